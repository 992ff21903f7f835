//! model::persistence: versioned JSON storage of trained change models.
//!
//! Layout:
//!
//! ```text
//! { "schema_version": 1,
//!   "model": { "model_name": …, "models": [ { "name", "vector", "constraint",
//!              "prior_weight", "mean_regressor", "cov_regressor" }, … ] } }
//! ```
//!
//! Regressors are stored as `degree`, `alpha`, `n_inputs` and the
//! coefficient matrix, so the blob can be read without running any code
//! from this crate. Floats round-trip exactly.
use std::{
    fs::File,
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{
    change_model::{ChangeModel, ChangeModelRecord},
    errors::{ChangeError, ChangeResult},
};

/// Version written by [`ChangeModel::save`] and required by [`ChangeModel::load`].
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct ModelFileRef<'a> {
    schema_version: u32,
    model: &'a ChangeModel,
}

#[derive(Deserialize)]
struct ModelHeader {
    schema_version: u32,
}

#[derive(Deserialize)]
struct ModelFile {
    model: ChangeModelRecord,
}

impl ChangeModel {
    /// Serialize the model to a JSON string.
    pub fn to_json(&self) -> ChangeResult<String> {
        Ok(serde_json::to_string(&ModelFileRef { schema_version: SCHEMA_VERSION, model: self })?)
    }

    /// Parse a model from a JSON string and re-validate it.
    ///
    /// # Errors
    /// - [`ChangeError::SchemaVersion`] for a different `schema_version`.
    /// - [`ChangeError::Json`] for malformed content.
    /// - Any validation error of [`ChangeModel::new`].
    pub fn from_json(text: &str) -> ChangeResult<Self> {
        let header: ModelHeader = serde_json::from_str(text)?;
        if header.schema_version != SCHEMA_VERSION {
            return Err(ChangeError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: header.schema_version,
            });
        }
        let file: ModelFile = serde_json::from_str(text)?;
        ChangeModel::try_from(file.model)
    }

    /// Write the model to `path`, replacing any existing file.
    ///
    /// # Errors
    /// - [`ChangeError::Io`] when the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> ChangeResult<()> {
        let path = path.as_ref();
        let io_err = |source| ChangeError::Io { path: path.to_path_buf(), source };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(
            &mut writer,
            &ModelFileRef { schema_version: SCHEMA_VERSION, model: self },
        )?;
        writer.flush().map_err(io_err)?;
        info!(path = %path.display(), model = %self.model_name(), "saved change model");
        Ok(())
    }

    /// Read a model previously written by [`ChangeModel::save`].
    ///
    /// # Errors
    /// - [`ChangeError::ModelNotFound`] when `path` does not exist.
    /// - [`ChangeError::Io`] for other read failures.
    /// - Any error of [`ChangeModel::from_json`].
    pub fn load(path: impl AsRef<Path>) -> ChangeResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ChangeError::ModelNotFound { path: path.to_path_buf() },
            _ => ChangeError::Io { path: path.to_path_buf(), source },
        })?;
        let mut text = String::new();
        std::io::Read::read_to_string(&mut BufReader::new(file), &mut text)
            .map_err(|source| ChangeError::Io { path: path.to_path_buf(), source })?;
        let model = Self::from_json(&text)?;
        info!(path = %path.display(), model = %model.model_name(), "loaded change model");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        direction::vector::{DirectionVector, DomainConstraint},
        model::direction_model::ChangeDirectionModel,
        regression::ridge::PolyRidge,
    };
    use ndarray::Array2;
    use std::sync::Arc;

    fn small_model() -> ChangeModel {
        let x = Array2::from_shape_fn((6, 2), |(i, j)| (i as f64) * 0.1 + j as f64 / 3.0);
        let mu = Array2::from_shape_fn((6, 2), |(i, j)| 1.0 / 3.0 + (i * j) as f64);
        let link = Array2::from_shape_fn((6, 3), |(i, j)| -0.1 * (i + j) as f64);
        let mean = Arc::new(PolyRidge::fit(x.view(), mu.view(), 2, 0.5).unwrap());
        let cov = Arc::new(PolyRidge::fit(x.view(), link.view(), 2, 0.5).unwrap());
        let vector = DirectionVector::new(vec![("a", 0.6), ("b", -0.8)]).unwrap();
        let models = [DomainConstraint::Positive, DomainConstraint::Negative]
            .into_iter()
            .map(|c| {
                ChangeDirectionModel::new(
                    format!("{vector}, {c}"),
                    vector.clone(),
                    c,
                    0.7,
                    Arc::clone(&mean),
                    Arc::clone(&cov),
                )
                .unwrap()
            })
            .collect();
        ChangeModel::new("small", models).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // A saved model loads back identical, including every float.
    fn save_then_load_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = small_model();

        model.save(&path).unwrap();
        let loaded = ChangeModel::load(&path).unwrap();

        assert_eq!(loaded, model);
        assert_eq!(loaded.models()[1].name(), "0.6*a - 0.8*b, negative");
    }

    #[test]
    fn missing_file_is_reported_as_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChangeModel::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ChangeError::ModelNotFound { .. }));
    }

    #[test]
    fn other_schema_versions_are_rejected() {
        let text = small_model().to_json().unwrap().replacen(
            "\"schema_version\":1",
            "\"schema_version\":99",
            1,
        );
        let err = ChangeModel::from_json(&text).unwrap_err();
        assert!(matches!(err, ChangeError::SchemaVersion { expected: 1, found: 99 }));
    }

    #[test]
    // Purpose
    // -------
    // A stored model without directions is rejected on load, and plain
    // serde deserialization applies the same validation.
    fn empty_stored_model_is_rejected() {
        let text = "{\"schema_version\": 1, \"model\": {\"model_name\": \"x\", \"models\": []}}";

        let err = ChangeModel::from_json(text).unwrap_err();
        let direct = serde_json::from_str::<ChangeModel>("{\"model_name\": \"x\", \"models\": []}");

        assert!(matches!(err, ChangeError::EmptyModel));
        assert!(direct.is_err());
    }

    #[test]
    fn malformed_content_is_a_json_error() {
        let err = ChangeModel::from_json("{\"schema_version\": 1, \"model\": 3}").unwrap_err();
        assert!(matches!(err, ChangeError::Json(_)));
    }
}
