//! Polynomial feature expansion.
//!
//! Columns are all monomials of total degree `0..=degree`, degree-major;
//! within one degree the monomials follow combinations-with-replacement
//! order of the input indices. For inputs `(x0, x1)` and degree 2 the
//! columns are `1, x0, x1, x0², x0·x1, x1²`.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialFeatures {
    n_inputs: usize,
    degree: usize,
    terms: Vec<Vec<usize>>,
}

impl PolynomialFeatures {
    pub fn new(n_inputs: usize, degree: usize) -> Self {
        let mut terms = Vec::new();
        for d in 0..=degree {
            let mut current = Vec::with_capacity(d);
            push_combinations(n_inputs, d, 0, &mut current, &mut terms);
        }
        Self { n_inputs, degree, terms }
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of output columns, `C(n_inputs + degree, degree)`.
    pub fn n_outputs(&self) -> usize {
        self.terms.len()
    }

    /// Expand a single input row.
    ///
    /// # Panics
    /// Panics when `x.len() != n_inputs`; callers validate shapes first.
    pub fn transform_row(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        assert_eq!(x.len(), self.n_inputs, "feature input length");
        self.terms.iter().map(|term| term.iter().map(|&i| x[i]).product()).collect()
    }

    /// Expand every row of `x` (`n_samples × n_inputs`).
    ///
    /// # Panics
    /// Panics when `x.ncols() != n_inputs`; callers validate shapes first.
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        assert_eq!(x.ncols(), self.n_inputs, "feature input width");
        let mut out = Array2::<f64>::zeros((x.nrows(), self.n_outputs()));
        for (row, mut out_row) in x.outer_iter().zip(out.outer_iter_mut()) {
            for (slot, term) in out_row.iter_mut().zip(&self.terms) {
                *slot = term.iter().map(|&i| row[i]).product();
            }
        }
        out
    }
}

fn push_combinations(
    n: usize, remaining: usize, start: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>,
) {
    if remaining == 0 {
        out.push(current.clone());
        return;
    }
    for i in start..n {
        current.push(i);
        push_combinations(n, remaining - 1, i, current, out);
        current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // Column order is degree-major with combinations-with-replacement order
    // inside each degree.
    fn degree_two_columns_follow_combination_order() {
        let features = PolynomialFeatures::new(2, 2);

        let row = features.transform_row(array![2.0, 3.0].view());

        assert_eq!(features.n_outputs(), 6);
        assert_eq!(row, array![1.0, 2.0, 3.0, 4.0, 6.0, 9.0]);
    }

    #[test]
    fn output_count_is_binomial() {
        assert_eq!(PolynomialFeatures::new(3, 2).n_outputs(), 10);
        assert_eq!(PolynomialFeatures::new(3, 3).n_outputs(), 20);
        assert_eq!(PolynomialFeatures::new(4, 0).n_outputs(), 1);
    }

    #[test]
    fn matrix_transform_matches_row_transform() {
        let features = PolynomialFeatures::new(3, 2);
        let x = array![[1.0, -1.0, 0.5], [2.0, 0.0, 3.0]];

        let m = features.transform(x.view());

        for (i, row) in x.outer_iter().enumerate() {
            assert_eq!(m.row(i), features.transform_row(row));
        }
    }
}
