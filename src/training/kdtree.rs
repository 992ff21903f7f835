//! training::kdtree: exact k-nearest-neighbour queries over baseline
//! signals.
//!
//! Purpose
//! -------
//! Find, for every simulated baseline `y₁`, the `k` closest baselines
//! (itself included) so local derivative moments can be pooled over them.
//!
//! Key behaviors
//! -------------
//! - [`KdTree::new`] builds a balanced tree by median splits, cycling the
//!   split axis with depth.
//! - [`KdTree::nearest`] returns the `k` nearest rows in ascending order of
//!   squared Euclidean distance, ties broken by row index.
//! - [`KdTree::neighbourhoods`] runs the self-query for every row in
//!   parallel.
//!
//! Invariants & assumptions
//! ------------------------
//! - Results are exact; a subtree is skipped only when its splitting plane
//!   is strictly farther than the current `k`-th candidate.
//! - The tree owns a copy of the points and is immutable after build, so
//!   it can be shared read-only across workers.
//!
//! Testing notes
//! -------------
//! - Unit tests compare against brute force on random data and on a grid
//!   with many equal distances.
use std::{cmp::Ordering, collections::BinaryHeap};

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use crate::numerics::errors::{NumericError, NumericResult};

#[derive(Debug, Clone, Copy)]
struct KdNode {
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Balanced k-d tree over the rows of a point matrix.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Array2<f64>,
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

impl KdTree {
    /// Build a tree over the rows of `points` (`n_points × n_dim`).
    ///
    /// # Errors
    /// - [`NumericError::DimensionMismatch`] when `points` has no columns.
    pub fn new(points: Array2<f64>) -> NumericResult<Self> {
        if points.ncols() == 0 {
            return Err(NumericError::DimensionMismatch {
                context: "k-d tree point dimension",
                expected: 1,
                found: 0,
            });
        }
        let mut order: Vec<usize> = (0..points.nrows()).collect();
        let mut nodes = Vec::with_capacity(points.nrows());
        let root = build(&points, &mut order, 0, &mut nodes);
        Ok(Self { points, nodes, root })
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    pub fn dim(&self) -> usize {
        self.points.ncols()
    }

    /// Indices of the `k` rows closest to `query`, nearest first.
    ///
    /// Returns fewer than `k` indices only when the tree holds fewer points.
    ///
    /// # Panics
    /// Panics if `query.len() != self.dim()`.
    pub fn nearest(&self, query: ArrayView1<'_, f64>, k: usize) -> Vec<usize> {
        assert_eq!(query.len(), self.dim(), "query dimension does not match the tree");
        if k == 0 {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.search(self.root, query, k, &mut heap);
        heap.into_sorted_vec().into_iter().map(|c| c.index).collect()
    }

    /// `k` nearest neighbours of every stored row, each row included in its
    /// own neighbourhood.
    pub fn neighbourhoods(&self, k: usize) -> Vec<Vec<usize>> {
        (0..self.len()).into_par_iter().map(|i| self.nearest(self.points.row(i), k)).collect()
    }

    // ---- Helper methods ----

    fn search(
        &self, node: Option<usize>, query: ArrayView1<'_, f64>, k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        let Some(id) = node else { return };
        let KdNode { point, axis, left, right } = self.nodes[id];
        let row = self.points.row(point);
        let dist = row.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum::<f64>();
        offer(heap, k, Candidate { dist, index: point });

        let diff = query[axis] - row[axis];
        let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
        self.search(near, query, k, heap);
        let worst = if heap.len() < k { f64::INFINITY } else { heap.peek().map_or(f64::INFINITY, |c| c.dist) };
        if diff * diff <= worst {
            self.search(far, query, k, heap);
        }
    }
}

fn build(points: &Array2<f64>, order: &mut [usize], depth: usize, nodes: &mut Vec<KdNode>) -> Option<usize> {
    if order.is_empty() {
        return None;
    }
    let axis = depth % points.ncols();
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| points[[a, axis]].total_cmp(&points[[b, axis]]));
    let point = order[mid];
    let slot = nodes.len();
    nodes.push(KdNode { point, axis, left: None, right: None });

    let (lower, rest) = order.split_at_mut(mid);
    let left = build(points, lower, depth + 1, nodes);
    let right = build(points, &mut rest[1..], depth + 1, nodes);
    nodes[slot].left = left;
    nodes[slot].right = right;
    Some(slot)
}

/// Keep the `k` best candidates; the heap top is the current worst.
fn offer(heap: &mut BinaryHeap<Candidate>, k: usize, candidate: Candidate) {
    if heap.len() < k {
        heap.push(candidate);
    } else if heap.peek().is_some_and(|worst| candidate < *worst) {
        heap.pop();
        heap.push(candidate);
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist: f64,
    index: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn brute_force(points: &Array2<f64>, query: ArrayView1<'_, f64>, k: usize) -> Vec<usize> {
        let mut all: Vec<Candidate> = points
            .outer_iter()
            .enumerate()
            .map(|(index, row)| Candidate {
                dist: row.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum(),
                index,
            })
            .collect();
        all.sort();
        all.into_iter().take(k).map(|c| c.index).collect()
    }

    #[test]
    // Purpose
    // -------
    // Tree queries agree exactly with brute force on random 3-D data.
    //
    // Given
    // -----
    // - 300 uniform points, k = 7, every point used as a query.
    //
    // Expect
    // ------
    // - Identical ordered index lists, each starting with the query itself.
    fn nearest_matches_brute_force_on_random_points() {
        // Arrange
        let mut rng = StdRng::seed_from_u64(11);
        let points = Array2::from_shape_fn((300, 3), |_| rng.gen_range(-1.0..1.0));
        let tree = KdTree::new(points.clone()).unwrap();

        // Act
        let hoods = tree.neighbourhoods(7);

        // Assert
        for (i, hood) in hoods.iter().enumerate() {
            assert_eq!(hood, &brute_force(&points, points.row(i), 7), "row {i}");
            assert_eq!(hood[0], i);
        }
    }

    #[test]
    fn ties_are_broken_by_index() {
        let points = Array2::from_shape_fn((25, 2), |(i, j)| if j == 0 { (i % 5) as f64 } else { (i / 5) as f64 });
        let tree = KdTree::new(points.clone()).unwrap();
        let query = array![2.0, 2.0];

        for k in [1, 5, 9, 13] {
            assert_eq!(tree.nearest(query.view(), k), brute_force(&points, query.view(), k), "k = {k}");
        }
    }

    #[test]
    fn k_larger_than_tree_returns_every_point() {
        let points = array![[0.0, 0.0], [1.0, 0.0], [0.0, 3.0]];
        let tree = KdTree::new(points).unwrap();
        assert_eq!(tree.nearest(array![0.9, 0.1].view(), 10), vec![1, 0, 2]);
        assert!(tree.nearest(array![0.0, 0.0].view(), 0).is_empty());
    }

    #[test]
    fn zero_dimensional_points_are_rejected() {
        assert!(KdTree::new(Array2::<f64>::zeros((4, 0))).is_err());
    }
}
