//! The structural summing matrix.

use super::node::NodeId;
use crate::error::{Error, Result};
use faer::{Mat, MatRef};

/// A structural summing matrix for a hierarchy.
///
/// For a hierarchy with $m$ total nodes and $n$ bottom nodes,
/// $S$ is an $m \times n$ binary matrix where $S_{ij} = 1$ if
/// bottom node $j$ is aggregated into node $i$.
#[derive(Debug, Clone)]
pub struct SummingMatrix {
    inner: Mat<f64>,
}

impl SummingMatrix {
    /// Create a new summing matrix from a faer matrix.
    pub fn new(inner: Mat<f64>) -> Self {
        Self { inner }
    }

    /// Build from row vectors.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let first = rows.first().ok_or(Error::EmptyInput)?;
        let n = first.len();
        if let Some(row) = rows.iter().find(|r| r.len() != n) {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: row.len(),
            });
        }
        Ok(Self {
            inner: Mat::from_fn(rows.len(), n, |i, j| rows[i][j]),
        })
    }

    /// Build from an `ndarray` view.
    #[cfg(feature = "ndarray")]
    pub fn from_ndarray(array: ndarray::ArrayView2<'_, f64>) -> Self {
        Self {
            inner: crate::linalg::mat_from_ndarray(array),
        }
    }

    /// Number of total nodes (rows).
    pub fn m(&self) -> usize {
        self.inner.nrows()
    }

    /// Number of bottom nodes (columns).
    pub fn n(&self) -> usize {
        self.inner.ncols()
    }

    /// Get the matrix reference.
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.inner.as_ref()
    }

    /// Generate S for a simple 2-level hierarchy (root + n leaves).
    pub fn simple_star(n_leaves: usize) -> Self {
        let mut mat = Mat::<f64>::zeros(n_leaves + 1, n_leaves);
        // Root (row 0) is sum of all leaves
        for j in 0..n_leaves {
            mat[(0, j)] = 1.0;
        }
        // Leaves (rows 1..n+1)
        for j in 0..n_leaves {
            mat[(j + 1, j)] = 1.0;
        }
        Self { inner: mat }
    }

    /// Number of bottom descendants of every node.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.m())
            .map(|i| (0..self.n()).map(|j| self.inner[(i, j)]).sum())
            .collect()
    }

    /// Bottom columns aggregated into `node`. Empty for an out-of-range id.
    pub fn row_support(&self, node: NodeId) -> Vec<usize> {
        if node.index() >= self.m() {
            return Vec::new();
        }
        (0..self.n())
            .filter(|&j| self.inner[(node.index(), j)] != 0.0)
            .collect()
    }

    /// Whether two nodes share at least one bottom column.
    pub fn overlaps(&self, a: NodeId, b: NodeId) -> bool {
        let m = self.m();
        if a.index() >= m || b.index() >= m {
            return false;
        }
        (0..self.n()).any(|j| self.inner[(a.index(), j)] != 0.0 && self.inner[(b.index(), j)] != 0.0)
    }

    /// Whether `node` aggregates bottom column `col`.
    pub fn covers(&self, node: NodeId, col: usize) -> bool {
        node.index() < self.m() && col < self.n() && self.inner[(node.index(), col)] != 0.0
    }

    /// The node aggregating the most bottom series, first on ties.
    pub fn root(&self) -> NodeId {
        let sums = self.row_sums();
        let mut best = 0;
        for (i, &sum) in sums.iter().enumerate() {
            if sum > sums[best] {
                best = i;
            }
        }
        NodeId::new(best)
    }

    /// The column a bottom node stands for (its first nonzero entry).
    pub fn bottom_column(&self, node: NodeId) -> Option<usize> {
        self.row_support(node).first().copied()
    }

    /// Rows of `S` for the given nodes, in the given order.
    pub fn select_rows(&self, nodes: &[NodeId]) -> Result<Mat<f64>> {
        if let Some(bad) = nodes.iter().find(|id| id.index() >= self.m()) {
            return Err(Error::invalid(
                "nodes",
                format!("node {bad} is out of range for {} rows", self.m()),
            ));
        }
        Ok(Mat::from_fn(nodes.len(), self.n(), |i, j| {
            self.inner[(nodes[i].index(), j)]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_root_and_supports() {
        let s = SummingMatrix::simple_star(3);
        assert_eq!((s.m(), s.n()), (4, 3));
        assert_eq!(s.root(), NodeId::new(0));
        assert_eq!(s.row_sums(), vec![3.0, 1.0, 1.0, 1.0]);
        assert_eq!(s.row_support(NodeId::new(2)), vec![1]);
        assert_eq!(s.bottom_column(NodeId::new(3)), Some(2));
        assert!(s.overlaps(NodeId::new(0), NodeId::new(1)));
        assert!(!s.overlaps(NodeId::new(1), NodeId::new(2)));
        assert!(!s.overlaps(NodeId::new(0), NodeId::new(9)));
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = SummingMatrix::from_rows(&[vec![1.0, 1.0], vec![1.0]]).unwrap_err();
        assert_eq!(err, Error::DimensionMismatch { expected: 2, found: 1 });
        assert_eq!(SummingMatrix::from_rows(&[]).unwrap_err(), Error::EmptyInput);
    }

    #[test]
    fn select_rows_keeps_order() {
        let s = SummingMatrix::simple_star(2);
        let sub = s.select_rows(&[NodeId::new(2), NodeId::new(0)]).unwrap();
        assert_eq!(sub[(0, 0)], 0.0);
        assert_eq!(sub[(0, 1)], 1.0);
        assert_eq!(sub[(1, 0)], 1.0);
        assert!(s.select_rows(&[NodeId::new(5)]).is_err());
    }
}
