//! Reconciliation methods for hierarchical forecasts.
//!
//! Hierarchical data follows a structural constraint: $y = S \cdot b$, where
//! $b$ are the "bottom-level" items and $S$ is the summing matrix.
//!
//! Reconciliation ensures that base forecasts $\hat{y}$ are adjusted to
//! $\tilde{y}$ such that $\tilde{y}$ satisfies the constraints. Every strategy
//! here computes a projection $P$ (bottom × total) and returns
//!
//! ```text
//! ỹ = S · P · ŷ
//! ```
//!
//! through [`reconcile`], so coherence holds by construction whatever $P$ is.
//!
//! | Strategy | Projection | Needs |
//! |----------|------------|-------|
//! | [`BottomUp`] | select bottom rows | bottom index set |
//! | [`TopDown`] | split the root by proportions | levels, strict tree, maybe history |
//! | [`MiddleOut`] | bottom-up above a level, top-down below | levels, strict tree |
//! | [`MinTrace`] | $(S^T W^{+} S)^{+} S^T W^{+}$ | residuals for statistical $W$ |
//! | [`OptimalCombination`] | MinTrace with structural $W$ only | nothing |
//! | [`Erm`] | regression on in-sample errors | history |
//!
//! ## Usage
//!
//! ```rust
//! use coherent::hierarchy::HierarchyTree;
//! use coherent::reconciliation::{BottomUp, ReconcileInput, Reconciler};
//! use faer::Mat;
//!
//! let tree = HierarchyTree::from_parents(&[None, Some(0), Some(0)]).unwrap();
//! let (s, levels) = (tree.summing_matrix(), tree.levels());
//!
//! let y_hat = Mat::from_fn(3, 1, |i, _| [10.0, 3.0, 4.0][i]);
//! let input = ReconcileInput::new(y_hat.as_ref()).with_levels(&levels);
//! let y_tilde = BottomUp::new().reconcile(&s, &input).unwrap();
//! assert_eq!(y_tilde[(0, 0)], 7.0);
//! ```

mod bottom_up;
pub mod covariance;
mod erm;
mod middle_out;
mod min_trace;
mod top_down;

pub use bottom_up::BottomUp;
pub use erm::{Erm, ErmMethod, Regularization};
pub use middle_out::MiddleOut;
pub use min_trace::{MinTrace, MinTraceMethod, OptimalCombination};
pub use top_down::{TopDown, TopDownMethod};

use crate::error::{Error, Result};
use crate::hierarchy::{Levels, NodeId, SummingMatrix};
use faer::{Mat, MatRef};

/// Reconcile base forecasts $\hat{y}$ with a projection $P$.
///
/// Returns $\tilde{y} = S \cdot (P \cdot \hat{y})$. `w` is the weighting
/// matrix the projection was derived from; it only takes part in the shape
/// check.
pub fn reconcile(
    s: &SummingMatrix,
    p: MatRef<'_, f64>,
    w: MatRef<'_, f64>,
    y_hat: MatRef<'_, f64>, // m x 1 or m x k
) -> Result<Mat<f64>> {
    let m = s.m();
    let n = s.n();

    if p.nrows() != n || p.ncols() != m {
        return Err(Error::ShapeMismatch {
            expected: format!("{}x{} projection", n, m),
            actual: format!("{}x{} projection", p.nrows(), p.ncols()),
        });
    }
    if w.nrows() != m || w.ncols() != m {
        return Err(Error::ShapeMismatch {
            expected: format!("{}x{} weighting", m, m),
            actual: format!("{}x{} weighting", w.nrows(), w.ncols()),
        });
    }
    if y_hat.nrows() != m {
        return Err(Error::DimensionMismatch {
            expected: m,
            found: y_hat.nrows(),
        });
    }

    let bottom = p * y_hat;
    Ok(s.as_ref() * bottom.as_ref())
}

/// A reconciliation strategy.
///
/// Implementations are plain data: configured once, then called any number of
/// times with independent inputs.
pub trait Reconciler {
    /// Reconcile `input.y_hat` against `s`.
    fn reconcile(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>>;

    /// Short strategy name.
    fn name(&self) -> &'static str;
}

/// Borrowed inputs of one reconciliation call.
///
/// Only `y_hat` is always required; each strategy documents which of the
/// optional parts it reads and fails with [`Error::InvalidArgument`] when one
/// is missing.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    /// Base forecasts, `n_total x horizon`.
    pub y_hat: MatRef<'a, f64>,
    /// In-sample actuals, `n_total x n_history`.
    pub y_insample: Option<MatRef<'a, f64>>,
    /// In-sample fitted values, `n_total x n_history`.
    pub y_hat_insample: Option<MatRef<'a, f64>>,
    /// Level map over the rows of `S`.
    pub levels: Option<&'a Levels>,
    /// Rows of `S` forming the bottom level.
    pub idx_bottom: Option<&'a [NodeId]>,
}

impl<'a> ReconcileInput<'a> {
    /// Inputs with forecasts only.
    pub fn new(y_hat: MatRef<'a, f64>) -> Self {
        Self {
            y_hat,
            y_insample: None,
            y_hat_insample: None,
            levels: None,
            idx_bottom: None,
        }
    }

    /// Attach in-sample actuals and fitted values.
    pub fn with_insample(mut self, y_insample: MatRef<'a, f64>, y_hat_insample: MatRef<'a, f64>) -> Self {
        self.y_insample = Some(y_insample);
        self.y_hat_insample = Some(y_hat_insample);
        self
    }

    /// Attach in-sample actuals only (enough for top-down proportions).
    pub fn with_actuals(mut self, y_insample: MatRef<'a, f64>) -> Self {
        self.y_insample = Some(y_insample);
        self
    }

    /// Attach the level map.
    pub fn with_levels(mut self, levels: &'a Levels) -> Self {
        self.levels = Some(levels);
        self
    }

    /// Attach the bottom index set.
    pub fn with_bottom(mut self, idx_bottom: &'a [NodeId]) -> Self {
        self.idx_bottom = Some(idx_bottom);
        self
    }

    pub(crate) fn require_levels(&self) -> Result<&'a Levels> {
        self.levels
            .ok_or_else(|| Error::invalid("levels", "this strategy needs the hierarchy level map"))
    }

    pub(crate) fn require_insample(&self) -> Result<(MatRef<'a, f64>, MatRef<'a, f64>)> {
        match (self.y_insample, self.y_hat_insample) {
            (Some(y), Some(y_hat)) => Ok((y, y_hat)),
            _ => Err(Error::invalid(
                "y_insample",
                "this method needs in-sample actuals and fitted values",
            )),
        }
    }

    /// Explicit bottom set, else the largest level.
    pub(crate) fn bottom_nodes(&self) -> Result<&'a [NodeId]> {
        if let Some(idx) = self.idx_bottom {
            return Ok(idx);
        }
        self.levels
            .and_then(|levels| levels.bottom())
            .map(|(_, nodes)| nodes)
            .ok_or_else(|| {
                Error::invalid("idx_bottom", "pass the bottom index set or the level map")
            })
    }
}

/// Fail unless `mat` has one row per node of `S`.
pub(crate) fn check_rows(s: &SummingMatrix, mat: MatRef<'_, f64>) -> Result<()> {
    if mat.nrows() != s.m() {
        return Err(Error::DimensionMismatch {
            expected: s.m(),
            found: mat.nrows(),
        });
    }
    Ok(())
}

/// Fail unless every node of `levels` is a row of `S`.
pub(crate) fn check_level_range(s: &SummingMatrix, levels: &Levels) -> Result<()> {
    for (name, nodes) in levels.iter() {
        if let Some(bad) = nodes.iter().find(|id| id.index() >= s.m()) {
            return Err(Error::invalid(
                "levels",
                format!("level '{name}' holds node {bad}, out of range for {} rows", s.m()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_applies_projection() {
        // Star hierarchy: 1 root, 2 leaves.
        // Projection keeps the leaves.
        let s = SummingMatrix::simple_star(2);
        let p = Mat::from_fn(2, 3, |i, j| if j == i + 1 { 1.0 } else { 0.0 });
        let w = Mat::<f64>::identity(3, 3);
        let y_hat = Mat::from_fn(3, 1, |i, _| [3.0, 1.0, 1.5][i]);

        let y_tilde = reconcile(&s, p.as_ref(), w.as_ref(), y_hat.as_ref()).unwrap();
        assert!((y_tilde[(0, 0)] - 2.5).abs() < 1e-12);
        assert!((y_tilde[(2, 0)] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn primitive_reports_shape_mismatch() {
        let s = SummingMatrix::simple_star(2);
        let w = Mat::<f64>::identity(3, 3);
        let y_hat = Mat::<f64>::zeros(3, 1);

        let bad_p = Mat::<f64>::zeros(3, 3);
        assert!(matches!(
            reconcile(&s, bad_p.as_ref(), w.as_ref(), y_hat.as_ref()),
            Err(Error::ShapeMismatch { .. })
        ));

        let p = Mat::<f64>::zeros(2, 3);
        let short = Mat::<f64>::zeros(2, 4);
        assert_eq!(
            reconcile(&s, p.as_ref(), w.as_ref(), short.as_ref()).unwrap_err(),
            Error::DimensionMismatch { expected: 3, found: 2 }
        );
    }

    #[test]
    fn input_falls_back_to_largest_level() {
        let levels = Levels::new().with_level("total", [0]).with_level("leaf", [1, 2]);
        let y_hat = Mat::<f64>::zeros(3, 1);
        let input = ReconcileInput::new(y_hat.as_ref());
        assert!(input.bottom_nodes().is_err());
        assert!(input.require_levels().is_err());
        assert!(input.require_insample().is_err());

        let input = input.with_levels(&levels);
        assert_eq!(input.bottom_nodes().unwrap(), &[NodeId::new(1), NodeId::new(2)]);

        let explicit = [NodeId::new(2)];
        let input = input.with_bottom(&explicit);
        assert_eq!(input.bottom_nodes().unwrap(), &explicit);
    }

    #[test]
    fn level_nodes_must_be_rows_of_s() {
        let s = SummingMatrix::simple_star(2);
        let levels = Levels::new().with_level("total", [0]).with_level("leaf", [1, 2]);
        assert!(check_level_range(&s, &levels).is_ok());

        let levels = Levels::new().with_level("total", [0]).with_level("leaf", [1, 30]);
        let err = check_level_range(&s, &levels).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { name: "levels", .. }));
    }
}
