//! Bottom-up reconciliation.
//!
//! Keeps the bottom forecasts and rebuilds every aggregate as their sum:
//! $P = [\,0 \mid I\,]$ up to a permutation of columns, $W = I$.

use super::{check_rows, reconcile, ReconcileInput, Reconciler};
use crate::error::{Error, Result};
use crate::hierarchy::{NodeId, SummingMatrix};
use faer::{Mat, MatRef};
use tracing::debug;

/// Bottom-up strategy.
///
/// Reads `idx_bottom` from the input, or the largest level of `levels`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BottomUp;

impl BottomUp {
    /// Create the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl Reconciler for BottomUp {
    fn reconcile(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>> {
        let idx_bottom = input.bottom_nodes()?;
        debug!(strategy = self.name(), nodes = s.m(), bottom = idx_bottom.len(), "reconciling");
        bottom_up(s, input.y_hat, idx_bottom)
    }

    fn name(&self) -> &'static str {
        "bottom_up"
    }
}

/// `P`: zeros shaped like `S` with the bottom rows copied from `S`, transposed.
pub(crate) fn bottom_up_projection(s: &SummingMatrix, idx_bottom: &[NodeId]) -> Result<Mat<f64>> {
    let m = s.m();
    let mut is_bottom = vec![false; m];
    for id in idx_bottom {
        match is_bottom.get_mut(id.index()) {
            Some(flag) => *flag = true,
            None => {
                return Err(Error::invalid(
                    "idx_bottom",
                    format!("node {id} is out of range for {m} rows"),
                ))
            }
        }
    }
    let s_mat = s.as_ref();
    Ok(Mat::from_fn(s.n(), m, |j, i| if is_bottom[i] { s_mat[(i, j)] } else { 0.0 }))
}

pub(crate) fn bottom_up(
    s: &SummingMatrix,
    y_hat: MatRef<'_, f64>,
    idx_bottom: &[NodeId],
) -> Result<Mat<f64>> {
    check_rows(s, y_hat)?;
    let p = bottom_up_projection(s, idx_bottom)?;
    let w = Mat::<f64>::identity(s.m(), s.m());
    reconcile(s, p.as_ref(), w.as_ref(), y_hat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{node_ids, HierarchyTree};

    #[test]
    fn aggregates_are_sums_of_bottom() {
        let tree =
            HierarchyTree::from_parents(&[None, Some(0), Some(0), Some(1), Some(1), Some(2), Some(2)])
                .unwrap();
        let s = tree.summing_matrix();
        let y_hat = Mat::from_fn(7, 2, |i, h| (i as f64 + 1.0) * (h as f64 + 1.0));
        let idx = node_ids(&[3, 4, 5, 6]);

        let y_tilde = BottomUp::new()
            .reconcile(&s, &ReconcileInput::new(y_hat.as_ref()).with_bottom(&idx))
            .unwrap();
        for h in 0..2 {
            let scale = h as f64 + 1.0;
            assert_eq!(y_tilde[(3, h)], 4.0 * scale);
            assert_eq!(y_tilde[(1, h)], 9.0 * scale);
            assert_eq!(y_tilde[(2, h)], 13.0 * scale);
            assert_eq!(y_tilde[(0, h)], 22.0 * scale);
        }
    }

    #[test]
    fn permuted_bottom_rows() {
        // Bottom rows listed before the total, columns swapped.
        let s = SummingMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]]).unwrap();
        let y_hat = Mat::from_fn(3, 1, |i, _| [2.0, 5.0, 100.0][i]);
        let idx = node_ids(&[0, 1]);
        let y_tilde = bottom_up(&s, y_hat.as_ref(), &idx).unwrap();
        assert_eq!(y_tilde[(0, 0)], 2.0);
        assert_eq!(y_tilde[(1, 0)], 5.0);
        assert_eq!(y_tilde[(2, 0)], 7.0);
    }

    #[test]
    fn out_of_range_bottom_is_rejected() {
        let s = SummingMatrix::simple_star(2);
        let y_hat = Mat::<f64>::zeros(3, 1);
        assert!(bottom_up(&s, y_hat.as_ref(), &node_ids(&[1, 7])).is_err());
        assert!(BottomUp::new().reconcile(&s, &ReconcileInput::new(y_hat.as_ref())).is_err());
    }
}
