//! Empirical-risk-minimization (ERM) reconciliation.
//!
//! Learns the projection $P$ from in-sample data instead of deriving it from a
//! covariance model: find $P$ so that $S P \hat{y}_t$ tracks $y_t$ on the most
//! recent history.
//!
//! - `closed`: least squares, $P = \big((\hat{Y}^T)^{+} B^T\big)^T$ with
//!   $B = (S^T S)^{+} S^T Y$.
//! - `reg`: lasso on $\mathrm{vec}(P)$ with design $X = S \otimes \hat{Y}^T$.
//! - `reg_bu`: same, but shrinks toward the bottom-up projection instead of
//!   zero.
//!
//! Only the last `h` in-sample steps are used, `h` the forecast horizon.

use core::fmt;
use core::str::FromStr;

use super::bottom_up::bottom_up_projection;
use super::{check_rows, reconcile, ReconcileInput, Reconciler};
use crate::error::{Error, Result};
use crate::hierarchy::SummingMatrix;
use crate::lasso::{lambda_max, lasso, LassoConfig};
use crate::linalg::{kron, pinv, pinv_symmetric};
use faer::{Mat, MatRef};
use tracing::{debug, warn};

/// Default lasso penalty for `reg` and `reg_bu`.
pub const DEFAULT_LAMBDA: f64 = 1e-2;

/// Lasso penalty.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum Regularization {
    /// A fixed penalty.
    Fixed(f64),
    /// The smallest penalty for which the lasso returns all zeros, so the
    /// result is the unregularized base projection.
    Auto,
}

impl Default for Regularization {
    fn default() -> Self {
        Regularization::Fixed(DEFAULT_LAMBDA)
    }
}

/// How `P` is estimated.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum ErmMethod {
    /// Closed-form least squares.
    Closed,
    /// Lasso shrinking toward zero.
    Reg {
        /// Penalty.
        lambda: Regularization,
    },
    /// Lasso shrinking toward bottom-up.
    RegBu {
        /// Penalty.
        lambda: Regularization,
    },
}

impl ErmMethod {
    const NAMES: [&'static str; 3] = ["closed", "reg", "reg_bu"];

    /// Snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ErmMethod::Closed => Self::NAMES[0],
            ErmMethod::Reg { .. } => Self::NAMES[1],
            ErmMethod::RegBu { .. } => Self::NAMES[2],
        }
    }
}

impl fmt::Display for ErmMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the method name; lasso methods get the default penalty.
impl FromStr for ErmMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "closed" => Ok(ErmMethod::Closed),
            "reg" => Ok(ErmMethod::Reg {
                lambda: Regularization::default(),
            }),
            "reg_bu" => Ok(ErmMethod::RegBu {
                lambda: Regularization::default(),
            }),
            other => Err(Error::unknown_method("erm_method", other, &Self::NAMES)),
        }
    }
}

/// ERM strategy.
///
/// Reads `y_insample` and `y_hat_insample`; `reg_bu` also needs `idx_bottom`
/// or `levels`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Erm {
    method: ErmMethod,
    lasso: LassoConfig,
}

impl Erm {
    /// Create the strategy with the default solver settings.
    pub fn new(method: ErmMethod) -> Self {
        Self {
            method,
            lasso: LassoConfig::default(),
        }
    }

    /// Replace the lasso solver settings.
    pub fn with_lasso(mut self, config: LassoConfig) -> Self {
        self.lasso = config;
        self
    }

    /// Configured method.
    pub fn method(&self) -> ErmMethod {
        self.method
    }

    /// Estimate the projection `P` (`n_bottom x n_total`).
    pub fn projection(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>> {
        let (y, y_hat) = input.require_insample()?;
        check_rows(s, y)?;
        check_rows(s, y_hat)?;
        if y.ncols() != y_hat.ncols() {
            return Err(Error::ShapeMismatch {
                expected: format!("{}x{} fitted values", y.nrows(), y.ncols()),
                actual: format!("{}x{} fitted values", y_hat.nrows(), y_hat.ncols()),
            });
        }

        let (y, y_hat) = recent_history(y, y_hat, input.y_hat.ncols())?;
        match self.method {
            ErmMethod::Closed => Ok(closed_form(s, y.as_ref(), y_hat.as_ref())),
            ErmMethod::Reg { lambda } => {
                let base = Mat::<f64>::zeros(s.n(), s.m());
                self.regularized(s, y.as_ref(), y_hat.as_ref(), base, lambda)
            }
            ErmMethod::RegBu { lambda } => {
                let base = bottom_up_projection(s, input.bottom_nodes()?)?;
                self.regularized(s, y.as_ref(), y_hat.as_ref(), base, lambda)
            }
        }
    }

    /// Lasso on `vec(P - base)`.
    ///
    /// Coefficient `j·m + k` is `P[j, k]`; observation `i·h + t` is node `i` at
    /// step `t`.
    fn regularized(
        &self,
        s: &SummingMatrix,
        y: MatRef<'_, f64>,
        y_hat: MatRef<'_, f64>,
        base: Mat<f64>,
        lambda: Regularization,
    ) -> Result<Mat<f64>> {
        let (m, n, h) = (s.m(), s.n(), y.ncols());
        let x = kron(s.as_ref(), y_hat.transpose());

        // Remove what the base projection already explains.
        let explained = base.as_ref() * y_hat;
        let fitted = s.as_ref() * explained.as_ref();
        let target: Vec<f64> = (0..m * h)
            .map(|r| y[(r / h, r % h)] - fitted[(r / h, r % h)])
            .collect();

        let lambda = match lambda {
            Regularization::Fixed(value) => value,
            Regularization::Auto => lambda_max(x.as_ref(), &target),
        };
        let fit = lasso(x.as_ref(), &target, lambda, &self.lasso)?;
        if !fit.converged {
            warn!(iterations = fit.iterations, lambda, "lasso did not converge; using last iterate");
        }

        let beta = &fit.coefficients;
        Ok(Mat::from_fn(n, m, |j, k| beta[j * m + k] + base[(j, k)]))
    }
}

impl Reconciler for Erm {
    fn reconcile(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>> {
        debug!(strategy = self.name(), method = %self.method, nodes = s.m(), "reconciling");
        check_rows(s, input.y_hat)?;
        let p = self.projection(s, input)?;
        let w = Mat::<f64>::identity(s.m(), s.m());
        reconcile(s, p.as_ref(), w.as_ref(), input.y_hat)
    }

    fn name(&self) -> &'static str {
        "erm"
    }
}

/// Drop steps with any missing fitted value, then keep the last `horizon`.
fn recent_history(
    y: MatRef<'_, f64>,
    y_hat: MatRef<'_, f64>,
    horizon: usize,
) -> Result<(Mat<f64>, Mat<f64>)> {
    let complete: Vec<usize> = (0..y_hat.ncols())
        .filter(|&t| (0..y_hat.nrows()).all(|i| !y_hat[(i, t)].is_nan()))
        .collect();
    let h = horizon.min(complete.len());
    if h == 0 {
        return Err(Error::invalid(
            "y_hat_insample",
            "no in-sample step has a fitted value for every node",
        ));
    }
    let steps = &complete[complete.len() - h..];
    debug!(kept = h, dropped = y_hat.ncols() - complete.len(), "erm history");
    Ok((
        Mat::from_fn(y.nrows(), h, |i, t| y[(i, steps[t])]),
        Mat::from_fn(y_hat.nrows(), h, |i, t| y_hat[(i, steps[t])]),
    ))
}

fn closed_form(s: &SummingMatrix, y: MatRef<'_, f64>, y_hat: MatRef<'_, f64>) -> Mat<f64> {
    let s_mat = s.as_ref();
    let gram = s_mat.transpose() * s_mat;
    let sty = s_mat.transpose() * y;
    let b = pinv_symmetric(gram.as_ref()) * sty.as_ref();
    let pt = pinv(y_hat.transpose()) * b.transpose();
    Mat::from_fn(pt.ncols(), pt.nrows(), |j, k| pt[(k, j)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{HierarchyTree, Levels};
    use crate::linalg::max_abs_diff;

    fn three_level() -> (SummingMatrix, Levels) {
        let tree =
            HierarchyTree::from_parents(&[None, Some(0), Some(0), Some(1), Some(1), Some(2), Some(2)])
                .unwrap();
        (tree.summing_matrix(), tree.levels())
    }

    /// Coherent history from bottom series, 7 x `len`.
    fn coherent(s: &SummingMatrix, len: usize, offset: usize) -> Mat<f64> {
        let bottom = Mat::from_fn(4, len, |j, t| {
            1.0 + j as f64 + ((t + offset) as f64 * (0.5 + 0.3 * j as f64)).sin()
        });
        s.as_ref() * bottom.as_ref()
    }

    fn is_coherent(s: &SummingMatrix, y: &Mat<f64>) -> bool {
        (0..y.ncols()).all(|h| {
            (0..s.m()).all(|i| {
                let sum: f64 = (0..s.n()).map(|j| s.as_ref()[(i, j)] * y[(3 + j, h)]).sum();
                (sum - y[(i, h)]).abs() < 1e-8
            })
        })
    }

    #[test]
    fn method_names_round_trip() {
        for name in ErmMethod::NAMES {
            let method: ErmMethod = name.parse().unwrap();
            assert_eq!(method.to_string(), name);
        }
        assert_eq!(
            "reg".parse::<ErmMethod>().unwrap(),
            ErmMethod::Reg {
                lambda: Regularization::Fixed(DEFAULT_LAMBDA)
            }
        );
        assert!(matches!(
            "ridge".parse::<ErmMethod>(),
            Err(Error::InvalidArgument { name: "erm_method", .. })
        ));
    }

    #[test]
    fn closed_form_reproduces_perfect_fits() {
        // Fitted values equal the actuals, so P = bottom-up fits exactly.
        let (s, _) = three_level();
        let y = coherent(&s, 10, 0);
        let y_hat = coherent(&s, 4, 3);
        let input = ReconcileInput::new(y_hat.as_ref()).with_insample(y.as_ref(), y.as_ref());
        let y_tilde = Erm::new(ErmMethod::Closed).reconcile(&s, &input).unwrap();
        assert!(is_coherent(&s, &y_tilde));

        // On the training window the learned map returns the actuals.
        let window = Mat::from_fn(7, 4, |i, t| y[(i, 6 + t)]);
        let input = ReconcileInput::new(window.as_ref()).with_insample(y.as_ref(), y.as_ref());
        let refit = Erm::new(ErmMethod::Closed).reconcile(&s, &input).unwrap();
        assert!(max_abs_diff(refit.as_ref(), window.as_ref()) < 1e-6);
    }

    #[test]
    fn unpenalized_lasso_reproduces_the_training_window() {
        let (s, levels) = three_level();
        let y = coherent(&s, 10, 0);
        let window = Mat::from_fn(7, 4, |i, t| y[(i, 6 + t)]);
        let input = ReconcileInput::new(window.as_ref())
            .with_insample(y.as_ref(), y.as_ref())
            .with_levels(&levels);
        let tight = LassoConfig::new().with_tol(1e-12).with_max_iters(100_000);

        for method in [
            ErmMethod::Reg { lambda: Regularization::Fixed(0.0) },
            ErmMethod::RegBu { lambda: Regularization::Fixed(0.0) },
        ] {
            let refit = Erm::new(method).with_lasso(tight).reconcile(&s, &input).unwrap();
            assert!(max_abs_diff(refit.as_ref(), window.as_ref()) < 1e-6, "{method}");
        }
    }

    #[test]
    fn regularized_methods_are_coherent() {
        let (s, levels) = three_level();
        let y = coherent(&s, 12, 0);
        let y_fit = Mat::from_fn(7, 12, |i, t| y[(i, t)] * (1.0 + 0.05 * ((i + t) % 3) as f64));
        let y_hat = coherent(&s, 3, 12);
        let input = ReconcileInput::new(y_hat.as_ref())
            .with_insample(y.as_ref(), y_fit.as_ref())
            .with_levels(&levels);

        for method in [
            ErmMethod::Reg { lambda: Regularization::default() },
            ErmMethod::RegBu { lambda: Regularization::default() },
        ] {
            let y_tilde = Erm::new(method).reconcile(&s, &input).unwrap();
            assert!(is_coherent(&s, &y_tilde), "{method}");
        }
    }

    #[test]
    fn auto_penalty_returns_the_base_projection() {
        let (s, levels) = three_level();
        let y = coherent(&s, 8, 0);
        let y_fit = Mat::from_fn(7, 8, |i, t| y[(i, t)] + 0.1 * ((i * t) % 4) as f64);
        let y_hat = Mat::from_fn(7, 2, |i, h| 3.0 + ((i + h) % 3) as f64);
        let input = ReconcileInput::new(y_hat.as_ref())
            .with_insample(y.as_ref(), y_fit.as_ref())
            .with_levels(&levels);

        let erm = Erm::new(ErmMethod::RegBu { lambda: Regularization::Auto });
        let p = erm.projection(&s, &input).unwrap();
        let base = bottom_up_projection(&s, levels.bottom().unwrap().1).unwrap();
        assert!(max_abs_diff(p.as_ref(), base.as_ref()) < 1e-12);

        let p = Erm::new(ErmMethod::Reg { lambda: Regularization::Auto })
            .projection(&s, &input)
            .unwrap();
        assert!(max_abs_diff(p.as_ref(), Mat::<f64>::zeros(4, 7).as_ref()) < 1e-12);
    }

    #[test]
    fn missing_fitted_steps_are_dropped() {
        let (s, _) = three_level();
        let y = coherent(&s, 6, 0);
        let mut y_fit = y.clone();
        y_fit[(2, 5)] = f64::NAN;
        y_fit[(0, 4)] = f64::NAN;
        let y_hat = coherent(&s, 2, 6);
        let input = ReconcileInput::new(y_hat.as_ref()).with_insample(y.as_ref(), y_fit.as_ref());
        let y_tilde = Erm::new(ErmMethod::Closed).reconcile(&s, &input).unwrap();
        assert!((0..7).all(|i| y_tilde[(i, 0)].is_finite() && y_tilde[(i, 1)].is_finite()));

        let all_missing = Mat::from_fn(7, 6, |_, _| f64::NAN);
        let input = ReconcileInput::new(y_hat.as_ref()).with_insample(y.as_ref(), all_missing.as_ref());
        assert!(matches!(
            Erm::new(ErmMethod::Closed).reconcile(&s, &input),
            Err(Error::InvalidArgument { name: "y_hat_insample", .. })
        ));
    }

    #[test]
    fn needs_history() {
        let (s, _) = three_level();
        let y_hat = Mat::<f64>::zeros(7, 1);
        let input = ReconcileInput::new(y_hat.as_ref());
        assert!(matches!(
            Erm::new(ErmMethod::Closed).reconcile(&s, &input),
            Err(Error::InvalidArgument { name: "y_insample", .. })
        ));
    }
}
