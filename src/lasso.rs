//! Lasso regression by cyclic coordinate descent.
//!
//! Minimizes
//!
//! ```text
//! ||y - Xβ||² + λ·n·||β||₁        (n = rows of X)
//! ```
//!
//! one coordinate at a time. For coordinate $i$ with column $x_i$ and squared
//! norm $\|x_i\|^2$, the partial-residual minimizer is
//!
//! ```text
//! ρ   = β_i + x_iᵀ r / ||x_i||²
//! β_i ← sign(ρ) · max(|ρ| - λn / ||x_i||², 0)      (soft threshold)
//! ```
//!
//! and the residual $r = y - X\beta$ is updated in place with the change in
//! $\beta_i$, so one sweep costs $O(np)$ and allocates nothing.

use crate::error::{Error, Result};
use faer::MatRef;
use tracing::debug;

/// Columns with a squared norm below this are left at zero.
const ZERO_NORM: f64 = 1e-8;

/// Stopping rule for the coordinate-descent loop.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LassoConfig {
    /// Maximum number of full sweeps over the coordinates.
    pub max_iters: usize,
    /// Stop once the largest coefficient change in a sweep is below this.
    pub tol: f64,
}

impl Default for LassoConfig {
    fn default() -> Self {
        Self {
            max_iters: 1_000,
            tol: 1e-4,
        }
    }
}

impl LassoConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sweep cap.
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }
}

/// Solver output.
///
/// Hitting `max_iters` is not an error: `coefficients` then holds the last
/// iterate and `converged` is false.
#[derive(Debug, Clone, PartialEq)]
pub struct LassoFit {
    /// Fitted coefficients, one per column of `X`.
    pub coefficients: Vec<f64>,
    /// Sweeps performed.
    pub iterations: usize,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

/// Smallest `λ` for which the all-zero vector is optimal: `max_i |x_iᵀy| / n`.
pub fn lambda_max(x: MatRef<'_, f64>, y: &[f64]) -> f64 {
    let n = x.nrows();
    if n == 0 {
        return 0.0;
    }
    let mut best = 0.0f64;
    for i in 0..x.ncols() {
        let mut dot = 0.0;
        for (r, &yr) in y.iter().enumerate().take(n) {
            dot += x[(r, i)] * yr;
        }
        best = best.max(dot.abs());
    }
    best / n as f64
}

/// Fit a lasso regression of `y` on `x`.
pub fn lasso(x: MatRef<'_, f64>, y: &[f64], lambda: f64, config: &LassoConfig) -> Result<LassoFit> {
    let (n, p) = (x.nrows(), x.ncols());
    if y.len() != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            found: y.len(),
        });
    }
    if !(lambda >= 0.0) {
        return Err(Error::invalid("lambda", format!("must be non-negative, got {lambda}")));
    }

    let norms: Vec<f64> = (0..p)
        .map(|i| (0..n).map(|r| x[(r, i)] * x[(r, i)]).sum())
        .collect();
    let penalty = lambda * n as f64;

    let mut beta = vec![0.0; p];
    let mut changes = vec![0.0f64; p];
    let mut residuals = y.to_vec();
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..config.max_iters {
        iterations += 1;
        for i in 0..p {
            if norms[i].abs() < ZERO_NORM {
                continue;
            }
            let old = beta[i];
            let mut dot = 0.0;
            for (r, res) in residuals.iter().enumerate() {
                dot += x[(r, i)] * res;
            }
            let rho = old + dot / norms[i];
            let new = if rho == 0.0 {
                0.0
            } else {
                rho.signum() * (rho.abs() - penalty / norms[i]).max(0.0)
            };
            beta[i] = new;
            changes[i] = (old - new).abs();
            if new != old {
                let delta = old - new;
                for (r, res) in residuals.iter_mut().enumerate() {
                    *res += delta * x[(r, i)];
                }
            }
        }
        let largest = changes.iter().fold(0.0f64, |acc, &c| acc.max(c));
        if largest < config.tol {
            converged = true;
            break;
        }
    }

    debug!(rows = n, cols = p, lambda, iterations, converged, "lasso finished");

    Ok(LassoFit {
        coefficients: beta,
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    fn design() -> (Mat<f64>, Vec<f64>) {
        // y = 2·x0 - 1·x1, x2 carries no signal.
        let rows: [[f64; 3]; 6] = [
            [1.0, 0.0, 0.5],
            [0.0, 1.0, -0.5],
            [1.0, 1.0, 0.0],
            [2.0, 0.5, 1.0],
            [0.5, 2.0, -1.0],
            [1.5, -1.0, 0.25],
        ];
        let x = Mat::from_fn(6, 3, |i, j| rows[i][j]);
        let y = rows.iter().map(|r| 2.0 * r[0] - r[1]).collect();
        (x, y)
    }

    #[test]
    fn zero_penalty_recovers_least_squares() {
        let (x, y) = design();
        let config = LassoConfig::new().with_tol(1e-10).with_max_iters(10_000);
        let fit = lasso(x.as_ref(), &y, 0.0, &config).unwrap();
        assert!(fit.converged);
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-6);
        assert!((fit.coefficients[1] + 1.0).abs() < 1e-6);
        assert!(fit.coefficients[2].abs() < 1e-6);
    }

    #[test]
    fn lambda_max_gives_all_zero_solution() {
        let (x, y) = design();
        let lambda = lambda_max(x.as_ref(), &y);
        let fit = lasso(x.as_ref(), &y, lambda, &LassoConfig::default()).unwrap();
        assert!(fit.converged);
        assert!(fit.coefficients.iter().all(|&b| b.abs() < 1e-12));

        // Just below the threshold something enters the model.
        let fit = lasso(x.as_ref(), &y, 0.9 * lambda, &LassoConfig::default()).unwrap();
        assert!(fit.coefficients.iter().any(|&b| b != 0.0));
    }

    #[test]
    fn penalty_shrinks_coefficients() {
        let (x, y) = design();
        let config = LassoConfig::new().with_tol(1e-10).with_max_iters(10_000);
        let loose = lasso(x.as_ref(), &y, 0.0, &config).unwrap();
        let tight = lasso(x.as_ref(), &y, 0.1 * lambda_max(x.as_ref(), &y), &config).unwrap();
        let l1 = |b: &[f64]| b.iter().map(|v| v.abs()).sum::<f64>();
        assert!(l1(&tight.coefficients) < l1(&loose.coefficients));
    }

    #[test]
    fn zero_columns_are_skipped() {
        let x = Mat::from_fn(3, 2, |i, j| if j == 0 { (i + 1) as f64 } else { 0.0 });
        let y = vec![1.0, 2.0, 3.0];
        let fit = lasso(x.as_ref(), &y, 0.0, &LassoConfig::default()).unwrap();
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-8);
        assert_eq!(fit.coefficients[1], 0.0);
    }

    #[test]
    fn iteration_cap_is_not_an_error() {
        let (x, y) = design();
        let config = LassoConfig::new().with_max_iters(1).with_tol(0.0);
        let fit = lasso(x.as_ref(), &y, 0.0, &config).unwrap();
        assert_eq!(fit.iterations, 1);
        assert!(!fit.converged);
    }

    #[test]
    fn rejects_bad_inputs() {
        let (x, _) = design();
        assert!(matches!(
            lasso(x.as_ref(), &[1.0], 0.1, &LassoConfig::default()),
            Err(Error::DimensionMismatch { expected: 6, found: 1 })
        ));
        assert!(lasso(x.as_ref(), &[0.0; 6], -1.0, &LassoConfig::default()).is_err());
    }
}
