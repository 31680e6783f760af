//! Covariance estimates of in-sample forecast errors.
//!
//! Residuals are laid out like the forecasts: one row per node, one column per
//! time step. Missing values are `NaN` and are skipped pairwise.
//!
//! The shrinkage estimator pulls the sample covariance toward its diagonal:
//!
//! ```text
//! W = λ · diag(Σ) + (1 - λ) · Σ
//! ```
//!
//! with λ estimated from the standardized residuals (Schäfer & Strimmer, 2005):
//!
//! ```text
//! λ = Σ_{i≠j} Var(r_ij) / Σ_{i≠j} r_ij²
//! ```
//!
//! clamped to `[0, 1]`.

use crate::error::{Error, Result};
use faer::{Mat, MatRef};
use tracing::{trace, warn};

/// In-sample errors `y - ŷ`, `n_total x n_history`.
pub fn residuals(y_insample: MatRef<'_, f64>, y_hat_insample: MatRef<'_, f64>) -> Result<Mat<f64>> {
    if y_insample.nrows() != y_hat_insample.nrows() || y_insample.ncols() != y_hat_insample.ncols() {
        return Err(Error::ShapeMismatch {
            expected: format!("{}x{} fitted values", y_insample.nrows(), y_insample.ncols()),
            actual: format!("{}x{} fitted values", y_hat_insample.nrows(), y_hat_insample.ncols()),
        });
    }
    Ok(Mat::from_fn(y_insample.nrows(), y_insample.ncols(), |i, t| {
        y_insample[(i, t)] - y_hat_insample[(i, t)]
    }))
}

/// Sample covariance between the rows of `residuals`, ignoring `NaN`.
///
/// Each row is centered on the mean of its own observed values. Entry `(i, j)`
/// sums over the time steps where both rows are observed and divides by that
/// count minus one.
///
/// Fails when some pair of rows shares fewer than two observations.
pub fn masked_covariance(residuals: MatRef<'_, f64>) -> Result<Mat<f64>> {
    let (nodes, history) = (residuals.nrows(), residuals.ncols());
    if nodes == 0 {
        return Err(Error::EmptyInput);
    }

    let observed = |i: usize, t: usize| !residuals[(i, t)].is_nan();
    let mut means = vec![0.0; nodes];
    for (i, mean) in means.iter_mut().enumerate() {
        let (sum, count) = (0..history)
            .filter(|&t| observed(i, t))
            .fold((0.0, 0usize), |(s, c), t| (s + residuals[(i, t)], c + 1));
        *mean = if count > 0 { sum / count as f64 } else { f64::NAN };
    }

    let mut cov = Mat::<f64>::zeros(nodes, nodes);
    for i in 0..nodes {
        for j in 0..=i {
            let mut sum = 0.0;
            let mut joint = 0usize;
            for t in 0..history {
                if observed(i, t) && observed(j, t) {
                    sum += (residuals[(i, t)] - means[i]) * (residuals[(j, t)] - means[j]);
                    joint += 1;
                }
            }
            if joint < 2 {
                return Err(Error::invalid(
                    "y_insample",
                    format!("nodes {i} and {j} share {joint} observed residuals; need at least 2"),
                ));
            }
            let value = sum / (joint - 1) as f64;
            cov[(i, j)] = value;
            cov[(j, i)] = value;
        }
    }
    Ok(cov)
}

/// Correlation matrix from a covariance matrix.
///
/// Rows with zero variance get zero correlation with everything else.
pub fn correlation(cov: MatRef<'_, f64>) -> Mat<f64> {
    let n = cov.nrows();
    let sd: Vec<f64> = (0..n).map(|i| cov[(i, i)].max(0.0).sqrt()).collect();
    Mat::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else if sd[i] > 0.0 && sd[j] > 0.0 {
            cov[(i, j)] / (sd[i] * sd[j])
        } else {
            0.0
        }
    })
}

/// `λ · diag(cov) + (1 - λ) · cov`.
pub fn shrink(cov: MatRef<'_, f64>, lambda: f64) -> Mat<f64> {
    Mat::from_fn(cov.nrows(), cov.ncols(), |i, j| {
        if i == j {
            cov[(i, j)]
        } else {
            (1.0 - lambda) * cov[(i, j)]
        }
    })
}

/// Shrinkage intensity toward the diagonal target, in `[0, 1]`.
///
/// Uses the residuals scaled by their standard deviations (not re-centered)
/// over the time steps where every node is observed. With fewer than two such
/// steps, or no off-diagonal correlation at all, the target is used as is.
pub fn shrinkage_intensity(residuals: MatRef<'_, f64>, cov: MatRef<'_, f64>) -> f64 {
    let nodes = residuals.nrows();
    let sd: Vec<f64> = (0..nodes).map(|i| cov[(i, i)].max(0.0).sqrt()).collect();

    let complete: Vec<usize> = (0..residuals.ncols())
        .filter(|&t| (0..nodes).all(|i| !residuals[(i, t)].is_nan()))
        .collect();
    let n = complete.len();
    if n < 2 {
        warn!(complete = n, "too few complete residual columns for shrinkage; using λ = 1");
        return 1.0;
    }
    let nf = n as f64;
    let xs = Mat::from_fn(nodes, n, |i, k| residuals[(i, complete[k])] / sd[i]);

    let corr = correlation(cov);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in 0..nodes {
        for j in 0..nodes {
            if i == j {
                continue;
            }
            let mut cross = 0.0;
            let mut cross_sq = 0.0;
            for k in 0..n {
                let p = xs[(i, k)] * xs[(j, k)];
                cross += p;
                cross_sq += p * p;
            }
            numerator += (cross_sq - cross * cross / nf) / (nf * (nf - 1.0));
            denominator += corr[(i, j)] * corr[(i, j)];
        }
    }

    if denominator == 0.0 || !numerator.is_finite() {
        return 1.0;
    }
    let lambda = (numerator / denominator).clamp(0.0, 1.0);
    trace!(numerator, denominator, lambda, "shrinkage intensity");
    lambda
}

/// A covariance matrix shrunk toward its diagonal, with the intensity used.
#[derive(Debug, Clone)]
pub struct ShrunkCovariance {
    /// The shrunk estimate.
    pub covariance: Mat<f64>,
    /// Weight of the diagonal target.
    pub lambda: f64,
}

/// Masked covariance of `residuals`, shrunk toward its diagonal.
pub fn shrunk_covariance(residuals: MatRef<'_, f64>) -> Result<ShrunkCovariance> {
    let cov = masked_covariance(residuals)?;
    let lambda = shrinkage_intensity(residuals, cov.as_ref());
    Ok(ShrunkCovariance {
        covariance: shrink(cov.as_ref(), lambda),
        lambda,
    })
}
