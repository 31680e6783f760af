//! Minimum-trace (MinT) reconciliation.
//!
//! Generalized least squares against a weighting matrix $W$:
//!
//! ```text
//! P = (Sᵀ W⁺ S)⁺ Sᵀ W⁺
//! ```
//!
//! | Method | $W$ |
//! |--------|-----|
//! | `ols` | $I$ |
//! | `wls_struct` | $\mathrm{diag}(S \mathbf{1})$ |
//! | `wls_var` | diagonal of the residual covariance |
//! | `mint_cov` | residual covariance |
//! | `mint_shrink` | residual covariance shrunk toward its diagonal |
//!
//! $W$ must be positive definite. Pseudo-inverses keep rank-deficient $S$
//! from failing outright.

use core::fmt;
use core::str::FromStr;

use super::covariance::{masked_covariance, residuals, shrinkage_intensity, shrink};
use super::{check_rows, reconcile, ReconcileInput, Reconciler};
use crate::error::{Error, Result};
use crate::hierarchy::SummingMatrix;
use crate::linalg::{diag, min_eigenvalue, pinv_symmetric};
use faer::Mat;
use tracing::debug;

/// Default positive-definiteness tolerance on the smallest eigenvalue of `W`.
pub const DEFAULT_PD_TOLERANCE: f64 = 1e-8;

/// Choice of weighting matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum MinTraceMethod {
    /// Identity.
    Ols,
    /// Number of bottom series under each node.
    WlsStruct,
    /// In-sample error variances.
    WlsVar,
    /// Full in-sample error covariance.
    MintCov,
    /// Shrunk in-sample error covariance.
    MintShrink,
}

impl MinTraceMethod {
    const NAMES: [&'static str; 5] = ["ols", "wls_struct", "wls_var", "mint_cov", "mint_shrink"];

    /// Snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            MinTraceMethod::Ols => Self::NAMES[0],
            MinTraceMethod::WlsStruct => Self::NAMES[1],
            MinTraceMethod::WlsVar => Self::NAMES[2],
            MinTraceMethod::MintCov => Self::NAMES[3],
            MinTraceMethod::MintShrink => Self::NAMES[4],
        }
    }

    /// Whether `W` is estimated from in-sample residuals.
    pub fn needs_residuals(self) -> bool {
        matches!(
            self,
            MinTraceMethod::WlsVar | MinTraceMethod::MintCov | MinTraceMethod::MintShrink
        )
    }
}

impl fmt::Display for MinTraceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MinTraceMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ols" => Ok(MinTraceMethod::Ols),
            "wls_struct" => Ok(MinTraceMethod::WlsStruct),
            "wls_var" => Ok(MinTraceMethod::WlsVar),
            "mint_cov" => Ok(MinTraceMethod::MintCov),
            "mint_shrink" => Ok(MinTraceMethod::MintShrink),
            other => Err(Error::unknown_method("min_trace_method", other, &Self::NAMES)),
        }
    }
}

/// MinTrace strategy.
///
/// Reads `y_insample` and `y_hat_insample` for the residual-based methods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinTrace {
    method: MinTraceMethod,
    pd_tolerance: f64,
}

impl MinTrace {
    /// Create the strategy.
    pub fn new(method: MinTraceMethod) -> Self {
        Self {
            method,
            pd_tolerance: DEFAULT_PD_TOLERANCE,
        }
    }

    /// Smallest eigenvalue of `W` still accepted as positive definite.
    pub fn with_pd_tolerance(mut self, tolerance: f64) -> Self {
        self.pd_tolerance = tolerance;
        self
    }

    /// Configured method.
    pub fn method(&self) -> MinTraceMethod {
        self.method
    }

    /// Configured tolerance.
    pub fn pd_tolerance(&self) -> f64 {
        self.pd_tolerance
    }

    /// Weighting matrix `W` for this method.
    pub fn weighting_matrix(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>> {
        let m = s.m();
        match self.method {
            MinTraceMethod::Ols => Ok(Mat::identity(m, m)),
            MinTraceMethod::WlsStruct => Ok(diag(&s.row_sums())),
            MinTraceMethod::WlsVar | MinTraceMethod::MintCov | MinTraceMethod::MintShrink => {
                let (y, y_hat) = input.require_insample()?;
                check_rows(s, y)?;
                let res = residuals(y, y_hat)?;
                let cov = masked_covariance(res.as_ref())?;
                match self.method {
                    MinTraceMethod::WlsVar => {
                        let variances: Vec<f64> = (0..m).map(|i| cov[(i, i)]).collect();
                        Ok(diag(&variances))
                    }
                    MinTraceMethod::MintShrink => {
                        let lambda = shrinkage_intensity(res.as_ref(), cov.as_ref());
                        debug!(lambda, "mint_shrink intensity");
                        Ok(shrink(cov.as_ref(), lambda))
                    }
                    _ => Ok(cov),
                }
            }
        }
    }
}

impl Reconciler for MinTrace {
    fn reconcile(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>> {
        debug!(strategy = self.name(), method = %self.method, nodes = s.m(), "reconciling");
        check_rows(s, input.y_hat)?;

        let w = self.weighting_matrix(s, input)?;
        let min_eigenvalue = min_eigenvalue(w.as_ref());
        if !(min_eigenvalue >= self.pd_tolerance) {
            return Err(Error::NotPositiveDefinite {
                method: self.method.as_str(),
                min_eigenvalue,
            });
        }

        let s_mat = s.as_ref();
        let w_inv = pinv_symmetric(w.as_ref());
        let r = s_mat.transpose() * w_inv.as_ref();
        let rs = r.as_ref() * s_mat;
        let p = pinv_symmetric(rs.as_ref()) * r.as_ref();
        reconcile(s, p.as_ref(), w.as_ref(), input.y_hat)
    }

    fn name(&self) -> &'static str {
        "min_trace"
    }
}

/// MinTrace restricted to the structural weightings (`ols`, `wls_struct`).
///
/// Never needs in-sample data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimalCombination {
    inner: MinTrace,
}

impl OptimalCombination {
    /// Create the strategy; residual-based methods are rejected.
    pub fn new(method: MinTraceMethod) -> Result<Self> {
        if method.needs_residuals() {
            return Err(Error::invalid(
                "optimal_combination_method",
                format!("\"{method}\" needs residuals; expected one of ols, wls_struct"),
            ));
        }
        Ok(Self {
            inner: MinTrace::new(method),
        })
    }

    /// Configured method.
    pub fn method(&self) -> MinTraceMethod {
        self.inner.method()
    }
}

impl Reconciler for OptimalCombination {
    fn reconcile(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>> {
        self.inner.reconcile(s, input)
    }

    fn name(&self) -> &'static str {
        "optimal_combination"
    }
}
