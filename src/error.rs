use thiserror::Error;

/// Result alias for `coherent`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by hierarchy analysis and reconciliation strategies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Matrix dimension mismatch (usize).
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Shape mismatch (string description).
    #[error("shape mismatch: expected {expected}, actual {actual}")]
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// Unknown method, missing level, missing history or a degenerate input.
    #[error("invalid argument '{name}': {message}")]
    InvalidArgument {
        /// Argument name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// A strategy that splits values downwards was given a hierarchy where
    /// some node has more than one parent.
    #[error("{strategy} reconciliation requires strictly hierarchical structures")]
    NotStrictlyHierarchical {
        /// Strategy that rejected the hierarchy.
        strategy: &'static str,
    },

    /// The MinTrace weighting matrix has an eigenvalue below tolerance.
    #[error("min_trace ({method}) needs the weighting matrix to be positive definite (min eigenvalue {min_eigenvalue:e})")]
    NotPositiveDefinite {
        /// Estimator that produced the weighting matrix.
        method: &'static str,
        /// Smallest eigenvalue found.
        min_eigenvalue: f64,
    },
}

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    pub(crate) fn unknown_method(name: &'static str, value: &str, allowed: &[&str]) -> Self {
        Error::InvalidArgument {
            name,
            message: format!("unknown method \"{value}\" (expected one of {})", allowed.join(", ")),
        }
    }
}
