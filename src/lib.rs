//! # coherent
//!
//! Hierarchical forecast reconciliation: adjust independent forecasts of every
//! node in an aggregation tree so that parents equal the sum of their children.
//!
//! The hierarchy is a summing matrix $S$ (`n_total x n_bottom`) plus a map of
//! named levels. Every strategy estimates a projection $P$ and returns
//! $\tilde{y} = S P \hat{y}$, so the output is coherent by construction.
//!
//! - [`hierarchy`]: summing matrices, levels, tree construction and checks.
//! - [`reconciliation`]: the strategies behind the [`Reconciler`] trait.
//! - [`lasso`]: the coordinate-descent solver used by [`Erm`].
//! - [`linalg`]: pseudo-inverses and small dense helpers on `faer`.
//!
//! The default build needs only `faer`; `ndarray` interop and `serde` derives
//! on configuration types are opt-in features.

/// Error types used across `coherent`.
pub mod error;
pub mod hierarchy;
pub mod lasso;
pub mod linalg;
pub mod reconciliation;


pub use crate::hierarchy::{HierarchyTree, Levels, NodeId, SummingMatrix};
pub use crate::lasso::{LassoConfig, LassoFit};
pub use crate::reconciliation::{
    reconcile, BottomUp, Erm, ErmMethod, MiddleOut, MinTrace, MinTraceMethod, OptimalCombination,
    ReconcileInput, Reconciler, Regularization, TopDown, TopDownMethod,
};

pub use error::{Error, Result};
