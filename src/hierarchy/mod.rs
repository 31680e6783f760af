//! Hierarchy data model: the summing matrix, level maps and tree analysis.
//!
//! # The Aggregation Structure
//!
//! A hierarchy of $m$ series built from $n$ bottom series is described by the
//! summing matrix $S \in \{0,1\}^{m \times n}$:
//!
//! ```text
//!              total                  b0 b1 b2 b3
//!             /     \        total  [  1  1  1  1 ]
//!           r0       r1      r0     [  1  1  0  0 ]
//!          /  \     /  \     r1     [  0  0  1  1 ]
//!        b0   b1  b2   b3    b0..b3 [     I_4     ]
//! ```
//!
//! Every coherent vector of forecasts is $y = S b$ for some bottom vector $b$.
//!
//! The [`Levels`] map names groups of rows (`total`, `region`, `store`, ...).
//! Strategies that split values downwards (top-down, middle-out) additionally
//! need the structure to be *strictly* hierarchical; see
//! [`is_strictly_hierarchical`].
//!
//! # Module Overview
//!
//! - [`SummingMatrix`]: `S` plus row queries (support, root, overlap)
//! - [`Levels`]: ordered level name → [`NodeId`]s
//! - [`child_nodes`] / [`ChildNodes`]: parent → children arena
//! - [`HierarchyTree`]: build `S` and `Levels` from parent links
//! - [`validate_structure`]: explicit health check of the invariants

mod analysis;
mod levels;
mod node;
mod summing;
pub mod tree;
mod validate;

pub use analysis::{child_nodes, is_strictly_hierarchical, ChildNodes, Subtree};
pub use levels::Levels;
pub use node::{node_ids, NodeId};
pub use summing::SummingMatrix;
pub use tree::HierarchyTree;
pub use validate::{validate_structure, Severity, ValidationIssue, ValidationReport};
