//! Node identifiers.

use core::fmt;

/// Index of a hierarchy node, i.e. a row of the summing matrix.
///
/// An id indexes the summing matrix it is used with. A subtree sub-problem
/// has its own matrix, so ids from [`crate::hierarchy::Subtree::local_levels`]
/// are local rows; [`crate::hierarchy::Subtree::to_global`] maps them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct NodeId(usize);

impl NodeId {
    /// Wrap a row index.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Row index into `S`, `y_hat` and the in-sample arrays.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Convert a slice of raw indices.
pub fn node_ids(indices: &[usize]) -> Vec<NodeId> {
    indices.iter().copied().map(NodeId).collect()
}
