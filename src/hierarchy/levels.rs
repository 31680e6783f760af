//! Ordered map from level name to the rows of `S` in that level.

use super::node::NodeId;

/// Ordered level map.
///
/// Insertion order is preserved. The levels are expected to partition the
/// rows of the summing matrix; this is not enforced here (see
/// [`crate::hierarchy::validate_structure`] for an explicit check).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Levels {
    entries: Vec<(String, Vec<NodeId>)>,
}

impl Levels {
    /// Create an empty level map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a level built from raw row indices.
    pub fn with_level(mut self, name: impl Into<String>, rows: impl IntoIterator<Item = usize>) -> Self {
        self.insert(name, rows.into_iter().map(NodeId::new).collect());
        self
    }

    /// Insert a level. An existing level with the same name is replaced in place.
    pub fn insert(&mut self, name: impl Into<String>, nodes: Vec<NodeId>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = nodes,
            None => self.entries.push((name, nodes)),
        }
    }

    /// Nodes of a level.
    pub fn get(&self, name: &str) -> Option<&[NodeId]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, nodes)| nodes.as_slice())
    }

    /// Whether a level with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Position of a level in insertion order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no levels.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of nodes over all levels.
    pub fn total_nodes(&self) -> usize {
        self.entries.iter().map(|(_, nodes)| nodes.len()).sum()
    }

    /// Iterate `(name, nodes)` in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[NodeId])> + '_ {
        self.entries
            .iter()
            .map(|(name, nodes)| (name.as_str(), nodes.as_slice()))
    }

    /// Level names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Level at a position.
    pub fn entry(&self, position: usize) -> Option<(&str, &[NodeId])> {
        self.entries
            .get(position)
            .map(|(name, nodes)| (name.as_str(), nodes.as_slice()))
    }

    /// Copy sorted by level size, smallest first.
    ///
    /// The sort is stable. For a well-formed hierarchy this puts the root level
    /// first and the bottom level last.
    pub fn sorted_by_size(&self) -> Levels {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|(_, nodes)| nodes.len());
        Levels { entries }
    }

    /// The bottom level: the largest one, the last of equals winning (matches
    /// the last entry of [`Levels::sorted_by_size`]).
    pub fn bottom(&self) -> Option<(&str, &[NodeId])> {
        let mut best: Option<&(String, Vec<NodeId>)> = None;
        for entry in &self.entries {
            if best.map_or(true, |b| entry.1.len() >= b.1.len()) {
                best = Some(entry);
            }
        }
        best.map(|(name, nodes)| (name.as_str(), nodes.as_slice()))
    }

    /// Levels from the first one up to and including `name`, concatenated.
    pub(crate) fn nodes_through(&self, name: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (level, nodes) in self.iter() {
            out.extend_from_slice(nodes);
            if level == name {
                break;
            }
        }
        out
    }
}
