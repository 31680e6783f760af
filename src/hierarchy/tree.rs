//! Hierarchy trees built from parent links.

use super::levels::Levels;
use super::node::NodeId;
use super::summing::SummingMatrix;
use crate::error::{Error, Result};
use faer::Mat;

/// A rooted tree given by parent links, the usual output of a hierarchy
/// builder (one entry per series, `None` for the total).
#[derive(Debug, Clone)]
pub struct HierarchyTree {
    /// Parent of each node (`None` for the root).
    parents: Vec<Option<NodeId>>,
    /// Distance from the root.
    depths: Vec<usize>,
    /// Nodes without children, in id order. Column `j` of `S` is `leaves[j]`.
    leaves: Vec<NodeId>,
}

impl HierarchyTree {
    /// Create from parent links.
    ///
    /// Requires exactly one root, no cycles, and every leaf at the same depth
    /// (so that the leaves form the bottom level).
    pub fn from_parents(parents: &[Option<usize>]) -> Result<Self> {
        let m = parents.len();
        if m == 0 {
            return Err(Error::EmptyInput);
        }
        if let Some(&Some(bad)) = parents.iter().find(|p| matches!(p, Some(i) if *i >= m)) {
            return Err(Error::invalid(
                "parents",
                format!("parent index {bad} is out of range for {m} nodes"),
            ));
        }
        let roots = parents.iter().filter(|p| p.is_none()).count();
        if roots != 1 {
            return Err(Error::invalid(
                "parents",
                format!("expected exactly one root, found {roots}"),
            ));
        }

        let mut depths = vec![0usize; m];
        for (start, depth) in depths.iter_mut().enumerate() {
            let mut current = start;
            let mut steps = 0;
            while let Some(parent) = parents[current] {
                steps += 1;
                if steps > m {
                    return Err(Error::invalid("parents", format!("cycle through node {start}")));
                }
                current = parent;
            }
            *depth = steps;
        }

        let mut has_children = vec![false; m];
        for parent in parents.iter().flatten() {
            has_children[*parent] = true;
        }
        let leaves: Vec<NodeId> = (0..m).filter(|&i| !has_children[i]).map(NodeId::new).collect();
        let leaf_depth = depths[leaves[0].index()];
        if let Some(ragged) = leaves.iter().find(|l| depths[l.index()] != leaf_depth) {
            return Err(Error::invalid(
                "parents",
                format!(
                    "leaf {ragged} sits at depth {}, other leaves at depth {leaf_depth}",
                    depths[ragged.index()]
                ),
            ));
        }

        Ok(Self {
            parents: parents.iter().map(|p| p.map(NodeId::new)).collect(),
            depths,
            leaves,
        })
    }

    /// Generate the structural summing matrix S.
    pub fn summing_matrix(&self) -> SummingMatrix {
        let m = self.parents.len();
        let n = self.leaves.len();
        let mut mat = Mat::<f64>::zeros(m, n);

        for (col, leaf) in self.leaves.iter().enumerate() {
            let mut current = Some(*leaf);
            while let Some(node) = current {
                mat[(node.index(), col)] = 1.0;
                current = self.parents[node.index()];
            }
        }

        SummingMatrix::new(mat)
    }

    /// Levels by depth, named `level_0` (root) to `level_{height}`.
    pub fn levels(&self) -> Levels {
        let names: Vec<String> = (0..=self.height()).map(|d| format!("level_{d}")).collect();
        self.levels_by_depth(&names)
    }

    /// Levels by depth with caller-supplied names, root first.
    pub fn levels_named(&self, names: &[&str]) -> Result<Levels> {
        if names.len() != self.height() + 1 {
            return Err(Error::DimensionMismatch {
                expected: self.height() + 1,
                found: names.len(),
            });
        }
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        Ok(self.levels_by_depth(&names))
    }

    fn levels_by_depth(&self, names: &[String]) -> Levels {
        let mut levels = Levels::new();
        for (depth, name) in names.iter().enumerate() {
            let rows = (0..self.len()).filter(|&i| self.depths[i] == depth);
            levels = levels.with_level(name.clone(), rows);
        }
        levels
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    /// Depth of a node (root = 0).
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.depths.get(id.index()).copied()
    }

    /// Depth of the leaves.
    pub fn height(&self) -> usize {
        self.depths[self.leaves[0].index()]
    }

    /// Bottom nodes, in column order of [`HierarchyTree::summing_matrix`].
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    /// Number of total nodes.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Always false: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Number of leaf nodes.
    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }
}
