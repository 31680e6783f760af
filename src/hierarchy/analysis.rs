//! Structural analysis of a summing matrix: strict-hierarchy detection and
//! parent → child adjacency.
//!
//! # Strictly hierarchical structures
//!
//! A hierarchy is strict when every node reaches the bottom through exactly one
//! path. Grouped structures (e.g. stores aggregated both by region and by
//! product line) are not strict, and have no well-defined way to push a value
//! from a parent down to its children.
//!
//! The check labels each bottom column with the tuple of nodes covering it at
//! every level above the bottom:
//!
//! ```text
//!             total            column:     b0  b1  b2  b3
//!            /     \           total        0   0   0   0
//!          r0       r1         region       0   0   1   1
//!         /  \     /  \
//!       b0   b1  b2   b3       distinct paths = {(0,0), (0,1)} = 2
//! ```
//!
//! In a strict tree each column is covered by exactly one node per level, and
//! the number of distinct tuples equals the number of nodes in the level
//! directly above the bottom. Any node with two parents breaks one or the
//! other.

use std::collections::HashSet;

use super::levels::Levels;
use super::node::NodeId;
use super::summing::SummingMatrix;
use crate::error::Result;
use faer::Mat;

/// Whether every node above the bottom has a single path down the tree.
///
/// Levels are sorted by size (smallest first) before the check, so the
/// bottom level is the largest one. A single level is trivially strict.
pub fn is_strictly_hierarchical(s: &SummingMatrix, levels: &Levels) -> bool {
    let sorted = levels.sorted_by_size();
    if sorted.len() <= 1 {
        return true;
    }
    let upper: Vec<&[NodeId]> = sorted.iter().take(sorted.len() - 1).map(|(_, n)| n).collect();

    let mut paths: HashSet<Vec<usize>> = HashSet::new();
    for col in 0..s.n() {
        let mut path = Vec::with_capacity(upper.len());
        for nodes in &upper {
            let mut covering = nodes
                .iter()
                .enumerate()
                .filter(|(_, id)| s.covers(**id, col))
                .map(|(position, _)| position);
            match (covering.next(), covering.next()) {
                (Some(position), None) => path.push(position),
                // Uncovered, or reached through two nodes of one level.
                _ => return false,
            }
        }
        paths.insert(path);
    }

    let nodes = upper.last().map_or(0, |n| n.len());
    paths.len() == nodes
}

/// Parent → children adjacency computed once from `S` and a level map.
///
/// Children of a parent are the nodes of the *next* level (in the level map's
/// order) whose rows overlap the parent's row. The arena is indexed by
/// [`NodeId`], so lookups never rescan the matrix.
#[derive(Debug, Clone)]
pub struct ChildNodes {
    levels: Levels,
    children: Vec<Vec<NodeId>>,
    level_of: Vec<Option<usize>>,
}

/// Build the adjacency for consecutive level pairs of `levels`.
///
/// Callers normally pass [`Levels::sorted_by_size`] so that the order runs
/// from the root to the bottom.
pub fn child_nodes(s: &SummingMatrix, levels: &Levels) -> ChildNodes {
    let m = s.m();
    let mut children = vec![Vec::new(); m];
    let mut level_of = vec![None; m];

    for (position, (_, nodes)) in levels.iter().enumerate() {
        for id in nodes {
            if let Some(slot) = level_of.get_mut(id.index()) {
                *slot = Some(position);
            }
        }
    }

    for position in 1..levels.len() {
        let (Some((_, parents)), Some((_, candidates))) =
            (levels.entry(position - 1), levels.entry(position))
        else {
            continue;
        };
        for &parent in parents {
            let Some(slot) = children.get_mut(parent.index()) else {
                continue;
            };
            *slot = candidates
                .iter()
                .copied()
                .filter(|&child| s.overlaps(parent, child))
                .collect();
        }
    }

    ChildNodes {
        levels: levels.clone(),
        children,
        level_of,
    }
}

impl ChildNodes {
    /// Children of a node; empty for bottom nodes and unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Level order the adjacency was built with.
    pub fn levels(&self) -> &Levels {
        &self.levels
    }

    /// Parent levels in order: every level except the last, with its nodes.
    pub fn parent_levels(&self) -> impl Iterator<Item = (&str, &[NodeId])> + '_ {
        self.levels.iter().take(self.levels.len().saturating_sub(1))
    }

    /// Children of every node of a level, keyed by parent.
    pub fn level(&self, name: &str) -> Option<Vec<(NodeId, &[NodeId])>> {
        let position = self.levels.position(name)?;
        if position + 1 >= self.levels.len() {
            return None;
        }
        let (_, nodes) = self.levels.entry(position)?;
        Some(nodes.iter().map(|&id| (id, self.children(id))).collect())
    }

    /// The subtree rooted at `root`, level by level.
    pub fn subtree(&self, root: NodeId) -> Subtree {
        let mut position = self.level_of.get(root.index()).copied().flatten();
        let mut layers = Vec::new();
        let mut layer = vec![root];

        loop {
            let name = position
                .and_then(|p| self.levels.entry(p))
                .map_or_else(|| format!("depth_{}", layers.len()), |(n, _)| n.to_string());
            let next: Vec<NodeId> = layer
                .iter()
                .flat_map(|&id| self.children(id).iter().copied())
                .collect();
            layers.push((name, layer));
            if next.is_empty() {
                break;
            }
            layer = next;
            position = position.map(|p| p + 1);
        }

        Subtree { layers }
    }
}

/// A subtree lifted out of a larger hierarchy.
///
/// Holds the global ids of its nodes level by level. Local ids are positions
/// in [`Subtree::nodes`]; [`Subtree::to_global`] maps them back.
#[derive(Debug, Clone)]
pub struct Subtree {
    layers: Vec<(String, Vec<NodeId>)>,
}

impl Subtree {
    /// Root of the subtree (global id).
    pub fn root(&self) -> NodeId {
        self.layers[0].1[0]
    }

    /// Number of levels, the root's included.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Global ids of all nodes, root first, level by level.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.layers.iter().flat_map(|(_, nodes)| nodes.iter().copied()).collect()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.layers.iter().map(|(_, nodes)| nodes.len()).sum()
    }

    /// Always false: a subtree has at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Global id of a local node.
    pub fn to_global(&self, local: NodeId) -> Option<NodeId> {
        self.layers
            .iter()
            .flat_map(|(_, nodes)| nodes.iter())
            .nth(local.index())
            .copied()
    }

    /// Level map over local ids `0..len()`, contiguous per level.
    pub fn local_levels(&self) -> Levels {
        let mut levels = Levels::new();
        let mut counter = 0;
        for (name, nodes) in &self.layers {
            levels = levels.with_level(name.clone(), counter..counter + nodes.len());
            counter += nodes.len();
        }
        levels
    }

    /// Rows of `S` for this subtree, restricted to the columns it touches.
    pub fn summing_matrix(&self, s: &SummingMatrix) -> Result<SummingMatrix> {
        let rows = s.select_rows(&self.nodes())?;
        let cols: Vec<usize> = (0..rows.ncols())
            .filter(|&j| (0..rows.nrows()).any(|i| rows[(i, j)] != 0.0))
            .collect();
        Ok(SummingMatrix::new(Mat::from_fn(rows.nrows(), cols.len(), |i, j| {
            rows[(i, cols[j])]
        })))
    }
}
