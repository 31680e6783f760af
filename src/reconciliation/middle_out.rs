//! Middle-out reconciliation.
//!
//! Picks a level in the middle of the tree, trusts its forecasts, and
//! reconciles in both directions from there:
//!
//! ```text
//! Level 0:            [total]            ┐
//!                    /       \           │ bottom-up: sums of the middle level
//! Level 1:     [r0]            [r1]      ┘ ← middle level
//!              /  \            /  \      ┐
//! Level 2:  [s0]  [s1]      [s2]  [s3]   ┘ top-down: one sub-problem per middle node
//! ```
//!
//! Each middle node roots an independent top-down problem over its own
//! subtree, solved in a local index space and scattered back.

use super::bottom_up::bottom_up;
use super::top_down::{top_down, TopDownMethod};
use super::{check_level_range, check_rows, ReconcileInput, Reconciler};
use crate::error::{Error, Result};
use crate::hierarchy::{child_nodes, is_strictly_hierarchical, Levels, NodeId, Subtree, SummingMatrix};
use crate::linalg::select_rows;
use faer::{Mat, MatRef};
use tracing::{debug, warn};

/// Middle-out strategy.
///
/// Reads `levels`, and `y_insample` when the top-down method is historical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddleOut {
    level: String,
    top_down_method: TopDownMethod,
}

impl MiddleOut {
    /// Create the strategy around a named middle level.
    pub fn new(level: impl Into<String>, top_down_method: TopDownMethod) -> Self {
        Self {
            level: level.into(),
            top_down_method,
        }
    }

    /// Middle level name.
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Method used below the middle level.
    pub fn top_down_method(&self) -> TopDownMethod {
        self.top_down_method
    }
}

impl Reconciler for MiddleOut {
    fn reconcile(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>> {
        let levels = input.require_levels()?;
        debug!(
            strategy = self.name(),
            middle = %self.level,
            method = %self.top_down_method,
            nodes = s.m(),
            "reconciling"
        );
        middle_out(s, input.y_hat, input.y_insample, levels, &self.level, self.top_down_method)
    }

    fn name(&self) -> &'static str {
        "middle_out"
    }
}

fn middle_out(
    s: &SummingMatrix,
    y_hat: MatRef<'_, f64>,
    y_insample: Option<MatRef<'_, f64>>,
    levels: &Levels,
    level: &str,
    method: TopDownMethod,
) -> Result<Mat<f64>> {
    check_level_range(s, levels)?;
    if !is_strictly_hierarchical(s, levels) {
        return Err(Error::NotStrictlyHierarchical { strategy: "middle_out" });
    }
    if !levels.contains(level) {
        return Err(Error::invalid(
            "level",
            format!("level '{level}' is not in the level map"),
        ));
    }
    check_rows(s, y_hat)?;
    match y_insample {
        Some(y) => check_rows(s, y)?,
        None if method.needs_history() => {
            return Err(Error::invalid(
                "y_insample",
                format!("middle-out with top-down {method} needs in-sample actuals"),
            ));
        }
        None => {}
    }

    let sorted = levels.sorted_by_size();
    let cut_nodes = sorted.get(level).unwrap_or_default();
    let horizon = y_hat.ncols();
    let mut reconciled = Mat::from_fn(s.m(), horizon, |_, _| f64::NAN);

    // Bottom-up over root..=middle, with the middle level as the bottom.
    let upper = sorted.nodes_through(level);
    let reduced = reduced_summing_matrix(s, &upper, cut_nodes);
    let upper_rows: Vec<usize> = upper.iter().map(|id| id.index()).collect();
    let local_bottom: Vec<NodeId> = (upper.len() - cut_nodes.len()..upper.len())
        .map(NodeId::new)
        .collect();
    let bu = bottom_up(&reduced, select_rows(y_hat, &upper_rows).as_ref(), &local_bottom)?;
    scatter(&mut reconciled, &bu, &upper_rows);

    // Top-down below each middle node.
    let adjacency = child_nodes(s, &sorted);
    for &node in cut_nodes {
        let subtree = adjacency.subtree(node);
        if subtree.depth() < 2 {
            continue;
        }
        let local_s = subtree.summing_matrix(s)?;
        let local_levels = subtree.local_levels();
        let rows: Vec<usize> = subtree.nodes().iter().map(|id| id.index()).collect();

        // The sub-problem's root forecast is the bottom-up adjusted value.
        let mut local_y_hat = select_rows(y_hat, &rows);
        for h in 0..horizon {
            local_y_hat[(0, h)] = reconciled[(node.index(), h)];
        }
        let local_insample = y_insample.map(|y| select_rows(y, &rows));

        let td = top_down(
            &local_s,
            local_y_hat.as_ref(),
            local_insample.as_ref().map(|y| y.as_ref()),
            &local_levels,
            method,
        )?;
        scatter_subtree(&mut reconciled, &td, &subtree)?;
    }

    let unset = (0..s.m())
        .filter(|&i| (0..horizon).any(|h| reconciled[(i, h)].is_nan()))
        .count();
    if unset > 0 {
        warn!(unset, middle = level, "middle-out left rows unset; levels may not partition S");
    }

    Ok(reconciled)
}

/// Summing matrix of the upper sub-problem: rows are `upper`, columns the
/// middle-level nodes each row aggregates.
fn reduced_summing_matrix(s: &SummingMatrix, upper: &[NodeId], cut_nodes: &[NodeId]) -> SummingMatrix {
    SummingMatrix::new(Mat::from_fn(upper.len(), cut_nodes.len(), |i, j| {
        if s.overlaps(upper[i], cut_nodes[j]) {
            1.0
        } else {
            0.0
        }
    }))
}

/// Write a sub-problem's rows back to their global positions.
fn scatter_subtree(target: &mut Mat<f64>, source: &Mat<f64>, subtree: &Subtree) -> Result<()> {
    for local in 0..source.nrows() {
        let global = subtree
            .to_global(NodeId::new(local))
            .filter(|id| id.index() < target.nrows())
            .ok_or_else(|| {
                Error::invalid("levels", format!("subtree row {local} has no global node"))
            })?;
        for h in 0..source.ncols() {
            target[(global.index(), h)] = source[(local, h)];
        }
    }
    Ok(())
}

fn scatter(target: &mut Mat<f64>, source: &Mat<f64>, rows: &[usize]) {
    for (local, &global) in rows.iter().enumerate() {
        for h in 0..source.ncols() {
            target[(global, h)] = source[(local, h)];
        }
    }
}
