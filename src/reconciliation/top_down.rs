//! Top-down reconciliation.
//!
//! Starts from the root forecast and pushes it down the tree with a set of
//! proportions. Three ways to get the proportions:
//!
//! | Method | Proportion of bottom node $j$ |
//! |--------|-------------------------------|
//! | forecast proportions | recursive, from the children's own forecasts |
//! | average proportions | $\frac{1}{T}\sum_t y_{j,t} / y_{root,t}$ |
//! | proportion averages | $\bar{y}_j / \bar{y}_{root}$ |
//!
//! Proportion averages is usually the stabler of the two historical methods:
//! a single small root value does not blow up the ratio.
//!
//! Only defined for strictly hierarchical structures.

use core::fmt;
use core::str::FromStr;

use super::bottom_up::bottom_up_projection;
use super::{check_level_range, check_rows, reconcile, ReconcileInput, Reconciler};
use crate::error::{Error, Result};
use crate::hierarchy::{child_nodes, is_strictly_hierarchical, Levels, NodeId, SummingMatrix};
use faer::{Mat, MatRef};
use tracing::debug;

/// How the root forecast is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum TopDownMethod {
    /// Split each parent by its children's forecasts, level by level.
    ForecastProportions,
    /// Mean over history of bottom / root ratios.
    AverageProportions,
    /// Ratio of the historical bottom mean to the historical root mean.
    ProportionAverages,
}

impl TopDownMethod {
    const NAMES: [&'static str; 3] = [
        "forecast_proportions",
        "average_proportions",
        "proportion_averages",
    ];

    /// Snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            TopDownMethod::ForecastProportions => Self::NAMES[0],
            TopDownMethod::AverageProportions => Self::NAMES[1],
            TopDownMethod::ProportionAverages => Self::NAMES[2],
        }
    }

    /// Whether the method reads in-sample actuals.
    pub fn needs_history(self) -> bool {
        !matches!(self, TopDownMethod::ForecastProportions)
    }
}

impl fmt::Display for TopDownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopDownMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forecast_proportions" => Ok(TopDownMethod::ForecastProportions),
            "average_proportions" => Ok(TopDownMethod::AverageProportions),
            "proportion_averages" => Ok(TopDownMethod::ProportionAverages),
            other => Err(Error::unknown_method("top_down_method", other, &Self::NAMES)),
        }
    }
}

/// Top-down strategy.
///
/// Reads `levels`, and `y_insample` for the historical methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopDown {
    method: TopDownMethod,
}

impl TopDown {
    /// Create the strategy.
    pub fn new(method: TopDownMethod) -> Self {
        Self { method }
    }

    /// Configured method.
    pub fn method(&self) -> TopDownMethod {
        self.method
    }
}

impl Reconciler for TopDown {
    fn reconcile(&self, s: &SummingMatrix, input: &ReconcileInput<'_>) -> Result<Mat<f64>> {
        let levels = input.require_levels()?;
        debug!(strategy = self.name(), method = %self.method, nodes = s.m(), "reconciling");
        top_down(s, input.y_hat, input.y_insample, levels, self.method)
    }

    fn name(&self) -> &'static str {
        "top_down"
    }
}

pub(crate) fn top_down(
    s: &SummingMatrix,
    y_hat: MatRef<'_, f64>,
    y_insample: Option<MatRef<'_, f64>>,
    levels: &Levels,
    method: TopDownMethod,
) -> Result<Mat<f64>> {
    check_level_range(s, levels)?;
    if !is_strictly_hierarchical(s, levels) {
        return Err(Error::NotStrictlyHierarchical { strategy: "top_down" });
    }
    check_rows(s, y_hat)?;

    let root = s.root();
    let sorted = levels.sorted_by_size();
    let idx_bottom: Vec<NodeId> = sorted
        .bottom()
        .map(|(_, nodes)| nodes.to_vec())
        .unwrap_or_default();
    let w = Mat::<f64>::identity(s.m(), s.m());

    match method {
        TopDownMethod::ForecastProportions => {
            let split = forecast_proportions(s, y_hat, &sorted, root);
            let p = bottom_up_projection(s, &idx_bottom)?;
            reconcile(s, p.as_ref(), w.as_ref(), split.as_ref())
        }
        TopDownMethod::AverageProportions | TopDownMethod::ProportionAverages => {
            let y_insample = y_insample.ok_or_else(|| {
                Error::invalid("y_insample", format!("top-down {method} needs in-sample actuals"))
            })?;
            check_rows(s, y_insample)?;
            let props = historical_proportions(y_insample, root, &idx_bottom, method)?;

            let mut p = Mat::<f64>::zeros(s.n(), s.m());
            for (&node, &prop) in idx_bottom.iter().zip(&props) {
                let col = s.bottom_column(node).ok_or_else(|| {
                    Error::invalid("levels", format!("bottom node {node} aggregates no series"))
                })?;
                p[(col, root.index())] = prop;
            }
            reconcile(s, p.as_ref(), w.as_ref(), y_hat)
        }
    }
}

/// Recursive split, one horizon column at a time.
///
/// Children of a parent share its reconciled value in proportion to their raw
/// forecasts. Siblings whose raw forecasts sum to zero share it equally.
fn forecast_proportions(
    s: &SummingMatrix,
    y_hat: MatRef<'_, f64>,
    sorted: &Levels,
    root: NodeId,
) -> Mat<f64> {
    let adjacency = child_nodes(s, sorted);
    let mut split = Mat::<f64>::zeros(s.m(), y_hat.ncols());

    for h in 0..y_hat.ncols() {
        split[(root.index(), h)] = y_hat[(root.index(), h)];
        for (_, parents) in adjacency.parent_levels() {
            for &parent in parents {
                let children = adjacency.children(parent);
                if children.is_empty() {
                    continue;
                }
                let parent_value = split[(parent.index(), h)];
                let raw_sum: f64 = children.iter().map(|c| y_hat[(c.index(), h)]).sum();
                for &child in children {
                    split[(child.index(), h)] = if raw_sum == 0.0 {
                        parent_value / children.len() as f64
                    } else {
                        y_hat[(child.index(), h)] * parent_value / raw_sum
                    };
                }
            }
        }
    }

    split
}

fn historical_proportions(
    y_insample: MatRef<'_, f64>,
    root: NodeId,
    idx_bottom: &[NodeId],
    method: TopDownMethod,
) -> Result<Vec<f64>> {
    let history = y_insample.ncols();
    let top = |t: usize| y_insample[(root.index(), t)];

    match method {
        TopDownMethod::AverageProportions => {
            let usable: Vec<usize> = (0..history)
                .filter(|&t| top(t).is_finite() && top(t) != 0.0)
                .collect();
            if usable.is_empty() {
                return Err(Error::invalid(
                    "y_insample",
                    "root actuals are zero or missing at every time step",
                ));
            }
            Ok(idx_bottom
                .iter()
                .map(|b| {
                    usable
                        .iter()
                        .map(|&t| y_insample[(b.index(), t)] / top(t))
                        .sum::<f64>()
                        / usable.len() as f64
                })
                .collect())
        }
        TopDownMethod::ProportionAverages => {
            if history == 0 {
                return Err(Error::invalid("y_insample", "no in-sample observations"));
            }
            let mean = |node: NodeId| {
                (0..history).map(|t| y_insample[(node.index(), t)]).sum::<f64>() / history as f64
            };
            let root_mean = mean(root);
            if !root_mean.is_finite() || root_mean == 0.0 {
                return Err(Error::invalid(
                    "y_insample",
                    format!("historical root mean is {root_mean}; proportions are undefined"),
                ));
            }
            Ok(idx_bottom.iter().map(|&b| mean(b) / root_mean).collect())
        }
        TopDownMethod::ForecastProportions => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyTree;

    fn three_level() -> (SummingMatrix, Levels) {
        let tree =
            HierarchyTree::from_parents(&[None, Some(0), Some(0), Some(1), Some(1), Some(2), Some(2)])
                .unwrap();
        (tree.summing_matrix(), tree.levels())
    }

    #[test]
    fn method_names_round_trip() {
        for name in TopDownMethod::NAMES {
            let method: TopDownMethod = name.parse().unwrap();
            assert_eq!(method.to_string(), name);
            assert_eq!(method.needs_history(), name != "forecast_proportions");
        }
        assert!(matches!(
            "forecast_proportion".parse::<TopDownMethod>(),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn forecast_proportions_conserve_parent_values() {
        let (s, levels) = three_level();
        let y_hat = Mat::from_fn(7, 3, |i, h| [10.0, 3.0, 5.0, 1.0, 2.0, 4.0, 1.0][i] + h as f64);
        let input = ReconcileInput::new(y_hat.as_ref()).with_levels(&levels);
        let y_tilde = TopDown::new(TopDownMethod::ForecastProportions)
            .reconcile(&s, &input)
            .unwrap();

        for h in 0..3 {
            assert!((y_tilde[(0, h)] - y_hat[(0, h)]).abs() < 1e-12);
            assert!((y_tilde[(1, h)] + y_tilde[(2, h)] - y_tilde[(0, h)]).abs() < 1e-10);
            assert!((y_tilde[(3, h)] + y_tilde[(4, h)] - y_tilde[(1, h)]).abs() < 1e-10);
            assert!((y_tilde[(5, h)] + y_tilde[(6, h)] - y_tilde[(2, h)]).abs() < 1e-10);
        }
        // Column 0: regions split 10 as 3:5, stores as 1:2 and 4:1.
        assert!((y_tilde[(1, 0)] - 3.75).abs() < 1e-12);
        assert!((y_tilde[(4, 0)] - 2.5).abs() < 1e-12);
        assert!((y_tilde[(5, 0)] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn zero_sum_siblings_split_equally() {
        let (s, levels) = three_level();
        let y_hat = Mat::from_fn(7, 1, |i, _| [8.0, 2.0, 2.0, 0.0, 0.0, 1.0, 3.0][i]);
        let input = ReconcileInput::new(y_hat.as_ref()).with_levels(&levels);
        let y_tilde = TopDown::new(TopDownMethod::ForecastProportions)
            .reconcile(&s, &input)
            .unwrap();

        assert!((0..7).all(|i| y_tilde[(i, 0)].is_finite()));
        assert!((y_tilde[(3, 0)] - 2.0).abs() < 1e-12);
        assert!((y_tilde[(4, 0)] - 2.0).abs() < 1e-12);
        assert!((y_tilde[(6, 0)] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn average_proportions_average_ratios() {
        let (s, levels) = three_level();
        // Two history steps; bottom node 3 holds 50% then 10% of the root.
        let y_insample = Mat::from_fn(7, 2, |i, t| {
            let cols = [[10.0, 10.0], [6.0, 2.0], [4.0, 8.0], [5.0, 1.0], [1.0, 1.0], [2.0, 4.0], [2.0, 4.0]];
            cols[i][t]
        });
        let y_hat = Mat::from_fn(7, 1, |i, _| if i == 0 { 100.0 } else { 0.0 });
        let input = ReconcileInput::new(y_hat.as_ref())
            .with_levels(&levels)
            .with_actuals(y_insample.as_ref());

        let y_tilde = TopDown::new(TopDownMethod::AverageProportions)
            .reconcile(&s, &input)
            .unwrap();
        assert!((y_tilde[(3, 0)] - 30.0).abs() < 1e-10);
        assert!((y_tilde[(4, 0)] - 10.0).abs() < 1e-10);
        assert!((y_tilde[(0, 0)] - 100.0).abs() < 1e-10);
    }

    #[test]
    fn historical_methods_need_actuals() {
        let (s, levels) = three_level();
        let y_hat = Mat::<f64>::zeros(7, 1);
        let input = ReconcileInput::new(y_hat.as_ref()).with_levels(&levels);
        let err = TopDown::new(TopDownMethod::ProportionAverages)
            .reconcile(&s, &input)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { name: "y_insample", .. }));
    }

    #[test]
    fn out_of_range_bottom_node_is_an_error() {
        let (s, _) = three_level();
        let levels = Levels::new()
            .with_level("total", [0])
            .with_level("region", [1, 2])
            .with_level("store", [3, 4, 5, 60]);
        let y_hat = Mat::from_fn(7, 1, |i, _| i as f64 + 1.0);
        let y_insample = Mat::from_fn(7, 4, |i, t| (i + t) as f64 + 1.0);
        let input = ReconcileInput::new(y_hat.as_ref())
            .with_levels(&levels)
            .with_actuals(y_insample.as_ref());

        for method in [
            TopDownMethod::ForecastProportions,
            TopDownMethod::AverageProportions,
            TopDownMethod::ProportionAverages,
        ] {
            let err = TopDown::new(method).reconcile(&s, &input).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { name: "levels", .. }), "{method}");
        }
    }

    #[test]
    fn zero_root_history_is_rejected() {
        let (s, levels) = three_level();
        let y_hat = Mat::<f64>::zeros(7, 1);
        let y_insample = Mat::<f64>::zeros(7, 3);
        let input = ReconcileInput::new(y_hat.as_ref())
            .with_levels(&levels)
            .with_actuals(y_insample.as_ref());
        for method in [TopDownMethod::AverageProportions, TopDownMethod::ProportionAverages] {
            assert!(TopDown::new(method).reconcile(&s, &input).is_err());
        }
    }
}
