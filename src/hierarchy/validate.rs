//! Structure validation and health checking.
//!
//! Strategies trust their inputs: a level map that does not partition the
//! rows of `S` produces meaningless output rather than an error. Call
//! [`validate_structure`] once when a hierarchy is built to catch:
//! - Rows of `S` with no bottom series
//! - Level entries out of range, in two levels, or missing
//! - A bottom level whose rows are not a permutation of the identity
//! - Structures that are not strictly hierarchical (top-down unavailable)
//!
//! # Example
//!
//! ```rust
//! use coherent::hierarchy::{validate_structure, HierarchyTree};
//!
//! let tree = HierarchyTree::from_parents(&[None, Some(0), Some(0)]).unwrap();
//! let report = validate_structure(&tree.summing_matrix(), &tree.levels());
//! assert!(report.is_healthy(), "{report}");
//! ```

use core::fmt;

use super::analysis::is_strictly_hierarchical;
use super::levels::Levels;
use super::node::NodeId;
use super::summing::SummingMatrix;

/// How bad an issue is. Ordered, so `>=` filters work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Worth knowing, not a defect.
    Info,
    /// Unusual; strategies still behave.
    Warning,
    /// Some strategy will give wrong results.
    Error,
    /// The inputs cannot be indexed consistently.
    Critical,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One finding of [`validate_structure`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Severity.
    pub severity: Severity,
    /// What is wrong.
    pub message: String,
    /// Row of `S` concerned, if any.
    pub node: Option<NodeId>,
    /// Extra detail (level names, counts).
    pub detail: Option<String>,
}

impl ValidationIssue {
    /// Issue without node or detail.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            node: None,
            detail: None,
        }
    }

    /// Attach the row concerned.
    pub fn with_node(mut self, id: NodeId) -> Self {
        self.node = Some(id);
        self
    }

    /// Attach extra detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(id) = self.node {
            write!(f, " at node {id}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Findings of a structure check, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// All findings.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding.
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    fn note(&mut self, severity: Severity, message: impl Into<String>) {
        self.add(ValidationIssue::new(severity, message));
    }

    /// No `Error` or `Critical` findings.
    pub fn is_healthy(&self) -> bool {
        self.worst().map_or(true, |s| s < Severity::Error)
    }

    /// No findings at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Most severe finding, if any.
    pub fn worst(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// Findings at or above `min`.
    pub fn at_least(&self, min: Severity) -> impl Iterator<Item = &ValidationIssue> + '_ {
        self.issues.iter().filter(move |i| i.severity >= min)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.worst() {
            None => f.write_str("hierarchy structure: ok"),
            Some(worst) => {
                write!(f, "hierarchy structure: {} issue(s), worst {worst}", self.issues.len())?;
                for issue in &self.issues {
                    write!(f, "\n  {issue}")?;
                }
                Ok(())
            }
        }
    }
}

/// Check `S` and `levels` against the invariants every strategy assumes.
pub fn validate_structure(s: &SummingMatrix, levels: &Levels) -> ValidationReport {
    let mut report = ValidationReport::new();
    let m = s.m();

    if m == 0 || s.n() == 0 {
        report.note(Severity::Critical, format!("summing matrix is empty ({}x{})", m, s.n()));
        return report;
    }
    if levels.is_empty() {
        report.note(Severity::Critical, "no levels given");
        return report;
    }

    for i in 0..m {
        if s.row_support(NodeId::new(i)).is_empty() {
            report.add(
                ValidationIssue::new(Severity::Error, "row aggregates no bottom series")
                    .with_node(NodeId::new(i)),
            );
        }
    }

    // Partition: each row in exactly one level.
    let mut owner: Vec<Option<&str>> = vec![None; m];
    for (name, nodes) in levels.iter() {
        if nodes.is_empty() {
            report.note(Severity::Warning, format!("level '{name}' is empty"));
        }
        for &id in nodes {
            match owner.get_mut(id.index()) {
                None => report.add(
                    ValidationIssue::new(Severity::Critical, "level entry out of range")
                        .with_node(id)
                        .with_detail(format!("level '{name}', {m} rows")),
                ),
                Some(Some(first)) => report.add(
                    ValidationIssue::new(Severity::Error, "node listed in two levels")
                        .with_node(id)
                        .with_detail(format!("'{first}' and '{name}'")),
                ),
                Some(slot) => *slot = Some(name),
            }
        }
    }
    let missing: Vec<usize> = (0..m).filter(|&i| owner[i].is_none()).collect();
    if !missing.is_empty() {
        report.add(
            ValidationIssue::new(
                Severity::Error,
                format!("{} rows belong to no level", missing.len()),
            )
            .with_detail(format!("first few: {:?}", &missing[..missing.len().min(5)])),
        );
    }

    // Bottom block: one row per column, each a unit vector.
    if let Some((name, bottom)) = levels.bottom() {
        if bottom.len() != s.n() {
            report.note(Severity::Error, format!(
                "bottom level '{name}' has {} nodes but S has {} columns",
                bottom.len(),
                s.n()
            ));
        }
        let mut seen = vec![false; s.n()];
        for &id in bottom {
            let support = s.row_support(id);
            match support.as_slice() {
                [col] if !seen[*col] => seen[*col] = true,
                [_] => report.add(
                    ValidationIssue::new(Severity::Error, "two bottom nodes share a column")
                        .with_node(id),
                ),
                _ => report.add(
                    ValidationIssue::new(Severity::Error, "bottom node is not a unit row")
                        .with_node(id)
                        .with_detail(format!("{} nonzero columns", support.len())),
                ),
            }
        }
    }

    if report.is_healthy() && !is_strictly_hierarchical(s, levels) {
        report.note(
            Severity::Info,
            "structure is not strictly hierarchical; top-down and middle-out are unavailable",
        );
    }

    report
}
