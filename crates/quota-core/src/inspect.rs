//! Offline inspection of a saved snapshot
//!
//! A snapshot bundles a persisted root with the catalog it was edited
//! against. [`inspect`] projects it and reports the tree, shape issues and
//! the quota-cell count of the top-level scheme.

use crate::config::EditorConfig;
use crate::error::QuotaError;
use crate::validation::ValidationEngine;
use quota_model::{ModelError, PlanArena, WeightingRoot};
use quota_tree::{project, CatalogSnapshot, Node};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::Path;

/// Root plus catalog, as written by `quota-plan` tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub root: WeightingRoot,
    #[serde(default)]
    pub catalog: CatalogSnapshot,
    /// Label for the synthetic root, defaults to the scope id
    #[serde(default)]
    pub label: Option<String>,
}

impl Snapshot {
    /// Parse from JSON text
    ///
    /// # Errors
    /// Returns `Config` when the JSON does not describe a snapshot
    pub fn from_json_str(text: &str) -> Result<Self, QuotaError> {
        serde_json::from_str(text).map_err(|e| QuotaError::Config(format!("snapshot: {e}")))
    }

    /// Load from a JSON file
    ///
    /// # Errors
    /// Returns `Config` when the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuotaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| QuotaError::Config(format!("{}: {e}", path.display())))?;
        let snapshot = Self::from_json_str(&text)?;
        tracing::debug!(
            "Loaded snapshot for {} from {}",
            snapshot.root.scope,
            path.display()
        );
        Ok(snapshot)
    }
}

/// Inspection result
#[derive(Debug, Clone, PartialEq)]
pub struct InspectReport {
    pub tree: Node,
    pub shape_issues: Vec<ModelError>,
    /// Quota cells of the top-level plans
    pub quota_cells: u64,
    pub quota_limit: u64,
}

impl InspectReport {
    /// No shape issues and within the quota-cell cap
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.shape_issues.is_empty() && self.quota_cells < self.quota_limit
    }
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        render(&self.tree, 0, &mut out)?;
        f.write_str(&out)?;
        writeln!(
            f,
            "quota cells: {} (limit {})",
            self.quota_cells, self.quota_limit
        )?;
        if self.shape_issues.is_empty() {
            writeln!(f, "no shape issues")?;
        } else {
            for issue in &self.shape_issues {
                writeln!(f, "issue: {issue}")?;
            }
        }
        Ok(())
    }
}

fn render(node: &Node, depth: usize, out: &mut String) -> fmt::Result {
    writeln!(out, "{}{} [{}]", "  ".repeat(depth), node.label, node.key)?;
    for child in &node.children {
        render(child, depth + 1, out)?;
    }
    Ok(())
}

/// Project and check a snapshot
#[must_use]
pub fn inspect(snapshot: &Snapshot, config: &EditorConfig) -> InspectReport {
    let arena = PlanArena::from_root(&snapshot.root);
    let label = snapshot
        .label
        .clone()
        .unwrap_or_else(|| snapshot.root.scope.to_string());
    let tree = project(&arena, &snapshot.catalog, &label);

    let quota_cells = ValidationEngine::quota_cells(snapshot.root.plans.iter().map(|plan| {
        snapshot
            .catalog
            .variable(&plan.variable)
            .map_or(plan.targets.len(), |v| v.category_count())
    }));

    InspectReport {
        tree,
        shape_issues: snapshot.root.shape_issues(),
        quota_cells,
        quota_limit: config.max_quota_cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "root": {"scope": "UK", "plans": [
            {"id": 1, "variable": "Region", "targets": [
                {"id": 10, "instance": 1, "percentage": 0.5},
                {"id": 11, "instance": 2, "percentage": 0.4}
            ]}
        ]},
        "catalog": {"variables": [
            {"identifier": "Region", "instances": [
                {"id": 1, "name": "North"}, {"id": 2, "name": "South"}, {"id": 3, "name": "East"}
            ]}
        ]},
        "label": "United Kingdom"
    }"#;

    #[test]
    fn report_lists_tree_and_issues() {
        let snapshot = Snapshot::from_json_str(SNAPSHOT).unwrap();
        let report = inspect(&snapshot, &EditorConfig::default());

        assert_eq!(report.tree.label, "United Kingdom");
        assert_eq!(report.quota_cells, 3);
        assert_eq!(report.shape_issues.len(), 1);
        assert!(!report.is_healthy());

        let text = report.to_string();
        assert!(text.starts_with("United Kingdom [root]\n  Region [plan-1]\n    North [target-10]\n"));
        assert!(text.contains("East [unweighted-plan-1-3]"));
        assert!(text.contains("issue: percentages for 'Region' sum to"));
    }

    #[test]
    fn bad_json_is_a_config_error() {
        let err = Snapshot::from_json_str("{}").unwrap_err();
        assert!(matches!(err, QuotaError::Config(_)));
    }
}
