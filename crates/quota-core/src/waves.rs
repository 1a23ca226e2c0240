//! Wave discovery and per-wave health checks
//!
//! A tracker plan's top-level variable is either a wave variable itself
//! (date-range or survey-id categories) or a grouping built from other
//! variables. [`WaveDiscovery`] walks the component chain to find the one
//! wave variable underneath; [`classify_waves`] reports which waves lack
//! weights or no longer resolve.

use crate::error::PortError;
use crate::ports::VariableCatalog;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use quota_model::{Instance, InstanceId, VariableId, VariableKind, WeightingPlan};
use quota_tree::CatalogSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Resolves the waves of a tracker variable
pub struct WaveDiscovery<'a> {
    variables: &'a dyn VariableCatalog,
    max_depth: usize,
}

impl<'a> WaveDiscovery<'a> {
    /// Create discovery over a catalog
    #[must_use]
    pub fn new(variables: &'a dyn VariableCatalog, max_depth: usize) -> Self {
        Self {
            variables,
            max_depth,
        }
    }

    /// Waves of `variable`, empty when none or ambiguous
    ///
    /// # Errors
    /// Propagates catalog failures other than `NotFound`
    pub async fn discover(&self, variable: &VariableId) -> Result<Vec<Instance>, PortError> {
        let waves = self.branch(variable.clone(), 0, HashSet::new()).await?;
        tracing::debug!("Discovered {} wave(s) for '{}'", waves.len(), variable);
        Ok(waves)
    }

    fn branch(
        &self,
        variable: VariableId,
        depth: usize,
        mut visited: HashSet<VariableId>,
    ) -> BoxFuture<'_, Result<Vec<Instance>, PortError>> {
        async move {
            if depth > self.max_depth || !visited.insert(variable.clone()) {
                return Ok(Vec::new());
            }
            let definition = match self.variables.resolve(&variable).await {
                Ok(definition) => definition,
                Err(PortError::NotFound(_)) => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };

            if definition.variable.kind.is_wave() {
                return match self.variables.wave_groupings(&variable).await {
                    Ok(waves) => Ok(waves),
                    Err(PortError::NotFound(_)) => Ok(Vec::new()),
                    Err(e) => Err(e),
                };
            }

            let branches = try_join_all(
                definition
                    .component_chain
                    .into_iter()
                    .map(|component| self.branch(component, depth + 1, visited.clone())),
            )
            .await?;

            let mut found = branches.into_iter().filter(|waves| !waves.is_empty());
            match (found.next(), found.next()) {
                (Some(waves), None) => Ok(waves),
                (Some(_), Some(_)) => {
                    tracing::warn!("Ambiguous wave variables below '{}'", variable);
                    Ok(Vec::new())
                }
                _ => Ok(Vec::new()),
            }
        }
        .boxed()
    }
}

/// What is wrong with a wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveIssueKind {
    /// Target row exists but carries no weights
    Unweighted,
    /// No target row for the wave
    UnweightedNoTarget,
    /// Wave category is missing from the plan's variable
    MissingInstance,
    /// Plan's variable cannot be resolved
    MissingVariable,
    /// Plan's variable is not a wave variable
    UnsupportedVariable,
}

/// Waves sharing one issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveIssue {
    pub kind: WaveIssueKind,
    pub instances: Vec<InstanceId>,
    pub message: String,
}

/// Per-wave issues of a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveReport {
    pub issues: Vec<WaveIssue>,
    /// Every issue is a wave without a target row
    pub warnings_only: bool,
}

impl WaveReport {
    /// No issues
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for WaveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{}", issue.message)?;
        }
        Ok(())
    }
}

/// Classify the waves of a tracker plan
///
/// Unweighted waves are only reported when at least one wave has a target
/// or weights.
#[must_use]
pub fn classify_waves(
    plan: &WeightingPlan,
    waves: &[Instance],
    catalog: &CatalogSnapshot,
) -> WaveReport {
    let mut found: Vec<(InstanceId, WaveIssueKind)> = Vec::new();

    let weighted = |wave: &Instance| {
        plan.target_for(wave.id)
            .is_some_and(|t| t.has_children() || t.value.is_set())
    };
    let all_bare = waves
        .iter()
        .all(|w| plan.target_for(w.id).is_none() && !weighted(w));
    if !all_bare {
        for wave in waves.iter().filter(|w| !weighted(*w)) {
            let kind = if plan.target_for(wave.id).is_some() {
                WaveIssueKind::Unweighted
            } else {
                WaveIssueKind::UnweightedNoTarget
            };
            found.push((wave.id, kind));
        }
    }

    let variable = catalog.variable(&plan.variable);
    for wave in waves {
        let kind = match variable {
            None => Some(WaveIssueKind::MissingVariable),
            Some(v) if v.kind == VariableKind::Composite => Some(WaveIssueKind::UnsupportedVariable),
            Some(v) if v.instance(wave.id).is_none() => Some(WaveIssueKind::MissingInstance),
            Some(_) => None,
        };
        if let Some(kind) = kind {
            found.push((wave.id, kind));
        }
    }

    let mut issues: Vec<WaveIssue> = Vec::new();
    for (instance, kind) in found {
        match issues.iter_mut().find(|i| i.kind == kind) {
            Some(issue) => issue.instances.push(instance),
            None => issues.push(WaveIssue {
                kind,
                instances: vec![instance],
                message: String::new(),
            }),
        }
    }
    for issue in &mut issues {
        issue.message = issue_message(issue, waves, plan);
    }

    let warnings_only = !issues.is_empty()
        && issues
            .iter()
            .all(|i| i.kind == WaveIssueKind::UnweightedNoTarget);
    WaveReport {
        issues,
        warnings_only,
    }
}

fn issue_message(issue: &WaveIssue, waves: &[Instance], plan: &WeightingPlan) -> String {
    let names = issue
        .instances
        .iter()
        .map(|id| {
            waves
                .iter()
                .find(|w| w.id == *id)
                .map_or_else(|| format!("Instance {id}"), |w| w.name.clone())
        })
        .collect::<Vec<_>>()
        .join(", ");
    match issue.kind {
        WaveIssueKind::Unweighted | WaveIssueKind::UnweightedNoTarget => {
            format!("Unweighted {names}.")
        }
        WaveIssueKind::MissingInstance => {
            format!("Variable {} does not have {names}.", plan.variable)
        }
        WaveIssueKind::MissingVariable => format!("Variable {} is missing.", plan.variable),
        WaveIssueKind::UnsupportedVariable => {
            "Only date-based or survey-based wave variables are supported.".to_string()
        }
    }
}
