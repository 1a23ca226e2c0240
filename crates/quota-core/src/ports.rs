//! Collaborator contracts
//!
//! Everything outside the tree model is reached through these async traits:
//! sample sizes, the RIM solver, plan persistence and the variable/category
//! catalogs. Every call returns `Result<_, PortError>`.

use crate::error::PortError;
use async_trait::async_trait;
use quota_model::{
    FilterInstanceChain, Instance, InstanceId, PlanId, ScopeId, TargetId, Variable, VariableId,
    WeightingPlan, WeightingRoot, WeightingTarget,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Respondent counts scoped by a filter chain
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SampleSizeProvider: Send + Sync {
    /// Respondents per category of `variable` within the chain
    async fn sample_sizes(
        &self,
        scope: &ScopeId,
        chain: &FilterInstanceChain,
        variable: &VariableId,
    ) -> Result<HashMap<InstanceId, u64>, PortError>;

    /// Respondents within the chain
    async fn total_population(
        &self,
        scope: &ScopeId,
        chain: &FilterInstanceChain,
    ) -> Result<u64, PortError>;
}

/// Outcome of a trial RIM run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub converged: bool,
    pub iterations: u32,
    pub efficiency_score: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

/// Iterative proportional fitting solver
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RimSolver: Send + Sync {
    /// Trial-run partial plans within the chain
    async fn validate_partial(
        &self,
        scope: &ScopeId,
        plans: &[WeightingPlan],
        chain: &FilterInstanceChain,
    ) -> Result<FeasibilityReport, PortError>;
}

/// Persistence of weighting roots
///
/// Each method is one atomic write.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WeightingPlanStore: Send + Sync {
    /// Load the root for a scope
    async fn get_root(&self, scope: &ScopeId) -> Result<WeightingRoot, PortError>;

    /// Write the top-level plan set of a scope
    async fn create_plans(&self, scope: &ScopeId, plans: Vec<WeightingPlan>) -> Result<(), PortError>;

    /// Replace one persisted plan
    async fn update_plan(&self, plan_id: PlanId, plan: WeightingPlan) -> Result<(), PortError>;

    /// Delete one plan and everything below it
    async fn delete_plan(&self, plan_id: PlanId) -> Result<(), PortError>;

    /// Add a target (with its child plans) to a persisted plan
    async fn create_target(&self, plan_id: PlanId, target: WeightingTarget) -> Result<(), PortError>;

    /// Replace one persisted target
    async fn update_target(
        &self,
        plan_id: PlanId,
        target_id: TargetId,
        target: WeightingTarget,
    ) -> Result<(), PortError>;

    /// Delete one target and everything below it
    async fn delete_target(&self, plan_id: PlanId, target_id: TargetId) -> Result<(), PortError>;

    /// Delete the whole configuration of a scope
    async fn delete_root(&self, scope: &ScopeId) -> Result<(), PortError>;

    /// Copy the plans below a target to sibling categories
    async fn copy_to_siblings(
        &self,
        scope: &ScopeId,
        target_id: TargetId,
        flatten_to_rim: bool,
        instance_ids: Vec<InstanceId>,
    ) -> Result<(), PortError>;
}

/// Variable with the components it is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub variable: Variable,
    /// Variables a grouping is built from (empty for plain questions)
    #[serde(default)]
    pub component_chain: Vec<VariableId>,
}

/// Variable metadata
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VariableCatalog: Send + Sync {
    /// Resolve one variable
    async fn resolve(&self, variable: &VariableId) -> Result<VariableDefinition, PortError>;

    /// Every variable available in a scope
    async fn list(&self, scope: &ScopeId) -> Result<Vec<Variable>, PortError>;

    /// Wave categories of a date-range or survey-id variable
    async fn wave_groupings(&self, variable: &VariableId) -> Result<Vec<Instance>, PortError>;
}

/// Scope-specific category details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub display_name: String,
    pub enabled: bool,
}

/// Category metadata
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CategoryCatalog: Send + Sync {
    /// Resolve one category of a variable within a scope
    async fn resolve(
        &self,
        instance: InstanceId,
        variable: &VariableId,
        scope: &ScopeId,
    ) -> Result<CategoryInfo, PortError>;
}

/// Bundle of collaborators used by a session
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn WeightingPlanStore>,
    pub samples: Arc<dyn SampleSizeProvider>,
    pub solver: Arc<dyn RimSolver>,
    pub variables: Arc<dyn VariableCatalog>,
    pub categories: Arc<dyn CategoryCatalog>,
}

impl std::fmt::Debug for Ports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ports").finish_non_exhaustive()
    }
}
