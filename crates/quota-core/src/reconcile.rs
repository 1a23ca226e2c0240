//! Reconciliation of edited dimensions into one store operation
//!
//! The baseline plans of the selected node are updated in place by instance
//! id so persisted identities survive an edit. Plans whose variable left the
//! working set are dropped, new variables get fresh plans, and the result is
//! dispatched as exactly one [`SaveOperation`].

use crate::dimension::Dimension;
use crate::error::{PortError, ReconcileError};
use crate::ports::WeightingPlanStore;
use quota_model::{
    PlanArena, PlanId, PlanIdx, ScopeId, TargetId, TargetValue, WeightingPlan, WeightingTarget,
};
use quota_tree::NodeEntity;
use serde::{Deserialize, Serialize};

/// Plans a node's working set is loaded from and saved into
///
/// Target nodes only count child plans that own at least one target.
#[must_use]
pub fn baseline_plans(arena: &PlanArena, entity: &NodeEntity) -> Vec<PlanIdx> {
    match entity {
        NodeEntity::Root => arena.roots().to_vec(),
        NodeEntity::Plan(p) => vec![*p],
        NodeEntity::Target(t) => arena
            .target(*t)
            .child_plans
            .iter()
            .copied()
            .filter(|p| !arena.plan(*p).targets.is_empty())
            .collect(),
        NodeEntity::Unweighted { .. } => Vec::new(),
    }
}

/// One atomic write against the plan store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SaveOperation {
    CreatePlans {
        scope: ScopeId,
        plans: Vec<WeightingPlan>,
    },
    UpdatePlan {
        plan_id: PlanId,
        plan: WeightingPlan,
    },
    CreateTarget {
        plan_id: PlanId,
        target: WeightingTarget,
    },
    UpdateTarget {
        plan_id: PlanId,
        target_id: TargetId,
        target: WeightingTarget,
    },
    DeleteRoot {
        scope: ScopeId,
    },
    DeletePlan {
        plan_id: PlanId,
    },
    DeleteTarget {
        plan_id: PlanId,
        target_id: TargetId,
    },
}

impl SaveOperation {
    /// Short name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreatePlans { .. } => "create_plans",
            Self::UpdatePlan { .. } => "update_plan",
            Self::CreateTarget { .. } => "create_target",
            Self::UpdateTarget { .. } => "update_target",
            Self::DeleteRoot { .. } => "delete_root",
            Self::DeletePlan { .. } => "delete_plan",
            Self::DeleteTarget { .. } => "delete_target",
        }
    }

    /// Whether the operation removes structure
    #[inline]
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::DeleteRoot { .. } | Self::DeletePlan { .. } | Self::DeleteTarget { .. }
        )
    }

    /// Execute against a store
    ///
    /// # Errors
    /// Propagates the store failure
    pub async fn apply(self, store: &dyn WeightingPlanStore) -> Result<(), PortError> {
        match self {
            Self::CreatePlans { scope, plans } => store.create_plans(&scope, plans).await,
            Self::UpdatePlan { plan_id, plan } => store.update_plan(plan_id, plan).await,
            Self::CreateTarget { plan_id, target } => store.create_target(plan_id, target).await,
            Self::UpdateTarget {
                plan_id,
                target_id,
                target,
            } => store.update_target(plan_id, target_id, target).await,
            Self::DeleteRoot { scope } => store.delete_root(&scope).await,
            Self::DeletePlan { plan_id } => store.delete_plan(plan_id).await,
            Self::DeleteTarget { plan_id, target_id } => {
                store.delete_target(plan_id, target_id).await
            }
        }
    }
}

/// What a reconciliation changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Targets matched by instance and rewritten
    pub updated: usize,
    /// Stale targets reassigned to a new instance
    pub recycled: usize,
    /// Targets appended to existing plans
    pub appended: usize,
    /// Plans created for new variables
    pub created_plans: usize,
    /// Persisted plans dropped from the node
    pub deleted_plans: Vec<PlanId>,
}

/// Operation plus summary
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub operation: SaveOperation,
    pub summary: ReconcileSummary,
}

/// Maps a working set onto the persisted structure
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    /// Create engine
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Reconcile `dimensions` into the structure at `entity`
    ///
    /// An empty working set degrades to [`Self::deletion`].
    ///
    /// # Errors
    /// `MissingIdentity` or `AmbiguousUpdateTarget` when the node's shape
    /// does not identify one write
    pub fn reconcile<'a>(
        &self,
        arena: &PlanArena,
        entity: &NodeEntity,
        dimensions: impl IntoIterator<Item = &'a Dimension>,
    ) -> Result<Reconciliation, ReconcileError> {
        let desired: Vec<&Dimension> = dimensions.into_iter().collect();
        if desired.is_empty() {
            return Ok(Reconciliation {
                operation: self.deletion(arena, entity)?,
                summary: ReconcileSummary::default(),
            });
        }

        let baseline: Vec<WeightingPlan> = baseline_plans(arena, entity)
            .into_iter()
            .map(|p| arena.materialize_plan(p))
            .collect();
        let is_rim = baseline.len() >= 2;
        let mut summary = ReconcileSummary::default();

        let mut plans = Vec::with_capacity(desired.len());
        for mut plan in baseline {
            match desired.iter().find(|d| *d.id() == plan.variable) {
                Some(dim) => {
                    merge_dimension(&mut plan, dim, is_rim, &mut summary);
                    plans.push(plan);
                }
                None => {
                    if let Some(id) = plan.id {
                        summary.deleted_plans.push(id);
                    }
                }
            }
        }
        for dim in &desired {
            if !plans.iter().any(|p| p.variable == *dim.id()) {
                plans.push(dim.to_plan());
                summary.created_plans += 1;
            }
        }

        tracing::debug!(
            "Reconciled {} plan(s): {} updated, {} recycled, {} appended, {} created, {} deleted",
            plans.len(),
            summary.updated,
            summary.recycled,
            summary.appended,
            summary.created_plans,
            summary.deleted_plans.len()
        );

        let operation = dispatch(arena, entity, plans)?;
        Ok(Reconciliation { operation, summary })
    }

    /// Operation removing the structure at `entity`
    ///
    /// # Errors
    /// `MissingIdentity` when the node was never persisted
    pub fn deletion(
        &self,
        arena: &PlanArena,
        entity: &NodeEntity,
    ) -> Result<SaveOperation, ReconcileError> {
        match entity {
            NodeEntity::Root => Ok(SaveOperation::DeleteRoot {
                scope: arena.scope().clone(),
            }),
            NodeEntity::Plan(p) => {
                let plan_id = arena.plan(*p).id.ok_or_else(|| {
                    ReconcileError::MissingIdentity(format!("plan for '{}'", arena.plan(*p).variable))
                })?;
                Ok(SaveOperation::DeletePlan { plan_id })
            }
            NodeEntity::Target(t) => {
                let target = arena.target(*t);
                let owner = arena.plan(target.plan);
                match (owner.id, target.id) {
                    (Some(plan_id), Some(target_id)) => {
                        Ok(SaveOperation::DeleteTarget { plan_id, target_id })
                    }
                    _ => Err(ReconcileError::MissingIdentity(format!(
                        "target for instance {} of '{}'",
                        target.instance, owner.variable
                    ))),
                }
            }
            NodeEntity::Unweighted { plan, instance } => Err(ReconcileError::MissingIdentity(
                format!(
                    "unweighted instance {} of '{}'",
                    instance,
                    arena.plan(*plan).variable
                ),
            )),
        }
    }
}

fn merge_dimension(
    plan: &mut WeightingPlan,
    dim: &Dimension,
    is_rim: bool,
    summary: &mut ReconcileSummary,
) {
    for category in dim.categories.values() {
        let instance = category.instance.id;
        let value = category.target_value();

        if let Some(target) = plan.targets.iter_mut().find(|t| t.instance == instance) {
            target.value = value;
            summary.updated += 1;
            continue;
        }
        if !is_rim && !value.is_set() {
            continue;
        }
        let stale = plan
            .targets
            .iter_mut()
            .find(|t| !dim.variable.is_valid_instance(t.instance));
        match stale {
            Some(target) => {
                target.instance = instance;
                target.value = value;
                summary.recycled += 1;
            }
            None => {
                plan.targets.push(WeightingTarget::new(instance).with_value(value));
                summary.appended += 1;
            }
        }
    }

    // rows left on retired categories keep identity and children, not values
    for target in &mut plan.targets {
        if !dim.variable.is_valid_instance(target.instance) {
            target.value = TargetValue::Unset;
        }
    }
}

fn dispatch(
    arena: &PlanArena,
    entity: &NodeEntity,
    plans: Vec<WeightingPlan>,
) -> Result<SaveOperation, ReconcileError> {
    match entity {
        NodeEntity::Root => Ok(SaveOperation::CreatePlans {
            scope: arena.scope().clone(),
            plans,
        }),
        NodeEntity::Plan(p) => {
            let record = arena.plan(*p);
            match (record.id, record.parent) {
                (Some(plan_id), _) => {
                    let mut plans = plans;
                    if plans.len() != 1 {
                        return Err(ReconcileError::AmbiguousUpdateTarget(format!(
                            "expected a single plan for '{}', got {}",
                            record.variable,
                            plans.len()
                        )));
                    }
                    let plan = plans.remove(0);
                    Ok(SaveOperation::UpdatePlan { plan_id, plan })
                }
                (None, None) => {
                    let mut all: Vec<WeightingPlan> = arena
                        .roots()
                        .iter()
                        .filter(|r| **r != *p)
                        .map(|r| arena.materialize_plan(*r))
                        .collect();
                    all.extend(plans);
                    Ok(SaveOperation::CreatePlans {
                        scope: arena.scope().clone(),
                        plans: all,
                    })
                }
                (None, Some(_)) => Err(ReconcileError::MissingIdentity(format!(
                    "nested plan for '{}'",
                    record.variable
                ))),
            }
        }
        NodeEntity::Target(t) => {
            let record = arena.target(*t);
            let owner = arena.plan(record.plan);
            let target = WeightingTarget {
                id: record.id,
                instance: record.instance,
                value: record.value,
                child_plans: plans,
            };
            match (owner.id, record.id) {
                (Some(plan_id), Some(target_id)) => Ok(SaveOperation::UpdateTarget {
                    plan_id,
                    target_id,
                    target,
                }),
                (Some(plan_id), None) => Ok(SaveOperation::CreateTarget { plan_id, target }),
                (None, _) => Err(ReconcileError::MissingIdentity(format!(
                    "plan for '{}'",
                    owner.variable
                ))),
            }
        }
        NodeEntity::Unweighted { plan, instance } => {
            let owner = arena.plan(*plan);
            let plan_id = owner.id.ok_or_else(|| {
                ReconcileError::MissingIdentity(format!("plan for '{}'", owner.variable))
            })?;
            let target = WeightingTarget::new(*instance)
                .with_value(TargetValue::Unset)
                .with_child_plans(plans);
            Ok(SaveOperation::CreateTarget { plan_id, target })
        }
    }
}
