//! Persisted weighting plans and targets
//!
//! The store hands out the recursive form: a root owns top-level plans, each
//! plan owns one target per category, and each target may own further child
//! plans (conditional / RIM weighting below that category).

use crate::error::ModelError;
use crate::ids::{InstanceId, PlanId, ScopeId, TargetId, VariableId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tolerance for stored percentages summing to one
pub const PERCENTAGE_SUM_TOLERANCE: f64 = 1e-9;

/// Desired value for one category
///
/// A target sets at most one of percentage or population.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TargetValue {
    /// No target (placeholder row)
    #[default]
    Unset,
    /// Share of the scope, 0..=1
    Percentage(f64),
    /// Absolute respondent count
    Population(u64),
}

impl TargetValue {
    /// Whether any target is set
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Percentage if set
    #[inline]
    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        match self {
            Self::Percentage(p) => Some(*p),
            _ => None,
        }
    }

    /// Population if set
    #[inline]
    #[must_use]
    pub fn population(&self) -> Option<u64> {
        match self {
            Self::Population(p) => Some(*p),
            _ => None,
        }
    }
}

/// Wire form of a target, where both values are optional fields
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<TargetId>,
    instance: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    population: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    child_plans: Vec<WeightingPlan>,
}

/// Target for one category of its plan's variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTarget", into = "RawTarget")]
pub struct WeightingTarget {
    /// Persisted identity (absent for new targets)
    pub id: Option<TargetId>,
    /// Category this target applies to
    pub instance: InstanceId,
    /// Desired value
    pub value: TargetValue,
    /// Nested plans conditioned on this category
    pub child_plans: Vec<WeightingPlan>,
}

impl TryFrom<RawTarget> for WeightingTarget {
    type Error = ModelError;

    fn try_from(raw: RawTarget) -> Result<Self, Self::Error> {
        let value = match (raw.percentage, raw.population) {
            (Some(_), Some(_)) => {
                return Err(ModelError::BothTargetKinds {
                    instance: raw.instance,
                })
            }
            (Some(p), None) => {
                if !(0.0..=1.0).contains(&p) {
                    return Err(ModelError::PercentageOutOfRange {
                        instance: raw.instance,
                        value: p,
                    });
                }
                TargetValue::Percentage(p)
            }
            (None, Some(n)) => TargetValue::Population(n),
            (None, None) => TargetValue::Unset,
        };
        Ok(Self {
            id: raw.id,
            instance: raw.instance,
            value,
            child_plans: raw.child_plans,
        })
    }
}

impl From<WeightingTarget> for RawTarget {
    fn from(target: WeightingTarget) -> Self {
        Self {
            id: target.id,
            instance: target.instance,
            percentage: target.value.percentage(),
            population: target.value.population(),
            child_plans: target.child_plans,
        }
    }
}

impl WeightingTarget {
    /// New unset target
    #[inline]
    #[must_use]
    pub fn new(instance: InstanceId) -> Self {
        Self {
            id: None,
            instance,
            value: TargetValue::Unset,
            child_plans: Vec::new(),
        }
    }

    /// New percentage target
    #[inline]
    #[must_use]
    pub fn percentage(instance: InstanceId, share: f64) -> Self {
        Self::new(instance).with_value(TargetValue::Percentage(share))
    }

    /// New population target
    #[inline]
    #[must_use]
    pub fn population(instance: InstanceId, count: u64) -> Self {
        Self::new(instance).with_value(TargetValue::Population(count))
    }

    /// With persisted identity
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(TargetId(id));
        self
    }

    /// With value
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: TargetValue) -> Self {
        self.value = value;
        self
    }

    /// With nested plans
    #[inline]
    #[must_use]
    pub fn with_child_plans(mut self, plans: Vec<WeightingPlan>) -> Self {
        self.child_plans = plans;
        self
    }

    /// Whether this target has nested plans
    #[inline]
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.child_plans.is_empty()
    }

    /// Whether the target is new (never persisted)
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

/// Plan targeting the categories of one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightingPlan {
    /// Persisted identity (absent for new plans)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlanId>,
    /// Variable whose categories are targeted
    pub variable: VariableId,
    /// Groups weightings below this level
    #[serde(default)]
    pub is_weighting_group_root: bool,
    /// One target per category
    #[serde(default)]
    pub targets: Vec<WeightingTarget>,
}

impl WeightingPlan {
    /// New plan without targets
    #[inline]
    #[must_use]
    pub fn new(variable: impl Into<VariableId>) -> Self {
        Self {
            id: None,
            variable: variable.into(),
            is_weighting_group_root: false,
            targets: Vec::new(),
        }
    }

    /// With persisted identity
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(PlanId(id));
        self
    }

    /// With targets
    #[inline]
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<WeightingTarget>) -> Self {
        self.targets = targets;
        self
    }

    /// Target row for an instance
    #[inline]
    #[must_use]
    pub fn target_for(&self, instance: InstanceId) -> Option<&WeightingTarget> {
        self.targets.iter().find(|t| t.instance == instance)
    }

    /// No target carries a value (placeholder state)
    #[inline]
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.targets.iter().all(|t| !t.value.is_set())
    }

    /// Any target has nested plans
    #[inline]
    #[must_use]
    pub fn has_nested_plans(&self) -> bool {
        self.targets.iter().any(WeightingTarget::has_children)
    }

    /// Sum of percentage targets
    #[must_use]
    pub fn percentage_sum(&self) -> f64 {
        self.targets.iter().filter_map(|t| t.value.percentage()).sum()
    }

    /// Whether the plan is new (never persisted)
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Check target-kind consistency of this plan (not its children)
    ///
    /// Unset rows are ignored. Set rows must all be percentages summing to one,
    /// or all populations.
    ///
    /// # Errors
    /// Returns the first shape violation found
    pub fn check_shape(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.instance) {
                return Err(ModelError::DuplicateInstance {
                    variable: self.variable.clone(),
                    instance: target.instance,
                });
            }
        }

        let percentages = self.targets.iter().filter(|t| t.value.percentage().is_some()).count();
        let populations = self.targets.iter().filter(|t| t.value.population().is_some()).count();

        if percentages > 0 && populations > 0 {
            return Err(ModelError::MixedTargetKinds {
                variable: self.variable.clone(),
            });
        }

        if percentages > 0 {
            let sum = self.percentage_sum();
            if (sum - 1.0).abs() > PERCENTAGE_SUM_TOLERANCE {
                return Err(ModelError::PercentageSum {
                    variable: self.variable.clone(),
                    sum,
                });
            }
        }
        Ok(())
    }

    /// Check this plan and every nested plan
    ///
    /// # Errors
    /// Returns every violation found, depth-first
    pub fn check_shape_recursive(&self) -> Vec<ModelError> {
        let mut errors = Vec::new();
        if let Err(e) = self.check_shape() {
            errors.push(e);
        }
        for target in &self.targets {
            for child in &target.child_plans {
                errors.extend(child.check_shape_recursive());
            }
        }
        errors
    }
}

/// Persisted weighting configuration for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightingRoot {
    /// Survey segment
    pub scope: ScopeId,
    /// Top-level plans
    #[serde(default)]
    pub plans: Vec<WeightingPlan>,
}

impl WeightingRoot {
    /// Empty root for a scope
    #[inline]
    #[must_use]
    pub fn new(scope: impl Into<ScopeId>) -> Self {
        Self {
            scope: scope.into(),
            plans: Vec::new(),
        }
    }

    /// With top-level plans
    #[inline]
    #[must_use]
    pub fn with_plans(mut self, plans: Vec<WeightingPlan>) -> Self {
        self.plans = plans;
        self
    }

    /// No plans configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Shape violations across the whole root
    #[must_use]
    pub fn shape_issues(&self) -> Vec<ModelError> {
        self.plans
            .iter()
            .flat_map(WeightingPlan::check_shape_recursive)
            .collect()
    }
}
