//! Dimensions: the transient editing form of a plan
//!
//! A [`Dimension`] pairs a variable with, for each enabled category, the live
//! sample size and the desired target. Percentages are held in display units
//! (0..=100) and divided by 100 when written back to a plan.

use indexmap::IndexMap;
use quota_model::{Instance, InstanceId, TargetValue, Variable, VariableId, WeightingPlan, WeightingTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One category of a dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTarget {
    pub instance: Instance,
    /// Respondents in this category within the node's chain
    pub sample_size: u64,
    /// Target share in percent
    pub percentage: Option<f64>,
    /// Target respondent count
    pub population: Option<u64>,
    /// Has sample but no target while other categories are targeted
    pub flagged: bool,
    /// A stored target was dropped because the category has no sample
    pub stale_cleared: bool,
}

impl CategoryTarget {
    /// Whether any target is set
    #[inline]
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.percentage.is_some() || self.population.is_some()
    }

    /// Stored form of the target
    #[must_use]
    pub fn target_value(&self) -> TargetValue {
        match (self.percentage, self.population) {
            (Some(p), _) => TargetValue::Percentage(p / 100.0),
            (None, Some(n)) => TargetValue::Population(n),
            (None, None) => TargetValue::Unset,
        }
    }

    /// Warning text for flagged or cleared categories
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        if self.stale_cleared {
            Some(format!(
                "{} has no respondents, its stored target was removed",
                self.instance.name
            ))
        } else if self.flagged {
            Some(format!(
                "{} has {} respondent(s) but no target. These respondents are currently not weighted",
                self.instance.name, self.sample_size
            ))
        } else {
            None
        }
    }
}

/// Variable plus per-category targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub variable: Variable,
    pub categories: IndexMap<InstanceId, CategoryTarget>,
}

impl Dimension {
    /// Build from a variable's enabled categories and scoped sample sizes
    ///
    /// Values come from `baseline` when given (percentages scaled to 0..=100).
    #[must_use]
    pub fn from_samples(
        variable: Variable,
        samples: &HashMap<InstanceId, u64>,
        baseline: Option<&WeightingPlan>,
    ) -> Self {
        let categories = variable
            .enabled_instances()
            .map(|instance| {
                let stored = baseline
                    .and_then(|plan| plan.target_for(instance.id))
                    .map_or(TargetValue::Unset, |t| t.value);
                let category = CategoryTarget {
                    instance: instance.clone(),
                    sample_size: samples.get(&instance.id).copied().unwrap_or(0),
                    percentage: stored.percentage().map(|p| p * 100.0),
                    population: stored.population(),
                    flagged: false,
                    stale_cleared: false,
                };
                (instance.id, category)
            })
            .collect();
        Self {
            variable,
            categories,
        }
    }

    /// Variable identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> &VariableId {
        &self.variable.identifier
    }

    /// Number of categories
    #[inline]
    #[must_use]
    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Whether any category carries a target
    #[must_use]
    pub fn has_any_target(&self) -> bool {
        self.categories.values().any(CategoryTarget::has_target)
    }

    /// Whether any category carries a population target
    #[must_use]
    pub fn has_population_targets(&self) -> bool {
        self.categories.values().any(|c| c.population.is_some())
    }

    /// Sum of percentages, unset counted as zero
    #[must_use]
    pub fn percentage_sum(&self) -> f64 {
        self.categories.values().filter_map(|c| c.percentage).sum()
    }

    /// Respondents across all categories
    #[must_use]
    pub fn total_sample(&self) -> u64 {
        self.categories.values().map(|c| c.sample_size).sum()
    }

    /// Drop targets of categories without sample
    ///
    /// Non-zero percentages and any population are cleared and marked.
    pub fn clear_zero_sample_targets(&mut self) {
        for category in self.categories.values_mut() {
            if category.sample_size > 0 {
                continue;
            }
            let stale_percentage = category.percentage.is_some_and(|p| p != 0.0);
            let stale_population = category.population.is_some();
            if stale_percentage || stale_population {
                category.stale_cleared = true;
            }
            if stale_percentage {
                category.percentage = None;
            }
            category.population = None;
        }
    }

    /// Recompute the unweighted-respondent flags
    ///
    /// Untouched dimensions carry no flags.
    pub fn refresh_flags(&mut self) {
        let populated = self.has_any_target();
        for category in self.categories.values_mut() {
            category.flagged = populated && category.sample_size > 0 && !category.has_target();
        }
    }

    /// Plan form of this dimension (targets for every category)
    #[must_use]
    pub fn to_plan(&self) -> WeightingPlan {
        WeightingPlan::new(self.id().clone()).with_targets(
            self.categories
                .values()
                .map(|c| WeightingTarget::new(c.instance.id).with_value(c.target_value()))
                .collect(),
        )
    }
}
