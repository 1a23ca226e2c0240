//! Validation of dimensions and schemes
//!
//! [`ValidationEngine`] holds the rules that gate adding dimensions and
//! saving a scheme, plus the solver round-trip that decides whether a save
//! needs explicit confirmation.

use crate::config::EditorConfig;
use crate::dimension::Dimension;
use crate::error::{PortError, ValidationError};
use crate::ports::{FeasibilityReport, RimSolver};
use quota_model::{FilterInstanceChain, InstanceId, ScopeId, VariableId, WeightingPlan};

/// Scheme and addition rules
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    config: EditorConfig,
}

impl ValidationEngine {
    /// Create engine with configuration
    #[inline]
    #[must_use]
    pub fn new(config: EditorConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Round to the configured number of decimal places
    #[must_use]
    pub fn round(&self, value: f64) -> f64 {
        let places = i32::try_from(self.config.rounding_places).unwrap_or(i32::MAX);
        let factor = 10f64.powi(places);
        (value * factor).round() / factor
    }

    /// Check one dimension
    ///
    /// Percentages must sum to 100, unless every category has a population
    /// target or no sample.
    ///
    /// # Errors
    /// Returns `PercentagesDoNotSum` with the rounded sum
    pub fn check_dimension(&self, dimension: &Dimension) -> Result<(), ValidationError> {
        let sum = self.round(dimension.percentage_sum());
        if (sum - 100.0).abs() <= self.config.percentage_tolerance {
            return Ok(());
        }
        let vacuous = dimension
            .categories
            .values()
            .all(|c| c.population.is_some() || c.sample_size == 0);
        if vacuous {
            return Ok(());
        }
        Err(ValidationError::PercentagesDoNotSum {
            variable: dimension.id().clone(),
            sum,
        })
    }

    /// Whether a dimension passes [`Self::check_dimension`]
    #[inline]
    #[must_use]
    pub fn dimension_valid(&self, dimension: &Dimension) -> bool {
        self.check_dimension(dimension).is_ok()
    }

    /// Exactly one dimension and nothing targeted yet
    #[must_use]
    pub fn is_placeholder<'a>(dimensions: impl IntoIterator<Item = &'a Dimension>) -> bool {
        let dims: Vec<_> = dimensions.into_iter().collect();
        dims.len() == 1 && !dims[0].has_any_target()
    }

    /// At least one dimension and every dimension valid
    #[must_use]
    pub fn all_valid<'a>(&self, dimensions: impl IntoIterator<Item = &'a Dimension>) -> bool {
        let mut any = false;
        for dim in dimensions {
            any = true;
            if !self.dimension_valid(dim) {
                return false;
            }
        }
        any
    }

    /// Check a scheme before saving
    ///
    /// # Errors
    /// Returns the first invalid dimension, or `InvalidScheme` when empty
    pub fn validate_scheme<'a>(
        &self,
        dimensions: impl IntoIterator<Item = &'a Dimension> + Clone,
    ) -> Result<(), ValidationError> {
        if Self::is_placeholder(dimensions.clone()) {
            return Ok(());
        }
        let mut count = 0;
        for dim in dimensions {
            count += 1;
            self.check_dimension(dim)?;
        }
        if count == 0 {
            return Err(ValidationError::InvalidScheme(
                "scheme has no dimensions".to_string(),
            ));
        }
        Ok(())
    }

    /// Product of category counts
    #[must_use]
    pub fn quota_cells(counts: impl IntoIterator<Item = usize>) -> u64 {
        counts
            .into_iter()
            .map(|c| u64::try_from(c).unwrap_or(u64::MAX))
            .fold(1u64, u64::saturating_mul)
    }

    /// Check that new dimensions may join the working set
    ///
    /// `nesting_blocked` is true when the selected node already has a
    /// doubly-nested chain below it.
    ///
    /// # Errors
    /// `DuplicateDimension`, `IneligibleNesting` or `TooManyQuotaCells`
    pub fn check_addition(
        &self,
        existing: &[&Dimension],
        added: &[&Dimension],
        nesting_blocked: bool,
    ) -> Result<(), ValidationError> {
        for (i, dim) in added.iter().enumerate() {
            let repeated = existing.iter().any(|e| e.id() == dim.id())
                || added[..i].iter().any(|e| e.id() == dim.id());
            if repeated {
                return Err(ValidationError::DuplicateDimension {
                    variable: dim.id().clone(),
                });
            }
        }

        if nesting_blocked && existing.len() + added.len() > 1 {
            return Err(ValidationError::IneligibleNesting);
        }

        let cells = Self::quota_cells(
            existing
                .iter()
                .chain(added.iter())
                .map(|d| d.category_count()),
        );
        if cells >= self.config.max_quota_cells {
            return Err(ValidationError::TooManyQuotaCells {
                cells,
                limit: self.config.max_quota_cells,
            });
        }
        Ok(())
    }

    /// Partial plans sent to the solver
    #[must_use]
    pub fn partial_plans<'a>(dimensions: impl IntoIterator<Item = &'a Dimension>) -> Vec<WeightingPlan> {
        dimensions.into_iter().map(Dimension::to_plan).collect()
    }

    /// Trial-run the scheme with the solver
    ///
    /// # Errors
    /// Propagates solver failures
    pub async fn feasibility<'a>(
        &self,
        solver: &dyn RimSolver,
        scope: &ScopeId,
        dimensions: impl IntoIterator<Item = &'a Dimension>,
        chain: &FilterInstanceChain,
    ) -> Result<FeasibilityReport, PortError> {
        let plans = Self::partial_plans(dimensions);
        let report = solver.validate_partial(scope, &plans, chain).await?;
        tracing::debug!(
            "Feasibility for {}: converged={} efficiency={:.3} weights={:.3}..{:.3}",
            chain,
            report.converged,
            report.efficiency_score,
            report.min_weight,
            report.max_weight
        );
        Ok(report)
    }

    /// Whether a report is poor enough to ask before saving
    #[must_use]
    pub fn needs_confirmation(&self, report: &FeasibilityReport) -> bool {
        let t = &self.config.thresholds;
        report.efficiency_score < t.min_efficiency
            || report.min_weight < t.min_weight
            || report.max_weight > t.max_weight
    }

    /// Categories with sample but a zero percentage, when weights hit zero
    #[must_use]
    pub fn zero_target_categories<'a>(
        report: &FeasibilityReport,
        dimensions: impl IntoIterator<Item = &'a Dimension>,
    ) -> Vec<(VariableId, InstanceId)> {
        if report.min_weight != 0.0 {
            return Vec::new();
        }
        dimensions
            .into_iter()
            .flat_map(|d| {
                d.categories
                    .values()
                    .filter(|c| c.sample_size > 0 && c.percentage == Some(0.0))
                    .map(move |c| (d.id().clone(), c.instance.id))
            })
            .collect()
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockRimSolver;
    use proptest::prelude::*;
    use quota_model::{Instance, Variable};
    use std::collections::HashMap;

    fn dim(name: &str, n: usize) -> Dimension {
        let variable = Variable::new(
            name,
            (0..n).map(|i| Instance::new(i as i64, format!("c{i}"))).collect(),
        );
        let sizes: HashMap<InstanceId, u64> = (0..n).map(|i| (InstanceId(i as i64), 10)).collect();
        Dimension::from_samples(variable, &sizes, None)
    }

    fn with_percentages(mut d: Dimension, values: &[f64]) -> Dimension {
        for (c, v) in d.categories.values_mut().zip(values) {
            c.percentage = Some(*v);
        }
        d
    }

    #[test]
    fn quarters_are_valid() {
        let engine = ValidationEngine::default();
        let d = with_percentages(dim("Region", 4), &[25.0, 25.0, 25.0, 25.0]);
        assert!(engine.dimension_valid(&d));
        assert!(engine.validate_scheme([&d]).is_ok());
    }

    #[test]
    fn thirds_round_to_one_hundred() {
        let engine = ValidationEngine::default();
        let third = 100.0 / 3.0;
        let d = with_percentages(dim("Region", 3), &[third, third, third]);
        assert!(engine.dimension_valid(&d));
    }

    #[test]
    fn short_sum_is_rejected() {
        let engine = ValidationEngine::default();
        let d = with_percentages(dim("Region", 4), &[25.0, 25.0, 25.0, 20.0]);
        assert!(matches!(
            engine.check_dimension(&d),
            Err(ValidationError::PercentagesDoNotSum { sum, .. }) if (sum - 95.0).abs() < 1e-9
        ));
    }

    #[test]
    fn population_or_empty_categories_are_vacuously_valid() {
        let engine = ValidationEngine::default();
        let mut d = dim("Region", 2);
        d.categories[&InstanceId(0)].population = Some(40);
        d.categories[&InstanceId(1)].sample_size = 0;
        assert!(engine.dimension_valid(&d));
    }

    #[test]
    fn single_untouched_dimension_is_placeholder() {
        let engine = ValidationEngine::default();
        let d = dim("Region", 4);
        assert!(ValidationEngine::is_placeholder([&d]));
        assert!(engine.validate_scheme([&d]).is_ok());

        let e = dim("Age", 2);
        assert!(engine.validate_scheme([&d, &e]).is_err());
        assert!(matches!(
            engine.validate_scheme(std::iter::empty::<&Dimension>()),
            Err(ValidationError::InvalidScheme(_))
        ));
    }

    #[test]
    fn quota_cell_guard() {
        let engine = ValidationEngine::default();
        let (a, b, c, d) = (dim("A", 10), dim("B", 10), dim("C", 10), dim("D", 3));
        assert!(engine.check_addition(&[&a, &b, &c], &[&d], false).is_ok());

        let big = dim("Big", 100);
        assert!(matches!(
            engine.check_addition(&[&a, &b, &c, &d], &[&big], false),
            Err(ValidationError::TooManyQuotaCells { cells: 300_000, limit: 200_000 })
        ));
    }

    #[test]
    fn cap_is_inclusive() {
        let engine = ValidationEngine::new(EditorConfig::new().with_max_quota_cells(100));
        let (a, b) = (dim("A", 10), dim("B", 10));
        assert!(engine.check_addition(&[&a], &[&b], false).is_err());
    }

    #[test]
    fn nesting_blocks_second_dimension_only() {
        let engine = ValidationEngine::default();
        let (a, b) = (dim("A", 2), dim("B", 2));
        assert!(engine.check_addition(&[], &[&a], true).is_ok());
        assert!(matches!(
            engine.check_addition(&[&a], &[&b], true),
            Err(ValidationError::IneligibleNesting)
        ));
        assert!(engine.check_addition(&[&a], &[&b], false).is_ok());
    }

    #[test]
    fn duplicates_rejected() {
        let engine = ValidationEngine::default();
        let a = dim("A", 2);
        assert!(matches!(
            engine.check_addition(&[&a], &[&a], false),
            Err(ValidationError::DuplicateDimension { .. })
        ));
    }

    #[test]
    fn confirmation_thresholds() {
        let engine = ValidationEngine::default();
        let ok = FeasibilityReport {
            converged: true,
            iterations: 4,
            efficiency_score: 0.9,
            min_weight: 0.5,
            max_weight: 2.0,
        };
        assert!(!engine.needs_confirmation(&ok));
        assert!(engine.needs_confirmation(&FeasibilityReport { efficiency_score: 0.69, ..ok }));
        assert!(engine.needs_confirmation(&FeasibilityReport { min_weight: 0.1, ..ok }));
        assert!(engine.needs_confirmation(&FeasibilityReport { max_weight: 5.5, ..ok }));
    }

    #[test]
    fn zero_targets_reported_when_min_weight_is_zero() {
        let d = with_percentages(dim("Region", 2), &[100.0, 0.0]);
        let report = FeasibilityReport {
            converged: true,
            iterations: 1,
            efficiency_score: 0.8,
            min_weight: 0.0,
            max_weight: 1.5,
        };
        let zeros = ValidationEngine::zero_target_categories(&report, [&d]);
        assert_eq!(zeros, vec![(VariableId::new("Region"), InstanceId(1))]);
    }

    #[tokio::test]
    async fn feasibility_sends_fractional_plans() {
        let mut solver = MockRimSolver::new();
        solver
            .expect_validate_partial()
            .withf(|_, plans, chain| {
                plans.len() == 1
                    && chain.is_empty()
                    && plans[0].targets.iter().all(|t| t.value.percentage() == Some(0.5))
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(FeasibilityReport {
                    converged: true,
                    iterations: 3,
                    efficiency_score: 0.95,
                    min_weight: 0.8,
                    max_weight: 1.2,
                })
            });

        let engine = ValidationEngine::default();
        let d = with_percentages(dim("Region", 2), &[50.0, 50.0]);
        let report = engine
            .feasibility(&solver, &ScopeId::new("UK"), [&d], &FilterInstanceChain::empty())
            .await
            .unwrap();
        assert!(report.converged);
    }

    proptest! {
        #[test]
        fn prop_integer_splits_are_valid(cuts in proptest::collection::vec(0u32..=100, 1..6)) {
            let mut points: Vec<u32> = cuts.clone();
            points.push(0);
            points.push(100);
            points.sort_unstable();
            let parts: Vec<f64> = points.windows(2).map(|w| f64::from(w[1] - w[0])).collect();

            let engine = ValidationEngine::default();
            let d = with_percentages(dim("V", parts.len()), &parts);
            prop_assert!(engine.dimension_valid(&d));
        }

        #[test]
        fn prop_off_by_one_percent_is_invalid(n in 2usize..6) {
            let engine = ValidationEngine::default();
            let mut parts = vec![100.0 / n as f64; n];
            parts[0] += 1.0;
            let d = with_percentages(dim("V", n), &parts);
            prop_assert!(!engine.dimension_valid(&d));
        }
    }
}
