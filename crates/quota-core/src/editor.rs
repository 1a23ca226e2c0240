//! Dimension editor
//!
//! Holds the working set of [`Dimension`]s for the selected node. Loading is
//! split in three steps so no borrow of the editor is held across an await:
//!
//! 1. [`DimensionEditor::begin_load`] bumps the generation and captures a
//!    [`SelectionTicket`], the ancestry chain and the baseline plans
//! 2. [`LoadRequest::fetch`] asks the sample-size provider
//! 3. [`DimensionEditor::complete_load`] applies the result, or discards it
//!    when a newer selection was made meanwhile

use crate::config::EditorConfig;
use crate::dimension::Dimension;
use crate::error::{PortError, QuotaError, ValidationError};
use crate::ports::SampleSizeProvider;
use crate::reconcile::baseline_plans;
use crate::validation::ValidationEngine;
use futures::future::try_join_all;
use indexmap::IndexMap;
use quota_model::{
    EntityRef, FilterInstanceChain, InstanceId, PlanArena, ScopeId, Variable, VariableId,
    WeightingPlan,
};
use quota_tree::{ancestry_chain, CatalogSnapshot, Node, NodeEntity, NodeKey};
use std::collections::HashSet;

/// Identifies one selection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionTicket {
    generation: u64,
    node: NodeKey,
}

impl SelectionTicket {
    /// Monotonic selection counter
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Selected node
    #[inline]
    #[must_use]
    pub fn node(&self) -> &NodeKey {
        &self.node
    }
}

/// Pending load for a selection
#[derive(Debug, Clone)]
pub struct LoadRequest {
    ticket: SelectionTicket,
    scope: ScopeId,
    chain: FilterInstanceChain,
    baseline: Vec<(Variable, WeightingPlan)>,
}

impl LoadRequest {
    /// Ticket of the selection this request belongs to
    #[inline]
    #[must_use]
    pub fn ticket(&self) -> &SelectionTicket {
        &self.ticket
    }

    /// Filters scoping the request
    #[inline]
    #[must_use]
    pub fn chain(&self) -> &FilterInstanceChain {
        &self.chain
    }

    /// Fetch population and per-category sample sizes
    ///
    /// # Errors
    /// Propagates provider failures
    pub async fn fetch(self, provider: &dyn SampleSizeProvider) -> Result<LoadedNode, PortError> {
        let total_population = provider.total_population(&self.scope, &self.chain).await?;

        let scope = &self.scope;
        let chain = &self.chain;
        let dimensions = try_join_all(self.baseline.iter().map(|(variable, plan)| async move {
            let sizes = provider
                .sample_sizes(scope, chain, &variable.identifier)
                .await?;
            Ok::<_, PortError>(Dimension::from_samples(variable.clone(), &sizes, Some(plan)))
        }))
        .await?;

        Ok(LoadedNode {
            ticket: self.ticket,
            chain: self.chain,
            total_population,
            dimensions,
        })
    }
}

/// Fetched data for a selection
#[derive(Debug, Clone)]
pub struct LoadedNode {
    ticket: SelectionTicket,
    chain: FilterInstanceChain,
    total_population: u64,
    dimensions: Vec<Dimension>,
}

impl LoadedNode {
    /// Ticket of the originating selection
    #[inline]
    #[must_use]
    pub fn ticket(&self) -> &SelectionTicket {
        &self.ticket
    }
}

/// Result of applying a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Working set replaced
    Applied,
    /// A newer selection superseded this one
    Stale,
}

/// Working set of dimensions for the selected node
#[derive(Debug, Clone)]
pub struct DimensionEditor {
    validation: ValidationEngine,
    generation: u64,
    current: Option<SelectionTicket>,
    /// Selection whose fetch is in flight
    pending: Option<SelectionTicket>,
    chain: FilterInstanceChain,
    dimensions: IndexMap<VariableId, Dimension>,
    total_population: Option<u64>,
    dirty: bool,
    loading: bool,
}

impl DimensionEditor {
    /// Create editor
    #[must_use]
    pub fn new(config: EditorConfig) -> Self {
        Self {
            validation: ValidationEngine::new(config),
            generation: 0,
            current: None,
            pending: None,
            chain: FilterInstanceChain::empty(),
            dimensions: IndexMap::new(),
            total_population: None,
            dirty: false,
            loading: false,
        }
    }

    /// Start loading the working set for a node
    ///
    /// The previous selection stays in place until [`Self::complete_load`]
    /// applies the result; its unsaved edits are discarded then.
    ///
    /// # Errors
    /// Returns `Tree(UnknownVariable)` when a baseline plan's variable is not
    /// in the catalog; the editor is left untouched in that case
    pub fn begin_load(
        &mut self,
        arena: &PlanArena,
        catalog: &CatalogSnapshot,
        scope: &ScopeId,
        node: &Node,
    ) -> Result<LoadRequest, QuotaError> {
        let baseline = baseline_plans(arena, &node.entity)
            .into_iter()
            .map(|idx| {
                let plan = arena.materialize_plan(idx);
                let variable = catalog.require(&plan.variable)?.clone();
                Ok((variable, plan))
            })
            .collect::<Result<Vec<_>, QuotaError>>()?;

        self.generation += 1;
        let ticket = SelectionTicket {
            generation: self.generation,
            node: node.key.clone(),
        };
        let chain = ancestry_chain(arena, &node.entity);
        self.pending = Some(ticket.clone());
        self.loading = true;

        tracing::debug!(
            "Loading node {} (generation {}) with {} dimension(s), chain {}",
            node.key,
            self.generation,
            baseline.len(),
            chain
        );

        Ok(LoadRequest {
            ticket,
            scope: scope.clone(),
            chain,
            baseline,
        })
    }

    /// Apply fetched data unless a newer selection was made
    pub fn complete_load(&mut self, loaded: LoadedNode) -> LoadOutcome {
        if self.pending.as_ref() != Some(&loaded.ticket) {
            tracing::warn!(
                "Discarding stale load for node {} (generation {})",
                loaded.ticket.node,
                loaded.ticket.generation
            );
            return LoadOutcome::Stale;
        }

        self.dimensions = loaded
            .dimensions
            .into_iter()
            .map(|mut dim| {
                dim.clear_zero_sample_targets();
                dim.refresh_flags();
                (dim.id().clone(), dim)
            })
            .collect();
        self.chain = loaded.chain;
        self.pending = None;
        self.current = Some(loaded.ticket);
        self.total_population = Some(loaded.total_population);
        self.dirty = false;
        self.loading = false;
        LoadOutcome::Applied
    }

    /// Abandon the in-flight load after a failed fetch
    ///
    /// The last applied selection and its working set stay as they were.
    pub fn clear_loading(&mut self) {
        self.pending = None;
        self.loading = false;
    }

    /// Whether a ticket belongs to the latest requested selection
    #[inline]
    #[must_use]
    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        self.pending.as_ref().or(self.current.as_ref()) == Some(ticket)
    }

    /// Add dimensions to the working set
    ///
    /// # Errors
    /// See [`ValidationEngine::check_addition`]; the working set is unchanged
    /// on error
    pub fn add_dimensions(
        &mut self,
        added: Vec<Dimension>,
        nesting_blocked: bool,
    ) -> Result<(), ValidationError> {
        {
            let existing: Vec<&Dimension> = self.dimensions.values().collect();
            let new: Vec<&Dimension> = added.iter().collect();
            self.validation
                .check_addition(&existing, &new, nesting_blocked)?;
        }
        for dim in added {
            self.dimensions.insert(dim.id().clone(), dim);
        }
        self.touch();
        Ok(())
    }

    /// Remove a dimension
    ///
    /// # Errors
    /// Returns `UnknownDimension` when absent
    pub fn remove_dimension(&mut self, variable: &VariableId) -> Result<Dimension, ValidationError> {
        let removed = self
            .dimensions
            .shift_remove(variable)
            .ok_or_else(|| ValidationError::UnknownDimension {
                variable: variable.clone(),
            })?;
        self.touch();
        Ok(removed)
    }

    /// Set a percentage target (in percent), clearing populations of that dimension
    ///
    /// # Errors
    /// `NegativeValue`, `UnknownDimension` or `UnknownInstance`
    pub fn set_percentage(
        &mut self,
        variable: &VariableId,
        instance: InstanceId,
        value: Option<f64>,
    ) -> Result<(), ValidationError> {
        if let Some(v) = value {
            if v < 0.0 || v.is_nan() {
                return Err(ValidationError::NegativeValue { instance, value: v });
            }
        }
        let dim = self.dimension_mut(variable, instance)?;
        for category in dim.categories.values_mut() {
            category.population = None;
        }
        if let Some(category) = dim.categories.get_mut(&instance) {
            category.percentage = value;
            category.stale_cleared = false;
        }
        self.touch();
        Ok(())
    }

    /// Set a population target, clearing percentages of that dimension
    ///
    /// # Errors
    /// `UnknownDimension` or `UnknownInstance`
    pub fn set_population(
        &mut self,
        variable: &VariableId,
        instance: InstanceId,
        value: Option<u64>,
    ) -> Result<(), ValidationError> {
        let dim = self.dimension_mut(variable, instance)?;
        for category in dim.categories.values_mut() {
            category.percentage = None;
        }
        if let Some(category) = dim.categories.get_mut(&instance) {
            category.population = value;
            category.stale_cleared = false;
        }
        self.touch();
        Ok(())
    }

    fn dimension_mut(
        &mut self,
        variable: &VariableId,
        instance: InstanceId,
    ) -> Result<&mut Dimension, ValidationError> {
        let dim = self
            .dimensions
            .get_mut(variable)
            .ok_or_else(|| ValidationError::UnknownDimension {
                variable: variable.clone(),
            })?;
        if !dim.categories.contains_key(&instance) {
            return Err(ValidationError::UnknownInstance {
                variable: variable.clone(),
                instance,
            });
        }
        Ok(dim)
    }

    fn touch(&mut self) {
        for dim in self.dimensions.values_mut() {
            dim.refresh_flags();
        }
        self.dirty = true;
    }

    /// Dimensions in working-set order
    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> + Clone {
        self.dimensions.values()
    }

    /// One dimension
    #[inline]
    #[must_use]
    pub fn dimension(&self, variable: &VariableId) -> Option<&Dimension> {
        self.dimensions.get(variable)
    }

    /// Number of dimensions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    /// No dimensions
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// More than one dimension
    #[inline]
    #[must_use]
    pub fn is_rim(&self) -> bool {
        self.dimensions.len() > 1
    }

    /// Filters of the selected node
    #[inline]
    #[must_use]
    pub fn chain(&self) -> &FilterInstanceChain {
        &self.chain
    }

    /// Respondents in the selected node's scope, once loaded
    #[inline]
    #[must_use]
    pub fn total_population(&self) -> Option<u64> {
        self.total_population
    }

    /// Selected node
    #[inline]
    #[must_use]
    pub fn current_node(&self) -> Option<&NodeKey> {
        self.current.as_ref().map(|t| &t.node)
    }

    /// Current selection ticket
    #[inline]
    #[must_use]
    pub fn ticket(&self) -> Option<&SelectionTicket> {
        self.current.as_ref()
    }

    /// Unsaved edits present
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Load in flight
    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Validation rules in use
    #[inline]
    #[must_use]
    pub fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    /// Exactly one untouched dimension
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        ValidationEngine::is_placeholder(self.dimensions())
    }

    /// Whether the working set may be saved
    #[must_use]
    pub fn is_saveable(&self) -> bool {
        self.validation.validate_scheme(self.dimensions()).is_ok()
    }

    /// Dimensions whose total sample falls short of the scope population
    #[must_use]
    pub fn inconsistent_base_sizes(&self, total_population: u64) -> Vec<VariableId> {
        self.dimensions
            .values()
            .filter(|d| d.total_sample() < total_population)
            .map(|d| d.id().clone())
            .collect()
    }

    /// Whether population targets are in use
    #[must_use]
    pub fn is_expansion_weighted(&self) -> bool {
        self.dimensions.values().any(Dimension::has_population_targets)
    }

    /// Variables that can still be added at a node
    ///
    /// Weightable variables not used by the node's ancestors or descendants
    /// and not already in the working set.
    #[must_use]
    pub fn available_variables<'c>(
        &self,
        catalog: &'c CatalogSnapshot,
        arena: &PlanArena,
        node: &Node,
    ) -> Vec<&'c Variable> {
        let used: HashSet<VariableId> = match node.entity {
            NodeEntity::Root => arena.branch_variables(None),
            NodeEntity::Plan(p) => arena.branch_variables(Some(EntityRef::Plan(p))),
            NodeEntity::Target(t) => arena.branch_variables(Some(EntityRef::Target(t))),
            NodeEntity::Unweighted { plan, .. } => {
                let mut used: HashSet<VariableId> = arena
                    .ancestry_chain(EntityRef::Plan(plan))
                    .filters()
                    .iter()
                    .map(|f| f.variable.clone())
                    .collect();
                used.insert(arena.plan(plan).variable.clone());
                used
            }
        };
        catalog
            .iter()
            .filter(|v| v.kind.is_weightable())
            .filter(|v| !used.contains(&v.identifier))
            .filter(|v| !self.dimensions.contains_key(&v.identifier))
            .collect()
    }
}

impl Default for DimensionEditor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}
