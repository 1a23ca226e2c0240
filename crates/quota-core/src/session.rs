//! Weighting session
//!
//! Orchestrates one scope: loads the persisted root and the catalog, projects
//! the tree, drives the [`DimensionEditor`] for the selected node and turns a
//! save into exactly one store write followed by a reload.
//!
//! Collaborator failures are logged and returned; the last loaded tree stays
//! in place.

use crate::config::EditorConfig;
use crate::dimension::Dimension;
use crate::editor::{DimensionEditor, LoadOutcome, LoadRequest, LoadedNode};
use crate::error::{PortError, QuotaError, ReconcileError, ValidationError};
use crate::marker::{MarkerSlot, SavedNodeMarker};
use crate::ports::{FeasibilityReport, Ports};
use crate::reconcile::{ReconcileSummary, ReconciliationEngine, SaveOperation};
use futures::future::try_join_all;
use quota_model::{Instance, InstanceId, PlanArena, PlanId, ScopeId, Variable, VariableId, WeightingRoot};
use quota_tree::{
    default_selection, describe, has_doubly_nested_chain, project, require, CatalogSnapshot,
    Node, NodeEntity, NodeKey, RequestedNode,
};
use std::collections::HashSet;

/// Result of a save attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Solver diagnostics are poor; call again with `confirmed`
    NeedsConfirmation(FeasibilityReport),
    /// Written and reloaded
    Saved {
        operation: &'static str,
        summary: ReconcileSummary,
        selected: NodeKey,
    },
}

/// Editing session for one scope
#[derive(Debug)]
pub struct WeightingSession {
    scope: ScopeId,
    scope_label: String,
    ports: Ports,
    arena: PlanArena,
    catalog: CatalogSnapshot,
    tree: Node,
    editor: DimensionEditor,
    reconciler: ReconciliationEngine,
    feasibility: Option<FeasibilityReport>,
}

impl WeightingSession {
    /// Create an empty session; call [`Self::reload`] to populate it
    #[must_use]
    pub fn new(scope: ScopeId, scope_label: impl Into<String>, ports: Ports, config: EditorConfig) -> Self {
        let scope_label = scope_label.into();
        let arena = PlanArena::from_root(&WeightingRoot::new(scope.clone()));
        let catalog = CatalogSnapshot::new();
        let tree = project(&arena, &catalog, &scope_label);
        Self {
            scope,
            scope_label,
            ports,
            arena,
            catalog,
            tree,
            editor: DimensionEditor::new(config),
            reconciler: ReconciliationEngine::new(),
            feasibility: None,
        }
    }

    /// Scope being edited
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Projected tree
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &Node {
        &self.tree
    }

    /// Loaded plan snapshot
    #[inline]
    #[must_use]
    pub fn arena(&self) -> &PlanArena {
        &self.arena
    }

    /// Loaded catalog
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &CatalogSnapshot {
        &self.catalog
    }

    /// Working set of the selected node
    #[inline]
    #[must_use]
    pub fn editor(&self) -> &DimensionEditor {
        &self.editor
    }

    /// Last solver report for the current working set
    #[inline]
    #[must_use]
    pub fn feasibility(&self) -> Option<&FeasibilityReport> {
        self.feasibility.as_ref()
    }

    /// Selected node
    #[must_use]
    pub fn selected(&self) -> Option<&Node> {
        self.editor
            .current_node()
            .and_then(|key| self.tree.find(key))
    }

    /// Breadcrumb of the selected node
    #[must_use]
    pub fn breadcrumb(&self) -> Option<String> {
        self.selected()
            .map(|node| describe(&self.arena, &self.catalog, node))
    }

    /// Variables that can be added at the selected node
    #[must_use]
    pub fn available_variables(&self) -> Vec<&Variable> {
        self.selected().map_or_else(Vec::new, |node| {
            self.editor
                .available_variables(&self.catalog, &self.arena, node)
        })
    }

    /// Load the root and catalog, then select a node
    ///
    /// Selection order: `marker`, then `requested`, then the first node with
    /// children, then the synthetic root. A missing root is treated as empty.
    ///
    /// # Errors
    /// Collaborator failures; the previous tree is kept
    pub async fn reload(
        &mut self,
        marker: Option<SavedNodeMarker>,
        requested: Option<RequestedNode>,
    ) -> Result<LoadOutcome, QuotaError> {
        let root = match self.ports.store.get_root(&self.scope).await {
            Ok(root) => root,
            Err(PortError::NotFound(_)) => WeightingRoot::new(self.scope.clone()),
            Err(e) => return Err(boundary("loading weighting root", e)),
        };
        for issue in root.shape_issues() {
            tracing::warn!("Plan shape issue in {}: {}", self.scope, issue);
        }

        let arena = PlanArena::from_root(&root);
        let catalog = self
            .load_catalog(&arena)
            .await
            .map_err(|e| boundary("loading catalog", e))?;
        let tree = project(&arena, &catalog, &self.scope_label);
        let key = default_selection(
            &tree,
            &arena,
            marker.as_ref().map(|m| &m.node),
            requested,
        )
        .key
        .clone();

        tracing::info!(
            "Loaded {} plan(s) and {} target(s) for {}",
            arena.plan_count(),
            arena.target_count(),
            self.scope
        );
        self.arena = arena;
        self.catalog = catalog;
        self.tree = tree;
        self.select(&key).await
    }

    async fn load_catalog(&self, arena: &PlanArena) -> Result<CatalogSnapshot, PortError> {
        let mut catalog = CatalogSnapshot::new();
        for variable in self.ports.variables.list(&self.scope).await? {
            catalog.insert(variable);
        }

        let referenced: HashSet<(VariableId, InstanceId)> = (0..arena.target_count())
            .filter_map(|index| arena.target_at(index).ok())
            .map(|idx| {
                let target = arena.target(idx);
                (arena.plan(target.plan).variable.clone(), target.instance)
            })
            .collect();

        let categories = &self.ports.categories;
        let scope = &self.scope;
        let resolved = try_join_all(referenced.into_iter().map(|(variable, instance)| async move {
            match categories.resolve(instance, &variable, scope).await {
                Ok(info) => Ok(Some((variable, instance, info))),
                Err(PortError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        }))
        .await?;

        for (variable, instance, info) in resolved.into_iter().flatten() {
            let mut patched = Instance::new(instance.0, info.display_name);
            patched.enabled = info.enabled;
            catalog.patch_instance(&variable, patched);
        }
        Ok(catalog)
    }

    /// Start selecting a node
    ///
    /// Unsaved edits of the previous selection are discarded.
    ///
    /// # Errors
    /// Unknown node or a baseline variable missing from the catalog
    pub fn begin_select(&mut self, key: &NodeKey) -> Result<LoadRequest, QuotaError> {
        let node = require(&self.tree, key)?;
        let request = self
            .editor
            .begin_load(&self.arena, &self.catalog, &self.scope, node)?;
        self.feasibility = None;
        Ok(request)
    }

    /// Apply the result of a [`LoadRequest::fetch`]
    ///
    /// A result for a superseded selection is discarded as `Stale`.
    ///
    /// # Errors
    /// The fetch failure; the loading flag is reset either way
    pub fn finish_select(
        &mut self,
        fetched: Result<LoadedNode, PortError>,
    ) -> Result<LoadOutcome, QuotaError> {
        match fetched {
            Ok(loaded) => Ok(self.editor.complete_load(loaded)),
            Err(e) => {
                self.editor.clear_loading();
                Err(boundary("loading sample sizes", e))
            }
        }
    }

    /// Select a node and load its working set
    ///
    /// # Errors
    /// See [`Self::begin_select`] and [`Self::finish_select`]
    pub async fn select(&mut self, key: &NodeKey) -> Result<LoadOutcome, QuotaError> {
        let request = self.begin_select(key)?;
        let samples = self.ports.samples.clone();
        let fetched = request.fetch(samples.as_ref()).await;
        self.finish_select(fetched)
    }

    /// Add dimensions for catalog variables at the selected node
    ///
    /// # Errors
    /// Validation failures leave the working set unchanged
    pub async fn add_dimensions(&mut self, variables: &[VariableId]) -> Result<(), QuotaError> {
        let node = self.selected().ok_or(QuotaError::NoSelection)?;
        let nesting_blocked = has_doubly_nested_chain(node);
        let available: HashSet<&VariableId> = self
            .editor
            .available_variables(&self.catalog, &self.arena, node)
            .into_iter()
            .map(|v| &v.identifier)
            .collect();

        let mut resolved = Vec::with_capacity(variables.len());
        for id in variables {
            let variable = self.catalog.require(id)?;
            if !available.contains(id) {
                return Err(ValidationError::DuplicateDimension {
                    variable: id.clone(),
                }
                .into());
            }
            resolved.push(variable.clone());
        }

        let samples = self.ports.samples.as_ref();
        let scope = &self.scope;
        let chain = self.editor.chain();
        let dimensions = try_join_all(resolved.into_iter().map(|variable| async move {
            let sizes = samples
                .sample_sizes(scope, chain, &variable.identifier)
                .await?;
            Ok::<_, PortError>(Dimension::from_samples(variable, &sizes, None))
        }))
        .await
        .map_err(|e| boundary("loading sample sizes", e))?;

        self.editor.add_dimensions(dimensions, nesting_blocked)?;
        self.feasibility = None;
        Ok(())
    }

    /// Remove a dimension from the working set
    ///
    /// # Errors
    /// `UnknownDimension`
    pub fn remove_dimension(&mut self, variable: &VariableId) -> Result<(), QuotaError> {
        self.editor.remove_dimension(variable)?;
        self.feasibility = None;
        Ok(())
    }

    /// Set a percentage target (0..=100)
    ///
    /// # Errors
    /// See [`DimensionEditor::set_percentage`]
    pub fn set_percentage(
        &mut self,
        variable: &VariableId,
        instance: InstanceId,
        value: Option<f64>,
    ) -> Result<(), QuotaError> {
        self.editor.set_percentage(variable, instance, value)?;
        self.feasibility = None;
        Ok(())
    }

    /// Set a population target
    ///
    /// # Errors
    /// See [`DimensionEditor::set_population`]
    pub fn set_population(
        &mut self,
        variable: &VariableId,
        instance: InstanceId,
        value: Option<u64>,
    ) -> Result<(), QuotaError> {
        self.editor.set_population(variable, instance, value)?;
        self.feasibility = None;
        Ok(())
    }

    /// Trial-run the working set with the solver
    ///
    /// # Errors
    /// Invalid schemes are rejected before the solver is called
    pub async fn check_feasibility(&mut self) -> Result<FeasibilityReport, QuotaError> {
        self.editor
            .validation()
            .validate_scheme(self.editor.dimensions())?;
        let report = self
            .editor
            .validation()
            .feasibility(
                self.ports.solver.as_ref(),
                &self.scope,
                self.editor.dimensions(),
                self.editor.chain(),
            )
            .await
            .map_err(|e| boundary("validating scheme", e))?;
        self.feasibility = Some(report);
        Ok(report)
    }

    /// Save the working set of the selected node
    ///
    /// Without `confirmed`, poor solver diagnostics stop the save and are
    /// returned for the caller to confirm. An empty working set deletes the
    /// structure at the node and selects its parent. On success the node to
    /// show is recorded in `slot` and the session reloads onto it.
    ///
    /// # Errors
    /// `NoChanges` without edits; validation, reconciliation or store
    /// failures. Nothing is written unless the store call itself was attempted
    pub async fn save(&mut self, confirmed: bool, slot: &MarkerSlot) -> Result<SaveOutcome, QuotaError> {
        let (key, label, entity) = self
            .selected()
            .map(|n| (n.key.clone(), n.label.clone(), n.entity))
            .ok_or(QuotaError::NoSelection)?;
        if !self.editor.is_dirty() {
            return Err(ValidationError::NoChanges.into());
        }
        let deleting = self.editor.is_empty();
        if !deleting {
            self.editor
                .validation()
                .validate_scheme(self.editor.dimensions())?;
        }

        if !confirmed && !deleting && !self.editor.is_placeholder() {
            let report = match self.feasibility {
                Some(report) => report,
                None => self.check_feasibility().await?,
            };
            if self.editor.validation().needs_confirmation(&report) {
                tracing::info!("Save of {} needs confirmation", key);
                return Ok(SaveOutcome::NeedsConfirmation(report));
            }
        }

        let reconciliation = self
            .reconciler
            .reconcile(&self.arena, &entity, self.editor.dimensions())?;
        let operation = reconciliation.operation.name();
        tracing::info!("Saving {} via {}", key, operation);

        if let Err(e) = reconciliation
            .operation
            .apply(self.ports.store.as_ref())
            .await
        {
            tracing::error!("Save of {} failed: {}", key, e);
            return Err(e.into());
        }

        let marker = if deleting {
            self.tree
                .parent_of(&key)
                .map(|p| SavedNodeMarker::new(p.key.clone(), p.label.clone()))
        } else {
            Some(SavedNodeMarker::new(key, label))
        };
        if let Some(marker) = marker {
            slot.record(marker);
        }
        self.reload(slot.take(), None).await?;
        let selected = self
            .editor
            .current_node()
            .cloned()
            .unwrap_or_else(NodeKey::root);
        Ok(SaveOutcome::Saved {
            operation,
            summary: reconciliation.summary,
            selected,
        })
    }

    /// Delete the structure at the selected node
    ///
    /// # Errors
    /// `MissingIdentity` for unsaved nodes, or the store failure
    pub async fn delete_selected(&mut self, slot: &MarkerSlot) -> Result<SaveOperation, QuotaError> {
        let node = self.selected().ok_or(QuotaError::NoSelection)?;
        let operation = self.reconciler.deletion(&self.arena, &node.entity)?;
        let parent = self
            .tree
            .parent_of(&node.key)
            .map(|p| SavedNodeMarker::new(p.key.clone(), p.label.clone()));
        tracing::info!("Deleting {} via {}", node.key, operation.name());

        if let Err(e) = operation.clone().apply(self.ports.store.as_ref()).await {
            tracing::error!("Delete failed: {}", e);
            return Err(e.into());
        }
        if let Some(marker) = parent {
            slot.record(marker);
        }
        self.reload(slot.take(), None).await?;
        Ok(operation)
    }

    /// Copy the plans below the selected target to sibling categories
    ///
    /// # Errors
    /// The selection must be a persisted target and every instance one of
    /// its siblings
    pub async fn copy_to_siblings(
        &mut self,
        flatten_to_rim: bool,
        instances: Vec<InstanceId>,
    ) -> Result<(), QuotaError> {
        let node = self.selected().ok_or(QuotaError::NoSelection)?;
        let NodeEntity::Target(idx) = node.entity else {
            return Err(ReconcileError::MissingIdentity(format!("node {}", node.key)).into());
        };
        let target = self.arena.target(idx);
        let target_id = target
            .id
            .ok_or_else(|| ReconcileError::MissingIdentity(format!("node {}", node.key)))?;
        let variable = &self.arena.plan(target.plan).variable;
        let categories = self.catalog.require(variable)?;
        if let Some(bad) = instances
            .iter()
            .find(|i| **i == target.instance || !categories.is_valid_instance(**i))
        {
            return Err(ValidationError::UnknownInstance {
                variable: variable.clone(),
                instance: *bad,
            }
            .into());
        }
        let marker = SavedNodeMarker::new(node.key.clone(), node.label.clone());

        tracing::info!(
            "Copying below target {} to {} sibling(s)",
            target_id,
            instances.len()
        );
        self.ports
            .store
            .copy_to_siblings(&self.scope, target_id, flatten_to_rim, instances)
            .await
            .map_err(|e| boundary("copying to siblings", e))?;
        self.reload(Some(marker), None).await?;
        Ok(())
    }

    /// Flag or unflag a persisted plan as weighting-group root
    ///
    /// # Errors
    /// Unknown plan id or the store failure
    pub async fn set_weighting_group_root(&mut self, plan_id: PlanId, value: bool) -> Result<(), QuotaError> {
        let idx = self.arena.find_plan(plan_id).ok_or_else(|| {
            QuotaError::Port(PortError::NotFound(format!("plan {plan_id}")))
        })?;
        let mut plan = self.arena.materialize_plan(idx);
        plan.is_weighting_group_root = value;
        let marker = self
            .selected()
            .map(|n| SavedNodeMarker::new(n.key.clone(), n.label.clone()));

        self.ports
            .store
            .update_plan(plan_id, plan)
            .await
            .map_err(|e| boundary("updating plan", e))?;
        self.reload(marker, None).await?;
        Ok(())
    }
}

fn boundary(context: &str, error: PortError) -> QuotaError {
    tracing::warn!("{} failed: {}", context, error);
    QuotaError::Port(error)
}
