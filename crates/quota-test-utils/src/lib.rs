//! Testing utilities for the quota workspace
//!
//! In-memory fakes for every port plus variable and root fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use quota_core::{
    CategoryCatalog, CategoryInfo, EditorConfig, FeasibilityReport, PortError, Ports, RimSolver,
    SampleSizeProvider, VariableCatalog, VariableDefinition, WeightingPlanStore, WeightingSession,
};
use quota_model::{
    FilterInstanceChain, Instance, InstanceId, PlanId, ScopeId, TargetId, Variable, VariableId,
    VariableKind, WeightingPlan, WeightingRoot, WeightingTarget,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SCOPE: &str = "UK";

// Fixtures

pub fn region() -> Variable {
    Variable::new(
        "Region",
        vec![
            Instance::new(1, "North"),
            Instance::new(2, "South"),
            Instance::new(3, "East"),
            Instance::new(4, "West"),
        ],
    )
}

pub fn age() -> Variable {
    Variable::new(
        "Age",
        vec![
            Instance::new(11, "18-34"),
            Instance::new(12, "35-54"),
            Instance::new(13, "55+"),
        ],
    )
}

pub fn gender() -> Variable {
    Variable::new("Gender", vec![Instance::new(21, "Female"), Instance::new(22, "Male")])
}

pub fn month() -> Variable {
    Variable::new(
        "Month",
        vec![
            Instance::new(101, "Jan"),
            Instance::new(102, "Feb"),
            Instance::new(103, "Mar"),
        ],
    )
    .with_kind(VariableKind::DateRange)
}

/// Single-choice variable with `n` categories numbered from `first`
pub fn categorical(name: &str, n: usize, first: i64) -> Variable {
    let instances = (first..)
        .take(n)
        .map(|id| Instance::new(id, format!("{name} {id}")))
        .collect();
    Variable::new(name, instances)
}

/// Persisted Region plan at 25% each, ids 1 / 10..=13
pub fn region_plan() -> WeightingPlan {
    WeightingPlan::new("Region").with_id(1).with_targets(
        [(1, 10), (2, 11), (3, 12), (4, 13)]
            .into_iter()
            .map(|(instance, id)| WeightingTarget::percentage(InstanceId(instance), 0.25).with_id(id))
            .collect(),
    )
}

/// Month → Jan → [Region → North → Age, Gender]
///
/// Jan (target 201) carries Region and Gender; Region's North (target 10)
/// carries Age. Feb and Mar have no target rows.
pub fn nested_root() -> WeightingRoot {
    let age = WeightingPlan::new("Age").with_id(3).with_targets(vec![
        WeightingTarget::percentage(InstanceId(11), 0.3).with_id(31),
        WeightingTarget::percentage(InstanceId(12), 0.3).with_id(32),
        WeightingTarget::percentage(InstanceId(13), 0.4).with_id(33),
    ]);
    let mut region = region_plan().with_id(2);
    region.targets[0].child_plans = vec![age];
    let gender = WeightingPlan::new("Gender").with_id(4).with_targets(vec![
        WeightingTarget::percentage(InstanceId(21), 0.5).with_id(41),
        WeightingTarget::percentage(InstanceId(22), 0.5).with_id(42),
    ]);
    let month = WeightingPlan::new("Month").with_id(5).with_targets(vec![
        WeightingTarget::new(InstanceId(101))
            .with_id(201)
            .with_child_plans(vec![region, gender]),
    ]);
    WeightingRoot::new(SCOPE).with_plans(vec![month])
}

// Plan store

#[derive(Debug, Default)]
struct StoreState {
    roots: HashMap<ScopeId, WeightingRoot>,
    next_id: u64,
    calls: Vec<&'static str>,
    fail_next: Option<PortError>,
}

impl StoreState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn assign_plan(&mut self, plan: &mut WeightingPlan) {
        if plan.id.is_none() {
            plan.id = Some(PlanId(self.allocate()));
        }
        for target in &mut plan.targets {
            self.assign_target(target);
        }
    }

    fn assign_target(&mut self, target: &mut WeightingTarget) {
        if target.id.is_none() {
            target.id = Some(TargetId(self.allocate()));
        }
        for plan in &mut target.child_plans {
            self.assign_plan(plan);
        }
    }

    fn begin(&mut self, call: &'static str) -> Result<(), PortError> {
        self.calls.push(call);
        match self.fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn plan_mut(&mut self, id: PlanId) -> Result<&mut WeightingPlan, PortError> {
        self.roots
            .values_mut()
            .find_map(|root| find_plan_mut(&mut root.plans, id))
            .ok_or_else(|| PortError::NotFound(format!("plan {id}")))
    }
}

fn find_plan_mut(plans: &mut [WeightingPlan], id: PlanId) -> Option<&mut WeightingPlan> {
    for plan in plans.iter_mut() {
        if plan.id == Some(id) {
            return Some(plan);
        }
        for target in &mut plan.targets {
            if let Some(found) = find_plan_mut(&mut target.child_plans, id) {
                return Some(found);
            }
        }
    }
    None
}

fn remove_plan(plans: &mut Vec<WeightingPlan>, id: PlanId) -> bool {
    if let Some(pos) = plans.iter().position(|p| p.id == Some(id)) {
        plans.remove(pos);
        return true;
    }
    plans
        .iter_mut()
        .any(|p| p.targets.iter_mut().any(|t| remove_plan(&mut t.child_plans, id)))
}

fn strip_ids(plan: &mut WeightingPlan, flatten: bool) {
    plan.id = None;
    for target in &mut plan.targets {
        target.id = None;
        if flatten {
            target.child_plans.clear();
        }
        for child in &mut target.child_plans {
            strip_ids(child, flatten);
        }
    }
}

/// Store keeping roots in memory and logging every write
#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    state: Mutex<StoreState>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a root
    pub fn with_root(root: WeightingRoot) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            state.next_id = 1000;
            state.roots.insert(root.scope.clone(), root);
        }
        store
    }

    pub fn root(&self, scope: &str) -> Option<WeightingRoot> {
        self.state.lock().roots.get(&ScopeId::new(scope)).cloned()
    }

    /// Names of the calls made so far, reads excluded
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Fail the next write with `error`
    pub fn fail_next(&self, error: PortError) {
        self.state.lock().fail_next = Some(error);
    }
}

#[async_trait]
impl WeightingPlanStore for InMemoryPlanStore {
    async fn get_root(&self, scope: &ScopeId) -> Result<WeightingRoot, PortError> {
        self.state
            .lock()
            .roots
            .get(scope)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("root {scope}")))
    }

    async fn create_plans(&self, scope: &ScopeId, mut plans: Vec<WeightingPlan>) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.begin("create_plans")?;
        for plan in &mut plans {
            state.assign_plan(plan);
        }
        state
            .roots
            .insert(scope.clone(), WeightingRoot::new(scope.clone()).with_plans(plans));
        Ok(())
    }

    async fn update_plan(&self, plan_id: PlanId, mut plan: WeightingPlan) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.begin("update_plan")?;
        plan.id = Some(plan_id);
        state.assign_plan(&mut plan);
        *state.plan_mut(plan_id)? = plan;
        Ok(())
    }

    async fn delete_plan(&self, plan_id: PlanId) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.begin("delete_plan")?;
        let removed = state
            .roots
            .values_mut()
            .any(|root| remove_plan(&mut root.plans, plan_id));
        if removed {
            Ok(())
        } else {
            Err(PortError::NotFound(format!("plan {plan_id}")))
        }
    }

    async fn create_target(&self, plan_id: PlanId, mut target: WeightingTarget) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.begin("create_target")?;
        state.assign_target(&mut target);
        state.plan_mut(plan_id)?.targets.push(target);
        Ok(())
    }

    async fn update_target(
        &self,
        plan_id: PlanId,
        target_id: TargetId,
        mut target: WeightingTarget,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.begin("update_target")?;
        target.id = Some(target_id);
        state.assign_target(&mut target);
        let plan = state.plan_mut(plan_id)?;
        let slot = plan
            .targets
            .iter_mut()
            .find(|t| t.id == Some(target_id))
            .ok_or_else(|| PortError::NotFound(format!("target {target_id}")))?;
        *slot = target;
        Ok(())
    }

    async fn delete_target(&self, plan_id: PlanId, target_id: TargetId) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.begin("delete_target")?;
        let plan = state.plan_mut(plan_id)?;
        let before = plan.targets.len();
        plan.targets.retain(|t| t.id != Some(target_id));
        if plan.targets.len() == before {
            return Err(PortError::NotFound(format!("target {target_id}")));
        }
        Ok(())
    }

    async fn delete_root(&self, scope: &ScopeId) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.begin("delete_root")?;
        state.roots.remove(scope);
        Ok(())
    }

    async fn copy_to_siblings(
        &self,
        scope: &ScopeId,
        target_id: TargetId,
        flatten_to_rim: bool,
        instance_ids: Vec<InstanceId>,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.begin("copy_to_siblings")?;
        let root = state
            .roots
            .get(scope)
            .ok_or_else(|| PortError::NotFound(format!("root {scope}")))?;
        let owner = owning_plan(&root.plans, target_id)
            .ok_or_else(|| PortError::NotFound(format!("target {target_id}")))?;
        let source = owner
            .targets
            .iter()
            .find(|t| t.id == Some(target_id))
            .map(|t| t.child_plans.clone())
            .unwrap_or_default();
        let owner_id = owner
            .id
            .ok_or_else(|| PortError::Malformed("owning plan has no id".into()))?;
        let existing: Vec<InstanceId> = owner.targets.iter().map(|t| t.instance).collect();

        let mut copies = Vec::new();
        for instance in instance_ids {
            let mut plans = source.clone();
            for plan in &mut plans {
                strip_ids(plan, flatten_to_rim);
                state.assign_plan(plan);
            }
            let id = (!existing.contains(&instance)).then(|| TargetId(state.allocate()));
            copies.push((instance, plans, id));
        }

        let plan = state.plan_mut(owner_id)?;
        for (instance, plans, id) in copies {
            match plan.targets.iter_mut().find(|t| t.instance == instance) {
                Some(sibling) => sibling.child_plans = plans,
                None => {
                    let mut target = WeightingTarget::new(instance).with_child_plans(plans);
                    target.id = id;
                    plan.targets.push(target);
                }
            }
        }
        Ok(())
    }
}

fn owning_plan(plans: &[WeightingPlan], target_id: TargetId) -> Option<&WeightingPlan> {
    plans.iter().find_map(|plan| {
        if plan.targets.iter().any(|t| t.id == Some(target_id)) {
            return Some(plan);
        }
        plan.targets
            .iter()
            .find_map(|t| owning_plan(&t.child_plans, target_id))
    })
}

// Sample sizes

/// Fixed respondent counts per category
#[derive(Debug, Default)]
pub struct FixedSampleSizes {
    sizes: Mutex<HashMap<InstanceId, u64>>,
    total: u64,
    fail_next: Mutex<Option<PortError>>,
    calls: AtomicUsize,
}

impl FixedSampleSizes {
    /// `per_category` respondents in every category of `variables`
    pub fn uniform(variables: &[Variable], per_category: u64) -> Self {
        let sizes: HashMap<InstanceId, u64> = variables
            .iter()
            .flat_map(|v| v.instances.iter().map(move |i| (i.id, per_category)))
            .collect();
        Self {
            sizes: Mutex::new(sizes),
            total: 1000,
            ..Self::default()
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    pub fn set(&self, instance: InstanceId, size: u64) {
        self.sizes.lock().insert(instance, size);
    }

    /// Fail the next call with `error`
    pub fn fail_next(&self, error: PortError) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_next.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SampleSizeProvider for FixedSampleSizes {
    async fn sample_sizes(
        &self,
        _scope: &ScopeId,
        _chain: &FilterInstanceChain,
        _variable: &VariableId,
    ) -> Result<HashMap<InstanceId, u64>, PortError> {
        self.check()?;
        Ok(self.sizes.lock().clone())
    }

    async fn total_population(&self, _scope: &ScopeId, _chain: &FilterInstanceChain) -> Result<u64, PortError> {
        self.check()?;
        Ok(self.total)
    }
}

// Solver

/// Solver returning a preset report
#[derive(Debug)]
pub struct ScriptedSolver {
    report: Mutex<FeasibilityReport>,
    calls: AtomicUsize,
}

impl ScriptedSolver {
    /// Converging solver with healthy weights
    pub fn healthy() -> Self {
        Self::with_report(FeasibilityReport {
            converged: true,
            iterations: 4,
            efficiency_score: 0.95,
            min_weight: 0.8,
            max_weight: 1.3,
        })
    }

    /// Solver reporting weights far outside the thresholds
    pub fn poor() -> Self {
        Self::with_report(FeasibilityReport {
            converged: true,
            iterations: 40,
            efficiency_score: 0.4,
            min_weight: 0.05,
            max_weight: 9.0,
        })
    }

    pub fn with_report(report: FeasibilityReport) -> Self {
        Self {
            report: Mutex::new(report),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn report(&self) -> FeasibilityReport {
        *self.report.lock()
    }

    pub fn set_report(&self, report: FeasibilityReport) {
        *self.report.lock() = report;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RimSolver for ScriptedSolver {
    async fn validate_partial(
        &self,
        _scope: &ScopeId,
        _plans: &[WeightingPlan],
        _chain: &FilterInstanceChain,
    ) -> Result<FeasibilityReport, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.report.lock())
    }
}

// Catalogs

/// Catalog serving a fixed variable list
#[derive(Debug, Default)]
pub struct StaticCatalog {
    variables: Vec<Variable>,
    components: HashMap<VariableId, Vec<VariableId>>,
}

impl StaticCatalog {
    pub fn new(variables: Vec<Variable>) -> Self {
        Self {
            variables,
            components: HashMap::new(),
        }
    }

    pub fn with_components(mut self, variable: &str, components: &[&str]) -> Self {
        self.components.insert(
            VariableId::new(variable),
            components.iter().map(|c| VariableId::new(*c)).collect(),
        );
        self
    }

    fn find(&self, id: &VariableId) -> Result<&Variable, PortError> {
        self.variables
            .iter()
            .find(|v| v.identifier == *id)
            .ok_or_else(|| PortError::NotFound(format!("variable {id}")))
    }
}

#[async_trait]
impl VariableCatalog for StaticCatalog {
    async fn resolve(&self, variable: &VariableId) -> Result<VariableDefinition, PortError> {
        Ok(VariableDefinition {
            variable: self.find(variable)?.clone(),
            component_chain: self.components.get(variable).cloned().unwrap_or_default(),
        })
    }

    async fn list(&self, _scope: &ScopeId) -> Result<Vec<Variable>, PortError> {
        Ok(self.variables.clone())
    }

    async fn wave_groupings(&self, variable: &VariableId) -> Result<Vec<Instance>, PortError> {
        let found = self.find(variable)?;
        if found.kind.is_wave() {
            Ok(found.instances.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl CategoryCatalog for StaticCatalog {
    async fn resolve(
        &self,
        instance: InstanceId,
        variable: &VariableId,
        _scope: &ScopeId,
    ) -> Result<CategoryInfo, PortError> {
        let found = self
            .find(variable)?
            .instance(instance)
            .ok_or_else(|| PortError::NotFound(format!("instance {instance} of {variable}")))?;
        Ok(CategoryInfo {
            display_name: found.name.clone(),
            enabled: found.enabled,
        })
    }
}

// Harness

/// All fakes wired together for one scope
#[derive(Debug, Clone)]
pub struct Harness {
    pub store: Arc<InMemoryPlanStore>,
    pub samples: Arc<FixedSampleSizes>,
    pub solver: Arc<ScriptedSolver>,
    pub catalog: Arc<StaticCatalog>,
}

impl Harness {
    /// Empty store, 10 respondents per category, healthy solver
    pub fn new(variables: Vec<Variable>) -> Self {
        Self::with_store(variables, InMemoryPlanStore::new())
    }

    pub fn with_store(variables: Vec<Variable>, store: InMemoryPlanStore) -> Self {
        Self {
            store: Arc::new(store),
            samples: Arc::new(FixedSampleSizes::uniform(&variables, 10)),
            solver: Arc::new(ScriptedSolver::healthy()),
            catalog: Arc::new(StaticCatalog::new(variables)),
        }
    }

    pub fn ports(&self) -> Ports {
        Ports {
            store: self.store.clone(),
            samples: self.samples.clone(),
            solver: self.solver.clone(),
            variables: self.catalog.clone(),
            categories: self.catalog.clone(),
        }
    }

    pub fn session(&self) -> WeightingSession {
        self.session_with(EditorConfig::default())
    }

    pub fn session_with(&self, config: EditorConfig) -> WeightingSession {
        WeightingSession::new(ScopeId::new(SCOPE), SCOPE, self.ports(), config)
    }
}
