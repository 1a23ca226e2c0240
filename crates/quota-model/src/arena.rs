//! Flat arena storage for the plan/target recursion
//!
//! The recursive root (plan → targets → plans → …) is flattened into two
//! indexed tables with explicit parent/child links. Nodes of the projected
//! tree and editor selections refer into the arena via [`EntityRef`].

use crate::chain::{FilterInstance, FilterInstanceChain};
use crate::error::ModelError;
use crate::ids::{InstanceId, PlanId, ScopeId, TargetId, VariableId};
use crate::plan::{TargetValue, WeightingPlan, WeightingRoot, WeightingTarget};
use std::collections::HashSet;
use std::fmt;

/// Index of a plan row in a [`PlanArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanIdx(usize);

impl PlanIdx {
    /// Raw table index
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PlanIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a target row in a [`PlanArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetIdx(usize);

impl TargetIdx {
    /// Raw table index
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TargetIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tagged reference to either table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// A plan row
    Plan(PlanIdx),
    /// A target row
    Target(TargetIdx),
}

/// Plan row
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRecord {
    pub id: Option<PlanId>,
    pub variable: VariableId,
    pub is_weighting_group_root: bool,
    /// Owning target, `None` for top-level plans
    pub parent: Option<TargetIdx>,
    pub targets: Vec<TargetIdx>,
}

/// Target row
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub id: Option<TargetId>,
    pub instance: InstanceId,
    pub value: TargetValue,
    /// Owning plan
    pub plan: PlanIdx,
    pub child_plans: Vec<PlanIdx>,
}

/// Immutable flattened snapshot of a [`WeightingRoot`]
#[derive(Debug, Clone, PartialEq)]
pub struct PlanArena {
    scope: ScopeId,
    plans: Vec<PlanRecord>,
    targets: Vec<TargetRecord>,
    roots: Vec<PlanIdx>,
}

impl PlanArena {
    /// Flatten a persisted root
    #[must_use]
    pub fn from_root(root: &WeightingRoot) -> Self {
        let mut arena = Self {
            scope: root.scope.clone(),
            plans: Vec::new(),
            targets: Vec::new(),
            roots: Vec::new(),
        };
        for plan in &root.plans {
            let idx = arena.push_plan(plan, None);
            arena.roots.push(idx);
        }
        arena
    }

    fn push_plan(&mut self, plan: &WeightingPlan, parent: Option<TargetIdx>) -> PlanIdx {
        let idx = PlanIdx(self.plans.len());
        self.plans.push(PlanRecord {
            id: plan.id,
            variable: plan.variable.clone(),
            is_weighting_group_root: plan.is_weighting_group_root,
            parent,
            targets: Vec::with_capacity(plan.targets.len()),
        });
        for target in &plan.targets {
            let t = self.push_target(target, idx);
            self.plans[idx.0].targets.push(t);
        }
        idx
    }

    fn push_target(&mut self, target: &WeightingTarget, plan: PlanIdx) -> TargetIdx {
        let idx = TargetIdx(self.targets.len());
        self.targets.push(TargetRecord {
            id: target.id,
            instance: target.instance,
            value: target.value,
            plan,
            child_plans: Vec::with_capacity(target.child_plans.len()),
        });
        for child in &target.child_plans {
            let p = self.push_plan(child, Some(idx));
            self.targets[idx.0].child_plans.push(p);
        }
        idx
    }

    /// Scope of the snapshot
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Top-level plans in order
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[PlanIdx] {
        &self.roots
    }

    /// Whether no plans exist
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of plan rows
    #[inline]
    #[must_use]
    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    /// Number of target rows
    #[inline]
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Plan row (indices only come from this arena)
    #[inline]
    #[must_use]
    pub fn plan(&self, idx: PlanIdx) -> &PlanRecord {
        &self.plans[idx.0]
    }

    /// Target row (indices only come from this arena)
    #[inline]
    #[must_use]
    pub fn target(&self, idx: TargetIdx) -> &TargetRecord {
        &self.targets[idx.0]
    }

    /// Checked plan lookup by raw index
    ///
    /// # Errors
    /// Returns `DanglingIndex` when out of range
    pub fn plan_at(&self, index: usize) -> Result<PlanIdx, ModelError> {
        if index < self.plans.len() {
            Ok(PlanIdx(index))
        } else {
            Err(ModelError::DanglingIndex { kind: "plan", index })
        }
    }

    /// Checked target lookup by raw index
    ///
    /// # Errors
    /// Returns `DanglingIndex` when out of range
    pub fn target_at(&self, index: usize) -> Result<TargetIdx, ModelError> {
        if index < self.targets.len() {
            Ok(TargetIdx(index))
        } else {
            Err(ModelError::DanglingIndex { kind: "target", index })
        }
    }

    /// Find a plan by persisted identity
    #[must_use]
    pub fn find_plan(&self, id: PlanId) -> Option<PlanIdx> {
        self.plans.iter().position(|p| p.id == Some(id)).map(PlanIdx)
    }

    /// Find a target by persisted identity
    #[must_use]
    pub fn find_target(&self, id: TargetId) -> Option<TargetIdx> {
        self.targets.iter().position(|t| t.id == Some(id)).map(TargetIdx)
    }

    /// Find a top-level plan by variable
    #[must_use]
    pub fn find_root_plan(&self, variable: &VariableId) -> Option<PlanIdx> {
        self.roots
            .iter()
            .copied()
            .find(|p| &self.plan(*p).variable == variable)
    }

    /// Target of `plan` for a category
    #[must_use]
    pub fn target_for(&self, plan: PlanIdx, instance: InstanceId) -> Option<TargetIdx> {
        self.plan(plan)
            .targets
            .iter()
            .copied()
            .find(|t| self.target(*t).instance == instance)
    }

    /// Whether a plan's own targets carry no values
    #[must_use]
    pub fn is_plan_pristine(&self, plan: PlanIdx) -> bool {
        self.plan(plan)
            .targets
            .iter()
            .all(|t| !self.target(*t).value.is_set())
    }

    /// Whether any target of the plan owns nested plans
    #[must_use]
    pub fn plan_has_nested(&self, plan: PlanIdx) -> bool {
        self.plan(plan)
            .targets
            .iter()
            .any(|t| !self.target(*t).child_plans.is_empty())
    }

    /// Plans directly below a target, or the top-level plans for `None`
    #[must_use]
    pub fn plans_below(&self, target: Option<TargetIdx>) -> &[PlanIdx] {
        match target {
            Some(t) => &self.target(t).child_plans,
            None => &self.roots,
        }
    }

    /// Ancestry filters for an entity, root first
    ///
    /// Every target on the way up contributes (owning plan variable, category).
    /// Plans contribute nothing themselves.
    #[must_use]
    pub fn ancestry_chain(&self, entity: EntityRef) -> FilterInstanceChain {
        let mut leaf_first = Vec::new();
        let mut cursor = match entity {
            EntityRef::Target(t) => Some(t),
            EntityRef::Plan(p) => self.plan(p).parent,
        };
        while let Some(t) = cursor {
            let target = self.target(t);
            let owner = self.plan(target.plan);
            leaf_first.push(FilterInstance::new(owner.variable.clone(), target.instance));
            cursor = owner.parent;
        }
        FilterInstanceChain::from_leaf_first(leaf_first)
    }

    /// Variables used on the branch through an entity
    ///
    /// Collects plan variables of every ancestor and every descendant.
    /// `None` stands for the synthetic root and yields every variable.
    #[must_use]
    pub fn branch_variables(&self, entity: Option<EntityRef>) -> HashSet<VariableId> {
        let mut out = HashSet::new();
        match entity {
            None => {
                for p in &self.roots {
                    self.collect_plan_variables(*p, &mut out);
                }
            }
            Some(EntityRef::Plan(p)) => {
                self.collect_plan_variables(p, &mut out);
                self.collect_ancestor_variables(self.plan(p).parent, &mut out);
            }
            Some(EntityRef::Target(t)) => {
                for p in &self.target(t).child_plans {
                    self.collect_plan_variables(*p, &mut out);
                }
                self.collect_ancestor_variables(Some(t), &mut out);
            }
        }
        out
    }

    fn collect_plan_variables(&self, plan: PlanIdx, out: &mut HashSet<VariableId>) {
        let record = self.plan(plan);
        out.insert(record.variable.clone());
        for t in &record.targets {
            for child in &self.target(*t).child_plans {
                self.collect_plan_variables(*child, out);
            }
        }
    }

    fn collect_ancestor_variables(&self, mut cursor: Option<TargetIdx>, out: &mut HashSet<VariableId>) {
        while let Some(t) = cursor {
            let owner = self.plan(self.target(t).plan);
            out.insert(owner.variable.clone());
            cursor = owner.parent;
        }
    }

    /// Rebuild the recursive form of one plan
    #[must_use]
    pub fn materialize_plan(&self, idx: PlanIdx) -> WeightingPlan {
        let record = self.plan(idx);
        WeightingPlan {
            id: record.id,
            variable: record.variable.clone(),
            is_weighting_group_root: record.is_weighting_group_root,
            targets: record
                .targets
                .iter()
                .map(|t| self.materialize_target(*t))
                .collect(),
        }
    }

    /// Rebuild the recursive form of one target
    #[must_use]
    pub fn materialize_target(&self, idx: TargetIdx) -> WeightingTarget {
        let record = self.target(idx);
        WeightingTarget {
            id: record.id,
            instance: record.instance,
            value: record.value,
            child_plans: record
                .child_plans
                .iter()
                .map(|p| self.materialize_plan(*p))
                .collect(),
        }
    }

    /// Rebuild the whole persisted root
    #[must_use]
    pub fn to_root(&self) -> WeightingRoot {
        WeightingRoot {
            scope: self.scope.clone(),
            plans: self.roots.iter().map(|p| self.materialize_plan(*p)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Wave(10, 11) → Region(1, 2) under wave 10 → Age(5) under North
    fn nested_root() -> WeightingRoot {
        let age = WeightingPlan::new("Age")
            .with_id(3)
            .with_targets(vec![WeightingTarget::percentage(InstanceId(5), 1.0).with_id(30)]);
        let region = WeightingPlan::new("Region").with_id(2).with_targets(vec![
            WeightingTarget::percentage(InstanceId(1), 0.5)
                .with_id(20)
                .with_child_plans(vec![age]),
            WeightingTarget::percentage(InstanceId(2), 0.5).with_id(21),
        ]);
        let wave = WeightingPlan::new("Wave").with_id(1).with_targets(vec![
            WeightingTarget::new(InstanceId(10))
                .with_id(10)
                .with_child_plans(vec![region]),
            WeightingTarget::new(InstanceId(11)).with_id(11),
        ]);
        WeightingRoot::new("UK").with_plans(vec![wave])
    }

    #[test]
    fn round_trips_through_arena() {
        let root = nested_root();
        let arena = PlanArena::from_root(&root);
        assert_eq!(arena.plan_count(), 3);
        assert_eq!(arena.target_count(), 5);
        assert_eq!(arena.to_root(), root);
    }

    #[test]
    fn ancestry_chain_is_root_first() {
        let arena = PlanArena::from_root(&nested_root());
        let north = arena.find_target(TargetId(20)).unwrap();
        let chain = arena.ancestry_chain(EntityRef::Target(north));
        let pairs: Vec<_> = chain
            .filters()
            .iter()
            .map(|f| (f.variable.as_str().to_string(), f.instance.0))
            .collect();
        assert_eq!(
            pairs,
            vec![("Wave".to_string(), 10), ("Region".to_string(), 1)]
        );
    }

    #[test]
    fn plan_chain_starts_at_its_parent_target() {
        let arena = PlanArena::from_root(&nested_root());
        let age = arena.find_plan(PlanId(3)).unwrap();
        let chain = arena.ancestry_chain(EntityRef::Plan(age));
        assert_eq!(chain.len(), 2);

        let wave = arena.find_plan(PlanId(1)).unwrap();
        assert!(arena.ancestry_chain(EntityRef::Plan(wave)).is_empty());
    }

    #[test]
    fn plans_below_target_or_root() {
        let arena = PlanArena::from_root(&nested_root());
        let wave10 = arena.find_target(TargetId(10)).unwrap();
        let wave11 = arena.find_target(TargetId(11)).unwrap();
        let region = arena.find_plan(PlanId(2)).unwrap();

        assert_eq!(arena.plans_below(Some(wave10)), &[region]);
        assert!(arena.plans_below(Some(wave11)).is_empty());
        assert_eq!(arena.plans_below(None).len(), 1);
        assert!(arena.plan_has_nested(region));
        assert!(!arena.is_plan_pristine(region));
    }

    #[test]
    fn branch_variables_cover_ancestors_and_descendants() {
        let arena = PlanArena::from_root(&nested_root());
        let north = arena.find_target(TargetId(20)).unwrap();
        let vars = arena.branch_variables(Some(EntityRef::Target(north)));
        let mut names: Vec<_> = vars.iter().map(|v| v.as_str().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["Age", "Region", "Wave"]);

        let south = arena.find_target(TargetId(21)).unwrap();
        let vars = arena.branch_variables(Some(EntityRef::Target(south)));
        assert!(!vars.contains(&VariableId::new("Age")));
    }

    #[test]
    fn checked_lookups_reject_out_of_range() {
        let arena = PlanArena::from_root(&nested_root());
        assert!(arena.plan_at(2).is_ok());
        assert!(matches!(
            arena.target_at(99),
            Err(ModelError::DanglingIndex { kind: "target", index: 99 })
        ));
    }

    fn arb_plan(depth: u32) -> BoxedStrategy<WeightingPlan> {
        let leaf = (1..4usize).prop_map(|n| {
            WeightingPlan::new("Leaf").with_targets(
                (0..n as i64).map(|i| WeightingTarget::new(InstanceId(i))).collect(),
            )
        });
        if depth == 0 {
            return leaf.boxed();
        }
        (
            1..4usize,
            proptest::collection::vec(proptest::option::of(arb_plan(depth - 1)), 1..4),
        )
            .prop_map(|(n, kids)| {
                let targets = (0..n)
                    .map(|i| {
                        let child = kids.get(i).cloned().flatten();
                        WeightingTarget::new(InstanceId(i as i64))
                            .with_child_plans(child.into_iter().collect())
                    })
                    .collect();
                WeightingPlan::new("Node").with_targets(targets)
            })
            .boxed()
    }

    proptest! {
        #[test]
        fn prop_arena_round_trip(plans in proptest::collection::vec(arb_plan(3), 0..3)) {
            let root = WeightingRoot::new("S").with_plans(plans);
            let arena = PlanArena::from_root(&root);
            prop_assert_eq!(arena.to_root(), root);
        }

        #[test]
        fn prop_chain_length_matches_target_depth(plans in proptest::collection::vec(arb_plan(3), 1..3)) {
            let root = WeightingRoot::new("S").with_plans(plans);
            let arena = PlanArena::from_root(&root);
            for i in 0..arena.target_count() {
                let t = arena.target_at(i).unwrap();
                let mut depth = 0;
                let mut cursor = Some(t);
                while let Some(c) = cursor {
                    depth += 1;
                    cursor = arena.plan(arena.target(c).plan).parent;
                }
                prop_assert_eq!(arena.ancestry_chain(EntityRef::Target(t)).len(), depth);
            }
        }
    }
}
