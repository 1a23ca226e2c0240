//! Tree projection
//!
//! [`TreeProjector`] turns a [`PlanArena`] snapshot into the navigable node
//! tree. Projection is a pure function of the arena and the catalog:
//! - the synthetic root lists every top-level plan
//! - plan nodes list their targets plus placeholders for enabled categories
//!   without a target row, sorted by instance id
//! - a nested, pristine plan whose targets carry further plans is collapsed
//!   into its target nodes

use crate::catalog::CatalogSnapshot;
use crate::node::{Node, NodeEntity, NodeKey};
use quota_model::{
    EntityRef, FilterInstance, FilterInstanceChain, InstanceId, PlanArena, PlanIdx, TargetIdx,
};
use tracing::warn;

/// Label used for categories missing from the catalog
pub const NOT_FOUND_LABEL: &str = "not found";

/// Projects an arena into nodes
#[derive(Debug, Clone, Copy)]
pub struct TreeProjector<'a> {
    arena: &'a PlanArena,
    catalog: &'a CatalogSnapshot,
}

impl<'a> TreeProjector<'a> {
    /// Create projector over a snapshot
    #[inline]
    #[must_use]
    pub fn new(arena: &'a PlanArena, catalog: &'a CatalogSnapshot) -> Self {
        Self { arena, catalog }
    }

    /// Project the synthetic root and everything below it
    #[must_use]
    pub fn project(&self, scope_label: &str) -> Node {
        let children = self
            .arena
            .roots()
            .iter()
            .flat_map(|p| self.plan_nodes(*p))
            .collect();
        Node {
            key: NodeKey::root(),
            label: scope_label.to_string(),
            tooltip: scope_label.to_string(),
            entity: NodeEntity::Root,
            children,
        }
    }

    /// One plan as a node, or its targets when the plan collapses
    fn plan_nodes(&self, idx: PlanIdx) -> Vec<Node> {
        let plan = self.arena.plan(idx);
        let key = NodeKey::plan(self.arena, idx);

        let mut entries: Vec<(InstanceId, Node)> = plan
            .targets
            .iter()
            .map(|t| (self.arena.target(*t).instance, self.target_node(*t)))
            .collect();

        if let Some(variable) = self.catalog.variable(&plan.variable) {
            for instance in variable.enabled_instances() {
                if self.arena.target_for(idx, instance.id).is_none() {
                    entries.push((instance.id, self.unweighted_node(idx, &key, instance.id)));
                }
            }
        }
        entries.sort_by_key(|(instance, _)| *instance);
        let children: Vec<Node> = entries.into_iter().map(|(_, node)| node).collect();

        let nested = plan.parent.is_some();
        if nested && self.arena.is_plan_pristine(idx) && children.iter().any(Node::has_children) {
            return children;
        }

        let label = self.catalog.variable_label(&plan.variable).to_string();
        vec![Node {
            key,
            tooltip: format!("Question: {label}"),
            label,
            entity: NodeEntity::Plan(idx),
            children,
        }]
    }

    fn target_node(&self, idx: TargetIdx) -> Node {
        let target = self.arena.target(idx);
        let children = target
            .child_plans
            .iter()
            .flat_map(|p| self.plan_nodes(*p))
            .collect();
        let (label, tooltip) = self.category_text(target.plan, target.instance);
        Node {
            key: NodeKey::target(self.arena, idx),
            label,
            tooltip,
            entity: NodeEntity::Target(idx),
            children,
        }
    }

    fn unweighted_node(&self, plan: PlanIdx, plan_key: &NodeKey, instance: InstanceId) -> Node {
        let (label, tooltip) = self.category_text(plan, instance);
        Node {
            key: NodeKey::unweighted(plan_key, instance),
            label,
            tooltip,
            entity: NodeEntity::Unweighted { plan, instance },
            children: Vec::new(),
        }
    }

    fn category_text(&self, plan: PlanIdx, instance: InstanceId) -> (String, String) {
        let variable = &self.arena.plan(plan).variable;
        let question = self.catalog.variable_label(variable);
        match self.catalog.instance(variable, instance) {
            Some(resolved) => (
                resolved.name.clone(),
                format!("Question: \"{question}\" - Selection: \"{}\"", resolved.name),
            ),
            None => {
                warn!(
                    "Instance {} of '{}' not found in catalog",
                    instance, variable
                );
                (
                    NOT_FOUND_LABEL.to_string(),
                    format!("Question: \"{question}\" - "),
                )
            }
        }
    }
}

/// Project an arena into its synthetic root node
#[must_use]
pub fn project(arena: &PlanArena, catalog: &CatalogSnapshot, scope_label: &str) -> Node {
    TreeProjector::new(arena, catalog).project(scope_label)
}

/// Filters selecting the respondents a node applies to, root first
///
/// Placeholders contribute their own (variable, category) pair on top of the
/// owning plan's ancestry.
#[must_use]
pub fn ancestry_chain(arena: &PlanArena, entity: &NodeEntity) -> FilterInstanceChain {
    match entity {
        NodeEntity::Root => FilterInstanceChain::empty(),
        NodeEntity::Plan(p) => arena.ancestry_chain(EntityRef::Plan(*p)),
        NodeEntity::Target(t) => arena.ancestry_chain(EntityRef::Target(*t)),
        NodeEntity::Unweighted { plan, instance } => {
            let base = arena.ancestry_chain(EntityRef::Plan(*plan));
            base.child(FilterInstance::new(arena.plan(*plan).variable.clone(), *instance))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use quota_model::{Instance, PlanId, TargetId, Variable, WeightingPlan, WeightingRoot, WeightingTarget};

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new()
            .with_variable(Variable::new(
                "Wave",
                vec![Instance::new(10, "Jan"), Instance::new(11, "Feb")],
            ))
            .with_variable(Variable::new(
                "Region",
                vec![
                    Instance::new(1, "North"),
                    Instance::new(2, "South"),
                    Instance::new(3, "Islands").disabled(),
                ],
            ))
            .with_variable(Variable::new(
                "Age",
                vec![Instance::new(5, "Young"), Instance::new(6, "Old")],
            ))
    }

    fn keys(node: &Node) -> Vec<String> {
        node.children.iter().map(|c| c.key.to_string()).collect()
    }

    #[test]
    fn empty_arena_projects_bare_root() {
        let arena = PlanArena::from_root(&WeightingRoot::new("UK"));
        let tree = project(&arena, &catalog(), "UK adults");
        assert!(tree.is_synthetic());
        assert_eq!(tree.label, "UK adults");
        assert!(tree.children.is_empty());
    }

    #[test]
    fn placeholders_fill_missing_enabled_categories() {
        let region = WeightingPlan::new("Region")
            .with_id(1)
            .with_targets(vec![WeightingTarget::percentage(InstanceId(2), 1.0).with_id(20)]);
        let arena = PlanArena::from_root(&WeightingRoot::new("UK").with_plans(vec![region]));
        let tree = project(&arena, &catalog(), "UK");

        let plan = &tree.children[0];
        assert_eq!(plan.label, "Region");
        assert_eq!(plan.tooltip, "Question: Region");
        // North (1) placeholder sorts before South (2); disabled Islands is absent
        assert_eq!(keys(plan), vec!["unweighted-plan-1-1", "target-20"]);
        assert_eq!(plan.children[0].label, "North");
        assert_eq!(
            plan.children[1].tooltip,
            "Question: \"Region\" - Selection: \"South\""
        );
    }

    #[test]
    fn unresolved_instance_renders_not_found() {
        let region = WeightingPlan::new("Region")
            .with_id(1)
            .with_targets(vec![WeightingTarget::new(InstanceId(99)).with_id(90)]);
        let arena = PlanArena::from_root(&WeightingRoot::new("UK").with_plans(vec![region]));
        let tree = project(&arena, &catalog(), "UK");
        let target = tree.find(&NodeKey::from("target-90")).unwrap();
        assert_eq!(target.label, NOT_FOUND_LABEL);
    }

    /// Wave plan (pristine) → Jan → Region plan (pristine) → North → Age
    fn pristine_nested() -> WeightingRoot {
        let age = WeightingPlan::new("Age").with_id(3).with_targets(vec![
            WeightingTarget::percentage(InstanceId(5), 0.5).with_id(50),
            WeightingTarget::percentage(InstanceId(6), 0.5).with_id(51),
        ]);
        let region = WeightingPlan::new("Region").with_id(2).with_targets(vec![
            WeightingTarget::new(InstanceId(1)).with_id(10).with_child_plans(vec![age]),
            WeightingTarget::new(InstanceId(2)).with_id(11),
        ]);
        let wave = WeightingPlan::new("Wave").with_id(1).with_targets(vec![
            WeightingTarget::new(InstanceId(10))
                .with_id(100)
                .with_child_plans(vec![region]),
        ]);
        WeightingRoot::new("UK").with_plans(vec![wave])
    }

    #[test]
    fn nested_pristine_plan_collapses_into_targets() {
        let arena = PlanArena::from_root(&pristine_nested());
        let tree = project(&arena, &catalog(), "UK");

        // top-level wave plan never collapses
        let wave = &tree.children[0];
        assert_eq!(wave.key.as_str(), "plan-1");

        // Region plan under Jan collapsed: Jan lists North/South directly
        let jan = wave.find(&NodeKey::from("target-100")).unwrap();
        assert_eq!(keys(jan), vec!["target-10", "target-11"]);

        // Age has values, so it stays explicit below North
        let north = &jan.children[0];
        assert_eq!(keys(north), vec!["plan-3"]);
    }

    #[test]
    fn nested_plan_with_values_stays_explicit() {
        let mut root = pristine_nested();
        let region = &mut root.plans[0].targets[0].child_plans[0];
        region.targets[0].value = quota_model::TargetValue::Percentage(0.5);
        region.targets[1].value = quota_model::TargetValue::Percentage(0.5);

        let arena = PlanArena::from_root(&root);
        let tree = project(&arena, &catalog(), "UK");
        let jan = tree.find(&NodeKey::from("target-100")).unwrap();
        assert_eq!(keys(jan), vec!["plan-2"]);
    }

    #[test]
    fn pristine_leaf_plan_does_not_collapse() {
        let mut root = pristine_nested();
        root.plans[0].targets[0].child_plans[0].targets[0].child_plans.clear();

        let arena = PlanArena::from_root(&root);
        let tree = project(&arena, &catalog(), "UK");
        let jan = tree.find(&NodeKey::from("target-100")).unwrap();
        assert_eq!(keys(jan), vec!["plan-2"]);
    }

    #[test]
    fn chain_for_placeholder_includes_its_category() {
        let arena = PlanArena::from_root(&pristine_nested());
        let region = arena.find_plan(PlanId(2)).unwrap();
        let chain = ancestry_chain(
            &arena,
            &NodeEntity::Unweighted {
                plan: region,
                instance: InstanceId(2),
            },
        );
        assert_eq!(chain.to_string(), "Wave=10 / Region=2");

        let north = arena.find_target(TargetId(10)).unwrap();
        let chain = ancestry_chain(&arena, &NodeEntity::Target(north));
        assert_eq!(chain.to_string(), "Wave=10 / Region=1");
        assert!(ancestry_chain(&arena, &NodeEntity::Root).is_empty());
    }

    #[test]
    fn new_entities_get_index_keys() {
        let region = WeightingPlan::new("Region")
            .with_targets(vec![WeightingTarget::percentage(InstanceId(1), 1.0)]);
        let arena = PlanArena::from_root(&WeightingRoot::new("UK").with_plans(vec![region]));
        let tree = project(&arena, &catalog(), "UK");
        assert_eq!(tree.children[0].key.as_str(), "plan-new-0");
        assert!(tree.find(&NodeKey::from("target-new-0")).is_some());
    }

    proptest! {
        #[test]
        fn prop_plan_children_sorted_and_complete(
            ids in proptest::collection::btree_set(1i64..6, 0..5),
            reversed in any::<bool>(),
        ) {
            let mut targets: Vec<_> = ids
                .iter()
                .map(|i| WeightingTarget::new(InstanceId(*i)).with_id(u64::try_from(*i).unwrap()))
                .collect();
            if reversed {
                targets.reverse();
            }
            let variable = Variable::new(
                "Five",
                (1..6).map(|i| Instance::new(i, format!("c{i}"))).collect(),
            );
            let catalog = CatalogSnapshot::new().with_variable(variable);
            let plan = WeightingPlan::new("Five").with_id(1).with_targets(targets);
            let arena = PlanArena::from_root(&WeightingRoot::new("S").with_plans(vec![plan]));
            let tree = project(&arena, &catalog, "S");

            let children = &tree.children[0].children;
            prop_assert_eq!(children.len(), 5);
            let instances: Vec<i64> = children
                .iter()
                .map(|c| match c.entity {
                    NodeEntity::Target(t) => arena.target(t).instance.0,
                    NodeEntity::Unweighted { instance, .. } => instance.0,
                    _ => -1,
                })
                .collect();
            prop_assert_eq!(instances, vec![1, 2, 3, 4, 5]);
        }
    }
}
