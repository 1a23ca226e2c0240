//! Navigation helpers over a projected tree
//!
//! Breadcrumbs, initial selection after a reload, and the structural
//! predicates the editor needs (RIM leaves, RIM categories, nesting depth).

use crate::catalog::CatalogSnapshot;
use crate::node::{Node, NodeEntity, NodeKey};
use crate::projector::{ancestry_chain, NOT_FOUND_LABEL};
use quota_model::{InstanceId, PlanArena, TargetId};
use serde::{Deserialize, Serialize};

/// Node explicitly requested by the caller (e.g. from a link)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedNode {
    /// A persisted target
    Target(TargetId),
    /// The top-level target for a wave category
    WaveInstance(InstanceId),
}

/// Human-readable path of a node, e.g. `Jan/North` or `North/Age`
///
/// Targets list the category names of their ancestry. Plans append their own
/// variable label. The synthetic root is described by its label.
#[must_use]
pub fn describe(arena: &PlanArena, catalog: &CatalogSnapshot, node: &Node) -> String {
    let chain = ancestry_chain(arena, &node.entity);
    let mut parts: Vec<String> = chain
        .filters()
        .iter()
        .map(|f| {
            catalog
                .instance(&f.variable, f.instance)
                .map_or_else(|| NOT_FOUND_LABEL.to_string(), |i| i.name.clone())
        })
        .collect();

    match node.entity {
        NodeEntity::Root => return node.label.clone(),
        NodeEntity::Plan(p) => {
            parts.push(catalog.variable_label(&arena.plan(p).variable).to_string());
        }
        NodeEntity::Target(_) | NodeEntity::Unweighted { .. } => {}
    }
    parts.join("/")
}

/// Pick the node to select after (re)loading
///
/// Order: the saved marker node, then an explicitly requested node, then the
/// first node with children, then the root itself.
#[must_use]
pub fn default_selection<'t>(
    root: &'t Node,
    arena: &PlanArena,
    marker: Option<&NodeKey>,
    requested: Option<RequestedNode>,
) -> &'t Node {
    if let Some(found) = marker.and_then(|key| root.find(key)) {
        return found;
    }
    if let Some(found) = requested.and_then(|r| find_requested(root, arena, r)) {
        return found;
    }
    root.flatten()
        .into_iter()
        .find(|n| n.has_children())
        .unwrap_or(root)
}

fn find_requested<'t>(root: &'t Node, arena: &PlanArena, requested: RequestedNode) -> Option<&'t Node> {
    match requested {
        RequestedNode::Target(id) => root.find(&NodeKey::from(format!("target-{id}").as_str())),
        RequestedNode::WaveInstance(instance) => root.flatten().into_iter().find(|n| {
            n.target_idx().is_some_and(|t| {
                let target = arena.target(t);
                target.instance == instance && arena.plan(target.plan).parent.is_none()
            })
        }),
    }
}

/// Whether a node is the leaf level of a RIM scheme
///
/// Target-like nodes always are. Plans are when they own no nested plans.
#[must_use]
pub fn is_rim_leaf(arena: &PlanArena, node: &Node) -> bool {
    match node.entity {
        NodeEntity::Root => false,
        NodeEntity::Plan(p) => !arena.plan_has_nested(p),
        NodeEntity::Target(_) | NodeEntity::Unweighted { .. } => true,
    }
}

/// Whether a childless target is one category of a multi-dimension scheme
///
/// Its plan node's parent must hold more than one child.
#[must_use]
pub fn is_rim_category(root: &Node, node: &Node) -> bool {
    if !node.entity.is_target_like() || node.has_children() {
        return false;
    }
    root.parent_of(&node.key)
        .and_then(|plan| root.parent_of(&plan.key))
        .is_some_and(|grand| grand.children.len() > 1)
}

/// Whether a doubly-nested chain already hangs below a target or the root
///
/// True when some child has a child that itself has children. Only target
/// nodes and the synthetic root can hold such a chain for this purpose.
#[must_use]
pub fn has_doubly_nested_chain(node: &Node) -> bool {
    let eligible = node.is_synthetic() || node.entity.is_target_like();
    eligible
        && node
            .children
            .iter()
            .any(|n| n.children.iter().any(Node::has_children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::project;
    use quota_model::{Instance, Variable, WeightingPlan, WeightingRoot, WeightingTarget};

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new()
            .with_variable(Variable::new(
                "Wave",
                vec![Instance::new(10, "Jan"), Instance::new(11, "Feb")],
            ))
            .with_variable(Variable::new(
                "Region",
                vec![Instance::new(1, "North"), Instance::new(2, "South")],
            ))
            .with_variable(Variable::new(
                "Age",
                vec![Instance::new(5, "Young"), Instance::new(6, "Old")],
            ))
            .with_variable(Variable::new(
                "Gender",
                vec![Instance::new(7, "F"), Instance::new(8, "M")],
            ))
    }

    fn halves(variable: &str, a: i64, b: i64, id: u64) -> WeightingPlan {
        WeightingPlan::new(variable).with_id(id).with_targets(vec![
            WeightingTarget::percentage(InstanceId(a), 0.5).with_id(id * 10),
            WeightingTarget::percentage(InstanceId(b), 0.5).with_id(id * 10 + 1),
        ])
    }

    /// Wave(1): Jan(100) → [Region(2): North(20) → Age(3)], Gender(4)
    fn fixture() -> (PlanArena, Node) {
        let mut region = halves("Region", 1, 2, 2);
        region.targets[0].child_plans.push(halves("Age", 5, 6, 3));
        let wave = WeightingPlan::new("Wave").with_id(1).with_targets(vec![
            WeightingTarget::new(InstanceId(10))
                .with_id(100)
                .with_child_plans(vec![region, halves("Gender", 7, 8, 4)]),
        ]);
        let arena = PlanArena::from_root(&WeightingRoot::new("UK").with_plans(vec![wave]));
        let tree = project(&arena, &catalog(), "UK");
        (arena, tree)
    }

    #[test]
    fn breadcrumbs() {
        let (arena, tree) = fixture();
        let cat = catalog();
        let north = tree.find(&NodeKey::from("target-20")).unwrap();
        assert_eq!(describe(&arena, &cat, north), "Jan/North");

        let age = tree.find(&NodeKey::from("plan-3")).unwrap();
        assert_eq!(describe(&arena, &cat, age), "Jan/North/Age");

        let feb = tree.find(&NodeKey::from("unweighted-plan-1-11")).unwrap();
        assert_eq!(describe(&arena, &cat, feb), "Feb");

        assert_eq!(describe(&arena, &cat, &tree), "UK");
    }

    #[test]
    fn selection_prefers_marker_then_request() {
        let (arena, tree) = fixture();
        let marker = NodeKey::from("plan-3");
        let chosen = default_selection(&tree, &arena, Some(&marker), Some(RequestedNode::Target(TargetId(20))));
        assert_eq!(chosen.key.as_str(), "plan-3");

        let gone = NodeKey::from("plan-999");
        let chosen = default_selection(&tree, &arena, Some(&gone), Some(RequestedNode::Target(TargetId(20))));
        assert_eq!(chosen.key.as_str(), "target-20");

        let chosen = default_selection(&tree, &arena, None, Some(RequestedNode::WaveInstance(InstanceId(10))));
        assert_eq!(chosen.key.as_str(), "target-100");

        // nested North is not a top-level wave target
        let chosen = default_selection(&tree, &arena, None, Some(RequestedNode::WaveInstance(InstanceId(1))));
        assert!(chosen.is_synthetic());
    }

    #[test]
    fn selection_falls_back_to_root() {
        let arena = PlanArena::from_root(&WeightingRoot::new("UK"));
        let tree = project(&arena, &catalog(), "UK");
        assert!(default_selection(&tree, &arena, None, None).is_synthetic());
    }

    #[test]
    fn rim_predicates() {
        let (arena, tree) = fixture();
        let jan = tree.find(&NodeKey::from("target-100")).unwrap();
        let north = tree.find(&NodeKey::from("target-20")).unwrap();
        let young = tree.find(&NodeKey::from("target-30")).unwrap();
        let female = tree.find(&NodeKey::from("target-40")).unwrap();
        let region = tree.find(&NodeKey::from("plan-2")).unwrap();

        // Jan → Region → North → Age
        assert!(has_doubly_nested_chain(jan));
        assert!(!has_doubly_nested_chain(north));
        assert!(has_doubly_nested_chain(&tree));
        assert!(!has_doubly_nested_chain(region));

        assert!(is_rim_leaf(&arena, young));
        assert!(!is_rim_leaf(&arena, region));
        assert!(!is_rim_leaf(&arena, &tree));

        // Gender sits beside Region under Jan
        assert!(is_rim_category(&tree, female));
        // Young's plan (Age) is alone under North
        assert!(!is_rim_category(&tree, young));
        assert!(!is_rim_category(&tree, north));
    }
}
