//! Projected tree nodes
//!
//! A [`Node`] is a read-only view over one arena entity (or the synthetic
//! root, or a placeholder for a category without a target row). Nodes carry
//! stable string keys so selections survive a reload.

use quota_model::{InstanceId, PlanArena, PlanIdx, TargetIdx};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable node key
///
/// `root`, `plan-{id}`, `target-{id}`, `plan-new-{idx}`, `target-new-{idx}`
/// or `unweighted-{plan key}-{instance}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    /// Key of the synthetic root
    pub const ROOT: &'static str = "root";

    /// Synthetic root key
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Key for a plan row
    #[must_use]
    pub fn plan(arena: &PlanArena, idx: PlanIdx) -> Self {
        match arena.plan(idx).id {
            Some(id) => Self(format!("plan-{id}")),
            None => Self(format!("plan-new-{idx}")),
        }
    }

    /// Key for a target row
    #[must_use]
    pub fn target(arena: &PlanArena, idx: TargetIdx) -> Self {
        match arena.target(idx).id {
            Some(id) => Self(format!("target-{id}")),
            None => Self(format!("target-new-{idx}")),
        }
    }

    /// Key for a category without a target row
    #[must_use]
    pub fn unweighted(plan: &NodeKey, instance: InstanceId) -> Self {
        Self(format!("unweighted-{plan}-{instance}"))
    }

    /// Key text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the synthetic root key
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEntity {
    /// Synthetic root of the scope
    Root,
    /// Plan row
    Plan(PlanIdx),
    /// Target row
    Target(TargetIdx),
    /// Enabled category of `plan` with no target row
    Unweighted {
        /// Plan the category belongs to
        plan: PlanIdx,
        /// The category
        instance: InstanceId,
    },
}

impl NodeEntity {
    /// Target-like entity (row or placeholder)
    #[inline]
    #[must_use]
    pub fn is_target_like(&self) -> bool {
        matches!(self, Self::Target(_) | Self::Unweighted { .. })
    }
}

/// One node of the projected tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub key: NodeKey,
    pub label: String,
    pub tooltip: String,
    pub entity: NodeEntity,
    pub children: Vec<Node>,
}

impl Node {
    /// Synthetic root node
    #[inline]
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        matches!(self.entity, NodeEntity::Root)
    }

    /// Plan row behind this node
    #[inline]
    #[must_use]
    pub fn plan_idx(&self) -> Option<PlanIdx> {
        match self.entity {
            NodeEntity::Plan(p) => Some(p),
            _ => None,
        }
    }

    /// Target row behind this node
    #[inline]
    #[must_use]
    pub fn target_idx(&self) -> Option<TargetIdx> {
        match self.entity {
            NodeEntity::Target(t) => Some(t),
            _ => None,
        }
    }

    /// Whether the node has children
    #[inline]
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Depth-first pre-order walk starting at this node
    #[must_use]
    pub fn flatten(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Find a node in this subtree by key
    #[must_use]
    pub fn find(&self, key: &NodeKey) -> Option<&Node> {
        if &self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(key))
    }

    /// Node whose direct children include `key`
    #[must_use]
    pub fn parent_of(&self, key: &NodeKey) -> Option<&Node> {
        if self.children.iter().any(|c| &c.key == key) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.parent_of(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(key: &str) -> Node {
        Node {
            key: NodeKey::from(key),
            label: key.to_string(),
            tooltip: String::new(),
            entity: NodeEntity::Root,
            children: Vec::new(),
        }
    }

    fn sample() -> Node {
        let mut a = leaf("a");
        a.children = vec![leaf("a1"), leaf("a2")];
        let mut root = leaf("root");
        root.children = vec![a, leaf("b")];
        root
    }

    #[test]
    fn flatten_is_pre_order() {
        let tree = sample();
        let keys: Vec<_> = tree.flatten().iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["root", "a", "a1", "a2", "b"]);
    }

    #[test]
    fn parent_lookup() {
        let tree = sample();
        assert_eq!(tree.parent_of(&NodeKey::from("a2")).unwrap().key.as_str(), "a");
        assert_eq!(tree.parent_of(&NodeKey::from("b")).unwrap().key.as_str(), "root");
        assert!(tree.parent_of(&NodeKey::root()).is_none());
        assert!(tree.find(&NodeKey::from("zz")).is_none());
    }

    #[test]
    fn unweighted_key_embeds_plan_key() {
        let key = NodeKey::unweighted(&NodeKey::from("plan-4"), InstanceId(7));
        assert_eq!(key.as_str(), "unweighted-plan-4-7");
        assert!(NodeKey::root().is_root());
    }
}
