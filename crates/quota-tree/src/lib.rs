//! Quota Tree - navigable projection of weighting plans
//!
//! Turns an immutable [`quota_model::PlanArena`] snapshot into a node tree:
//! - [`TreeProjector`] builds the tree under a synthetic root
//! - [`Node`] lookups: `flatten`, `find`, `parent_of`
//! - [`ancestry_chain`] gives the filters scoping a node
//! - [`navigation`] covers breadcrumbs, initial selection and RIM predicates
//!
//! # Example
//!
//! ```rust
//! use quota_model::{Instance, InstanceId, PlanArena, Variable, WeightingPlan, WeightingRoot, WeightingTarget};
//! use quota_tree::{project, CatalogSnapshot};
//!
//! let catalog = CatalogSnapshot::new().with_variable(Variable::new(
//!     "Region",
//!     vec![Instance::new(1, "North"), Instance::new(2, "South")],
//! ));
//! let plan = WeightingPlan::new("Region")
//!     .with_targets(vec![WeightingTarget::percentage(InstanceId(1), 1.0)]);
//! let arena = PlanArena::from_root(&WeightingRoot::new("UK").with_plans(vec![plan]));
//!
//! let tree = project(&arena, &catalog, "UK");
//! assert_eq!(tree.children[0].children.len(), 2);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod catalog;
pub mod error;
pub mod navigation;
pub mod node;
pub mod projector;

pub use catalog::CatalogSnapshot;
pub use error::TreeError;
pub use navigation::{
    default_selection, describe, has_doubly_nested_chain, is_rim_category, is_rim_leaf,
    RequestedNode,
};
pub use node::{Node, NodeEntity, NodeKey};
pub use projector::{ancestry_chain, project, TreeProjector, NOT_FOUND_LABEL};

/// Find a node that must exist
///
/// # Errors
/// Returns `UnknownNode` when the key is not in the tree
pub fn require<'t>(root: &'t Node, key: &NodeKey) -> Result<&'t Node, TreeError> {
    root.find(key)
        .ok_or_else(|| TreeError::UnknownNode { key: key.clone() })
}

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the projected tree
    pub use crate::{
        ancestry_chain, project, CatalogSnapshot, Node, NodeEntity, NodeKey, RequestedNode,
        TreeProjector,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
