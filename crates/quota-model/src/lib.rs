//! Quota Model - weighting plan and target entities
//!
//! The persisted configuration of a survey scope:
//! - [`WeightingRoot`] owns top-level [`WeightingPlan`]s
//! - each plan owns one [`WeightingTarget`] per category of its variable
//! - each target may own nested child plans
//!
//! [`PlanArena`] flattens that recursion into indexed tables so tree nodes
//! and editor selections can refer to entities without shared mutable state.
//!
//! # Example
//!
//! ```rust
//! use quota_model::{InstanceId, PlanArena, WeightingPlan, WeightingRoot, WeightingTarget};
//!
//! let region = WeightingPlan::new("Region").with_targets(vec![
//!     WeightingTarget::percentage(InstanceId(1), 0.5),
//!     WeightingTarget::percentage(InstanceId(2), 0.5),
//! ]);
//! let root = WeightingRoot::new("UK").with_plans(vec![region]);
//! let arena = PlanArena::from_root(&root);
//! assert_eq!(arena.target_count(), 2);
//! assert_eq!(arena.to_root(), root);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod arena;
pub mod chain;
pub mod error;
pub mod ids;
pub mod plan;
pub mod variable;

pub use arena::{EntityRef, PlanArena, PlanIdx, PlanRecord, TargetIdx, TargetRecord};
pub use chain::{FilterInstance, FilterInstanceChain};
pub use error::ModelError;
pub use ids::{InstanceId, PlanId, ScopeId, TargetId, VariableId};
pub use plan::{TargetValue, WeightingPlan, WeightingRoot, WeightingTarget, PERCENTAGE_SUM_TOLERANCE};
pub use variable::{Instance, Variable, VariableKind};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with weighting entities
    pub use crate::{
        EntityRef, FilterInstanceChain, InstanceId, PlanArena, PlanId, ScopeId, TargetId,
        TargetValue, Variable, VariableId, WeightingPlan, WeightingRoot, WeightingTarget,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
