//! Quota Core - editing weighting plans
//!
//! Drives the edit cycle of a weighting configuration:
//! - [`DimensionEditor`] holds the working set of the selected node
//! - [`ValidationEngine`] checks percentages, quota cells and RIM nesting
//! - [`ReconciliationEngine`] maps a working set onto exactly one store write
//! - [`WaveDiscovery`] finds the waves of tracker variables
//! - [`WeightingSession`] ties them to the collaborator [`Ports`]
//!
//! # Example
//!
//! ```rust,ignore
//! use quota_core::{EditorConfig, MarkerSlot, Ports, WeightingSession};
//! use quota_model::{InstanceId, ScopeId, VariableId};
//!
//! # async fn example(ports: Ports) -> Result<(), quota_core::QuotaError> {
//! let mut session = WeightingSession::new(ScopeId::new("UK"), "UK", ports, EditorConfig::default());
//! session.reload(None, None).await?;
//!
//! let region = VariableId::new("Region");
//! session.add_dimensions(&[region.clone()]).await?;
//! for (instance, pct) in [(1, 30.0), (2, 30.0), (3, 20.0), (4, 20.0)] {
//!     session.set_percentage(&region, InstanceId(instance), Some(pct))?;
//! }
//! session.save(true, &MarkerSlot::new()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod dimension;
pub mod editor;
pub mod error;
pub mod inspect;
pub mod marker;
pub mod ports;
pub mod reconcile;
pub mod session;
pub mod validation;
pub mod waves;

pub use config::{EditorConfig, SolverThresholds};
pub use dimension::{CategoryTarget, Dimension};
pub use editor::{DimensionEditor, LoadOutcome, LoadRequest, LoadedNode, SelectionTicket};
pub use error::{PortError, QuotaError, ReconcileError, ValidationError};
pub use inspect::{inspect, InspectReport, Snapshot};
pub use marker::{MarkerSlot, SavedNodeMarker};
pub use ports::{
    CategoryCatalog, CategoryInfo, FeasibilityReport, Ports, RimSolver, SampleSizeProvider,
    VariableCatalog, VariableDefinition, WeightingPlanStore,
};
pub use reconcile::{
    baseline_plans, ReconcileSummary, Reconciliation, ReconciliationEngine, SaveOperation,
};
pub use session::{SaveOutcome, WeightingSession};
pub use validation::ValidationEngine;
pub use waves::{classify_waves, WaveDiscovery, WaveIssue, WaveIssueKind, WaveReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for editing weighting plans
    pub use crate::{
        Dimension, DimensionEditor, EditorConfig, MarkerSlot, Ports, QuotaError, SaveOutcome,
        ValidationEngine, WeightingSession,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
