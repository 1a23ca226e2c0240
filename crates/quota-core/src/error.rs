//! Error types for Quota Core
//!
//! Provides error handling for:
//! - Dimension and scheme validation (never reaches the store)
//! - Reconciliation of edits into a single store operation
//! - Failures reported by external collaborators

use quota_model::{InstanceId, ModelError, VariableId};
use quota_tree::TreeError;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Malformed plan shapes
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Tree lookup failed
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Edit or scheme rejected
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Edits cannot be mapped to a store operation
    #[error("reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Collaborator call failed
    #[error("collaborator failed: {0}")]
    Port(#[from] PortError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation needs a selected node
    #[error("no node is selected")]
    NoSelection,
}

impl QuotaError {
    /// Check if error is a rejected edit
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if error came from a collaborator
    #[inline]
    #[must_use]
    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::Port(_))
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Port(e) if e.is_retryable())
    }
}

/// Rejected edits and invalid schemes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Percentages of one dimension do not add up to 100
    #[error("percentages for '{variable}' sum to {sum}, expected 100")]
    PercentagesDoNotSum { variable: VariableId, sum: f64 },

    /// Too many quota cells
    #[error("{cells} quota cells would reach the limit of {limit}")]
    TooManyQuotaCells { cells: u64, limit: u64 },

    /// Multiple dimensions where RIM weighting is already nested below
    #[error("cannot add multiple questions here as RIM weighting already applies further down the tree")]
    IneligibleNesting,

    /// Scheme cannot be saved
    #[error("invalid scheme: {0}")]
    InvalidScheme(String),

    /// Variable already in the working set
    #[error("'{variable}' is already a dimension")]
    DuplicateDimension { variable: VariableId },

    /// Variable not in the working set
    #[error("'{variable}' is not a dimension")]
    UnknownDimension { variable: VariableId },

    /// Category not in the dimension
    #[error("instance {instance} is not a category of '{variable}'")]
    UnknownInstance {
        variable: VariableId,
        instance: InstanceId,
    },

    /// Save requested without edits
    #[error("no unsaved changes")]
    NoChanges,

    /// Negative target value
    #[error("target {value} for instance {instance} is negative")]
    NegativeValue { instance: InstanceId, value: f64 },
}

/// Edits that do not map to exactly one store operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Shape of the edit does not identify a single entity to write
    #[error("ambiguous update target: {0}")]
    AmbiguousUpdateTarget(String),

    /// Entity that must already be persisted has no identity
    #[error("{0} has no persisted identity")]
    MissingIdentity(String),
}

/// Failures reported by external collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// Collaborator unreachable or timed out
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Request refused
    #[error("rejected: {0}")]
    Rejected(String),

    /// Input or response could not be interpreted
    #[error("malformed: {0}")]
    Malformed(String),
}

impl PortError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
