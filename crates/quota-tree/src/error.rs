//! Error types for tree projection and navigation

use crate::node::NodeKey;
use quota_model::VariableId;

/// Tree lookup failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// No node with that key in the current tree
    #[error("no node with key '{key}'")]
    UnknownNode { key: NodeKey },

    /// Variable missing from the catalog
    #[error("variable '{variable}' is not in the catalog")]
    UnknownVariable { variable: VariableId },
}
