//! Saved-node marker
//!
//! A save records which node was edited so the next reload reselects it.
//! The slot is handed to `save` and `reload` explicitly and is read once.

use parking_lot::Mutex;
use quota_tree::NodeKey;
use serde::{Deserialize, Serialize};

/// Node edited by the last save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNodeMarker {
    pub node: NodeKey,
    /// Label at the time of the save
    pub name: String,
}

impl SavedNodeMarker {
    /// Create marker
    #[inline]
    #[must_use]
    pub fn new(node: NodeKey, name: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }
}

/// Holder for at most one pending marker
#[derive(Debug, Default)]
pub struct MarkerSlot {
    inner: Mutex<Option<SavedNodeMarker>>,
}

impl MarkerSlot {
    /// Empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a marker, replacing any unread one
    pub fn record(&self, marker: SavedNodeMarker) {
        tracing::debug!("Recording saved node {}", marker.node);
        *self.inner.lock() = Some(marker);
    }

    /// Read and clear
    pub fn take(&self) -> Option<SavedNodeMarker> {
        self.inner.lock().take()
    }

    /// Whether a marker is pending
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }
}
