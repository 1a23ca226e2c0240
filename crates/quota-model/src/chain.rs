//! Filter-instance chains
//!
//! A [`FilterInstanceChain`] scopes sample-size and solver queries to the
//! respondents selected by every (variable, category) pair on the path from
//! the synthetic root down to a node.

use crate::ids::{InstanceId, VariableId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One (variable, category) filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterInstance {
    /// Variable owning the category
    pub variable: VariableId,
    /// Selected category
    pub instance: InstanceId,
}

impl FilterInstance {
    /// Create filter pair
    #[inline]
    #[must_use]
    pub fn new(variable: impl Into<VariableId>, instance: InstanceId) -> Self {
        Self {
            variable: variable.into(),
            instance,
        }
    }
}

/// Ordered filters, outermost first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterInstanceChain(Vec<FilterInstance>);

impl FilterInstanceChain {
    /// Empty chain (entire dataset)
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from pairs ordered root first
    #[inline]
    #[must_use]
    pub fn new(filters: Vec<FilterInstance>) -> Self {
        Self(filters)
    }

    /// Build from pairs collected leaf first
    #[inline]
    #[must_use]
    pub fn from_leaf_first(mut filters: Vec<FilterInstance>) -> Self {
        filters.reverse();
        Self(filters)
    }

    /// Filters, root first
    #[inline]
    #[must_use]
    pub fn filters(&self) -> &[FilterInstance] {
        &self.0
    }

    /// Number of filters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the chain selects the whole dataset
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a variable already filters this chain
    #[inline]
    #[must_use]
    pub fn contains_variable(&self, variable: &VariableId) -> bool {
        self.0.iter().any(|f| &f.variable == variable)
    }

    /// Extend with a deeper filter
    #[inline]
    #[must_use]
    pub fn child(&self, filter: FilterInstance) -> Self {
        let mut next = self.clone();
        next.0.push(filter);
        next
    }
}

impl fmt::Display for FilterInstanceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<all>");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|p| format!("{}={}", p.variable, p.instance))
            .collect();
        f.write_str(&parts.join(" / "))
    }
}
