//! Variables and their category instances

use crate::ids::{InstanceId, VariableId};
use serde::{Deserialize, Serialize};

/// How a variable's categories are defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Single-choice survey question
    #[default]
    SingleChoice,
    /// Categories are date ranges (tracker waves)
    DateRange,
    /// Categories are survey instances (tracker waves)
    SurveyId,
    /// Grouping built from other variables
    Composite,
    /// Explicit instance list
    InstanceList,
}

impl VariableKind {
    /// Whether categories of this kind are waves directly
    #[inline]
    #[must_use]
    pub fn is_wave(self) -> bool {
        matches!(self, Self::DateRange | Self::SurveyId)
    }

    /// Whether the variable can carry weighting targets
    #[inline]
    #[must_use]
    pub fn is_weightable(self) -> bool {
        !matches!(self, Self::Composite)
    }
}

/// One category of a variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Category id
    pub id: InstanceId,
    /// Display name for the scope
    pub name: String,
    /// Disabled categories are hidden from editing
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl Instance {
    /// Create enabled instance
    #[inline]
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: InstanceId(id),
            name: name.into(),
            enabled: true,
        }
    }

    /// Mark as disabled
    #[inline]
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A survey question that can be weighted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Identifier used by plans
    pub identifier: VariableId,
    /// Human-readable name (falls back to the identifier)
    #[serde(default)]
    pub display_name: Option<String>,
    /// Category definition kind
    #[serde(default)]
    pub kind: VariableKind,
    /// Ordered categories
    pub instances: Vec<Instance>,
}

impl Variable {
    /// Create single-choice variable
    #[must_use]
    pub fn new(identifier: impl Into<String>, instances: Vec<Instance>) -> Self {
        Self {
            identifier: VariableId::new(identifier),
            display_name: None,
            kind: VariableKind::SingleChoice,
            instances,
        }
    }

    /// With kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: VariableKind) -> Self {
        self.kind = kind;
        self
    }

    /// With display name
    #[inline]
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name shown to users
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.identifier.as_str())
    }

    /// Look up an instance by id
    #[inline]
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// Enabled instances in declaration order
    pub fn enabled_instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter().filter(|i| i.enabled)
    }

    /// Whether an instance id is a live (enabled) category
    #[inline]
    #[must_use]
    pub fn is_valid_instance(&self, id: InstanceId) -> bool {
        self.enabled_instances().any(|i| i.id == id)
    }

    /// Number of enabled categories
    #[inline]
    #[must_use]
    pub fn category_count(&self) -> usize {
        self.enabled_instances().count()
    }
}
