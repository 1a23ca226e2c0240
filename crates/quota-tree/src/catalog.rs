//! Resolved variable catalog for one scope
//!
//! [`CatalogSnapshot`] holds the variables (with scope-specific category
//! names and enabled flags) needed to label nodes and to list placeholder
//! categories. Serialized as `{"variables": [...]}`.

use crate::error::TreeError;
use indexmap::IndexMap;
use quota_model::{Instance, InstanceId, Variable, VariableId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    variables: Vec<Variable>,
}

/// Variables keyed by identifier, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCatalog", into = "RawCatalog")]
pub struct CatalogSnapshot {
    variables: IndexMap<VariableId, Variable>,
}

impl From<RawCatalog> for CatalogSnapshot {
    fn from(raw: RawCatalog) -> Self {
        let mut catalog = Self::default();
        for variable in raw.variables {
            catalog.insert(variable);
        }
        catalog
    }
}

impl From<CatalogSnapshot> for RawCatalog {
    fn from(catalog: CatalogSnapshot) -> Self {
        Self {
            variables: catalog.variables.into_values().collect(),
        }
    }
}

impl CatalogSnapshot {
    /// Create empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With variable
    #[must_use]
    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.insert(variable);
        self
    }

    /// Insert or replace a variable
    pub fn insert(&mut self, variable: Variable) {
        self.variables.insert(variable.identifier.clone(), variable);
    }

    /// Look up a variable
    #[inline]
    #[must_use]
    pub fn variable(&self, id: &VariableId) -> Option<&Variable> {
        self.variables.get(id)
    }

    /// Look up a variable that must exist
    ///
    /// # Errors
    /// Returns `UnknownVariable` when absent
    pub fn require(&self, id: &VariableId) -> Result<&Variable, TreeError> {
        self.variable(id).ok_or_else(|| TreeError::UnknownVariable {
            variable: id.clone(),
        })
    }

    /// Overwrite one category of a known variable, appending it if missing
    ///
    /// Returns `false` when the variable is unknown.
    pub fn patch_instance(&mut self, variable: &VariableId, instance: Instance) -> bool {
        let Some(target) = self.variables.get_mut(variable) else {
            return false;
        };
        match target.instances.iter_mut().find(|i| i.id == instance.id) {
            Some(existing) => *existing = instance,
            None => target.instances.push(instance),
        }
        true
    }

    /// Resolve one category of a variable
    #[must_use]
    pub fn instance(&self, variable: &VariableId, instance: InstanceId) -> Option<&Instance> {
        self.variable(variable).and_then(|v| v.instance(instance))
    }

    /// Display label of a variable, falling back to its identifier
    #[must_use]
    pub fn variable_label<'a>(&'a self, id: &'a VariableId) -> &'a str {
        self.variable(id).map_or_else(|| id.as_str(), Variable::label)
    }

    /// Variables in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Number of variables
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// No variables known
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
