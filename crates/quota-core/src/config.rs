//! Editor configuration
//!
//! All limits and thresholds used while editing and validating a scheme.
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! max_quota_cells = 50000
//!
//! [thresholds]
//! min_efficiency = 0.6
//! ```

use crate::error::QuotaError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Solver results below/above these limits need explicit confirmation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverThresholds {
    /// Minimum acceptable efficiency score
    pub min_efficiency: f64,
    /// Minimum acceptable respondent weight
    pub min_weight: f64,
    /// Maximum acceptable respondent weight
    pub max_weight: f64,
}

impl Default for SolverThresholds {
    fn default() -> Self {
        Self {
            min_efficiency: 0.70,
            min_weight: 0.2,
            max_weight: 5.0,
        }
    }
}

/// Configuration for editing sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Quota-cell product at which adding dimensions is refused
    pub max_quota_cells: u64,
    /// Allowed distance of a percentage sum from 100
    pub percentage_tolerance: f64,
    /// Decimal places percentage sums are rounded to
    pub rounding_places: u32,
    /// Solver warning thresholds
    pub thresholds: SolverThresholds,
    /// Recursion limit for wave discovery
    pub max_wave_depth: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_quota_cells: 200_000,
            percentage_tolerance: 1e-5,
            rounding_places: 5,
            thresholds: SolverThresholds::default(),
            max_wave_depth: 8,
        }
    }
}

impl EditorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With quota-cell cap
    #[inline]
    #[must_use]
    pub fn with_max_quota_cells(mut self, max: u64) -> Self {
        self.max_quota_cells = max;
        self
    }

    /// With solver thresholds
    #[inline]
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: SolverThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// With wave recursion limit
    #[inline]
    #[must_use]
    pub fn with_max_wave_depth(mut self, depth: usize) -> Self {
        self.max_wave_depth = depth;
        self
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns `Config` when the text is not valid TOML for this struct
    pub fn from_toml_str(text: &str) -> Result<Self, QuotaError> {
        toml::from_str(text).map_err(|e| QuotaError::Config(e.to_string()))
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns `Config` when the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuotaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| QuotaError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded editor config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = EditorConfig::new();
        assert_eq!(config.max_quota_cells, 200_000);
        assert_eq!(config.rounding_places, 5);
        assert!((config.thresholds.min_efficiency - 0.70).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EditorConfig::from_toml_str(
            "max_quota_cells = 1000\n[thresholds]\nmax_weight = 8.0\n",
        )
        .unwrap();
        assert_eq!(config.max_quota_cells, 1000);
        assert!((config.thresholds.max_weight - 8.0).abs() < f64::EPSILON);
        assert!((config.thresholds.min_weight - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.max_wave_depth, EditorConfig::default().max_wave_depth);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = EditorConfig::from_toml_str("max_quota_cells = \"lots\"").unwrap_err();
        assert!(matches!(err, QuotaError::Config(_)));
    }

    #[test]
    fn builders() {
        let config = EditorConfig::new()
            .with_max_quota_cells(10)
            .with_max_wave_depth(2);
        assert_eq!(config.max_quota_cells, 10);
        assert_eq!(config.max_wave_depth, 2);
    }
}
