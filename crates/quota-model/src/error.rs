//! Error types for the weighting model

use crate::ids::{InstanceId, VariableId};

/// Malformed plan or target shapes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// A target document sets both a percentage and a population
    #[error("target for instance {instance} sets both a percentage and a population")]
    BothTargetKinds { instance: InstanceId },

    /// Percentage outside of 0..=1
    #[error("percentage {value} for instance {instance} is outside 0..=1")]
    PercentageOutOfRange { instance: InstanceId, value: f64 },

    /// One plan mixes percentage and population targets
    #[error("plan for '{variable}' mixes percentage and population targets")]
    MixedTargetKinds { variable: VariableId },

    /// Percentages of one plan do not add up to 1.0
    #[error("percentages for '{variable}' sum to {sum}, expected 1.0")]
    PercentageSum { variable: VariableId, sum: f64 },

    /// Same instance targeted twice within one plan
    #[error("instance {instance} is targeted more than once in plan for '{variable}'")]
    DuplicateInstance {
        variable: VariableId,
        instance: InstanceId,
    },

    /// Arena index does not exist
    #[error("no {kind} at arena index {index}")]
    DanglingIndex { kind: &'static str, index: usize },
}
