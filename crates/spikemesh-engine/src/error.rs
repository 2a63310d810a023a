//! Error types for the SNN engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the SNN engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Neuron table parsing error
    #[error("Table error: {source}")]
    Table {
        #[from]
        /// Source table error
        source: spikemesh_table::TableError,
    },

    /// Invalid engine configuration
    #[error("Invalid engine configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Neuron not found
    #[error("Neuron {neuron_id} not found")]
    NeuronNotFound {
        /// Local neuron id that was not found
        neuron_id: u16,
    },

    /// Neuron already present
    #[error("Neuron {neuron_id} already exists")]
    NeuronExists {
        /// Local neuron id that already exists
        neuron_id: u16,
    },

    /// Synapse table for a neuron is full
    #[error("Neuron {neuron_id} synapse table full (capacity {capacity})")]
    SynapseTableFull {
        /// Local neuron id whose table is full
        neuron_id: u16,
        /// Fixed per-neuron capacity
        capacity: usize,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },
}

impl EngineError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EngineError::invalid_config("no neurons loaded");
        assert!(matches!(err, EngineError::InvalidConfiguration { .. }));

        let err = EngineError::invalid_parameter("timestep_us", "0", "> 0");
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::NeuronNotFound { neuron_id: 42 };
        assert!(format!("{}", err).contains("Neuron 42 not found"));
    }
}
