//! Error types for the neuron-table schema

use thiserror::Error;

/// Result type for table operations
pub type Result<T> = std::result::Result<T, TableError>;

/// Errors that can occur while encoding or decoding neuron tables
#[derive(Error, Debug)]
pub enum TableError {
    /// Table byte length is not a whole number of entries
    #[error("Table length {len} is not a multiple of the {entry_size}-byte entry size")]
    MisalignedTable {
        /// Total table length in bytes
        len: usize,
        /// Fixed entry stride
        entry_size: usize,
    },

    /// Entry declares more synapses than the entry can physically hold
    #[error("Entry for neuron {neuron_id} declares {count} synapses (physical slot limit {limit})")]
    SynapseOverflow {
        /// Local neuron id of the offending entry
        neuron_id: u16,
        /// Declared synapse count
        count: u16,
        /// Physical slot limit
        limit: usize,
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

impl TableError {
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
    fn test_error_display() {
        let err = TableError::MisalignedTable {
            len: 300,
            entry_size: 256,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("300"));
        assert!(msg.contains("256"));

        let err = TableError::invalid_parameter("threshold", "0", "> 0");
        assert!(matches!(err, TableError::InvalidParameter { .. }));
    }
}
