//! Error types for topology compilation

use thiserror::Error;

/// Result type for topology operations
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors surfaced synchronously from the topology compiler
#[derive(Error, Debug)]
pub enum TopologyError {
    /// A connection references a layer id that does not exist
    #[error("Connection references unknown layer {layer_id}")]
    UnknownLayer {
        /// The missing layer id
        layer_id: u32,
    },

    /// Two layers claim overlapping neuron id ranges
    #[error("Layers {first} and {second} have overlapping neuron id ranges")]
    OverlappingLayers {
        /// First layer id
        first: u32,
        /// Second layer id
        second: u32,
    },

    /// A layer's neuron id range is malformed or outside the network
    #[error("Layer {layer_id} range [{start}, {end}] is invalid for {neuron_count} neurons")]
    InvalidRange {
        /// Offending layer id
        layer_id: u32,
        /// Range start (inclusive)
        start: u32,
        /// Range end (inclusive)
        end: u32,
        /// Declared network size
        neuron_count: u32,
    },

    /// A neuron declared by a layer was not placed on any node
    #[error("Neuron {neuron_id} not assigned to any node")]
    UnassignedNeuron {
        /// Global id of the unplaced neuron
        neuron_id: u32,
    },

    /// The node assignment lists no nodes
    #[error("Node assignment lists no nodes")]
    NoNodes,

    /// A node id does not fit the 8-bit field of the packed global id
    #[error("Node id {node} is out of range (0..=255)")]
    NodeOutOfRange {
        /// Offending node id
        node: u32,
    },

    /// The same node appears twice in the assignment
    #[error("Node {node} listed more than once in the assignment")]
    DuplicateNode {
        /// Offending node id
        node: u32,
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

    /// Table encoding error
    #[error("Table error: {source}")]
    Table {
        #[from]
        /// Source table error
        source: spikemesh_table::TableError,
    },

    /// I/O error while reading a topology file
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Source I/O error
        source: std::io::Error,
    },

    /// Malformed topology JSON
    #[error("Topology JSON error: {source}")]
    Json {
        #[from]
        /// Source JSON error
        source: serde_json::Error,
    },
}

impl TopologyError {
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
