//! Declarative topology description (the compiler's JSON input)

use serde::{Deserialize, Serialize};

/// A complete layered network description
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Topology {
    /// Human-readable network name
    #[serde(default = "default_network_name")]
    pub network_name: String,
    /// Total neuron count; global ids index `0..neuron_count`
    pub neuron_count: u32,
    /// Layer declarations
    pub layers: Vec<Layer>,
    /// Inter-layer connection declarations
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// How neurons are placed onto compute nodes
    #[serde(default)]
    pub node_assignment: NodeAssignment,
}

/// One layer of neurons sharing LIF parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Layer {
    /// Layer identifier referenced by connections
    pub layer_id: u32,
    /// Role of the layer in the network
    pub layer_type: LayerType,
    /// Inclusive `[start, end]` global neuron id range
    pub neuron_ids: [u32; 2],
    /// Firing threshold for every neuron in the layer
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Multiplicative per-step leak rate
    #[serde(default = "default_leak_rate")]
    pub leak_rate: f32,
    /// Refractory period in microseconds
    #[serde(default = "default_refractory_period_us")]
    pub refractory_period_us: u32,
}

impl Layer {
    /// Inclusive range start
    pub fn start(&self) -> u32 {
        self.neuron_ids[0]
    }

    /// Inclusive range end
    pub fn end(&self) -> u32 {
        self.neuron_ids[1]
    }

    /// Number of neurons in the layer
    pub fn len(&self) -> u32 {
        self.end() - self.start() + 1
    }

    /// Whether the layer declares no neurons (never true for a valid range)
    pub fn is_empty(&self) -> bool {
        self.end() < self.start()
    }
}

/// Layer role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    /// Externally stimulated layer
    Input,
    /// Interior layer
    Hidden,
    /// Observed output layer
    Output,
}

/// A connection rule between two layers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Connection {
    /// Presynaptic layer id
    pub source_layer: u32,
    /// Postsynaptic layer id
    pub target_layer: u32,
    /// Pair-selection rule
    pub connection_type: ConnectionType,
    /// Weight initialization rule
    #[serde(default)]
    pub weight_init: WeightInit,
    /// Mean for `random_normal`
    #[serde(default = "default_weight_mean")]
    pub weight_mean: f32,
    /// Standard deviation for `random_normal`
    #[serde(default = "default_weight_stddev")]
    pub weight_stddev: f32,
    /// Lower bound for `random_uniform`
    #[serde(default)]
    pub weight_min: f32,
    /// Upper bound for `random_uniform`
    #[serde(default = "default_weight_max")]
    pub weight_max: f32,
    /// Value for `constant`
    #[serde(default = "default_weight_value")]
    pub weight_value: f32,
    /// Inclusion probability for `sparse_random`
    #[serde(default = "default_connection_probability")]
    pub connection_probability: f32,
}

/// Pair-selection rule for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Every source-target pair
    FullyConnected,
    /// Each pair included with independent Bernoulli probability
    SparseRandom,
}

/// Weight initialization rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInit {
    /// Gaussian draw around `weight_mean` with `weight_stddev`
    #[default]
    RandomNormal,
    /// Uniform draw in `[weight_min, weight_max]`
    RandomUniform,
    /// Fixed `weight_value`
    Constant,
}

/// Placement of neurons onto compute nodes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeAssignment {
    /// Placement strategy
    #[serde(default)]
    pub strategy: Strategy,
    /// Target node ids, in placement order
    #[serde(default = "default_nodes")]
    pub nodes: Vec<u32>,
}

impl Default for NodeAssignment {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            nodes: default_nodes(),
        }
    }
}

/// Neuron placement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Spread neurons evenly over the node list
    #[default]
    Balanced,
    /// Place each layer wholly on one node, round-robin
    LayerBased,
}

fn default_network_name() -> String {
    "unnamed".to_string()
}

fn default_threshold() -> f32 {
    1.0
}

fn default_leak_rate() -> f32 {
    0.95
}

fn default_refractory_period_us() -> u32 {
    1000
}

fn default_weight_mean() -> f32 {
    0.5
}

fn default_weight_stddev() -> f32 {
    0.1
}

fn default_weight_max() -> f32 {
    1.0
}

fn default_weight_value() -> f32 {
    0.5
}

fn default_connection_probability() -> f32 {
    0.1
}

fn default_nodes() -> Vec<u32> {
    (0..12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_topology() {
        let json = r#"{
            "network_name": "test_net",
            "neuron_count": 6,
            "layers": [
                {"layer_id": 0, "layer_type": "input", "neuron_ids": [0, 1]},
                {"layer_id": 1, "layer_type": "hidden", "neuron_ids": [2, 4],
                 "threshold": 1.5, "leak_rate": 0.9, "refractory_period_us": 2000},
                {"layer_id": 2, "layer_type": "output", "neuron_ids": [5, 5]}
            ],
            "connections": [
                {"source_layer": 0, "target_layer": 1,
                 "connection_type": "fully_connected",
                 "weight_init": "constant", "weight_value": 0.5}
            ],
            "node_assignment": {"strategy": "balanced", "nodes": [0, 1]}
        }"#;

        let topology: Topology = serde_json::from_str(json).unwrap();
        assert_eq!(topology.network_name, "test_net");
        assert_eq!(topology.neuron_count, 6);
        assert_eq!(topology.layers.len(), 3);
        assert_eq!(topology.layers[0].layer_type, LayerType::Input);
        assert_eq!(topology.layers[0].threshold, 1.0);
        assert_eq!(topology.layers[1].threshold, 1.5);
        assert_eq!(topology.layers[1].len(), 3);
        assert_eq!(
            topology.connections[0].weight_init,
            WeightInit::Constant
        );
        assert_eq!(topology.node_assignment.strategy, Strategy::Balanced);
        assert_eq!(topology.node_assignment.nodes, vec![0, 1]);
    }

    #[test]
    fn test_parse_defaults() {
        let json = r#"{
            "neuron_count": 4,
            "layers": [
                {"layer_id": 0, "layer_type": "input", "neuron_ids": [0, 3]}
            ]
        }"#;

        let topology: Topology = serde_json::from_str(json).unwrap();
        assert_eq!(topology.network_name, "unnamed");
        assert!(topology.connections.is_empty());
        assert_eq!(topology.node_assignment.nodes.len(), 12);
        assert_eq!(topology.layers[0].leak_rate, 0.95);
        assert_eq!(topology.layers[0].refractory_period_us, 1000);
    }

    #[test]
    fn test_parse_sparse_connection() {
        let json = r#"{
            "source_layer": 1, "target_layer": 2,
            "connection_type": "sparse_random",
            "connection_probability": 0.25
        }"#;

        let conn: Connection = serde_json::from_str(json).unwrap();
        assert_eq!(conn.connection_type, ConnectionType::SparseRandom);
        assert_eq!(conn.connection_probability, 0.25);
        assert_eq!(conn.weight_init, WeightInit::RandomNormal);
        assert_eq!(conn.weight_mean, 0.5);
    }
}
