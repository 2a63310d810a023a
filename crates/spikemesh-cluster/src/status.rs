//! Aggregate status snapshots consumed by the HTTP layer

use serde::Serialize;

/// Cluster-wide activity snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    /// Registered engines
    pub total_engines: usize,
    /// Neurons loaded across all engines
    pub total_neurons: usize,
    /// Spikes emitted across all engines
    pub total_spikes_sent: u64,
    /// Spikes absorbed across all engines (routed + injected)
    pub total_spikes_received: u64,
    /// STDP weight updates across all engines
    pub total_stdp_updates: u64,
    /// Whether the routing task is running
    pub routing_active: bool,
    /// Whether any registered engine has STDP enabled
    pub stdp_enabled: bool,
}

/// Per-neuron line of the engines listing
#[derive(Debug, Clone, Serialize)]
pub struct NeuronSummary {
    /// Local neuron id
    pub id: u16,
    /// Firing threshold
    pub threshold: f32,
    /// Per-step leak rate
    pub leak_rate: f32,
    /// Incoming synapse count
    pub synapse_count: usize,
    /// Most recent fire time (0 when the neuron has never fired)
    pub last_spike_time_us: u64,
}

/// Per-engine line of the engines listing
#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    /// Backplane id of the engine's key
    pub backplane: u8,
    /// Node id of the engine's key
    pub node: u8,
    /// Neuron summaries in local id order
    pub neurons: Vec<NeuronSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_flat() {
        let status = ClusterStatus {
            total_engines: 2,
            total_neurons: 7,
            total_spikes_sent: 10,
            total_spikes_received: 20,
            total_stdp_updates: 0,
            routing_active: true,
            stdp_enabled: false,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["total_engines"], 2);
        assert_eq!(json["routing_active"], true);
        assert_eq!(json["stdp_enabled"], false);
    }

    #[test]
    fn test_engine_summary_shape() {
        let summary = EngineSummary {
            backplane: 0,
            node: 3,
            neurons: vec![NeuronSummary {
                id: 1,
                threshold: 1.0,
                leak_rate: 0.95,
                synapse_count: 2,
                last_spike_time_us: 0,
            }],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["node"], 3);
        assert_eq!(json["neurons"][0]["synapse_count"], 2);
    }
}
