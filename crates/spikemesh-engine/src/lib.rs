//! Per-node SNN execution engine for the spikemesh cluster emulator
//!
//! Each engine emulates one compute node: it owns a table of Leaky
//! Integrate-and-Fire neurons and their incoming synapses, advances
//! simulated time in fixed microsecond quanta on a dedicated task, absorbs
//! routed and injected spikes through a FIFO queue, and emits outgoing
//! spikes for the cluster coordinator to broadcast. Spike-Timing-Dependent
//! Plasticity is a per-engine configuration; a disabled config skips all
//! trace and weight logic.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod neuron;
pub mod stdp;

pub use engine::{EngineStats, NeuronView, SnnEngine, SynapseView};
pub use error::{EngineError, Result};
pub use neuron::{Neuron, Synapse};
pub use stdp::StdpConfig;

// Re-export the vocabulary types engines speak in
pub use spikemesh_table::{GlobalId, NeuronId, Spike};

/// Default simulation timestep (1 ms in microseconds)
pub const DEFAULT_TIMESTEP_US: u64 = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_integration() {
        let stdp = StdpConfig::default();
        assert!(!stdp.enabled);

        let engine = SnnEngine::new(0, 0, stdp).unwrap();
        assert_eq!(engine.node_id(), 0);
        assert!(!engine.is_running());
    }
}
