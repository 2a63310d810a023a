//! Cluster coordinator for the spikemesh emulator
//!
//! The coordinator hosts one SNN engine per emulated compute node, keyed
//! by `(backplane_id, node_id)`, and runs the spike bus between them: a
//! single routing task drains every engine's outgoing queue at a ~1 ms
//! cadence and broadcasts each spike into every engine's incoming queue.
//! Engines filter by synapse match, so the bus itself carries no topology
//! knowledge. A bounded global buffer keeps the most recent spikes for
//! the status surface.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod error;
pub mod status;

pub use coordinator::{ClusterCoordinator, GLOBAL_SPIKE_BUFFER_CAPACITY};
pub use error::{ClusterError, Result};
pub use status::{ClusterStatus, EngineSummary, NeuronSummary};

// Re-export the types the coordinator surface speaks in
pub use spikemesh_engine::{NeuronId, SnnEngine, Spike, StdpConfig};
