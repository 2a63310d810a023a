//! Topology compiler for the spikemesh cluster emulator
//!
//! Transforms a declarative layered network description (JSON) into
//! per-node binary neuron tables in the fixed 256-byte-entry format.
//! Compilation is deterministic for a given topology and RNG seed; the
//! resulting byte strings are the contract consumed by emulated engines
//! and real node firmware alike.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod error;
pub mod model;

pub use compiler::{
    compile_topology_file, CompiledNetwork, DeploymentInfo, Placement, TopologyCompiler,
};
pub use error::{Result, TopologyError};
pub use model::{
    Connection, ConnectionType, Layer, LayerType, NodeAssignment, Strategy, Topology, WeightInit,
};
