//! Neuron-table binary schema and shared spike types for the spikemesh
//! cluster emulator
//!
//! This crate owns the vocabulary shared by the topology compiler, the
//! per-node SNN engines, and the cluster coordinator: neuron identifiers,
//! the 24-bit packed presynaptic id, spike events, and the fixed-stride
//! binary neuron-table format that is the compiler's external contract.

#![deny(missing_docs)]
#![warn(clippy::all)]

use core::fmt;

pub mod entry;
pub mod error;

pub use entry::{
    decode_table, dequantize_weight, encode_table, quantize_weight, NeuronEntry, SynapseSlot,
    NEURON_ENTRY_SIZE, SYNAPSE_CAPACITY, SYNAPSE_SLOT_COUNT,
};
pub use error::{Result, TableError};

/// Table schema version for compatibility checking
pub const TABLE_VERSION: u32 = 1;

/// Neuron flag bits stored in the table's `flags` field
pub mod flags {
    /// Neuron participates in simulation
    pub const ACTIVE: u16 = 0x0001;
    /// Neuron is an external input
    pub const INPUT: u16 = 0x0004;
    /// Neuron is a network output
    pub const OUTPUT: u16 = 0x0008;
}

/// Identifier of a neuron local to one engine (one compute node)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NeuronId(pub u16);

impl NeuronId {
    /// Create a new local neuron ID
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn raw(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Packed 24-bit presynaptic identifier: `(node_id << 16) | local_id`
///
/// The upper 8 bits of the 32-bit carrier are reserved and always zero.
/// The backplane id is deliberately not part of the encoding; spike
/// matching across backplanes uses node + local id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalId(u32);

impl GlobalId {
    /// Mask covering the 24 significant bits
    pub const MASK: u32 = 0x00FF_FFFF;

    /// Pack a node id and local neuron id
    pub const fn pack(node_id: u8, local_id: NeuronId) -> Self {
        Self(((node_id as u32) << 16) | local_id.raw() as u32)
    }

    /// Build from a raw value, discarding the reserved high byte
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & Self::MASK)
    }

    /// Get the packed 24-bit value
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Node id carried in bits 16..24
    pub const fn node_id(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Local neuron id carried in bits 0..16
    pub const fn local_id(&self) -> NeuronId {
        NeuronId::new(self.0 as u16)
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{:06x}", self.0)
    }
}

/// An immutable spike event emitted by an engine and routed by the
/// coordinator
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Spike {
    /// Local id of the presynaptic neuron on its source node
    pub neuron_id: NeuronId,
    /// Node the spike originated from
    pub source_node: u8,
    /// Backplane the spike originated from
    pub source_backplane: u8,
    /// Simulated time of the fire (microseconds)
    pub timestamp_us: u64,
    /// Spike amplitude (typically 1.0)
    pub value: f32,
}

impl Spike {
    /// Create a spike with the default amplitude of 1.0
    pub fn new(neuron_id: NeuronId, source_node: u8, source_backplane: u8, timestamp_us: u64) -> Self {
        Self {
            neuron_id,
            source_node,
            source_backplane,
            timestamp_us,
            value: 1.0,
        }
    }

    /// Packed presynaptic id used for synapse matching
    pub const fn global_id(&self) -> GlobalId {
        GlobalId::pack(self.source_node, self.neuron_id)
    }
}

impl serde::Serialize for NeuronId {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}
