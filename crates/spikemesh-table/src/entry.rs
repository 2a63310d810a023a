//! Fixed-stride binary neuron-table entries
//!
//! A compiled neuron table is a concatenation of 256-byte little-endian
//! entries, one per neuron on the target node. The layout is the external
//! contract between the topology compiler, the emulated engines, and real
//! node firmware:
//!
//! | Offset | Size | Field |
//! |--------|------|------------------------------------|
//! | 0      | 2    | local neuron id                    |
//! | 2      | 2    | flags                              |
//! | 4      | 4    | initial membrane potential (f32)   |
//! | 8      | 4    | threshold (f32)                    |
//! | 12     | 4    | last spike time (u32, µs)          |
//! | 16     | 2    | synapse count                      |
//! | 18     | 2    | declared synapse capacity (60)     |
//! | 20     | 4    | reserved                           |
//! | 24     | 4    | leak rate (f32)                    |
//! | 28     | 4    | refractory period (u32, µs)        |
//! | 32     | 8    | reserved                           |
//! | 40     | 216  | synapse slots, 4 bytes each        |
//!
//! Each slot packs `(source_global_id_24 << 8) | weight_8`; unused slots
//! are zero. The declared capacity field advertises the hardware table
//! limit of 60, while the 256-byte stride physically holds 54 slots; the
//! compiler never emits more than fit.

use crate::{
    error::{Result, TableError},
    GlobalId, NeuronId,
};

/// Fixed entry stride in bytes
pub const NEURON_ENTRY_SIZE: usize = 256;

/// Declared synapse capacity written to every entry
pub const SYNAPSE_CAPACITY: u16 = 60;

/// Byte offset of the synapse slot region
const SLOTS_OFFSET: usize = 40;

/// Number of 4-byte slots that fit in the entry stride
pub const SYNAPSE_SLOT_COUNT: usize = (NEURON_ENTRY_SIZE - SLOTS_OFFSET) / 4;

/// Quantize a weight in `[0.0, 1.0]` to the 8-bit on-wire form
pub fn quantize_weight(weight: f32) -> u8 {
    (weight.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Dequantize an 8-bit on-wire weight back to `[0.0, 1.0]`
pub fn dequantize_weight(weight: u8) -> f32 {
    weight as f32 / 255.0
}

/// One synapse slot: packed presynaptic id plus quantized weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynapseSlot {
    /// Packed 24-bit presynaptic id
    pub source: GlobalId,
    /// Quantized weight
    pub weight: u8,
}

impl SynapseSlot {
    /// Create a new slot
    pub const fn new(source: GlobalId, weight: u8) -> Self {
        Self { source, weight }
    }

    /// Pack into the on-wire 32-bit word
    pub const fn to_word(self) -> u32 {
        (self.source.raw() << 8) | self.weight as u32
    }

    /// Unpack from the on-wire 32-bit word
    pub const fn from_word(word: u32) -> Self {
        Self {
            source: GlobalId::from_raw(word >> 8),
            weight: word as u8,
        }
    }
}

/// A decoded neuron-table entry
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronEntry {
    /// Local neuron id on the owning node
    pub local_id: NeuronId,
    /// Flag bits (see [`crate::flags`])
    pub flags: u16,
    /// Initial membrane potential, normally 0.0
    pub membrane_potential: f32,
    /// Firing threshold, strictly positive
    pub threshold: f32,
    /// Last spike time in microseconds, normally 0
    pub last_spike_time_us: u32,
    /// Multiplicative per-step leak rate in (0, 1]
    pub leak_rate: f32,
    /// Refractory period in microseconds
    pub refractory_period_us: u32,
    /// Incoming synapses in table order
    pub synapses: Vec<SynapseSlot>,
}

impl NeuronEntry {
    /// Create an entry with validated LIF parameters and no synapses
    pub fn new(
        local_id: NeuronId,
        flags: u16,
        threshold: f32,
        leak_rate: f32,
        refractory_period_us: u32,
    ) -> Result<Self> {
        let entry = Self {
            local_id,
            flags,
            membrane_potential: 0.0,
            threshold,
            last_spike_time_us: 0,
            leak_rate,
            refractory_period_us,
            synapses: Vec::new(),
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Validate the LIF parameters and synapse count
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0) {
            return Err(TableError::invalid_parameter(
                "threshold",
                self.threshold.to_string(),
                "> 0.0",
            ));
        }
        if !(self.leak_rate > 0.0 && self.leak_rate <= 1.0) {
            return Err(TableError::invalid_parameter(
                "leak_rate",
                self.leak_rate.to_string(),
                "in (0.0, 1.0]",
            ));
        }
        if self.synapses.len() > SYNAPSE_SLOT_COUNT {
            return Err(TableError::SynapseOverflow {
                neuron_id: self.local_id.raw(),
                count: self.synapses.len() as u16,
                limit: SYNAPSE_SLOT_COUNT,
            });
        }
        Ok(())
    }

    /// Encode into one fixed-stride entry
    pub fn encode(&self) -> Result<[u8; NEURON_ENTRY_SIZE]> {
        self.validate()?;

        let mut buf = [0u8; NEURON_ENTRY_SIZE];
        buf[0..2].copy_from_slice(&self.local_id.raw().to_le_bytes());
        buf[2..4].copy_from_slice(&self.flags.to_le_bytes());
        buf[4..8].copy_from_slice(&self.membrane_potential.to_le_bytes());
        buf[8..12].copy_from_slice(&self.threshold.to_le_bytes());
        buf[12..16].copy_from_slice(&self.last_spike_time_us.to_le_bytes());
        buf[16..18].copy_from_slice(&(self.synapses.len() as u16).to_le_bytes());
        buf[18..20].copy_from_slice(&SYNAPSE_CAPACITY.to_le_bytes());
        // 20..24 reserved
        buf[24..28].copy_from_slice(&self.leak_rate.to_le_bytes());
        buf[28..32].copy_from_slice(&self.refractory_period_us.to_le_bytes());
        // 32..40 reserved

        for (i, slot) in self.synapses.iter().enumerate() {
            let off = SLOTS_OFFSET + i * 4;
            buf[off..off + 4].copy_from_slice(&slot.to_word().to_le_bytes());
        }

        Ok(buf)
    }

    /// Decode one fixed-stride entry
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NEURON_ENTRY_SIZE {
            return Err(TableError::MisalignedTable {
                len: bytes.len(),
                entry_size: NEURON_ENTRY_SIZE,
            });
        }

        let local_id = NeuronId::new(read_u16(bytes, 0));
        let flags = read_u16(bytes, 2);
        let membrane_potential = read_f32(bytes, 4);
        let threshold = read_f32(bytes, 8);
        let last_spike_time_us = read_u32(bytes, 12);
        let synapse_count = read_u16(bytes, 16);
        let leak_rate = read_f32(bytes, 24);
        let refractory_period_us = read_u32(bytes, 28);

        if synapse_count as usize > SYNAPSE_SLOT_COUNT {
            return Err(TableError::SynapseOverflow {
                neuron_id: local_id.raw(),
                count: synapse_count,
                limit: SYNAPSE_SLOT_COUNT,
            });
        }

        let mut synapses = Vec::with_capacity(synapse_count as usize);
        for i in 0..synapse_count as usize {
            let word = read_u32(bytes, SLOTS_OFFSET + i * 4);
            synapses.push(SynapseSlot::from_word(word));
        }

        let entry = Self {
            local_id,
            flags,
            membrane_potential,
            threshold,
            last_spike_time_us,
            leak_rate,
            refractory_period_us,
            synapses,
        };
        entry.validate()?;
        Ok(entry)
    }
}

/// Encode a node's neuron entries into one contiguous table
pub fn encode_table(entries: &[NeuronEntry]) -> Result<Vec<u8>> {
    let mut table = Vec::with_capacity(entries.len() * NEURON_ENTRY_SIZE);
    for entry in entries {
        table.extend_from_slice(&entry.encode()?);
    }
    Ok(table)
}

/// Decode a contiguous table into its neuron entries
///
/// Fails when the byte length is not a whole number of entries; trailing
/// garbage shorter than an entry is therefore rejected rather than
/// silently ignored.
pub fn decode_table(bytes: &[u8]) -> Result<Vec<NeuronEntry>> {
    if bytes.len() % NEURON_ENTRY_SIZE != 0 {
        return Err(TableError::MisalignedTable {
            len: bytes.len(),
            entry_size: NEURON_ENTRY_SIZE,
        });
    }

    bytes
        .chunks_exact(NEURON_ENTRY_SIZE)
        .map(NeuronEntry::decode)
        .collect()
}

fn read_u16(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([bytes[off], bytes[off + 1]])
}

fn read_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn read_f32(bytes: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}
