//! Runtime neuron and synapse state

use spikemesh_table::{dequantize_weight, GlobalId, NeuronEntry, NeuronId, SynapseSlot};

use crate::error::{EngineError, Result};

/// Default synaptic delay in microseconds
pub const DEFAULT_DELAY_US: u32 = 1000;

/// Runtime state of one LIF neuron
#[derive(Debug, Clone, PartialEq)]
pub struct Neuron {
    /// Local id within the owning engine
    pub local_id: NeuronId,
    /// Membrane potential (V)
    pub membrane_potential: f32,
    /// Firing threshold, strictly positive
    pub threshold: f32,
    /// Multiplicative per-step leak rate in (0, 1]
    pub leak_rate: f32,
    /// Refractory period in microseconds
    pub refractory_period_us: u64,
    /// Simulated time of the most recent fire
    pub last_spike_time_us: Option<u64>,
    /// Flag bits carried from the neuron table
    pub flags: u16,
    /// Presynaptic STDP trace
    pub pre_trace: f32,
    /// Postsynaptic STDP trace
    pub post_trace: f32,
}

impl Neuron {
    /// Create a neuron with validated LIF parameters
    pub fn new(
        local_id: NeuronId,
        threshold: f32,
        leak_rate: f32,
        refractory_period_us: u64,
    ) -> Result<Self> {
        if !(threshold > 0.0) {
            return Err(EngineError::invalid_parameter(
                "threshold",
                threshold.to_string(),
                "> 0.0",
            ));
        }
        if !(leak_rate > 0.0 && leak_rate <= 1.0) {
            return Err(EngineError::invalid_parameter(
                "leak_rate",
                leak_rate.to_string(),
                "in (0.0, 1.0]",
            ));
        }

        Ok(Self {
            local_id,
            membrane_potential: 0.0,
            threshold,
            leak_rate,
            refractory_period_us,
            last_spike_time_us: None,
            flags: 0,
            pre_trace: 0.0,
            post_trace: 0.0,
        })
    }

    /// Reconstruct a neuron from a decoded table entry
    ///
    /// A zero on-wire last-spike time means the neuron has never fired.
    pub fn from_entry(entry: &NeuronEntry) -> Self {
        Self {
            local_id: entry.local_id,
            membrane_potential: entry.membrane_potential,
            threshold: entry.threshold,
            leak_rate: entry.leak_rate,
            refractory_period_us: entry.refractory_period_us as u64,
            last_spike_time_us: match entry.last_spike_time_us {
                0 => None,
                t => Some(t as u64),
            },
            flags: entry.flags,
            pre_trace: 0.0,
            post_trace: 0.0,
        }
    }

    /// Whether the neuron is inside its refractory window at `now_us`
    pub fn is_refractory(&self, now_us: u64) -> bool {
        match self.last_spike_time_us {
            Some(last) => now_us.saturating_sub(last) < self.refractory_period_us,
            None => false,
        }
    }

    /// Reset state after a fire at `spike_time_us`
    pub fn reset_after_fire(&mut self, spike_time_us: u64) {
        self.membrane_potential = 0.0;
        self.last_spike_time_us = Some(spike_time_us);
    }
}

/// An incoming synaptic connection to a target neuron
#[derive(Debug, Clone, PartialEq)]
pub struct Synapse {
    /// Packed 24-bit id of the presynaptic neuron
    pub source: GlobalId,
    /// Synaptic weight
    pub weight: f32,
    /// Transmission delay in microseconds
    pub delay_us: u32,
    /// Simulated time of the most recent STDP weight update
    pub last_update_time_us: u64,
}

impl Synapse {
    /// Create a synapse with the default delay
    pub fn new(source: GlobalId, weight: f32) -> Self {
        Self {
            source,
            weight,
            delay_us: DEFAULT_DELAY_US,
            last_update_time_us: 0,
        }
    }

    /// Reconstruct a synapse from a table slot, dequantizing the weight
    pub fn from_slot(slot: &SynapseSlot) -> Self {
        Self::new(slot.source, dequantize_weight(slot.weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spikemesh_table::flags;

    #[test]
    fn test_neuron_validation() {
        assert!(Neuron::new(NeuronId::new(0), 0.0, 0.95, 1000).is_err());
        assert!(Neuron::new(NeuronId::new(0), -1.0, 0.95, 1000).is_err());
        assert!(Neuron::new(NeuronId::new(0), 1.0, 0.0, 1000).is_err());
        assert!(Neuron::new(NeuronId::new(0), 1.0, 1.1, 1000).is_err());
        assert!(Neuron::new(NeuronId::new(0), 1.0, 1.0, 0).is_ok());
    }

    #[test]
    fn test_refractory_window() {
        let mut neuron = Neuron::new(NeuronId::new(0), 1.0, 0.95, 5000).unwrap();

        // A neuron that has never fired is never refractory.
        assert!(!neuron.is_refractory(0));
        assert!(!neuron.is_refractory(1_000_000));

        neuron.reset_after_fire(10_000);
        assert!(neuron.is_refractory(10_000));
        assert!(neuron.is_refractory(14_999));
        assert!(!neuron.is_refractory(15_000));
    }

    #[test]
    fn test_reset_after_fire() {
        let mut neuron = Neuron::new(NeuronId::new(3), 1.0, 0.95, 1000).unwrap();
        neuron.membrane_potential = 1.4;
        neuron.reset_after_fire(2000);
        assert_eq!(neuron.membrane_potential, 0.0);
        assert_eq!(neuron.last_spike_time_us, Some(2000));
    }

    #[test]
    fn test_from_entry() {
        let mut entry = NeuronEntry::new(
            NeuronId::new(7),
            flags::ACTIVE | flags::INPUT,
            1.5,
            0.9,
            2000,
        )
        .unwrap();
        entry.synapses = vec![SynapseSlot::new(GlobalId::pack(1, NeuronId::new(2)), 128)];

        let neuron = Neuron::from_entry(&entry);
        assert_eq!(neuron.local_id, NeuronId::new(7));
        assert_eq!(neuron.threshold, 1.5);
        assert_eq!(neuron.leak_rate, 0.9);
        assert_eq!(neuron.refractory_period_us, 2000);
        assert_eq!(neuron.last_spike_time_us, None);
        assert_eq!(neuron.flags, flags::ACTIVE | flags::INPUT);

        let synapse = Synapse::from_slot(&entry.synapses[0]);
        assert_eq!(synapse.source, GlobalId::pack(1, NeuronId::new(2)));
        assert!((synapse.weight - 128.0 / 255.0).abs() < f32::EPSILON);
        assert_eq!(synapse.delay_us, DEFAULT_DELAY_US);
    }
}
