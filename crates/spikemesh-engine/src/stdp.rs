//! Spike-Timing-Dependent Plasticity configuration and pairing state

use std::collections::{HashMap, VecDeque};

use spikemesh_table::{GlobalId, NeuronId};

use crate::error::{EngineError, Result};

/// Spikes remembered per neuron for nearest-neighbour pairing
const HISTORY_CAPACITY: usize = 100;

/// STDP learning configuration for one engine
///
/// A disabled config makes the engine skip all trace and weight logic;
/// there is no separate non-learning engine variant.
#[derive(Debug, Clone, PartialEq)]
pub struct StdpConfig {
    /// Master switch for all plasticity logic
    pub enabled: bool,
    /// LTP learning rate (weight increase)
    pub learning_rate_plus: f32,
    /// LTD learning rate (weight decrease)
    pub learning_rate_minus: f32,
    /// Potentiation time constant (µs)
    pub tau_plus_us: f32,
    /// Depression time constant (µs)
    pub tau_minus_us: f32,
    /// Minimum weight after an update
    pub w_min: f32,
    /// Maximum weight after an update
    pub w_max: f32,
    /// Maximum pre/post time difference considered for pairing (µs)
    pub max_delta_t_us: u64,
}

impl Default for StdpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            learning_rate_plus: 0.01,
            learning_rate_minus: 0.01,
            tau_plus_us: 20_000.0,  // 20ms presynaptic window
            tau_minus_us: 20_000.0, // 20ms postsynaptic window
            w_min: 0.0,
            w_max: 1.0,
            max_delta_t_us: 100_000, // 100ms pairing cutoff
        }
    }
}

impl StdpConfig {
    /// Default configuration with learning switched on
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Validate the configuration (only meaningful when enabled)
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.learning_rate_plus <= 0.0 {
            return Err(EngineError::invalid_parameter(
                "learning_rate_plus",
                self.learning_rate_plus.to_string(),
                "> 0.0",
            ));
        }
        if self.learning_rate_minus <= 0.0 {
            return Err(EngineError::invalid_parameter(
                "learning_rate_minus",
                self.learning_rate_minus.to_string(),
                "> 0.0",
            ));
        }
        if self.tau_plus_us <= 0.0 {
            return Err(EngineError::invalid_parameter(
                "tau_plus_us",
                self.tau_plus_us.to_string(),
                "> 0.0",
            ));
        }
        if self.tau_minus_us <= 0.0 {
            return Err(EngineError::invalid_parameter(
                "tau_minus_us",
                self.tau_minus_us.to_string(),
                "> 0.0",
            ));
        }
        if self.w_max <= self.w_min {
            return Err(EngineError::invalid_parameter(
                "w_max",
                format!("{} (with w_min={})", self.w_max, self.w_min),
                "> w_min",
            ));
        }
        if self.max_delta_t_us == 0 {
            return Err(EngineError::invalid_parameter(
                "max_delta_t_us",
                "0",
                "> 0",
            ));
        }
        Ok(())
    }

    /// LTP weight delta for a pre-before-post interval, if inside the window
    pub fn potentiation(&self, delta_t_us: u64) -> Option<f32> {
        if delta_t_us == 0 || delta_t_us > self.max_delta_t_us {
            return None;
        }
        Some(self.learning_rate_plus * (-(delta_t_us as f32) / self.tau_plus_us).exp())
    }

    /// LTD weight delta for a post-before-pre interval, if inside the window
    pub fn depression(&self, delta_t_us: u64) -> Option<f32> {
        if delta_t_us == 0 || delta_t_us > self.max_delta_t_us {
            return None;
        }
        Some(-self.learning_rate_minus * (-(delta_t_us as f32) / self.tau_minus_us).exp())
    }

    /// Clamp a weight to the configured bounds
    pub fn clamp_weight(&self, weight: f32) -> f32 {
        weight.clamp(self.w_min, self.w_max)
    }

    /// Per-step decay factor for the presynaptic trace
    pub fn pre_trace_decay(&self, timestep_us: u64) -> f32 {
        (-(timestep_us as f32) / self.tau_plus_us).exp()
    }

    /// Per-step decay factor for the postsynaptic trace
    pub fn post_trace_decay(&self, timestep_us: u64) -> f32 {
        (-(timestep_us as f32) / self.tau_minus_us).exp()
    }
}

/// Bounded spike-time history for nearest-neighbour STDP pairing
///
/// Presynaptic arrivals are keyed by packed global id (sources may live on
/// other nodes); postsynaptic fires are keyed by local neuron id.
#[derive(Debug, Default)]
pub struct SpikeHistory {
    pre: HashMap<GlobalId, VecDeque<u64>>,
    post: HashMap<NeuronId, VecDeque<u64>>,
}

impl SpikeHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a presynaptic arrival
    pub fn record_pre(&mut self, source: GlobalId, time_us: u64) {
        push_bounded(self.pre.entry(source).or_default(), time_us);
    }

    /// Record a postsynaptic fire
    pub fn record_post(&mut self, neuron: NeuronId, time_us: u64) {
        push_bounded(self.post.entry(neuron).or_default(), time_us);
    }

    /// Most recent presynaptic arrival strictly before `time_us`
    pub fn last_pre_before(&self, source: GlobalId, time_us: u64) -> Option<u64> {
        last_before(self.pre.get(&source), time_us)
    }

    /// Most recent postsynaptic fire strictly before `time_us`
    pub fn last_post_before(&self, neuron: NeuronId, time_us: u64) -> Option<u64> {
        last_before(self.post.get(&neuron), time_us)
    }

    /// Drop all recorded spikes
    pub fn clear(&mut self) {
        self.pre.clear();
        self.post.clear();
    }
}

fn push_bounded(times: &mut VecDeque<u64>, time_us: u64) {
    if times.len() == HISTORY_CAPACITY {
        times.pop_front();
    }
    times.push_back(time_us);
}

fn last_before(times: Option<&VecDeque<u64>>, time_us: u64) -> Option<u64> {
    times?.iter().rev().copied().find(|&t| t < time_us)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(StdpConfig::default().validate().is_ok());
        assert!(StdpConfig::enabled().validate().is_ok());

        let mut config = StdpConfig::enabled();
        config.tau_plus_us = 0.0;
        assert!(config.validate().is_err());

        let mut config = StdpConfig::enabled();
        config.w_max = config.w_min;
        assert!(config.validate().is_err());

        // A disabled config is never rejected.
        let mut config = StdpConfig::default();
        config.tau_plus_us = -1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_potentiation_magnitude() {
        let config = StdpConfig::enabled();
        // Δw = 0.01 · exp(−1000/20000) ≈ 0.009512
        let delta = config.potentiation(1000).unwrap();
        assert!((delta - 0.01 * (-0.05f32).exp()).abs() < 1e-7);
        assert!(delta > 0.0);
    }

    #[test]
    fn test_depression_magnitude() {
        let config = StdpConfig::enabled();
        let delta = config.depression(1000).unwrap();
        assert!((delta + 0.01 * (-0.05f32).exp()).abs() < 1e-7);
        assert!(delta < 0.0);
    }

    #[test]
    fn test_pairing_window() {
        let config = StdpConfig::enabled();
        assert!(config.potentiation(0).is_none());
        assert!(config.potentiation(100_000).is_some());
        assert!(config.potentiation(100_001).is_none());
        assert!(config.depression(0).is_none());
        assert!(config.depression(100_001).is_none());
    }

    #[test]
    fn test_clamp() {
        let config = StdpConfig::enabled();
        assert_eq!(config.clamp_weight(1.5), 1.0);
        assert_eq!(config.clamp_weight(-0.5), 0.0);
        assert_eq!(config.clamp_weight(0.4), 0.4);
    }

    #[test]
    fn test_history_nearest_neighbour() {
        let mut history = SpikeHistory::new();
        let source = GlobalId::pack(0, NeuronId::new(0));

        history.record_pre(source, 1000);
        history.record_pre(source, 2000);
        history.record_pre(source, 3000);

        // Strictly-before lookup skips a same-time spike.
        assert_eq!(history.last_pre_before(source, 3000), Some(2000));
        assert_eq!(history.last_pre_before(source, 5000), Some(3000));
        assert_eq!(history.last_pre_before(source, 1000), None);
        assert_eq!(
            history.last_pre_before(GlobalId::pack(1, NeuronId::new(0)), 5000),
            None
        );
    }

    #[test]
    fn test_history_bounded() {
        let mut history = SpikeHistory::new();
        let neuron = NeuronId::new(0);
        for i in 0..2 * HISTORY_CAPACITY as u64 {
            history.record_post(neuron, i * 10);
        }
        // The oldest half was evicted.
        assert_eq!(
            history.last_post_before(neuron, 1),
            None
        );
        assert_eq!(
            history.last_post_before(neuron, u64::MAX),
            Some((2 * HISTORY_CAPACITY as u64 - 1) * 10)
        );
    }

    #[test]
    fn test_trace_decay_factors() {
        let config = StdpConfig::enabled();
        let decay = config.pre_trace_decay(1000);
        assert!((decay - (-0.05f32).exp()).abs() < 1e-7);
        assert!(decay < 1.0 && decay > 0.0);
    }

    proptest::proptest! {
        #[test]
        fn prop_updates_never_leave_bounds(
            start in 0.0f32..=1.0f32,
            deltas in proptest::collection::vec(1u64..=100_000, 1..64),
            ltp_mask in proptest::collection::vec(proptest::bool::ANY, 1..64),
        ) {
            let config = StdpConfig::enabled();
            let mut weight = start;
            for (dt, ltp) in deltas.iter().zip(ltp_mask.iter().cycle()) {
                let delta = if *ltp {
                    config.potentiation(*dt)
                } else {
                    config.depression(*dt)
                };
                if let Some(delta) = delta {
                    weight = config.clamp_weight(weight + delta);
                }
                proptest::prop_assert!((config.w_min..=config.w_max).contains(&weight));
            }
        }

        #[test]
        fn prop_potentiation_decreases_with_interval(dt in 1u64..100_000) {
            let config = StdpConfig::enabled();
            let near = config.potentiation(dt).unwrap();
            let far = config.potentiation(dt + 1).unwrap();
            // The LTP kernel is positive and monotonically decreasing in Δt.
            proptest::prop_assert!(near > 0.0);
            proptest::prop_assert!(far <= near);
        }
    }
}
