//! The per-node simulation engine

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use spikemesh_table::{decode_table, NeuronId, Spike, SYNAPSE_SLOT_COUNT};

use crate::error::{EngineError, Result};
use crate::neuron::{Neuron, Synapse};
use crate::stdp::{SpikeHistory, StdpConfig};
use crate::DEFAULT_TIMESTEP_US;

/// How long `stop` waits for the simulation task to observe the run flag
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Events absorbed by the engine's incoming queue
#[derive(Debug, Clone)]
enum IncomingEvent {
    /// A spike broadcast by the cluster router
    Routed(Spike),
    /// An external stimulus addressed to one local neuron
    Injected { neuron_id: NeuronId, value: f32 },
}

/// Internal counters updated by the step task
#[derive(Debug, Default)]
struct Counters {
    spikes_sent: u64,
    neurons_spiked: u64,
    simulation_steps: u64,
    stdp_updates: u64,
    weight_increases: u64,
    weight_decreases: u64,
}

/// Neuron, synapse, and timing state owned by the step task
struct EngineCore {
    neurons: BTreeMap<NeuronId, Neuron>,
    synapses: BTreeMap<NeuronId, Vec<Synapse>>,
    history: SpikeHistory,
    current_time_us: u64,
    timestep_us: u64,
    counters: Counters,
}

impl EngineCore {
    fn new() -> Self {
        Self {
            neurons: BTreeMap::new(),
            synapses: BTreeMap::new(),
            history: SpikeHistory::new(),
            current_time_us: 0,
            timestep_us: DEFAULT_TIMESTEP_US,
            counters: Counters::default(),
        }
    }
}

/// Read-only statistics snapshot of one engine
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    /// Node id of the emulated compute node
    pub node_id: u8,
    /// Backplane id of the emulated compute node
    pub backplane_id: u8,
    /// Loaded neuron count
    pub neuron_count: usize,
    /// Loaded synapse count across all neurons
    pub synapse_count: usize,
    /// Whether the simulation task is running
    pub running: bool,
    /// Current simulated time (µs)
    pub current_time_us: u64,
    /// Simulation timestep (µs)
    pub timestep_us: u64,
    /// Spikes absorbed into the incoming queue (routed + injected)
    pub total_spikes_received: u64,
    /// Spikes emitted to the outgoing queue
    pub total_spikes_sent: u64,
    /// Fire events observed
    pub neurons_spiked: u64,
    /// Steps executed
    pub simulation_steps: u64,
    /// STDP weight updates applied
    pub stdp_updates: u64,
    /// Updates that increased a weight
    pub weight_increases: u64,
    /// Updates that decreased a weight
    pub weight_decreases: u64,
    /// Whether STDP is enabled on this engine
    pub stdp_enabled: bool,
}

/// Read-only snapshot of one neuron's state
#[derive(Debug, Clone, serde::Serialize)]
pub struct NeuronView {
    /// Local neuron id
    pub id: u16,
    /// Membrane potential
    pub membrane_potential: f32,
    /// Firing threshold
    pub threshold: f32,
    /// Per-step leak rate
    pub leak_rate: f32,
    /// Refractory period (µs)
    pub refractory_period_us: u64,
    /// Incoming synapse count
    pub synapse_count: usize,
    /// Most recent fire time (0 when the neuron has never fired)
    pub last_spike_time_us: u64,
    /// Flag bits from the neuron table
    pub flags: u16,
    /// Presynaptic STDP trace
    pub pre_trace: f32,
    /// Postsynaptic STDP trace
    pub post_trace: f32,
}

/// Read-only snapshot of one synapse's state
#[derive(Debug, Clone, serde::Serialize)]
pub struct SynapseView {
    /// Packed 24-bit presynaptic id
    pub source_id: u32,
    /// Current weight
    pub weight: f32,
    /// Transmission delay (µs)
    pub delay_us: u32,
    /// Most recent STDP update time (µs)
    pub last_update_time_us: u64,
}

/// State shared between the public handle and the simulation task
struct EngineInner {
    node_id: u8,
    backplane_id: u8,
    stdp: StdpConfig,
    core: Mutex<EngineCore>,
    incoming: Mutex<VecDeque<IncomingEvent>>,
    outgoing: Mutex<VecDeque<Spike>>,
    spikes_received: AtomicU64,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// SNN execution engine emulating one compute node
///
/// The engine is a cheap-to-clone handle; clones share the same node
/// state, so the coordinator and the background simulation task observe
/// one engine. Public methods are safe to call from any thread; neuron
/// and synapse state is only mutated by [`SnnEngine::step`], which the
/// simulation task invokes once per timestep after [`SnnEngine::start`].
#[derive(Clone)]
pub struct SnnEngine {
    inner: Arc<EngineInner>,
}

impl SnnEngine {
    /// Create an engine for `(backplane_id, node_id)` with the given STDP
    /// configuration
    pub fn new(node_id: u8, backplane_id: u8, stdp: StdpConfig) -> Result<Self> {
        stdp.validate()?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                node_id,
                backplane_id,
                stdp,
                core: Mutex::new(EngineCore::new()),
                incoming: Mutex::new(VecDeque::new()),
                outgoing: Mutex::new(VecDeque::new()),
                spikes_received: AtomicU64::new(0),
                running: AtomicBool::new(false),
                handle: Mutex::new(None),
            }),
        })
    }

    /// Node id of the emulated compute node
    pub fn node_id(&self) -> u8 {
        self.inner.node_id
    }

    /// Backplane id of the emulated compute node
    pub fn backplane_id(&self) -> u8 {
        self.inner.backplane_id
    }

    /// The engine's STDP configuration
    pub fn stdp(&self) -> &StdpConfig {
        &self.inner.stdp
    }

    /// Whether the simulation task is running
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Load a compiled neuron table, replacing all prior neuron, synapse,
    /// and pairing state and rewinding simulated time to zero
    ///
    /// Weights are dequantized as `w / 255`; a zero last-spike field marks
    /// a neuron that has never fired.
    pub fn load_table(&self, bytes: &[u8]) -> Result<()> {
        let entries = decode_table(bytes)?;

        let mut neurons = BTreeMap::new();
        let mut synapses = BTreeMap::new();
        for entry in &entries {
            if neurons.contains_key(&entry.local_id) {
                return Err(EngineError::NeuronExists {
                    neuron_id: entry.local_id.raw(),
                });
            }
            neurons.insert(entry.local_id, Neuron::from_entry(entry));
            synapses.insert(
                entry.local_id,
                entry.synapses.iter().map(Synapse::from_slot).collect(),
            );
        }

        let mut core = self.inner.core.lock();
        core.neurons = neurons;
        core.synapses = synapses;
        core.history.clear();
        core.current_time_us = 0;

        log::info!(
            "[snn-{}-{}] loaded {} neurons from table",
            self.backplane_id(),
            self.node_id(),
            core.neurons.len(),
        );
        Ok(())
    }

    /// Insert a neuron programmatically (fixtures and embedders)
    pub fn insert_neuron(&self, neuron: Neuron) -> Result<()> {
        let mut core = self.inner.core.lock();
        if core.neurons.contains_key(&neuron.local_id) {
            return Err(EngineError::NeuronExists {
                neuron_id: neuron.local_id.raw(),
            });
        }
        core.synapses.insert(neuron.local_id, Vec::new());
        core.neurons.insert(neuron.local_id, neuron);
        Ok(())
    }

    /// Attach an incoming synapse to a local neuron
    pub fn insert_synapse(&self, target: NeuronId, synapse: Synapse) -> Result<()> {
        let mut core = self.inner.core.lock();
        if !core.neurons.contains_key(&target) {
            return Err(EngineError::NeuronNotFound {
                neuron_id: target.raw(),
            });
        }
        let list = core.synapses.entry(target).or_default();
        if list.len() >= SYNAPSE_SLOT_COUNT {
            return Err(EngineError::SynapseTableFull {
                neuron_id: target.raw(),
                capacity: SYNAPSE_SLOT_COUNT,
            });
        }
        list.push(synapse);
        Ok(())
    }

    /// Enqueue an external spike toward a specific local neuron
    ///
    /// A neuron with no incoming synapses fires directly when the event is
    /// drained (input-neuron convention); one with synapses has `value`
    /// added to its membrane potential.
    pub fn inject_spike(&self, neuron_id: NeuronId, value: f32) {
        self.inner.spikes_received.fetch_add(1, Ordering::Relaxed);
        self.inner
            .incoming
            .lock()
            .push_back(IncomingEvent::Injected { neuron_id, value });
    }

    /// Enqueue a routed spike from the cluster bus
    pub fn push_incoming(&self, spike: Spike) {
        self.inner.spikes_received.fetch_add(1, Ordering::Relaxed);
        self.inner
            .incoming
            .lock()
            .push_back(IncomingEvent::Routed(spike));
    }

    /// Atomically drain and return the outgoing spike queue
    pub fn take_outgoing_spikes(&self) -> Vec<Spike> {
        let mut queue = self.inner.outgoing.lock();
        queue.drain(..).collect()
    }

    /// Advance simulated time by one timestep
    ///
    /// Order within the step is invariant: drain incoming events, leak
    /// pass, trace decay. The background task calls this once per
    /// timestep; tests and embedders may call it directly for
    /// deterministic single-stepping.
    pub fn step(&self) {
        self.inner.step();
    }

    /// Set the simulation timestep
    pub fn set_timestep(&self, timestep_us: u64) -> Result<()> {
        if timestep_us == 0 {
            return Err(EngineError::invalid_parameter("timestep_us", "0", "> 0"));
        }
        self.inner.core.lock().timestep_us = timestep_us;
        Ok(())
    }

    /// Start the simulation task; repeated calls while running are no-ops
    ///
    /// Simulated time restarts from zero. The loop paces itself against
    /// wall-clock time: an overrunning step shortens the following sleep
    /// to zero with no catch-up steps.
    pub fn start(&self, timestep_us: u64) -> Result<()> {
        if timestep_us == 0 {
            return Err(EngineError::invalid_parameter("timestep_us", "0", "> 0"));
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut core = self.inner.core.lock();
            core.timestep_us = timestep_us;
            core.current_time_us = 0;
        }

        let inner = Arc::clone(&self.inner);
        let name = format!("snn-{}-{}", self.backplane_id(), self.node_id());
        match thread::Builder::new().name(name).spawn(move || inner.run_loop()) {
            Ok(handle) => {
                *self.inner.handle.lock() = Some(handle);
                log::info!(
                    "[snn-{}-{}] started with {}µs timestep",
                    self.backplane_id(),
                    self.node_id(),
                    timestep_us,
                );
                Ok(())
            }
            Err(err) => {
                self.inner.running.store(false, Ordering::SeqCst);
                Err(EngineError::invalid_config(format!(
                    "failed to spawn simulation task: {err}"
                )))
            }
        }
    }

    /// Request loop termination and join with a bounded timeout
    ///
    /// A join that outlives the timeout is logged and abandoned; the task
    /// observes the cleared run flag at its next iteration and exits.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let handle = self.inner.handle.lock().take();
        let Some(handle) = handle else {
            return;
        };

        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if handle.is_finished() {
            let _ = handle.join();
            log::info!("[snn-{}-{}] stopped", self.backplane_id(), self.node_id());
        } else {
            log::warn!(
                "[snn-{}-{}] simulation task did not stop within {:?}",
                self.backplane_id(),
                self.node_id(),
                JOIN_TIMEOUT,
            );
        }
    }

    /// Read-only statistics snapshot
    pub fn stats(&self) -> EngineStats {
        let core = self.inner.core.lock();
        EngineStats {
            node_id: self.node_id(),
            backplane_id: self.backplane_id(),
            neuron_count: core.neurons.len(),
            synapse_count: core.synapses.values().map(Vec::len).sum(),
            running: self.is_running(),
            current_time_us: core.current_time_us,
            timestep_us: core.timestep_us,
            total_spikes_received: self.inner.spikes_received.load(Ordering::Relaxed),
            total_spikes_sent: core.counters.spikes_sent,
            neurons_spiked: core.counters.neurons_spiked,
            simulation_steps: core.counters.simulation_steps,
            stdp_updates: core.counters.stdp_updates,
            weight_increases: core.counters.weight_increases,
            weight_decreases: core.counters.weight_decreases,
            stdp_enabled: self.inner.stdp.enabled,
        }
    }

    /// Snapshot of one neuron's state, if present
    pub fn neuron_state(&self, neuron_id: NeuronId) -> Option<NeuronView> {
        let core = self.inner.core.lock();
        let neuron = core.neurons.get(&neuron_id)?;
        Some(neuron_view(neuron, &core.synapses))
    }

    /// Snapshot of every neuron's state, in local id order
    pub fn neurons(&self) -> Vec<NeuronView> {
        let core = self.inner.core.lock();
        core.neurons
            .values()
            .map(|n| neuron_view(n, &core.synapses))
            .collect()
    }

    /// Snapshot of a neuron's incoming synapses, in table order
    pub fn synapse_state(&self, neuron_id: NeuronId) -> Vec<SynapseView> {
        let core = self.inner.core.lock();
        core.synapses
            .get(&neuron_id)
            .map(|list| {
                list.iter()
                    .map(|s| SynapseView {
                        source_id: s.source.raw(),
                        weight: s.weight,
                        delay_us: s.delay_us,
                        last_update_time_us: s.last_update_time_us,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl EngineInner {
    fn step(&self) {
        let events: Vec<IncomingEvent> = {
            let mut queue = self.incoming.lock();
            queue.drain(..).collect()
        };

        let mut core = self.core.lock();
        core.current_time_us += core.timestep_us;
        core.counters.simulation_steps += 1;

        let mut fired = Vec::new();
        let EngineCore {
            neurons,
            synapses,
            history,
            current_time_us,
            timestep_us,
            counters,
        } = &mut *core;
        let now = *current_time_us;

        for event in events {
            match event {
                IncomingEvent::Injected { neuron_id, value } => {
                    apply_injection(
                        neurons, synapses, history, counters, &self.stdp, self.node_id,
                        self.backplane_id, now, neuron_id, value, &mut fired,
                    );
                }
                IncomingEvent::Routed(spike) => {
                    apply_spike(
                        neurons, synapses, history, counters, &self.stdp, self.node_id,
                        self.backplane_id, now, &spike, &mut fired,
                    );
                }
            }
        }

        // Leak pass: decay positive potentials; residual potential left by
        // a refractory-blocked fire may still cross threshold here.
        for (&id, neuron) in neurons.iter_mut() {
            if neuron.membrane_potential > 0.0 {
                neuron.membrane_potential *= neuron.leak_rate;
                if neuron.membrane_potential >= neuron.threshold {
                    let list = synapses.entry(id).or_default();
                    fire_neuron(
                        neuron, list, history, counters, &self.stdp, self.node_id,
                        self.backplane_id, now, &mut fired,
                    );
                }
            }
        }

        if self.stdp.enabled {
            let pre_decay = self.stdp.pre_trace_decay(*timestep_us);
            let post_decay = self.stdp.post_trace_decay(*timestep_us);
            for neuron in neurons.values_mut() {
                neuron.pre_trace *= pre_decay;
                neuron.post_trace *= post_decay;
            }
        }

        drop(core);

        if !fired.is_empty() {
            self.outgoing.lock().extend(fired);
        }
    }

    fn run_loop(self: Arc<Self>) {
        let period = Duration::from_micros(self.core.lock().timestep_us);
        let mut next_deadline = Instant::now() + period;

        while self.running.load(Ordering::SeqCst) {
            self.step();

            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
                next_deadline += period;
            } else {
                next_deadline = now + period;
            }
        }
    }
}

fn neuron_view(neuron: &Neuron, synapses: &BTreeMap<NeuronId, Vec<Synapse>>) -> NeuronView {
    NeuronView {
        id: neuron.local_id.raw(),
        membrane_potential: neuron.membrane_potential,
        threshold: neuron.threshold,
        leak_rate: neuron.leak_rate,
        refractory_period_us: neuron.refractory_period_us,
        synapse_count: synapses.get(&neuron.local_id).map_or(0, Vec::len),
        last_spike_time_us: neuron.last_spike_time_us.unwrap_or(0),
        flags: neuron.flags,
        pre_trace: neuron.pre_trace,
        post_trace: neuron.post_trace,
    }
}

/// Apply an external injection at the current step
#[allow(clippy::too_many_arguments)]
fn apply_injection(
    neurons: &mut BTreeMap<NeuronId, Neuron>,
    synapses: &mut BTreeMap<NeuronId, Vec<Synapse>>,
    history: &mut SpikeHistory,
    counters: &mut Counters,
    stdp: &StdpConfig,
    node_id: u8,
    backplane_id: u8,
    now_us: u64,
    neuron_id: NeuronId,
    value: f32,
    fired: &mut Vec<Spike>,
) {
    let Some(neuron) = neurons.get_mut(&neuron_id) else {
        log::warn!("[snn-{backplane_id}-{node_id}] inject: neuron {neuron_id} not found");
        return;
    };
    let list = synapses.entry(neuron_id).or_default();

    if list.is_empty() {
        // Input neurons carry no synapses; external stimulus fires them
        // directly, bypassing membrane integration.
        log::trace!("[snn-{backplane_id}-{node_id}] {neuron_id} injected, firing directly");
        fire_neuron(
            neuron, list, history, counters, stdp, node_id, backplane_id, now_us, fired,
        );
    } else {
        neuron.membrane_potential += value;
        log::trace!(
            "[snn-{backplane_id}-{node_id}] {neuron_id} injected, V_mem={}",
            neuron.membrane_potential,
        );
        if neuron.membrane_potential >= neuron.threshold {
            fire_neuron(
                neuron, list, history, counters, stdp, node_id, backplane_id, now_us, fired,
            );
        }
    }
}

/// Apply a routed spike at the current step
#[allow(clippy::too_many_arguments)]
fn apply_spike(
    neurons: &mut BTreeMap<NeuronId, Neuron>,
    synapses: &mut BTreeMap<NeuronId, Vec<Synapse>>,
    history: &mut SpikeHistory,
    counters: &mut Counters,
    stdp: &StdpConfig,
    node_id: u8,
    backplane_id: u8,
    now_us: u64,
    spike: &Spike,
    fired: &mut Vec<Spike>,
) {
    let source = spike.global_id();
    log::trace!(
        "[snn-{backplane_id}-{node_id}] spike from {source} (neuron {} @ node {})",
        spike.neuron_id,
        spike.source_node,
    );

    if stdp.enabled {
        history.record_pre(source, now_us);
    }

    for (&target_id, list) in synapses.iter_mut() {
        let Some(neuron) = neurons.get_mut(&target_id) else {
            continue;
        };
        // A refractory target absorbs nothing from this spike.
        if neuron.is_refractory(now_us) {
            continue;
        }

        let mut crossed = false;
        for synapse in list.iter_mut() {
            if synapse.source != source {
                continue;
            }

            neuron.membrane_potential += synapse.weight * spike.value;
            log::trace!(
                "[snn-{backplane_id}-{node_id}]   -> {target_id}: V_mem={} (threshold={})",
                neuron.membrane_potential,
                neuron.threshold,
            );

            if stdp.enabled {
                // Post fired before this arrival: depression.
                if let Some(t_post) = history.last_post_before(target_id, now_us) {
                    if let Some(delta) = stdp.depression(now_us - t_post) {
                        update_weight(synapse, delta, stdp, counters, now_us);
                    }
                }
            }

            if neuron.membrane_potential >= neuron.threshold {
                crossed = true;
                break;
            }
        }

        if crossed {
            fire_neuron(
                neuron, list, history, counters, stdp, node_id, backplane_id, now_us, fired,
            );
        }
    }
}

/// Fire a neuron, subject to its refractory window
#[allow(clippy::too_many_arguments)]
fn fire_neuron(
    neuron: &mut Neuron,
    synapses: &mut [Synapse],
    history: &mut SpikeHistory,
    counters: &mut Counters,
    stdp: &StdpConfig,
    node_id: u8,
    backplane_id: u8,
    now_us: u64,
    fired: &mut Vec<Spike>,
) -> bool {
    if neuron.is_refractory(now_us) {
        return false;
    }

    log::trace!(
        "[snn-{backplane_id}-{node_id}] {} fired at {now_us}µs",
        neuron.local_id,
    );

    neuron.reset_after_fire(now_us);
    counters.spikes_sent += 1;
    counters.neurons_spiked += 1;

    if stdp.enabled {
        neuron.post_trace += 1.0;
        history.record_post(neuron.local_id, now_us);

        // Pre arrived before this fire: potentiation over every incoming
        // synapse with a pairable arrival.
        for synapse in synapses.iter_mut() {
            if let Some(t_pre) = history.last_pre_before(synapse.source, now_us) {
                if let Some(delta) = stdp.potentiation(now_us - t_pre) {
                    update_weight(synapse, delta, stdp, counters, now_us);
                }
            }
        }
    }

    fired.push(Spike::new(neuron.local_id, node_id, backplane_id, now_us));
    true
}

/// Apply a weight delta with clamping and statistics
fn update_weight(
    synapse: &mut Synapse,
    delta: f32,
    stdp: &StdpConfig,
    counters: &mut Counters,
    now_us: u64,
) {
    let old = synapse.weight;
    synapse.weight = stdp.clamp_weight(synapse.weight + delta);
    synapse.last_update_time_us = now_us;

    counters.stdp_updates += 1;
    if delta > 0.0 {
        counters.weight_increases += 1;
    } else {
        counters.weight_decreases += 1;
    }

    log::trace!(
        "[stdp] {}: weight {old} -> {} (dW={delta:+})",
        synapse.source,
        synapse.weight,
    );
}
