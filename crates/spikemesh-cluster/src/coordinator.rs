//! The cluster coordinator and its routing loop

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use spikemesh_engine::{NeuronId, SnnEngine, Spike};

use crate::error::{ClusterError, Result};
use crate::status::{ClusterStatus, EngineSummary, NeuronSummary};

/// Bound on the recent-spike feed; the oldest entry is evicted at capacity
pub const GLOBAL_SPIKE_BUFFER_CAPACITY: usize = 10_000;

/// Routing task cadence
const ROUTING_INTERVAL: Duration = Duration::from_millis(1);

/// How long `stop_all` waits for the routing task to observe the run flag
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Engine registry preserving registration order
#[derive(Default)]
struct Registry {
    engines: HashMap<(u8, u8), SnnEngine>,
    order: Vec<(u8, u8)>,
}

impl Registry {
    fn ordered(&self) -> Vec<SnnEngine> {
        self.order
            .iter()
            .map(|key| self.engines[key].clone())
            .collect()
    }
}

/// State shared between the public handle and the routing task
#[derive(Default)]
struct CoordinatorInner {
    registry: Mutex<Registry>,
    buffer: Mutex<VecDeque<Spike>>,
    routing_active: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Hosts engines keyed by `(backplane_id, node_id)` and routes spikes
/// between them
///
/// Broadcast is unconditional: every drained spike reaches every engine,
/// including its producer; filtering happens at the synapse match inside
/// each engine. The coordinator is a cheap-to-clone handle; clones share
/// the same registry, buffer, and routing task.
#[derive(Clone, Default)]
pub struct ClusterCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl ClusterCoordinator {
    /// Create an empty coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine under its `(backplane_id, node_id)` key
    ///
    /// A second registration under the same key fails.
    pub fn register_engine(&self, engine: SnnEngine) -> Result<()> {
        let key = (engine.backplane_id(), engine.node_id());
        let mut registry = self.inner.registry.lock();
        if registry.engines.contains_key(&key) {
            return Err(ClusterError::EngineExists {
                backplane: key.0,
                node: key.1,
            });
        }
        registry.order.push(key);
        registry.engines.insert(key, engine);
        log::info!("Registered engine ({}, {})", key.0, key.1);
        Ok(())
    }

    /// Stop and remove the engine under the given key
    ///
    /// Returns whether an engine was present; an unknown key has no
    /// effect.
    pub fn unregister_engine(&self, backplane_id: u8, node_id: u8) -> bool {
        let key = (backplane_id, node_id);
        let removed = {
            let mut registry = self.inner.registry.lock();
            registry.order.retain(|k| *k != key);
            registry.engines.remove(&key)
        };
        match removed {
            Some(engine) => {
                engine.stop();
                log::info!("Unregistered engine ({}, {})", key.0, key.1);
                true
            }
            None => false,
        }
    }

    /// Handle to the engine under the given key
    pub fn engine(&self, backplane_id: u8, node_id: u8) -> Option<SnnEngine> {
        self.inner
            .registry
            .lock()
            .engines
            .get(&(backplane_id, node_id))
            .cloned()
    }

    /// Whether the routing task is running
    pub fn is_routing(&self) -> bool {
        self.inner.routing_active.load(Ordering::SeqCst)
    }

    /// Start every registered engine, then launch the routing task
    pub fn start_all(&self, timestep_us: u64) -> Result<()> {
        let engines = self.inner.registry.lock().ordered();
        for engine in &engines {
            engine.start(timestep_us)?;
        }

        if self.inner.routing_active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        match thread::Builder::new()
            .name("spike-router".to_string())
            .spawn(move || inner.routing_loop())
        {
            Ok(handle) => {
                *self.inner.handle.lock() = Some(handle);
                log::info!("Started {} engines and spike routing", engines.len());
                Ok(())
            }
            Err(err) => {
                self.inner.routing_active.store(false, Ordering::SeqCst);
                for engine in engines.iter().rev() {
                    engine.stop();
                }
                Err(ClusterError::Engine {
                    source: spikemesh_engine::EngineError::invalid_config(format!(
                        "failed to spawn routing task: {err}"
                    )),
                })
            }
        }
    }

    /// Stop the routing task, then every engine in reverse registration
    /// order
    pub fn stop_all(&self) {
        self.inner.routing_active.store(false, Ordering::SeqCst);
        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::warn!("Routing task did not stop within {:?}", JOIN_TIMEOUT);
            }
        }

        let engines = self.inner.registry.lock().ordered();
        for engine in engines.iter().rev() {
            engine.stop();
        }
        log::info!("Stopped routing and {} engines", engines.len());
    }

    /// Dispatch an external spike to the addressed engine
    ///
    /// Returns the number of injections effected: 0 for an unknown key,
    /// 1 otherwise.
    pub fn inject_spike(
        &self,
        backplane_id: u8,
        node_id: u8,
        neuron_id: NeuronId,
        value: f32,
    ) -> usize {
        match self.engine(backplane_id, node_id) {
            Some(engine) => {
                engine.inject_spike(neuron_id, value);
                1
            }
            None => 0,
        }
    }

    /// Run one routing tick: drain every engine's outgoing queue and
    /// broadcast each drained spike to every engine
    ///
    /// Engines are drained in registration order; all spikes of an
    /// earlier engine are delivered before any of a later one. Returns
    /// the number of spikes routed. The routing task calls this every
    /// ~1 ms; tests and embedders may call it directly for deterministic
    /// stepping.
    pub fn route_once(&self) -> usize {
        self.inner.route_once()
    }

    /// Snapshot of up to the last `count` routed spikes, oldest first
    pub fn recent_spikes(&self, count: usize) -> Vec<Spike> {
        let buffer = self.inner.buffer.lock();
        let skip = buffer.len().saturating_sub(count);
        buffer.iter().skip(skip).copied().collect()
    }

    /// Cluster-wide activity snapshot
    pub fn status(&self) -> ClusterStatus {
        let engines = self.inner.registry.lock().ordered();

        let mut status = ClusterStatus {
            total_engines: engines.len(),
            total_neurons: 0,
            total_spikes_sent: 0,
            total_spikes_received: 0,
            total_stdp_updates: 0,
            routing_active: self.is_routing(),
            stdp_enabled: false,
        };
        for engine in &engines {
            let stats = engine.stats();
            status.total_neurons += stats.neuron_count;
            status.total_spikes_sent += stats.total_spikes_sent;
            status.total_spikes_received += stats.total_spikes_received;
            status.total_stdp_updates += stats.stdp_updates;
            status.stdp_enabled |= stats.stdp_enabled;
        }
        status
    }

    /// Per-engine neuron listing, in registration order
    pub fn engines(&self) -> Vec<EngineSummary> {
        let engines = self.inner.registry.lock().ordered();
        engines
            .iter()
            .map(|engine| EngineSummary {
                backplane: engine.backplane_id(),
                node: engine.node_id(),
                neurons: engine
                    .neurons()
                    .into_iter()
                    .map(|n| NeuronSummary {
                        id: n.id,
                        threshold: n.threshold,
                        leak_rate: n.leak_rate,
                        synapse_count: n.synapse_count,
                        last_spike_time_us: n.last_spike_time_us,
                    })
                    .collect(),
            })
            .collect()
    }
}

impl CoordinatorInner {
    fn route_once(&self) -> usize {
        let engines = self.registry.lock().ordered();

        let mut drained = Vec::new();
        for engine in &engines {
            drained.extend(engine.take_outgoing_spikes());
        }
        if drained.is_empty() {
            return 0;
        }

        {
            let mut buffer = self.buffer.lock();
            for &spike in &drained {
                if buffer.len() == GLOBAL_SPIKE_BUFFER_CAPACITY {
                    buffer.pop_front();
                }
                buffer.push_back(spike);
            }
        }

        for &spike in &drained {
            for engine in &engines {
                engine.push_incoming(spike);
            }
        }

        log::trace!("Routed {} spikes to {} engines", drained.len(), engines.len());
        drained.len()
    }

    fn routing_loop(self: Arc<Self>) {
        while self.routing_active.load(Ordering::SeqCst) {
            self.route_once();
            thread::sleep(ROUTING_INTERVAL);
        }
    }
}
