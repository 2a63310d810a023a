//! Topology compilation: node assignment, connection generation, and
//! table packing

use std::collections::BTreeMap;
use std::path::Path;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};

use spikemesh_table::{
    encode_table, flags, quantize_weight, GlobalId, NeuronEntry, NeuronId, SynapseSlot,
    SYNAPSE_SLOT_COUNT,
};

use crate::error::{Result, TopologyError};
use crate::model::{Connection, ConnectionType, LayerType, Strategy, Topology, WeightInit};

/// Where a neuron landed: node and local slot within that node's table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Target node id
    pub node_id: u8,
    /// Local id within the node's table (also the table slot index)
    pub local_id: NeuronId,
}

impl Placement {
    /// Packed presynaptic id of the placed neuron
    pub fn global_id(&self) -> GlobalId {
        GlobalId::pack(self.node_id, self.local_id)
    }
}

/// Summary of a compiled deployment
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeploymentInfo {
    /// Network name from the topology
    pub network_name: String,
    /// Declared neuron count
    pub neuron_count: u32,
    /// Number of nodes that received neurons
    pub nodes_used: usize,
    /// Neurons placed per node
    pub neurons_per_node: BTreeMap<u8, usize>,
    /// Synapses emitted across all tables
    pub total_synapses: usize,
    /// Candidate synapses dropped by the per-target capacity
    pub dropped_synapses: usize,
}

/// The compiler's output: per-node tables plus placement metadata
#[derive(Debug, Clone)]
pub struct CompiledNetwork {
    /// Binary neuron table per node, keyed by node id
    pub tables: BTreeMap<u8, Vec<u8>>,
    /// Global topology id to node/local placement
    pub placements: BTreeMap<u32, Placement>,
    /// Deployment summary
    pub info: DeploymentInfo,
}

/// Internal per-neuron build state
struct NeuronConfig {
    placement: Placement,
    flags: u16,
    threshold: f32,
    leak_rate: f32,
    refractory_period_us: u32,
    synapses: Vec<SynapseSlot>,
}

/// Compiles a topology into per-node neuron tables
pub struct TopologyCompiler {
    topology: Topology,
    seed: Option<u64>,
}

impl TopologyCompiler {
    /// Create a compiler for the given topology
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            seed: None,
        }
    }

    /// Seed the weight-initialization RNG for reproducible output
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Run the full pipeline: validate, assign, connect, pack
    pub fn compile(self) -> Result<CompiledNetwork> {
        self.validate()?;

        let node_lists = self.assign_neurons();
        let placements = Self::build_placements(&node_lists)?;
        let mut configs = self.build_neuron_configs(&placements)?;
        let dropped = self.generate_connections(&mut configs, &placements)?;
        let tables = Self::pack_tables(&node_lists, &configs)?;

        let total_synapses = configs.values().map(|c| c.synapses.len()).sum();
        let info = DeploymentInfo {
            network_name: self.topology.network_name.clone(),
            neuron_count: self.topology.neuron_count,
            nodes_used: node_lists.len(),
            neurons_per_node: node_lists
                .iter()
                .map(|(node, list)| (*node, list.len()))
                .collect(),
            total_synapses,
            dropped_synapses: dropped,
        };

        log::info!(
            "Compiled '{}': {} neurons over {} nodes, {} synapses ({} dropped)",
            info.network_name,
            info.neuron_count,
            info.nodes_used,
            info.total_synapses,
            info.dropped_synapses,
        );

        Ok(CompiledNetwork {
            tables,
            placements,
            info,
        })
    }

    fn validate(&self) -> Result<()> {
        let topology = &self.topology;

        let nodes = &topology.node_assignment.nodes;
        if nodes.is_empty() {
            return Err(TopologyError::NoNodes);
        }
        for &node in nodes {
            if node > u8::MAX as u32 {
                return Err(TopologyError::NodeOutOfRange { node });
            }
        }
        for (i, &node) in nodes.iter().enumerate() {
            if nodes[..i].contains(&node) {
                return Err(TopologyError::DuplicateNode { node });
            }
        }

        for layer in &topology.layers {
            if layer.start() > layer.end() || layer.end() >= topology.neuron_count {
                return Err(TopologyError::InvalidRange {
                    layer_id: layer.layer_id,
                    start: layer.start(),
                    end: layer.end(),
                    neuron_count: topology.neuron_count,
                });
            }
        }

        for (i, a) in topology.layers.iter().enumerate() {
            for b in &topology.layers[i + 1..] {
                if a.layer_id == b.layer_id {
                    return Err(TopologyError::invalid_parameter(
                        "layer_id",
                        a.layer_id.to_string(),
                        "unique layer ids",
                    ));
                }
                if a.start() <= b.end() && b.start() <= a.end() {
                    return Err(TopologyError::OverlappingLayers {
                        first: a.layer_id,
                        second: b.layer_id,
                    });
                }
            }
        }

        for conn in &topology.connections {
            for layer_id in [conn.source_layer, conn.target_layer] {
                if !topology.layers.iter().any(|l| l.layer_id == layer_id) {
                    return Err(TopologyError::UnknownLayer { layer_id });
                }
            }
            if !(0.0..=1.0).contains(&conn.connection_probability) {
                return Err(TopologyError::invalid_parameter(
                    "connection_probability",
                    conn.connection_probability.to_string(),
                    "in [0.0, 1.0]",
                ));
            }
            if conn.weight_stddev < 0.0 {
                return Err(TopologyError::invalid_parameter(
                    "weight_stddev",
                    conn.weight_stddev.to_string(),
                    ">= 0.0",
                ));
            }
            if conn.weight_min > conn.weight_max {
                return Err(TopologyError::invalid_parameter(
                    "weight_min",
                    format!("{} (with weight_max={})", conn.weight_min, conn.weight_max),
                    "<= weight_max",
                ));
            }
        }

        Ok(())
    }

    /// Place global neuron ids onto nodes, preserving node-list order
    fn assign_neurons(&self) -> Vec<(u8, Vec<u32>)> {
        let assignment = &self.topology.node_assignment;
        let nodes: Vec<u8> = assignment.nodes.iter().map(|&n| n as u8).collect();
        let total = self.topology.neuron_count;

        match assignment.strategy {
            Strategy::Balanced => {
                let per_node = total as usize / nodes.len();
                let mut lists: Vec<(u8, Vec<u32>)> =
                    nodes.iter().map(|&n| (n, Vec::new())).collect();

                let mut next = 0u32;
                for (_, list) in lists.iter_mut() {
                    for _ in 0..per_node {
                        if next < total {
                            list.push(next);
                            next += 1;
                        }
                    }
                }

                // Remainder goes round-robin from the first node.
                let mut idx = 0;
                while next < total {
                    lists[idx].1.push(next);
                    next += 1;
                    idx = (idx + 1) % lists.len();
                }

                lists
            }
            Strategy::LayerBased => {
                let mut lists: Vec<(u8, Vec<u32>)> = Vec::new();
                for (i, layer) in self.topology.layers.iter().enumerate() {
                    let node = nodes[i % nodes.len()];
                    let pos = match lists.iter().position(|(n, _)| *n == node) {
                        Some(pos) => pos,
                        None => {
                            lists.push((node, Vec::new()));
                            lists.len() - 1
                        }
                    };
                    lists[pos].1.extend(layer.start()..=layer.end());
                }
                lists
            }
        }
    }

    fn build_placements(node_lists: &[(u8, Vec<u32>)]) -> Result<BTreeMap<u32, Placement>> {
        let mut placements = BTreeMap::new();
        for (node, list) in node_lists {
            if list.len() > u16::MAX as usize + 1 {
                return Err(TopologyError::invalid_parameter(
                    "neurons_per_node",
                    list.len().to_string(),
                    "<= 65536 (16-bit local ids)",
                ));
            }
            for (local, &global) in list.iter().enumerate() {
                placements.insert(
                    global,
                    Placement {
                        node_id: *node,
                        local_id: NeuronId::new(local as u16),
                    },
                );
            }
        }
        Ok(placements)
    }

    fn build_neuron_configs(
        &self,
        placements: &BTreeMap<u32, Placement>,
    ) -> Result<BTreeMap<u32, NeuronConfig>> {
        let mut configs = BTreeMap::new();

        for layer in &self.topology.layers {
            let mut neuron_flags = flags::ACTIVE;
            match layer.layer_type {
                LayerType::Input => neuron_flags |= flags::INPUT,
                LayerType::Output => neuron_flags |= flags::OUTPUT,
                LayerType::Hidden => {}
            }

            for global in layer.start()..=layer.end() {
                let placement = *placements
                    .get(&global)
                    .ok_or(TopologyError::UnassignedNeuron { neuron_id: global })?;
                configs.insert(
                    global,
                    NeuronConfig {
                        placement,
                        flags: neuron_flags,
                        threshold: layer.threshold,
                        leak_rate: layer.leak_rate,
                        refractory_period_us: layer.refractory_period_us,
                        synapses: Vec::new(),
                    },
                );
            }
        }

        Ok(configs)
    }

    /// Generate synapses for every declared connection
    ///
    /// Targets and sources are enumerated ascending; together with the
    /// seeded RNG this ordering is the determinism contract. Returns the
    /// number of candidates dropped by the per-target capacity.
    fn generate_connections(
        &self,
        configs: &mut BTreeMap<u32, NeuronConfig>,
        placements: &BTreeMap<u32, Placement>,
    ) -> Result<usize> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut dropped_total = 0usize;

        for conn in &self.topology.connections {
            let source = self.layer(conn.source_layer)?;
            let target = self.layer(conn.target_layer)?;
            let sampler = WeightSampler::new(conn)?;

            let mut dropped = 0usize;
            for target_id in target.start()..=target.end() {
                let config = configs
                    .get_mut(&target_id)
                    .ok_or(TopologyError::UnassignedNeuron { neuron_id: target_id })?;

                for source_id in source.start()..=source.end() {
                    match conn.connection_type {
                        ConnectionType::FullyConnected => {
                            // The weight is drawn for every pair so the RNG
                            // stream is independent of the capacity cutoff.
                            let weight = quantize_weight(sampler.sample(&mut rng));
                            if config.synapses.len() < SYNAPSE_SLOT_COUNT {
                                let source_gid = placements
                                    .get(&source_id)
                                    .ok_or(TopologyError::UnassignedNeuron {
                                        neuron_id: source_id,
                                    })?
                                    .global_id();
                                config.synapses.push(SynapseSlot::new(source_gid, weight));
                            } else {
                                dropped += 1;
                            }
                        }
                        ConnectionType::SparseRandom => {
                            if rng.gen::<f32>() >= conn.connection_probability {
                                continue;
                            }
                            let weight = quantize_weight(sampler.sample(&mut rng));
                            if config.synapses.len() < SYNAPSE_SLOT_COUNT {
                                let source_gid = placements
                                    .get(&source_id)
                                    .ok_or(TopologyError::UnassignedNeuron {
                                        neuron_id: source_id,
                                    })?
                                    .global_id();
                                config.synapses.push(SynapseSlot::new(source_gid, weight));
                            } else {
                                dropped += 1;
                            }
                        }
                    }
                }
            }

            if dropped > 0 && conn.connection_type == ConnectionType::FullyConnected {
                log::warn!(
                    "Connection {}->{}: dropped {} synapses past per-target capacity {}",
                    conn.source_layer,
                    conn.target_layer,
                    dropped,
                    SYNAPSE_SLOT_COUNT,
                );
            }
            dropped_total += dropped;
        }

        Ok(dropped_total)
    }

    fn pack_tables(
        node_lists: &[(u8, Vec<u32>)],
        configs: &BTreeMap<u32, NeuronConfig>,
    ) -> Result<BTreeMap<u8, Vec<u8>>> {
        let mut tables = BTreeMap::new();

        for (node, list) in node_lists {
            let mut entries = Vec::with_capacity(list.len());
            for &global in list {
                // Neurons outside every layer have no parameters and are
                // omitted from the table, like any other absent id.
                let Some(config) = configs.get(&global) else {
                    continue;
                };
                let mut entry = NeuronEntry::new(
                    config.placement.local_id,
                    config.flags,
                    config.threshold,
                    config.leak_rate,
                    config.refractory_period_us,
                )?;
                entry.synapses = config.synapses.clone();
                entries.push(entry);
            }
            tables.insert(*node, encode_table(&entries)?);
        }

        Ok(tables)
    }

    fn layer(&self, layer_id: u32) -> Result<&crate::model::Layer> {
        self.topology
            .layers
            .iter()
            .find(|l| l.layer_id == layer_id)
            .ok_or(TopologyError::UnknownLayer { layer_id })
    }
}

/// Weight draw for one connection declaration
enum WeightSampler {
    Normal(Normal<f32>),
    Uniform(Uniform<f32>),
    Constant(f32),
}

impl WeightSampler {
    fn new(conn: &Connection) -> Result<Self> {
        Ok(match conn.weight_init {
            WeightInit::RandomNormal => Self::Normal(
                Normal::new(conn.weight_mean, conn.weight_stddev).map_err(|_| {
                    TopologyError::invalid_parameter(
                        "weight_stddev",
                        conn.weight_stddev.to_string(),
                        "finite and >= 0.0",
                    )
                })?,
            ),
            WeightInit::RandomUniform => {
                Self::Uniform(Uniform::new_inclusive(conn.weight_min, conn.weight_max))
            }
            WeightInit::Constant => Self::Constant(conn.weight_value),
        })
    }

    /// Draw one weight, clamped to the representable [0, 1]
    fn sample(&self, rng: &mut StdRng) -> f32 {
        let weight = match self {
            Self::Normal(dist) => dist.sample(rng),
            Self::Uniform(dist) => dist.sample(rng),
            Self::Constant(value) => *value,
        };
        weight.clamp(0.0, 1.0)
    }
}

/// Read a topology JSON file and compile it
pub fn compile_topology_file(path: impl AsRef<Path>, seed: Option<u64>) -> Result<CompiledNetwork> {
    let data = std::fs::read_to_string(path)?;
    let topology: Topology = serde_json::from_str(&data)?;
    let mut compiler = TopologyCompiler::new(topology);
    if let Some(seed) = seed {
        compiler = compiler.with_seed(seed);
    }
    compiler.compile()
}
