//! Compiler-to-engine table loading round-trip

use spikemesh_engine::{NeuronId, SnnEngine, StdpConfig};
use spikemesh_table::decode_table;
use spikemesh_topology::{
    Connection, ConnectionType, Layer, LayerType, NodeAssignment, Strategy, Topology,
    TopologyCompiler, WeightInit,
};

fn two_layer_topology(weight_init: WeightInit) -> Topology {
    Topology {
        network_name: "roundtrip".to_string(),
        neuron_count: 8,
        layers: vec![
            Layer {
                layer_id: 0,
                layer_type: LayerType::Input,
                neuron_ids: [0, 3],
                threshold: 1.25,
                leak_rate: 0.9,
                refractory_period_us: 2500,
            },
            Layer {
                layer_id: 1,
                layer_type: LayerType::Output,
                neuron_ids: [4, 7],
                threshold: 0.75,
                leak_rate: 0.85,
                refractory_period_us: 500,
            },
        ],
        connections: vec![Connection {
            source_layer: 0,
            target_layer: 1,
            connection_type: ConnectionType::FullyConnected,
            weight_init,
            weight_mean: 0.5,
            weight_stddev: 0.15,
            weight_min: 0.0,
            weight_max: 1.0,
            weight_value: 0.5,
            connection_probability: 0.1,
        }],
        node_assignment: NodeAssignment {
            strategy: Strategy::Balanced,
            nodes: vec![0, 1],
        },
    }
}

#[test]
fn loaded_engine_matches_compiled_tables() {
    let _ = env_logger::builder().is_test(true).try_init();

    let compiled = TopologyCompiler::new(two_layer_topology(WeightInit::RandomNormal))
        .with_seed(1234)
        .compile()
        .unwrap();

    for (&node, table) in &compiled.tables {
        let engine = SnnEngine::new(node, 0, StdpConfig::default()).unwrap();
        engine.load_table(table).unwrap();

        let entries = decode_table(table).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.neuron_count, entries.len());
        assert_eq!(
            stats.synapse_count,
            entries.iter().map(|e| e.synapses.len()).sum::<usize>()
        );

        for entry in &entries {
            let view = engine.neuron_state(entry.local_id).unwrap();
            // Thresholds, leak, and refractory round-trip exactly.
            assert_eq!(view.threshold, entry.threshold);
            assert_eq!(view.leak_rate, entry.leak_rate);
            assert_eq!(view.refractory_period_us, entry.refractory_period_us as u64);
            assert_eq!(view.flags, entry.flags);
            assert_eq!(view.last_spike_time_us, 0);
            assert_eq!(view.synapse_count, entry.synapses.len());

            // Weights round-trip within one quantization step, ordering
            // preserved.
            let synapses = engine.synapse_state(entry.local_id);
            assert_eq!(synapses.len(), entry.synapses.len());
            for (loaded, slot) in synapses.iter().zip(&entry.synapses) {
                assert_eq!(loaded.source_id, slot.source.raw());
                let compiled_weight = slot.weight as f32 / 255.0;
                assert!((loaded.weight - compiled_weight).abs() <= 1.0 / 255.0);
            }
        }
    }
}

#[test]
fn reload_replaces_previous_state() {
    let compiled = TopologyCompiler::new(two_layer_topology(WeightInit::Constant))
        .compile()
        .unwrap();
    let engine = SnnEngine::new(0, 0, StdpConfig::default()).unwrap();

    engine.load_table(&compiled.tables[&0]).unwrap();
    let before = engine.stats().neuron_count;

    // Advance time and fire something, then reload.
    engine.inject_spike(NeuronId::new(0), 1.0);
    engine.step();
    assert!(engine.stats().current_time_us > 0);

    engine.load_table(&compiled.tables[&0]).unwrap();
    let stats = engine.stats();
    assert_eq!(stats.neuron_count, before);
    assert_eq!(stats.current_time_us, 0);
    for view in engine.neurons() {
        assert_eq!(view.membrane_potential, 0.0);
        assert_eq!(view.last_spike_time_us, 0);
    }
}

#[test]
fn trailing_garbage_fails_load() {
    let compiled = TopologyCompiler::new(two_layer_topology(WeightInit::Constant))
        .compile()
        .unwrap();
    let engine = SnnEngine::new(0, 0, StdpConfig::default()).unwrap();

    let mut bytes = compiled.tables[&0].clone();
    bytes.extend_from_slice(&[1, 2, 3]);
    assert!(engine.load_table(&bytes).is_err());
    // The failed load left no partial state behind.
    assert_eq!(engine.stats().neuron_count, 0);
}
