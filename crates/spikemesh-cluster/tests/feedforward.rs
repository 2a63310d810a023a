//! Minimal feed-forward scenario: an injected input spike propagates
//! through the bus and fires a downstream neuron

use std::thread;
use std::time::Duration;

use spikemesh_cluster::{ClusterCoordinator, NeuronId, SnnEngine, StdpConfig};
use spikemesh_engine::{GlobalId, Neuron, Synapse};

fn two_neuron_engine() -> SnnEngine {
    let engine = SnnEngine::new(0, 0, StdpConfig::default()).unwrap();
    // Neuron 0: input, no incoming synapses.
    engine
        .insert_neuron(Neuron::new(NeuronId::new(0), 1.0, 0.95, 1000).unwrap())
        .unwrap();
    // Neuron 1: listens to neuron 0 with a supra-threshold weight.
    engine
        .insert_neuron(Neuron::new(NeuronId::new(1), 1.0, 0.95, 1000).unwrap())
        .unwrap();
    engine
        .insert_synapse(
            NeuronId::new(1),
            Synapse::new(GlobalId::pack(0, NeuronId::new(0)), 1.2),
        )
        .unwrap();
    engine
}

#[test]
fn injected_spike_propagates_to_downstream_neuron() {
    let coordinator = ClusterCoordinator::new();
    let engine = two_neuron_engine();
    coordinator.register_engine(engine.clone()).unwrap();

    assert_eq!(coordinator.inject_spike(0, 0, NeuronId::new(0), 1.0), 1);

    // Step 1: the input neuron fires directly; route its spike.
    engine.step();
    assert_eq!(coordinator.route_once(), 1);

    // Step 2: neuron 1 integrates 1.2 >= 1.0 and fires.
    engine.step();
    assert_eq!(coordinator.route_once(), 1);

    let spikes = coordinator.recent_spikes(10);
    assert_eq!(spikes.len(), 2);
    assert_eq!(spikes[0].neuron_id, NeuronId::new(0));
    assert_eq!(spikes[1].neuron_id, NeuronId::new(1));
    assert!(spikes[0].timestamp_us < spikes[1].timestamp_us);

    let status = coordinator.status();
    assert_eq!(status.total_spikes_sent, 2);
    // One injection plus both broadcast deliveries.
    assert_eq!(status.total_spikes_received, 3);
}

#[test]
fn feedforward_runs_under_background_tasks() {
    let _ = env_logger::builder().is_test(true).try_init();

    let coordinator = ClusterCoordinator::new();
    let engine = two_neuron_engine();
    coordinator.register_engine(engine.clone()).unwrap();

    coordinator.start_all(1000).unwrap();
    assert!(coordinator.is_routing());
    assert!(engine.is_running());

    coordinator.inject_spike(0, 0, NeuronId::new(0), 1.0);
    thread::sleep(Duration::from_millis(100));
    coordinator.stop_all();

    assert!(!coordinator.is_routing());
    assert!(!engine.is_running());

    let spikes = coordinator.recent_spikes(10);
    assert!(spikes.iter().any(|s| s.neuron_id == NeuronId::new(0)));
    assert!(spikes.iter().any(|s| s.neuron_id == NeuronId::new(1)));

    // No new side effects after stop_all returns.
    let sent = coordinator.status().total_spikes_sent;
    thread::sleep(Duration::from_millis(20));
    assert_eq!(coordinator.status().total_spikes_sent, sent);
}
