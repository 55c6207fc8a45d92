//! End-to-end noise tests over the network fixture
//!
//! Loads `fixtures/network.yaml`, which trains mote 1 on a 300-reading trace
//! and mote 3 on a 40-reading trace, and checks replay, synthesis and the
//! diagnostics written to the "Noise" channel.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use motesim_common::{ChannelLog, ChannelLogConfig, MemorySink};
use motesim_noise::UNTRAINED_NOISE;
use motesim_runner::{build_simulation, load_config, parse_trace, NodeId, Simulation};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn read_fixture_trace(name: &str) -> Vec<i8> {
    let text = std::fs::read_to_string(fixture(name)).expect("Failed to read trace fixture");
    parse_trace(&text).expect("Trace fixture should parse")
}

/// Build the fixture network with its logs captured in memory.
fn build_network(seed: u64) -> (Simulation, Arc<MemorySink>) {
    let mut config = load_config(fixture("network.yaml")).expect("Failed to load config");
    config.seed = seed;

    let sink = Arc::new(MemorySink::new());
    let log = ChannelLog::with_sink(ChannelLogConfig::parse(&config.log_channels), sink.clone());
    let sim = build_simulation(&config)
        .expect("Failed to build simulation")
        .with_log(log);
    (sim, sink)
}

// ============================================================================
// Replay
// ============================================================================

#[test]
fn test_replay_matches_trace_file() {
    let trace = read_fixture_trace("traces/node3.txt");
    assert_eq!(trace.len(), 40);

    let (mut sim, _) = build_network(42);
    assert_eq!(sim.noise().trace_len(NodeId(3)), 40);
    for (t, &expected) in trace.iter().enumerate() {
        assert_eq!(sim.generate_noise(NodeId(3), t as u32), expected, "t = {}", t);
    }
}

#[test]
fn test_replay_random_access() {
    let trace = read_fixture_trace("traces/node3.txt");
    let (mut sim, _) = build_network(42);

    assert_eq!(sim.generate_noise(NodeId(3), 25), trace[25]);
    assert_eq!(sim.generate_noise(NodeId(3), 25), -96);
    assert_eq!(sim.generate_noise(NodeId(3), 3), trace[3]);
    assert_eq!(sim.generate_noise(NodeId(3), 39), trace[39]);
}

// ============================================================================
// Synthesis
// ============================================================================

#[test]
fn test_synthesized_values_come_from_trace() {
    let trace = read_fixture_trace("traces/node3.txt");
    let observed: BTreeSet<i8> = trace.iter().copied().collect();
    let (mut sim, _) = build_network(42);

    let first = sim.generate_noise(NodeId(3), 45);
    assert_ne!(first, UNTRAINED_NOISE);
    assert!(observed.contains(&first), "{} not in trace", first);

    for t in 46..400 {
        let value = sim.generate_noise(NodeId(3), t);
        assert!(observed.contains(&value), "t = {}: {} not in trace", t, value);
    }
}

#[test]
fn test_repeated_time_returns_cached_value() {
    let (mut sim, _) = build_network(7);

    let value = sim.generate_noise(NodeId(1), 500);
    assert_eq!(sim.generate_noise(NodeId(1), 500), value);
}

#[test]
fn test_backward_time_past_trace_is_logged() {
    let (mut sim, sink) = build_network(7);

    let value = sim.generate_noise(NodeId(3), 60);
    assert_eq!(sim.generate_noise(NodeId(3), 50), value);

    let lines = sink.channel_lines("Noise");
    assert!(
        lines.iter().any(|l| l.contains("before last generated time")),
        "Noise lines: {:?}",
        lines
    );
}

// ============================================================================
// Untrained Motes
// ============================================================================

#[test]
fn test_untrained_mote_yields_sentinel_and_error() {
    let (mut sim, sink) = build_network(42);

    assert!(!sim.noise().is_trained(NodeId(2)));
    assert_eq!(sim.generate_noise(NodeId(2), 10), UNTRAINED_NOISE);
    assert_eq!(sim.generate_noise(NodeId(99), 10), UNTRAINED_NOISE);

    let lines = sink.channel_lines("Noise");
    assert!(lines.iter().any(|l| l.contains("uninitialized radio model of node 2")));
    assert!(lines.iter().any(|l| l.contains("out-of-range node 99")));
}

#[test]
fn test_noise_floor_only_for_configured_motes() {
    let (mut sim, _) = build_network(42);

    let floor = sim
        .sample_noise_floor(NodeId(2))
        .expect("Mote 2 has a noise floor");
    assert!((-101.0..=-95.0).contains(&floor), "floor {}", floor);

    assert_eq!(sim.gain().noise_mean(NodeId(3)), Some(0.0));
    assert_eq!(sim.sample_noise_floor(NodeId(99)), None);
}
