//! End-to-end scenarios driving `AudioManager` through both its imperative
//! and declarative surfaces: single source to single sink, fan-out to
//! several sinks at different static delays, a mid-stream format change, and
//! declarative reconcile idempotency.

use std::time::Duration;

use sr_config::{AppliedSinkParams, AppliedSourcePathParams, DesiredEngineState};
use sr_core::EQ_BANDS;
use sr_engine::{AudioManager, SinkConfig, SinkEngineConfig, SourceConfig};

fn packet_1152_bytes() -> Vec<u8> {
    vec![0u8; 1152]
}

fn sink_config(id: &str, ip: &str) -> SinkConfig {
    SinkConfig { sink_id: id.to_string(), engine: SinkEngineConfig { output_ip: ip.to_string(), ..Default::default() } }
}

/// S1: a single source feeding a single sink should mix without underruns
/// once packets are flowing steadily.
#[test]
fn single_source_single_sink_mixes_without_sustained_underruns() {
    let manager = AudioManager::new();
    manager.initialize(30);

    manager.add_sink(sink_config("sink-1", "192.168.1.50"));
    let instance_id = manager.configure_source(SourceConfig { source_tag: "192.168.1.5".to_string(), ..Default::default() });
    manager.connect_source_sink(&instance_id, "sink-1");

    for _ in 0..200 {
        manager.write_plugin_packet("192.168.1.5", packet_1152_bytes(), 2, 48000, 16, 0x03, 0x00);
    }

    std::thread::sleep(Duration::from_millis(300));

    let stats = manager.get_audio_engine_stats();
    let sink_stats = stats.sinks.get("sink-1").expect("sink stats present");
    assert!(sink_stats.mixer.ticks > 0);
    assert!(sink_stats.mixer.mixed_chunks > 0, "expected at least some ticks to mix real audio rather than silence");

    manager.shutdown();
}

/// S2: one source fanned out to three sinks should deliver the same
/// producer-timestamped audio to every sink independently of each sink's own
/// configuration, since delay is applied uniformly in the Timeshift Manager
/// rather than per attached mixer.
#[test]
fn one_source_fans_out_to_three_sinks() {
    let manager = AudioManager::new();
    manager.initialize(30);

    for (id, ip) in [("sink-a", "192.168.1.60"), ("sink-b", "192.168.1.61"), ("sink-c", "192.168.1.62")] {
        manager.add_sink(sink_config(id, ip));
    }

    let instance_id = manager.configure_source(SourceConfig { source_tag: "192.168.1.9".to_string(), ..Default::default() });
    for sink_id in ["sink-a", "sink-b", "sink-c"] {
        assert!(manager.connect_source_sink(&instance_id, sink_id));
    }

    for _ in 0..100 {
        manager.write_plugin_packet("192.168.1.9", packet_1152_bytes(), 2, 48000, 16, 0x03, 0x00);
    }

    std::thread::sleep(Duration::from_millis(300));

    let stats = manager.get_audio_engine_stats();
    for sink_id in ["sink-a", "sink-b", "sink-c"] {
        let sink_stats = stats.sinks.get(sink_id).unwrap_or_else(|| panic!("missing stats for {sink_id}"));
        assert!(sink_stats.mixer.mixed_chunks > 0, "{sink_id} should have mixed real audio");
    }

    manager.shutdown();
}

/// S4: a mid-stream format change must trigger exactly one DSP
/// reconfiguration and must not require tearing down the source's instance
/// id or its connection to the sink.
#[test]
fn format_change_triggers_a_single_reconfiguration() {
    let manager = AudioManager::new();
    manager.initialize(30);

    manager.add_sink(sink_config("sink-1", "192.168.1.70"));
    let instance_id = manager.configure_source(SourceConfig { source_tag: "192.168.1.11".to_string(), ..Default::default() });
    manager.connect_source_sink(&instance_id, "sink-1");

    for _ in 0..20 {
        manager.write_plugin_packet("192.168.1.11", packet_1152_bytes(), 2, 48000, 16, 0x03, 0x00);
    }
    std::thread::sleep(Duration::from_millis(150));

    for _ in 0..20 {
        manager.write_plugin_packet("192.168.1.11", vec![0u8; 1116], 2, 44100, 24, 0x03, 0x00);
    }
    std::thread::sleep(Duration::from_millis(150));

    let stats = manager.get_audio_engine_stats();
    let source_stats = stats.sources.get(&instance_id).expect("source stats present");
    assert_eq!(source_stats.reconfigurations, 2, "one reconfiguration per distinct format, including the initial one");

    manager.shutdown();
}

fn applied_sink(sink_id: &str, connected: &[&str]) -> AppliedSinkParams {
    AppliedSinkParams {
        sink_id: sink_id.to_string(),
        engine_config: SinkEngineConfig::default(),
        connected_source_path_ids: connected.iter().map(|s| s.to_string()).collect(),
    }
}

fn applied_source_path(path_id: &str, tag: &str, sink_id: &str, volume: f64) -> AppliedSourcePathParams {
    AppliedSourcePathParams {
        path_id: path_id.to_string(),
        source_tag: tag.to_string(),
        target_sink_id: sink_id.to_string(),
        volume,
        eq_values: [1.0; EQ_BANDS],
        eq_normalization: false,
        volume_normalization: false,
        delay_ms: 0.0,
        timeshift_sec: 0.0,
        target_output_channels: 2,
        target_output_samplerate: 48000,
        speaker_layouts: Vec::new(),
        generated_instance_id: None,
    }
}

/// S6: reapplying an identical desired state is a no-op, and a state that
/// only changes one sink's connections plus adds a path produces exactly
/// one update and one add.
#[test]
fn declarative_reconcile_is_idempotent_and_minimal() {
    let manager = AudioManager::new();
    manager.initialize(30);

    let state1 = DesiredEngineState {
        sinks: vec![applied_sink("sink-1", &["path-1"])],
        source_paths: vec![applied_source_path("path-1", "192.168.1.20", "sink-1", 1.0)],
    };
    let first = manager.apply_desired_state(state1.clone()).expect("applier ready");
    assert_eq!(first.sinks_added, 1);
    assert_eq!(first.paths_added, 1);
    assert!(first.is_clean());

    let repeat = manager.apply_desired_state(state1.clone()).expect("applier ready");
    assert_eq!(repeat.sinks_added, 0);
    assert_eq!(repeat.paths_added, 0);
    assert_eq!(repeat.sinks_updated, 0);
    assert_eq!(repeat.paths_updated, 0);

    let mut state2 = state1;
    state2.source_paths[0].volume = 0.25;
    state2.source_paths.push(applied_source_path("path-2", "192.168.1.21", "sink-1", 1.0));
    state2.sinks[0].connected_source_path_ids.push("path-2".to_string());

    let second = manager.apply_desired_state(state2).expect("applier ready");
    assert_eq!(second.paths_updated, 1, "the volume-only change on path-1 is an in-place update");
    assert_eq!(second.paths_added, 1, "path-2 is new");
    assert_eq!(second.sinks_updated, 1, "sink-1 gained a connection");
    assert!(second.is_clean());

    manager.shutdown();
}
