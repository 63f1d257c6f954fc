//! Desired/applied state shapes, grounded on
//! `original_source/src/configuration/audio_engine_config_types.h`
//! (`AppliedSourcePathParams`, `AppliedSinkParams`, `DesiredEngineState`).

use serde::{Deserialize, Serialize};

use sr_core::{SpeakerLayout, EQ_BANDS};

/// Engine-level configuration for one sink, grounded on
/// `original_source/src/audio_engine/audio_types.h`'s `SinkConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkEngineConfig {
    pub output_ip: String,
    pub output_port: u16,
    pub bit_depth: sr_core::BitDepth,
    pub sample_rate: u32,
    pub channels: u8,
    pub chlayout1: u8,
    pub chlayout2: u8,
    pub enable_mp3: bool,
    pub protocol: String,
    pub speaker_layout: SpeakerLayout,
    pub time_sync_enabled: bool,
    pub time_sync_delay_ms: u32,
}

impl Default for SinkEngineConfig {
    fn default() -> Self {
        Self {
            output_ip: String::new(),
            output_port: 4010,
            bit_depth: sr_core::BitDepth::Sixteen,
            sample_rate: 48000,
            channels: 2,
            chlayout1: 0x03,
            chlayout2: 0x00,
            enable_mp3: false,
            protocol: "scream".to_string(),
            speaker_layout: SpeakerLayout::identity(),
            time_sync_enabled: false,
            time_sync_delay_ms: 0,
        }
    }
}

/// One desired sink: its engine config plus the set of source-path ids it
/// should be connected to. Connection set-equality (order-independent) is
/// how the applier decides whether `reconcile_connections_for_sink` has
/// anything to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedSinkParams {
    pub sink_id: String,
    pub engine_config: SinkEngineConfig,
    pub connected_source_path_ids: Vec<String>,
}

/// One desired source path: a source tag (possibly a `prefix*` wildcard)
/// routed into one sink at a given DSP configuration. `generated_instance_id`
/// is filled in by the applier once the path has a live processor; it is
/// never set by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedSourcePathParams {
    pub path_id: String,
    pub source_tag: String,
    pub target_sink_id: String,
    pub volume: f64,
    pub eq_values: [f64; EQ_BANDS],
    pub eq_normalization: bool,
    pub volume_normalization: bool,
    pub delay_ms: f64,
    pub timeshift_sec: f64,
    pub target_output_channels: u8,
    pub target_output_samplerate: u32,
    pub speaker_layouts: Vec<(u8, SpeakerLayout)>,
    #[serde(default)]
    pub generated_instance_id: Option<String>,
}

impl AppliedSourcePathParams {
    /// Whether `other` differs from `self` only in "in-place updatable"
    /// fields (volume/EQ/delay/timeshift/layouts). A
    /// change to `source_tag`, `target_sink_id`, or target channels/rate is
    /// fundamental and requires destroy+recreate instead.
    pub fn is_fundamental_change(&self, other: &AppliedSourcePathParams) -> bool {
        self.source_tag != other.source_tag
            || self.target_sink_id != other.target_sink_id
            || self.target_output_channels != other.target_output_channels
            || self.target_output_samplerate != other.target_output_samplerate
    }

    /// Whether any in-place-updatable field differs, using the applier's
    /// float tolerance and deep matrix equality.
    pub fn differs_in_place(&self, other: &AppliedSourcePathParams) -> bool {
        if !sr_core::floats_equal(self.volume, other.volume) {
            return true;
        }
        if self
            .eq_values
            .iter()
            .zip(other.eq_values.iter())
            .any(|(a, b)| !sr_core::floats_equal(*a, *b))
        {
            return true;
        }
        if self.eq_normalization != other.eq_normalization || self.volume_normalization != other.volume_normalization {
            return true;
        }
        if !sr_core::floats_equal(self.delay_ms, other.delay_ms) || !sr_core::floats_equal(self.timeshift_sec, other.timeshift_sec) {
            return true;
        }
        if self.speaker_layouts.len() != other.speaker_layouts.len() {
            return true;
        }
        for (a, b) in self.speaker_layouts.iter().zip(other.speaker_layouts.iter()) {
            if a.0 != b.0 || a.1.auto_mode != b.1.auto_mode || !sr_core::matrices_equal(&a.1.matrix, &b.1.matrix) {
                return true;
            }
        }
        false
    }
}

impl SinkEngineConfig {
    /// A change here is fundamental: the sink's mixer/listener set must be
    /// torn down and recreated rather than patched in place.
    pub fn differs(&self, other: &SinkEngineConfig) -> bool {
        self.output_ip != other.output_ip
            || self.output_port != other.output_port
            || self.bit_depth != other.bit_depth
            || self.sample_rate != other.sample_rate
            || self.channels != other.channels
            || self.chlayout1 != other.chlayout1
            || self.chlayout2 != other.chlayout2
            || self.enable_mp3 != other.enable_mp3
            || self.protocol != other.protocol
            || self.speaker_layout.auto_mode != other.speaker_layout.auto_mode
            || !sr_core::matrices_equal(&self.speaker_layout.matrix, &other.speaker_layout.matrix)
            || self.time_sync_enabled != other.time_sync_enabled
            || self.time_sync_delay_ms != other.time_sync_delay_ms
    }
}

/// The full desired state of the engine: every sink and every source path
/// that should exist. Anything not listed here is removed on the next
/// `apply_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredEngineState {
    pub sinks: Vec<AppliedSinkParams>,
    pub source_paths: Vec<AppliedSourcePathParams>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_state_round_trips_through_json() {
        let state = DesiredEngineState {
            sinks: vec![AppliedSinkParams {
                sink_id: "sink-1".to_string(),
                engine_config: SinkEngineConfig::default(),
                connected_source_path_ids: vec!["path-1".to_string()],
            }],
            source_paths: vec![AppliedSourcePathParams {
                path_id: "path-1".to_string(),
                source_tag: "192.168.1.5".to_string(),
                target_sink_id: "sink-1".to_string(),
                volume: 1.0,
                eq_values: [1.0; EQ_BANDS],
                eq_normalization: false,
                volume_normalization: false,
                delay_ms: 0.0,
                timeshift_sec: 0.0,
                target_output_channels: 2,
                target_output_samplerate: 48000,
                speaker_layouts: Vec::new(),
                generated_instance_id: None,
            }],
        };

        let json = serde_json::to_string(&state).expect("desired state should serialize");
        let restored: DesiredEngineState = serde_json::from_str(&json).expect("desired state should deserialize");
        assert_eq!(state, restored);
    }
}
