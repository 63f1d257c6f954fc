//! Control-surface config shapes, grounded on
//! `original_source/src/audio_engine/audio_types.h`'s `SourceConfig` and
//! `SinkConfig`. Distinct from `sr_config`'s `AppliedSourcePathParams` /
//! `AppliedSinkParams`: those carry the declarative diff layer's path/sink
//! wiring, these are the plain imperative arguments `configure_source` and
//! `add_sink` take directly.

use sr_core::{SpeakerLayout, EQ_BANDS};

pub use sr_config::SinkEngineConfig;

/// Initial configuration for one source processing path.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub source_tag: String,
    pub initial_volume: f64,
    pub initial_eq: [f64; EQ_BANDS],
    pub initial_delay_ms: f64,
    pub initial_timeshift_sec: f64,
    pub target_output_channels: u8,
    pub target_output_samplerate: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_tag: String::new(),
            initial_volume: 1.0,
            initial_eq: [1.0; EQ_BANDS],
            initial_delay_ms: 0.0,
            initial_timeshift_sec: 0.0,
            target_output_channels: 2,
            target_output_samplerate: 48000,
        }
    }
}

/// A single audio sink (output), identified by `sink_id`.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub sink_id: String,
    pub engine: SinkEngineConfig,
}

/// Atomic, all-or-nothing parameter update for a running source path: only
/// the fields set to `Some` are changed.
#[derive(Debug, Clone, Default)]
pub struct SourceParameterUpdates {
    pub volume: Option<f64>,
    pub eq: Option<[f64; EQ_BANDS]>,
    pub eq_normalization: Option<bool>,
    pub volume_normalization: Option<bool>,
    pub delay_ms: Option<f64>,
    pub timeshift_sec: Option<f64>,
    pub speaker_layout: Option<(u8, SpeakerLayout)>,
}
