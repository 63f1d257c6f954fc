use serde::{Deserialize, Serialize};

/// Tunables governing the Timeshift Manager's dispatch and clock-recovery
/// behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeshiftTuning {
    pub cleanup_interval_ms: u64,
    pub jitter_smoothing_factor: f64,
    pub jitter_safety_margin_multiplier: f64,
    pub late_packet_threshold_ms: f64,
    pub target_buffer_level_ms: f64,
    pub proportional_gain_kp: f64,
    pub min_playback_rate: f64,
    pub max_playback_rate: f64,
    pub loop_max_sleep_ms: u64,
    pub max_buffer_duration_sec: u64,
    pub inbound_queue_capacity: usize,
}

impl Default for TimeshiftTuning {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: 1000,
            jitter_smoothing_factor: 1.0 / 16.0,
            jitter_safety_margin_multiplier: 2.0,
            late_packet_threshold_ms: 50.0,
            target_buffer_level_ms: 40.0,
            proportional_gain_kp: 0.05,
            min_playback_rate: 0.98,
            max_playback_rate: 1.02,
            loop_max_sleep_ms: 20,
            max_buffer_duration_sec: 300,
            inbound_queue_capacity: 1024,
        }
    }
}

/// Tunables governing the Mix Scheduler, Sink Mixer, drain-ratio controller
/// and the MP3 encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerTuning {
    pub mp3_bitrate_kbps: u32,
    pub mp3_vbr_enabled: bool,
    pub mp3_output_queue_max_size: usize,
    pub grace_period_ms: u64,
    pub max_ready_chunks_per_source: usize,
    pub max_ready_queue_duration_ms: f64,
    pub buffer_measurement_interval_ms: f64,
    pub target_buffer_level_ms: f64,
    pub buffer_tolerance_ms: f64,
    pub max_speedup_factor: f64,
    pub enable_adaptive_buffer_drain: bool,
    pub drain_smoothing_factor: f64,
    /// Soft-knee threshold/width for the mix accumulator's output clip,
    /// fractions of full scale (spec §4.5 step 3: "saturation ... with soft
    /// clip above configurable threshold"). Independent of the per-source
    /// DSP chain's own `ProcessorTuning` clip settings.
    pub soft_clip_threshold: f64,
    pub soft_clip_knee: f64,
}

impl Default for MixerTuning {
    fn default() -> Self {
        Self {
            mp3_bitrate_kbps: 192,
            mp3_vbr_enabled: false,
            mp3_output_queue_max_size: 64,
            grace_period_ms: 200,
            max_ready_chunks_per_source: 4,
            max_ready_queue_duration_ms: 250.0,
            buffer_measurement_interval_ms: 100.0,
            target_buffer_level_ms: 100.0,
            buffer_tolerance_ms: 20.0,
            max_speedup_factor: 1.10,
            enable_adaptive_buffer_drain: true,
            drain_smoothing_factor: 0.9,
            soft_clip_threshold: 0.891, // -1 dBFS
            soft_clip_knee: 0.1,
        }
    }
}

/// Tunables governing the per-source Audio Processor (DSP chain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorTuning {
    pub volume_smoothing_factor: f64,
    pub dc_filter_cutoff_hz: f64,
    pub soft_clip_threshold: f64,
    pub soft_clip_knee: f64,
    pub normalization_target_rms: f64,
    pub normalization_attack_ms: f64,
    pub normalization_decay_ms: f64,
}

impl Default for ProcessorTuning {
    fn default() -> Self {
        Self {
            volume_smoothing_factor: 0.01,
            dc_filter_cutoff_hz: 5.0,
            soft_clip_threshold: 0.891, // -1 dBFS
            soft_clip_knee: 0.1,
            normalization_target_rms: 0.2,
            normalization_attack_ms: 5.0,
            normalization_decay_ms: 300.0,
        }
    }
}

/// The full set of engine tunables, grouped by subsystem. Threaded through
/// as an `Arc<AudioEngineSettings>` everywhere a component needs to read
/// shared, rarely-mutated configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioEngineSettings {
    pub timeshift: TimeshiftTuning,
    pub mixer: MixerTuning,
    pub processor: ProcessorTuning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_json() {
        let settings = AudioEngineSettings::default();
        let json = serde_json::to_string(&settings).expect("settings should serialize");
        let restored: AudioEngineSettings = serde_json::from_str(&json).expect("settings should deserialize");
        assert_eq!(settings, restored);
    }
}
