//! Aggregated engine-wide statistics, grounded on
//! `original_source/src/audio_engine/managers/stats_manager.{h,cpp}`: one
//! flat snapshot combining the Timeshift Manager's per-stream/per-processor
//! counters with per-sink and per-source counters the mixer and source
//! crates track independently.

use std::collections::HashMap;

use sr_mixer::SinkMixerStats;
use sr_timeshift::TimeshiftManagerStats;

#[derive(Debug, Clone, Default)]
pub struct SinkStats {
    pub mixer: SinkMixerStats,
    pub listener_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    pub reconfigurations: u64,
}

#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub timeshift: TimeshiftManagerStats,
    pub sinks: HashMap<String, SinkStats>,
    pub sources: HashMap<String, SourceStats>,
}
