//! Aggregated counters surfaced through `get_audio_engine_stats()`.

use std::collections::HashMap;

use crate::timing::StreamCounters;

/// Per-(source_tag, instance_id) dispatch counters.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    pub dispatched: u64,
    pub dropped: u64,
    pub late: u64,
    pub high_water_mark: usize,
}

/// Snapshot of the whole Timeshift Manager's state, grouped the way the
/// original engine's stats manager reports it: one row per stream for
/// clock/jitter data, one row per (stream, processor) for dispatch data,
/// plus global counters.
#[derive(Debug, Clone, Default)]
pub struct TimeshiftManagerStats {
    pub total_inbound_dropped: u64,
    pub global_buffer_len: usize,
    pub per_stream: HashMap<String, StreamStatsSnapshot>,
    pub per_processor: HashMap<String, ProcessorStats>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamStatsSnapshot {
    pub jitter_ms: f64,
    pub playback_rate: f64,
    pub target_buffer_ms: f64,
    pub counters: StreamCounters,
}
