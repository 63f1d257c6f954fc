//! Drain-ratio controller: back-pressures individual sources whose ready
//! ring is draining slower than it fills, by emitting a speedup ratio the
//! Source Processor folds into its resampler ratio.
//!
//! Grounded on `sink_rate_controller.cpp`'s blocks-based band: buffer depth
//! is expressed in "blocks" of one chunk duration, a target band is
//! `[target_blocks, target_blocks + tolerance_blocks]`, and the ratio above
//! the band is `1.0 + 0.01 * excess_blocks` clamped to `max_speedup_factor`.

use std::collections::HashMap;

use parking_lot::Mutex as PLMutex;

use sr_core::MixerTuning;

struct SourceDrainState {
    smoothed_depth_ms: f64,
    last_emitted_ratio: f64,
}

pub struct DrainRateController {
    tuning: MixerTuning,
    chunk_duration_ms: f64,
    state: PLMutex<HashMap<String, SourceDrainState>>,
}

impl DrainRateController {
    pub fn new(tuning: MixerTuning, chunk_duration_ms: f64) -> Self {
        Self { tuning, chunk_duration_ms: chunk_duration_ms.max(1e-6), state: PLMutex::new(HashMap::new()) }
    }

    /// Feeds one observation of `ring_depth` (in chunks) for `source_id`,
    /// returning `Some(ratio)` only when the ratio changed by more than
    /// `1e-4` since the last emission for this source.
    pub fn observe(&self, source_id: &str, ring_depth: usize) -> Option<f64> {
        if !self.tuning.enable_adaptive_buffer_drain {
            return None;
        }

        let mut states = self.state.lock();
        let entry = states
            .entry(source_id.to_string())
            .or_insert_with(|| SourceDrainState { smoothed_depth_ms: 0.0, last_emitted_ratio: 1.0 });

        let raw_depth_ms = ring_depth as f64 * self.chunk_duration_ms;
        let alpha = 1.0 - self.tuning.drain_smoothing_factor;
        entry.smoothed_depth_ms += (raw_depth_ms - entry.smoothed_depth_ms) * alpha;

        let blocks = entry.smoothed_depth_ms / self.chunk_duration_ms;
        let target_blocks = self.tuning.target_buffer_level_ms / self.chunk_duration_ms;
        let tolerance_blocks = self.tuning.buffer_tolerance_ms / self.chunk_duration_ms;

        let excess_blocks = blocks - (target_blocks + tolerance_blocks);
        let ratio = if excess_blocks > 0.0 {
            (1.0 + 0.01 * excess_blocks).min(self.tuning.max_speedup_factor)
        } else {
            1.0
        };

        if (ratio - entry.last_emitted_ratio).abs() > 1e-4 {
            entry.last_emitted_ratio = ratio;
            Some(ratio)
        } else {
            None
        }
    }

    pub fn remove_source(&self, source_id: &str) {
        self.state.lock().remove(source_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_depth_emits_no_command_after_initial_unity() {
        let controller = DrainRateController::new(MixerTuning::default(), 12.0);
        // First observation always "changes" from the implicit 1.0 baseline
        // only if it differs; with zero depth it should stay at 1.0 and
        // therefore emit nothing.
        assert_eq!(controller.observe("s1", 0), None);
    }

    #[test]
    fn excess_backlog_emits_speedup_clamped_to_max() {
        let tuning = MixerTuning { max_speedup_factor: 1.05, drain_smoothing_factor: 0.0, ..Default::default() };
        let controller = DrainRateController::new(tuning, 12.0);
        // Massive backlog drives the raw ratio far past the clamp.
        let ratio = controller.observe("s1", 10_000).expect("expected a speedup command");
        assert!(ratio <= 1.05 + 1e-9);
        assert!(ratio > 1.0);
    }

    #[test]
    fn ratio_change_below_threshold_is_suppressed() {
        let tuning = MixerTuning { drain_smoothing_factor: 0.0, ..Default::default() };
        let controller = DrainRateController::new(tuning, 12.0);
        let first = controller.observe("s1", 50);
        assert!(first.is_some());
        let second = controller.observe("s1", 50);
        assert_eq!(second, None, "identical depth should not re-emit the same ratio");
    }
}
