//! Per-stream clock recovery: tracks the offset and drift between a
//! producer's sample-counter timestamps and this process's wall clock.

use std::time::Instant;

/// Drift is clamped to this many parts-per-million either way; beyond this
/// a producer clock is assumed pathological rather than merely fast/slow.
pub const DRIFT_CLAMP_PPM: f64 = 500.0;

/// Packets required before a drift baseline is established. Before warm-up,
/// `drift_ppm` reads 0.
const WARMUP_PACKETS: u32 = 50;

/// Snapshot of a `StreamClock`'s state after processing one packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockEstimate {
    pub measured_offset_ms: f64,
    pub smoothed_offset_ms: f64,
    pub drift_ppm: f64,
    pub last_innovation_ms: f64,
    pub mean_abs_innovation_ms: f64,
}

impl ClockEstimate {
    fn zeroed() -> Self {
        Self {
            measured_offset_ms: 0.0,
            smoothed_offset_ms: 0.0,
            drift_ppm: 0.0,
            last_innovation_ms: 0.0,
            mean_abs_innovation_ms: 0.0,
        }
    }
}

/// Two-state (offset, drift) tracker for one ingress stream.
///
/// Producer timestamps are a 32-bit, wrapping sample counter (RTP-style).
/// Differences are always taken as signed 32-bit deltas so a single wrap
/// does not register as a multi-hour jump.
pub struct StreamClock {
    nominal_sample_rate: u32,
    alpha: f64,
    first_packet: bool,
    first_producer_ts: u32,
    first_arrival: Instant,
    smoothed_offset_ms: f64,
    mean_abs_innovation_ms: f64,
    baseline: Option<(f64, Instant)>,
    packet_count: u32,
}

impl StreamClock {
    pub fn new(nominal_sample_rate: u32, alpha: f64) -> Self {
        Self {
            nominal_sample_rate: nominal_sample_rate.max(1),
            alpha,
            first_packet: true,
            first_producer_ts: 0,
            first_arrival: Instant::now(),
            smoothed_offset_ms: 0.0,
            mean_abs_innovation_ms: 0.0,
            baseline: None,
            packet_count: 0,
        }
    }

    /// Feeds one (producer_timestamp, arrival_time) observation. Returns the
    /// updated estimate. On the very first call, returns a zeroed estimate
    /// and records the baseline point.
    pub fn update(&mut self, producer_timestamp: u32, arrival_time: Instant) -> ClockEstimate {
        if self.first_packet {
            self.first_packet = false;
            self.first_producer_ts = producer_timestamp;
            self.first_arrival = arrival_time;
            self.packet_count = 1;
            return ClockEstimate::zeroed();
        }

        self.packet_count = self.packet_count.saturating_add(1);

        // Signed 32-bit delta handles wrap-around transparently.
        let delta_ts = producer_timestamp.wrapping_sub(self.first_producer_ts) as i32;
        let elapsed_producer_sec = delta_ts as f64 / self.nominal_sample_rate as f64;
        let elapsed_arrival_sec = arrival_time.duration_since(self.first_arrival).as_secs_f64();
        let measured_offset_ms = (elapsed_producer_sec - elapsed_arrival_sec) * 1000.0;

        let prev_smoothed = self.smoothed_offset_ms;
        self.smoothed_offset_ms = prev_smoothed * (1.0 - self.alpha) + measured_offset_ms * self.alpha;

        let innovation = (measured_offset_ms - prev_smoothed).abs();
        // Same EMA smoothing factor doubles as the innovation-tracking window.
        self.mean_abs_innovation_ms =
            self.mean_abs_innovation_ms * (1.0 - self.alpha) + innovation * self.alpha;

        if self.baseline.is_none() && self.packet_count >= WARMUP_PACKETS {
            self.baseline = Some((self.smoothed_offset_ms, arrival_time));
        }

        let drift_ppm = match self.baseline {
            Some((baseline_offset_ms, baseline_time)) => {
                let elapsed_since_baseline =
                    arrival_time.duration_since(baseline_time).as_secs_f64();
                if elapsed_since_baseline > 0.0 {
                    let raw = (self.smoothed_offset_ms - baseline_offset_ms) / elapsed_since_baseline
                        * 1000.0;
                    raw.clamp(-DRIFT_CLAMP_PPM, DRIFT_CLAMP_PPM)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        ClockEstimate {
            measured_offset_ms,
            smoothed_offset_ms: self.smoothed_offset_ms,
            drift_ppm,
            last_innovation_ms: innovation,
            mean_abs_innovation_ms: self.mean_abs_innovation_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    #[test]
    fn first_packet_is_zeroed() {
        let mut clock = StreamClock::new(48000, 1.0 / 16.0);
        let est = clock.update(1000, Instant::now());
        assert_eq!(est, ClockEstimate::zeroed());
    }

    #[test]
    fn steady_stream_converges_to_near_zero_offset_and_drift() {
        let mut clock = StreamClock::new(48000, 1.0 / 16.0);
        let start = Instant::now();
        let mut last = ClockEstimate::zeroed();
        for i in 0..200u32 {
            let ts = i * 480; // 10ms worth of samples per packet
            let arrival = start + Duration::from_millis((i as u64) * 10);
            last = clock.update(ts, arrival);
        }
        assert_abs_diff_eq!(last.smoothed_offset_ms, 0.0, epsilon = 1.0);
        assert!(last.drift_ppm.abs() < 5.0);
    }

    #[test]
    fn drift_is_clamped_to_500_ppm() {
        let mut clock = StreamClock::new(48000, 1.0 / 16.0);
        let start = Instant::now();
        // Producer clock running far faster than wall clock: large drift.
        for i in 0..500u32 {
            let ts = i * 480 * 2; // producer reports twice the elapsed samples
            let arrival = start + Duration::from_millis((i as u64) * 10);
            let est = clock.update(ts, arrival);
            assert!(est.drift_ppm <= DRIFT_CLAMP_PPM);
            assert!(est.drift_ppm >= -DRIFT_CLAMP_PPM);
        }
    }
}
