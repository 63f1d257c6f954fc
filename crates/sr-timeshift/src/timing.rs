//! Per-stream timing state: clock recovery, RFC 3550 jitter, adaptive
//! target-buffer sizing, and the PI controller producing playback-rate
//! adjustments.

use std::time::Instant;

use sr_clock::StreamClock;
use sr_core::TimeshiftTuning;

/// Accumulated, monotonically-growing counters surfaced through
/// `get_audio_engine_stats()`.
#[derive(Debug, Clone, Default)]
pub struct StreamCounters {
    pub packets: u64,
    pub late_packets: u64,
    pub underruns: u64,
    pub discarded: u64,
    pub lagging_events: u64,
}

/// One ingress source tag's clock-recovery and scheduling state. Created on
/// first packet, destroyed on explicit reset or stream timeout.
pub struct StreamTimingState {
    clock: StreamClock,
    last_producer_ts: Option<u32>,
    last_arrival_time: Option<Instant>,
    jitter_ms: f64,
    playback_rate: f64,
    pi_integral: f64,
    pi_last_update: Instant,
    target_buffer_ms: f64,
    target_buffer_last_update: Instant,
    pub counters: StreamCounters,
}

impl StreamTimingState {
    pub fn new(nominal_sample_rate: u32, jitter_smoothing_factor: f64, now: Instant, tuning: &TimeshiftTuning) -> Self {
        Self {
            clock: StreamClock::new(nominal_sample_rate, jitter_smoothing_factor),
            last_producer_ts: None,
            last_arrival_time: None,
            jitter_ms: 0.0,
            playback_rate: 1.0,
            pi_integral: 0.0,
            pi_last_update: now,
            target_buffer_ms: tuning.target_buffer_level_ms,
            target_buffer_last_update: now,
            counters: StreamCounters::default(),
        }
    }

    pub fn jitter_ms(&self) -> f64 {
        self.jitter_ms
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn target_buffer_ms(&self) -> f64 {
        self.target_buffer_ms
    }

    /// Updates clock, jitter, adaptive target buffer, and the PI controller
    /// for one newly-arrived packet. `observed_buffer_depth_ms` is the
    /// caller's estimate of how much audio is currently queued for this
    /// stream (used as the controller's process variable).
    pub fn on_packet_arrival(
        &mut self,
        producer_timestamp: Option<u32>,
        arrival_time: Instant,
        observed_buffer_depth_ms: f64,
        tuning: &TimeshiftTuning,
    ) {
        self.counters.packets += 1;

        if let Some(ts) = producer_timestamp {
            let estimate = self.clock.update(ts, arrival_time);

            // RFC 3550 jitter estimator: J += (|D| - J) / 16, where D is the
            // difference between consecutive transit-time estimates. We use
            // the clock's innovation (deviation of measured offset from the
            // smoothed estimate) as a proxy for D, since both capture
            // arrival-time irregularity relative to the expected schedule.
            let d = estimate.last_innovation_ms;
            self.jitter_ms += (d.abs() - self.jitter_ms) / 16.0;
        }
        self.last_producer_ts = producer_timestamp;
        self.last_arrival_time = Some(arrival_time);

        self.update_target_buffer(tuning);
        self.update_pi_controller(observed_buffer_depth_ms, arrival_time, tuning);
    }

    fn update_target_buffer(&mut self, tuning: &TimeshiftTuning) {
        let candidate = tuning.target_buffer_level_ms.max(
            tuning.jitter_safety_margin_multiplier * self.jitter_ms,
        );
        // Hysteresis: only ever decrease the target gradually, and only
        // increase immediately — this avoids oscillating the buffer level
        // on transient jitter spikes.
        if candidate > self.target_buffer_ms {
            self.target_buffer_ms = candidate;
        } else {
            self.target_buffer_ms += (candidate - self.target_buffer_ms) * 0.05;
        }
    }

    fn update_pi_controller(&mut self, observed_buffer_depth_ms: f64, now: Instant, tuning: &TimeshiftTuning) {
        let dt = now.duration_since(self.pi_last_update).as_secs_f64().max(1e-6);
        self.pi_last_update = now;

        let error_ms = observed_buffer_depth_ms - self.target_buffer_ms;

        // Proportional term directly, integral term with anti-windup
        // clamped to keep the final rate inside the configured bounds even
        // if the proportional term alone is already saturating it.
        let proportional = tuning.proportional_gain_kp * error_ms;
        let ki = tuning.proportional_gain_kp * 0.1;
        self.pi_integral += error_ms * dt * ki;
        self.pi_integral = self.pi_integral.clamp(-50.0, 50.0);

        let rate_adjustment_ppm = proportional + self.pi_integral;
        let rate = 1.0 + rate_adjustment_ppm / 1_000_000.0;
        self.playback_rate = rate.clamp(tuning.min_playback_rate, tuning.max_playback_rate);
    }

    pub fn reset(&mut self, nominal_sample_rate: u32, jitter_smoothing_factor: f64, now: Instant, tuning: &TimeshiftTuning) {
        *self = Self::new(nominal_sample_rate, jitter_smoothing_factor, now, tuning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn jitter_converges_within_expected_band_for_gaussian_noise() {
        let tuning = TimeshiftTuning::default();
        let mut state = StreamTimingState::new(48000, 1.0 / 16.0, Instant::now(), &tuning);
        let start = Instant::now();
        // Deterministic pseudo-noise standing in for Gaussian jitter with a
        // fixed, known standard deviation.
        let sigma_ms = 5.0;
        let mut seed: u64 = 12345;
        let mut next_rand = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as f64 / u32::MAX as f64) - 0.5
        };
        for i in 0..2000u32 {
            let nominal_ms = i as u64 * 10;
            let jitter = next_rand() * 2.0 * sigma_ms * 1.732; // approx uniform->variance match
            let arrival = start + Duration::from_micros(((nominal_ms as f64 + jitter) * 1000.0).max(0.0) as u64);
            state.on_packet_arrival(Some(i * 480), arrival, 40.0, &tuning);
        }
        // Loose band check: jitter estimator should reflect meaningful
        // spread, not collapse to zero nor diverge unbounded.
        assert!(state.jitter_ms() > 0.1);
        assert!(state.jitter_ms() < sigma_ms * 10.0);
    }

    #[test]
    fn rate_stays_within_configured_clamp() {
        let tuning = TimeshiftTuning::default();
        let mut state = StreamTimingState::new(48000, 1.0 / 16.0, Instant::now(), &tuning);
        let start = Instant::now();
        for i in 0..500u32 {
            let arrival = start + Duration::from_millis(i as u64 * 10);
            // Simulate a persistently overflowing buffer to push the
            // controller toward its upper clamp.
            state.on_packet_arrival(Some(i * 480), arrival, 500.0, &tuning);
            assert!(state.playback_rate() >= tuning.min_playback_rate - 1e-9);
            assert!(state.playback_rate() <= tuning.max_playback_rate + 1e-9);
        }
    }
}
