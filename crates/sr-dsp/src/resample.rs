//! Sample-rate conversion. Linear interpolation is used rather than a
//! polyphase filter bank: the Audio Processor runs per-source, per-format
//! epoch, so the simplicity and low latency of linear interpolation outweigh
//! the extra stopband rejection a polyphase design would buy here.

/// Stateful linear-interpolation resampler carrying fractional phase and a
/// one-frame history across calls, so output stays continuous across
/// chunk boundaries.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    channels: usize,
    ratio: f64, // input_rate / output_rate
    phase: f64,
    history: Vec<f64>, // last input frame, carried across calls
    has_history: bool,
}

impl LinearResampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Self {
        Self {
            channels,
            ratio: input_rate as f64 / output_rate as f64,
            phase: 0.0,
            history: vec![0.0; channels],
            has_history: false,
        }
    }

    pub fn set_rates(&mut self, input_rate: u32, output_rate: u32) {
        self.ratio = input_rate as f64 / output_rate as f64;
    }

    /// Additional playback-rate multiplier layered on top of the format
    /// ratio (used by the drain-ratio controller to locally skew timing).
    pub fn process(&mut self, input: &[f64], playback_rate: f64) -> Vec<f64> {
        if input.is_empty() || self.channels == 0 {
            return Vec::new();
        }
        let frame_count = input.len() / self.channels;
        let step = self.ratio * playback_rate;
        let mut output = Vec::new();

        let mut read_pos = self.phase;
        loop {
            let idx = read_pos.floor() as isize;
            let frac = read_pos - idx as f64;

            let prev_frame: &[f64] = if idx < 0 {
                &self.history
            } else if (idx as usize) < frame_count {
                &input[(idx as usize) * self.channels..(idx as usize + 1) * self.channels]
            } else {
                break;
            };
            let next_idx = idx + 1;
            let next_frame: &[f64] = if next_idx < 0 {
                &self.history
            } else if (next_idx as usize) < frame_count {
                &input[(next_idx as usize) * self.channels..(next_idx as usize + 1) * self.channels]
            } else {
                // Not enough lookahead yet; stop and resume next call.
                break;
            };

            for ch in 0..self.channels {
                let interpolated = prev_frame[ch] + (next_frame[ch] - prev_frame[ch]) * frac;
                output.push(interpolated);
            }
            read_pos += step;
        }

        if frame_count > 0 {
            self.history.copy_from_slice(&input[(frame_count - 1) * self.channels..frame_count * self.channels]);
            self.has_history = true;
        }
        self.phase = read_pos - frame_count as f64;
        if !self.has_history {
            self.phase = read_pos;
        }
        output
    }
}
