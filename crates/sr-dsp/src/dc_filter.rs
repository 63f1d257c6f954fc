//! DC-blocking high-pass stage, one first-order-equivalent biquad per
//! channel, run ahead of the parametric EQ to keep a slow DC offset (common
//! from cheap capture hardware or an 8-bit-widened Scream source) from
//! eating into the EQ's and normalizer's headroom.

use crate::biquad::{BiquadCoeffs, BiquadTdf2};

const DC_FILTER_Q: f64 = 0.707;

#[derive(Debug, Clone)]
pub struct DcBlocker {
    channels: usize,
    stages: Vec<BiquadTdf2>,
}

impl DcBlocker {
    pub fn new(channels: usize, cutoff_hz: f64, sample_rate: f64) -> Self {
        let coeffs = Self::coeffs(cutoff_hz, sample_rate);
        Self { channels, stages: (0..channels).map(|_| BiquadTdf2::with_coeffs(coeffs)).collect() }
    }

    fn coeffs(cutoff_hz: f64, sample_rate: f64) -> BiquadCoeffs {
        if cutoff_hz <= 0.0 {
            return BiquadCoeffs::bypass();
        }
        let nyquist = sample_rate / 2.0;
        BiquadCoeffs::highpass(cutoff_hz.min(nyquist * 0.45), DC_FILTER_Q, sample_rate)
    }

    pub fn process_interleaved(&mut self, samples: &mut [f64]) {
        for frame in samples.chunks_mut(self.channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.stages[ch].process(*sample);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_constant_offset_after_settling() {
        let mut filter = DcBlocker::new(1, 5.0, 48000.0);
        let mut last = 0.0;
        for _ in 0..20000 {
            let mut block = [0.3f64];
            filter.process_interleaved(&mut block);
            last = block[0];
        }
        assert!(last.abs() < 0.01, "DC offset should be attenuated to near zero after settling, got {last}");
    }

    #[test]
    fn passes_mid_band_signal_largely_unattenuated() {
        let mut filter = DcBlocker::new(1, 5.0, 48000.0);
        let mut peak = 0.0f64;
        for i in 0..4800 {
            let t = i as f64 / 48000.0;
            let mut block = [(2.0 * std::f64::consts::PI * 1000.0 * t).sin()];
            filter.process_interleaved(&mut block);
            peak = peak.max(block[0].abs());
        }
        assert!(peak > 0.9, "a 1kHz tone should pass through a 5Hz DC blocker almost unattenuated, got {peak}");
    }
}
