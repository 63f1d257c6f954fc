//! 12-band parametric equalizer: a cascade of peaking biquads at fixed
//! center frequencies, one cascade per channel.

use crate::biquad::{BiquadCoeffs, BiquadTdf2};
use sr_core::EQ_BANDS;

/// Fixed band centers, roughly one-octave spaced from 31 Hz to 16 kHz.
pub const EQ_CENTER_FREQUENCIES_HZ: [f64; EQ_BANDS] = [
    31.0, 62.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 12000.0, 16000.0, 20000.0,
];

const BAND_Q: f64 = 1.41; // ~1 octave bandwidth per band

/// A per-channel cascade of [`EQ_BANDS`] peaking filters. Gains are linear
/// (1.0 = unity); `set_gains_db` is the ergonomic entry point for callers
/// carrying dB values from the control surface.
#[derive(Debug, Clone)]
pub struct ParametricEq {
    sample_rate: f64,
    channels: usize,
    bands: Vec<[BiquadTdf2; EQ_BANDS]>,
    gains_linear: [f64; EQ_BANDS],
}

impl ParametricEq {
    pub fn new(channels: usize, sample_rate: f64) -> Self {
        let bands = (0..channels).map(|_| std::array::from_fn(|_| BiquadTdf2::new())).collect();
        let mut eq = Self { sample_rate, channels, bands, gains_linear: [1.0; EQ_BANDS] };
        eq.rebuild_coeffs();
        eq
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sets each band's gain as a linear multiplier (1.0 = unity, as the
    /// Audio Processor's `setEqualizer` contract specifies).
    pub fn set_gains_linear(&mut self, gains: [f64; EQ_BANDS]) {
        self.gains_linear = gains;
        self.rebuild_coeffs();
    }

    pub fn set_gains_db(&mut self, gains_db: [f64; EQ_BANDS]) {
        let mut linear = [1.0; EQ_BANDS];
        for i in 0..EQ_BANDS {
            linear[i] = 10.0_f64.powf(gains_db[i] / 20.0);
        }
        self.set_gains_linear(linear);
    }

    pub fn gains_linear(&self) -> [f64; EQ_BANDS] {
        self.gains_linear
    }

    fn rebuild_coeffs(&mut self) {
        for channel_bands in self.bands.iter_mut() {
            for (band_idx, biquad) in channel_bands.iter_mut().enumerate() {
                let gain_db = 20.0 * self.gains_linear[band_idx].max(1e-9).log10();
                let coeffs = BiquadCoeffs::peaking(
                    EQ_CENTER_FREQUENCIES_HZ[band_idx],
                    BAND_Q,
                    gain_db,
                    self.sample_rate,
                );
                biquad.set_coeffs(coeffs);
            }
        }
    }

    /// Processes one interleaved block in place.
    pub fn process_interleaved(&mut self, samples: &mut [f64]) {
        for frame in samples.chunks_mut(self.channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let channel_bands = &mut self.bands[ch];
                let mut x = *sample;
                for band in channel_bands.iter_mut() {
                    x = band.process(x);
                }
                *sample = x;
            }
        }
    }
}
