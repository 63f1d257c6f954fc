//! The Audio Processor: the per-source DSP chain (decode, remix, resample,
//! DC-block, equalize, apply volume, normalize, soft-clip, hard-clip).
//! One instance is constructed per Source Input Processor per format epoch
//! (it is torn down and rebuilt whenever the input format changes).

use std::collections::HashMap;

use sr_core::{AudioFormat, ProcessorTuning, SpeakerLayout, EQ_BANDS};

use crate::clip::finalize_sample;
use crate::convert::decode_to_f64;
use crate::dc_filter::DcBlocker;
use crate::eq::ParametricEq;
use crate::normalize::RmsNormalizer;
use crate::remix::remix_buffer;
use crate::resample::LinearResampler;
use crate::volume::VolumeSmoother;

/// Constructor parameters for one `AudioProcessor` instance.
pub struct ProcessorConfig {
    pub input_format: AudioFormat,
    pub output_channels: usize,
    pub output_rate: u32,
    pub initial_volume: f64,
    pub tuning: ProcessorTuning,
}

/// Converts PCM bytes at the source's input format into interleaved i32
/// samples at the sink's target format, applying remix, resample,
/// equalization, volume, and normalization in that order.
pub struct AudioProcessor {
    input_format: AudioFormat,
    output_channels: usize,
    output_rate: u32,
    speaker_layouts: HashMap<u8, SpeakerLayout>,
    resampler: LinearResampler,
    dc_blocker: DcBlocker,
    eq: ParametricEq,
    volume: VolumeSmoother,
    eq_normalization_enabled: bool,
    volume_normalization_enabled: bool,
    eq_normalizer: RmsNormalizer,
    volume_normalizer: RmsNormalizer,
    tuning: ProcessorTuning,
}

impl AudioProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        let output_rate_f = config.output_rate as f64;
        Self {
            input_format: config.input_format,
            output_channels: config.output_channels,
            output_rate: config.output_rate,
            speaker_layouts: HashMap::new(),
            resampler: LinearResampler::new(
                config.input_format.sample_rate,
                config.output_rate,
                config.output_channels,
            ),
            dc_blocker: DcBlocker::new(config.output_channels, config.tuning.dc_filter_cutoff_hz, output_rate_f),
            eq: ParametricEq::new(config.output_channels, output_rate_f),
            volume: VolumeSmoother::new(config.initial_volume, config.tuning.volume_smoothing_factor),
            eq_normalization_enabled: false,
            volume_normalization_enabled: false,
            eq_normalizer: RmsNormalizer::new(
                config.tuning.normalization_target_rms,
                config.tuning.normalization_attack_ms,
                config.tuning.normalization_decay_ms,
                output_rate_f,
            ),
            volume_normalizer: RmsNormalizer::new(
                config.tuning.normalization_target_rms,
                config.tuning.normalization_attack_ms,
                config.tuning.normalization_decay_ms,
                output_rate_f,
            ),
            tuning: config.tuning,
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume.set_target(volume);
    }

    /// Returns an error via `None`-by-caller convention is avoided here: the
    /// caller (Source Input Processor command handler) is responsible for
    /// validating the band count (`EQ_BANDS`) before calling; this method
    /// always accepts a well-formed array.
    pub fn set_equalizer(&mut self, gains_linear: [f64; EQ_BANDS]) {
        self.eq.set_gains_linear(gains_linear);
    }

    pub fn set_eq_normalization(&mut self, enabled: bool) {
        self.eq_normalization_enabled = enabled;
    }

    pub fn set_volume_normalization(&mut self, enabled: bool) {
        self.volume_normalization_enabled = enabled;
    }

    /// Merges `layout` into the per-input-channel-count map (keyed by the
    /// channel count the layout applies to), replacing any prior entry for
    /// that key.
    pub fn update_speaker_layout(&mut self, input_channels: u8, layout: SpeakerLayout) {
        self.speaker_layouts.insert(input_channels, layout);
    }

    pub fn input_format(&self) -> AudioFormat {
        self.input_format
    }

    /// Runs one input chunk through the full chain, returning the produced
    /// interleaved i32 samples at `output_channels`/`output_rate`. The
    /// returned length varies call to call (resampler phase carries over)
    /// and may legitimately be zero if not enough input has accumulated yet
    /// to produce a full output frame.
    pub fn process_audio(
        &mut self,
        input_bytes: &[u8],
        chlayout1: u8,
        chlayout2: u8,
        playback_rate: f64,
    ) -> Vec<i32> {
        let input_channels = self.input_format.channels as usize;
        let decoded = decode_to_f64(input_bytes, self.input_format.bit_depth);

        let layout = self
            .speaker_layouts
            .get(&self.input_format.channels)
            .cloned()
            .unwrap_or_else(|| SpeakerLayout { auto_mode: true, ..SpeakerLayout::identity() });

        let remixed = remix_buffer(
            &decoded,
            &layout,
            input_channels,
            self.output_channels,
            chlayout1,
            chlayout2,
        );

        let mut resampled = self.resampler.process(&remixed, playback_rate);
        if resampled.is_empty() {
            return Vec::new();
        }

        self.dc_blocker.process_interleaved(&mut resampled);
        self.eq.process_interleaved(&mut resampled);
        if self.eq_normalization_enabled {
            self.eq_normalizer.process(&mut resampled);
        }

        self.volume.apply(&mut resampled);
        if self.volume_normalization_enabled {
            self.volume_normalizer.process(&mut resampled);
        }

        resampled
            .iter()
            .map(|&s| finalize_sample(s, self.tuning.soft_clip_threshold, self.tuning.soft_clip_knee))
            .collect()
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_core::BitDepth;

    fn test_config() -> ProcessorConfig {
        ProcessorConfig {
            input_format: AudioFormat { channels: 2, sample_rate: 48000, bit_depth: BitDepth::Sixteen },
            output_channels: 2,
            output_rate: 48000,
            initial_volume: 1.0,
            tuning: ProcessorTuning::default(),
        }
    }

    #[test]
    fn produces_no_malformed_chunks_at_unity_rate() {
        let mut proc = AudioProcessor::new(test_config());
        let frame_count = 288; // 1152 bytes / (2ch * 2 bytes)
        let mut bytes = Vec::with_capacity(frame_count * 4);
        for i in 0..frame_count {
            let s = ((i as f64 * 0.05).sin() * 10000.0) as i16;
            bytes.extend_from_slice(&s.to_le_bytes());
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let out = proc.process_audio(&bytes, 0, 0, 1.0);
        assert_eq!(out.len() % 2, 0, "output must be an integer number of stereo frames");
    }

    #[test]
    fn volume_zero_produces_near_silence() {
        let mut proc = AudioProcessor::new(test_config());
        proc.set_volume(0.0);
        let frame_count = 288;
        let mut bytes = Vec::with_capacity(frame_count * 4);
        for _ in 0..frame_count {
            bytes.extend_from_slice(&20000i16.to_le_bytes());
            bytes.extend_from_slice(&20000i16.to_le_bytes());
        }
        // Drive the smoother to converge.
        for _ in 0..20 {
            proc.process_audio(&bytes, 0, 0, 1.0);
        }
        let out = proc.process_audio(&bytes, 0, 0, 1.0);
        let peak = out.iter().map(|s| s.abs()).max().unwrap_or(0);
        assert!(peak < (i32::MAX / 100), "volume=0 should produce near-silence after smoothing converges");
    }
}
