//! Channel remixing: applies an explicit gain matrix, or derives one
//! automatically from channel-layout bytes when `auto_mode` is set.

use sr_core::{SpeakerLayout, MAX_LAYOUT_CHANNELS};

/// Derives a best-effort downmix/upmix matrix from the two Scream
/// channel-layout bytes when no explicit matrix has been configured.
///
/// Known layouts collapse to stereo by equal-power summing of surrounds into
/// L/R; anything unrecognized falls back to the identity (channels beyond
/// the output count are simply dropped, channels short of it left silent).
pub fn auto_mix_matrix(
    input_channels: usize,
    output_channels: usize,
    _chlayout1: u8,
    _chlayout2: u8,
) -> [[f64; MAX_LAYOUT_CHANNELS]; MAX_LAYOUT_CHANNELS] {
    let mut matrix = [[0.0; MAX_LAYOUT_CHANNELS]; MAX_LAYOUT_CHANNELS];
    match (input_channels, output_channels) {
        (a, b) if a == b => {
            for i in 0..a.min(MAX_LAYOUT_CHANNELS) {
                matrix[i][i] = 1.0;
            }
        }
        (1, 2) => {
            matrix[0][0] = 1.0;
            matrix[1][0] = 1.0;
        }
        (2, 1) => {
            matrix[0][0] = 0.5;
            matrix[0][1] = 0.5;
        }
        (in_ch, 2) if in_ch > 2 => {
            // Front L/R pass through; everything else folds down equally
            // into both output channels at reduced gain.
            matrix[0][0] = 1.0;
            matrix[1][1] = 1.0;
            let fold_gain = 1.0 / (in_ch as f64 - 2.0).max(1.0);
            for ch in 2..in_ch.min(MAX_LAYOUT_CHANNELS) {
                matrix[0][ch] = fold_gain * 0.5;
                matrix[1][ch] = fold_gain * 0.5;
            }
        }
        (in_ch, out_ch) => {
            for i in 0..in_ch.min(out_ch).min(MAX_LAYOUT_CHANNELS) {
                matrix[i][i] = 1.0;
            }
        }
    }
    matrix
}

/// Applies `layout` to remix one interleaved input frame (of `input_channels`
/// samples) into `output` (`output_channels` samples).
pub fn remix_frame(
    input_frame: &[f64],
    output_frame: &mut [f64],
    layout: &SpeakerLayout,
    input_channels: usize,
    output_channels: usize,
    chlayout1: u8,
    chlayout2: u8,
) {
    let matrix = if layout.auto_mode {
        auto_mix_matrix(input_channels, output_channels, chlayout1, chlayout2)
    } else {
        layout.matrix
    };
    for (out_ch, out_sample) in output_frame.iter_mut().enumerate().take(output_channels) {
        let mut acc = 0.0;
        for (in_ch, in_sample) in input_frame.iter().enumerate().take(input_channels) {
            if out_ch < MAX_LAYOUT_CHANNELS && in_ch < MAX_LAYOUT_CHANNELS {
                acc += matrix[out_ch][in_ch] * in_sample;
            }
        }
        *out_sample = acc;
    }
}

/// Remixes a full interleaved buffer, frame by frame.
pub fn remix_buffer(
    input: &[f64],
    layout: &SpeakerLayout,
    input_channels: usize,
    output_channels: usize,
    chlayout1: u8,
    chlayout2: u8,
) -> Vec<f64> {
    let frame_count = if input_channels == 0 { 0 } else { input.len() / input_channels };
    let mut output = vec![0.0; frame_count * output_channels];
    for frame_idx in 0..frame_count {
        let in_start = frame_idx * input_channels;
        let out_start = frame_idx * output_channels;
        remix_frame(
            &input[in_start..in_start + input_channels],
            &mut output[out_start..out_start + output_channels],
            layout,
            input_channels,
            output_channels,
            chlayout1,
            chlayout2,
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_layout_passes_through() {
        let layout = SpeakerLayout::identity();
        let input = vec![0.1, 0.2, 0.3, 0.4];
        let output = remix_buffer(&input, &layout, 2, 2, 0, 0);
        assert_eq!(output, input);
    }

    #[test]
    fn mono_to_stereo_duplicates_channel() {
        let mut layout = SpeakerLayout::identity();
        layout.auto_mode = true;
        let input = vec![0.5, -0.5];
        let output = remix_buffer(&input, &layout, 1, 2, 0, 0);
        assert_eq!(output, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut layout = SpeakerLayout::identity();
        layout.auto_mode = true;
        let input = vec![1.0, 0.0];
        let output = remix_buffer(&input, &layout, 2, 1, 0, 0);
        assert_eq!(output, vec![0.5]);
    }
}
