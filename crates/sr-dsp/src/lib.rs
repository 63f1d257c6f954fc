//! sr-dsp: the per-source Audio Processor chain — remix, resample,
//! parametric EQ, volume smoothing, RMS normalization, and output clipping.

pub mod biquad;
pub mod clip;
pub mod convert;
pub mod dc_filter;
pub mod eq;
pub mod normalize;
pub mod processor;
pub mod remix;
pub mod resample;
pub mod volume;

pub use processor::{AudioProcessor, ProcessorConfig};
