//! Control-plane commands accepted by a running `SourceInputProcessor`.
//! Delivered over a dedicated command queue so the processing thread's
//! input loop never blocks on configuration changes (and vice versa).

use sr_core::{SpeakerLayout, EQ_BANDS};

#[derive(Debug, Clone)]
pub enum SourceCommand {
    SetVolume(f64),
    SetEqualizerGainsLinear([f64; EQ_BANDS]),
    SetEqNormalization(bool),
    SetVolumeNormalization(bool),
    /// Informational only at this layer: the Timeshift Manager is the
    /// authority on delay; the processor just tracks it for stats/echo.
    SetDelayMs(f64),
    /// Informational only at this layer, same reasoning as `SetDelayMs`.
    SetTimeshiftSec(f64),
    SetSpeakerLayout { input_channels: u8, layout: SpeakerLayout },
    /// Drain-ratio command from the sink mixer: folded into the resampler
    /// ratio locally rather than fed back to the Timeshift Manager, to
    /// avoid double correction between the drain controller and the PI
    /// controller that already steers ingestion timing.
    SetDrainRateMultiplier(f64),
}
