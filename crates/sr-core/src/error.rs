use thiserror::Error;

/// Errors surfaced at the command boundary of the audio engine.
///
/// Transient conditions (I/O timeouts, dropped packets) are not modeled here —
/// they are counted in stats, not raised. This enum covers rejections that a
/// caller needs to react to.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("equalizer band count mismatch: expected {expected}, got {got}")]
    EqBandMismatch { expected: usize, got: usize },

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("unknown sink id: {0}")]
    UnknownSink(String),

    #[error("unknown source instance: {0}")]
    UnknownSource(String),

    #[error("unknown connection: source {source} -> sink {sink}")]
    UnknownConnection { source: String, sink: String },

    #[error("graph inconsistency: {0}")]
    GraphInconsistency(String),

    #[error("external component failed: {0}")]
    ExternalFailure(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
