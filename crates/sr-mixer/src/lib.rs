//! sr-mixer: the Mix Scheduler and Sink Audio Mixer — per-sink aggregation
//! of Processed-Audio-Chunks from any number of sources into one output
//! stream, fanned out to listeners and (optionally) an MP3 encoder.

pub mod drain;
pub mod listener;
pub mod mp3;
pub mod scheduler;
pub mod sink;

pub use drain::DrainRateController;
pub use listener::{EgressKind, EgressTransport, ListenerDispatcher, ListenerState};
pub use mp3::{Mp3Encoder, Mp3EncoderWorker, NullMp3Encoder, PassthroughMp3Encoder};
pub use scheduler::{HarvestedChunk, MixScheduler};
pub use sink::{SinkAudioMixer, SinkMixerConfig, SinkMixerStats};
