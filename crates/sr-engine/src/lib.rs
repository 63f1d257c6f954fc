//! sr-engine: the Audio Manager facade tying the Timeshift Manager,
//! per-source Source Input Processors, and per-sink Sink Audio Mixers into
//! one running audio graph, plus the identity/clock singletons and
//! aggregated statistics the rest of the workspace's crates don't own.

mod ids;
mod logging;
mod manager;
mod stats;
mod types;

pub use ids::{InstanceIdAllocator, PlaybackClock};
pub use logging::init as init_logging;
pub use manager::AudioManager;
pub use stats::{EngineStats, SinkStats, SourceStats};
pub use types::{SinkConfig, SinkEngineConfig, SourceConfig, SourceParameterUpdates};
