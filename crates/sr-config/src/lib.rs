//! sr-config: the declarative Config Applier that diffs a desired engine
//! state against the live audio graph and reconciles the difference.

mod applier;
mod managers;
mod types;

pub use applier::{ApplyReport, ConfigApplier, EngineGraph};
pub use managers::{ConnectionManager, ReceiverManager, SinkManager, SourceManager};
pub use types::{AppliedSinkParams, AppliedSourcePathParams, DesiredEngineState, SinkEngineConfig};
