//! sr-source: the Source Input Processor — one DSP pipeline per registered
//! (instance, source tag, sink format) triple, threaded so command
//! handling never stalls audio processing.

mod commands;
mod processor;

pub use commands::SourceCommand;
pub use processor::{SourceInputProcessor, SourceProcessorConfig, DEFAULT_INPUT_CHUNK_BYTES};
