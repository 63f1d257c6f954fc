//! The Source Input Processor: one DSP pipeline per (instance_id,
//! source_tag, sink format) registration, running its own input thread and
//! its own command-dispatch thread so configuration changes never stall
//! audio processing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as PLMutex;

use sr_core::{
    tag_matches, BoundedQueue, ComponentHandle, ProcessedAudioChunk, ProcessorTuning, PushOutcome,
    SpeakerLayout, TaggedAudioPacket, EQ_BANDS,
};
use sr_dsp::{AudioProcessor, ProcessorConfig};

use crate::commands::SourceCommand;

/// Scream's historical PCM chunk size (288 stereo frames at 16-bit):
/// fragments accumulated from inbound packets are processed in chunks of
/// this many bytes, independent of how the transport happened to frame
/// them on the wire.
pub const DEFAULT_INPUT_CHUNK_BYTES: usize = 1152;

pub struct SourceProcessorConfig {
    pub instance_id: String,
    /// The tag this processor is bound to; may be a wildcard (`prefix*`).
    pub source_tag: String,
    pub output_channels: u8,
    pub output_rate: u32,
    pub initial_volume: f64,
    pub tuning: ProcessorTuning,
    pub input_queue_capacity: usize,
    pub output_queue_capacity: usize,
    pub input_chunk_bytes: usize,
}

impl SourceProcessorConfig {
    pub fn new(instance_id: impl Into<String>, source_tag: impl Into<String>, output_channels: u8, output_rate: u32) -> Self {
        Self {
            instance_id: instance_id.into(),
            source_tag: source_tag.into(),
            output_channels,
            output_rate,
            initial_volume: 1.0,
            tuning: ProcessorTuning::default(),
            input_queue_capacity: 256,
            output_queue_capacity: 64,
            input_chunk_bytes: DEFAULT_INPUT_CHUNK_BYTES,
        }
    }
}

/// State shared between the input thread and the command thread. Protected
/// by a single mutex: command application and DSP processing never race,
/// and commands issued just before a format-triggered rebuild are never
/// lost since the rebuild re-reads this same state.
struct Runtime {
    dsp: Option<AudioProcessor>,
    output_channels: u8,
    output_rate: u32,
    volume: f64,
    eq_gains: [f64; EQ_BANDS],
    eq_normalization: bool,
    volume_normalization: bool,
    speaker_layouts: Vec<(u8, SpeakerLayout)>,
    delay_ms: f64,
    timeshift_sec: f64,
    drain_rate_multiplier: f64,
    tuning: ProcessorTuning,
}

impl Runtime {
    fn apply_command(&mut self, command: SourceCommand) {
        match command {
            SourceCommand::SetVolume(v) => {
                self.volume = v;
                if let Some(dsp) = &mut self.dsp {
                    dsp.set_volume(v);
                }
            }
            SourceCommand::SetEqualizerGainsLinear(gains) => {
                self.eq_gains = gains;
                if let Some(dsp) = &mut self.dsp {
                    dsp.set_equalizer(gains);
                }
            }
            SourceCommand::SetEqNormalization(enabled) => {
                self.eq_normalization = enabled;
                if let Some(dsp) = &mut self.dsp {
                    dsp.set_eq_normalization(enabled);
                }
            }
            SourceCommand::SetVolumeNormalization(enabled) => {
                self.volume_normalization = enabled;
                if let Some(dsp) = &mut self.dsp {
                    dsp.set_volume_normalization(enabled);
                }
            }
            SourceCommand::SetDelayMs(ms) => self.delay_ms = ms,
            SourceCommand::SetTimeshiftSec(sec) => self.timeshift_sec = sec,
            SourceCommand::SetDrainRateMultiplier(ratio) => self.drain_rate_multiplier = ratio,
            SourceCommand::SetSpeakerLayout { input_channels, layout } => {
                if let Some(existing) = self.speaker_layouts.iter_mut().find(|(ch, _)| *ch == input_channels) {
                    existing.1 = layout.clone();
                } else {
                    self.speaker_layouts.push((input_channels, layout.clone()));
                }
                if let Some(dsp) = &mut self.dsp {
                    dsp.update_speaker_layout(input_channels, layout);
                }
            }
        }
    }

    /// Rebuilds the DSP chain for a new input format, replaying every
    /// stored setting onto the fresh instance.
    fn rebuild(&mut self, input_format: sr_core::AudioFormat) {
        let mut dsp = AudioProcessor::new(ProcessorConfig {
            input_format,
            output_channels: self.output_channels as usize,
            output_rate: self.output_rate,
            initial_volume: self.volume,
            tuning: self.tuning.clone(),
        });
        dsp.set_equalizer(self.eq_gains);
        dsp.set_eq_normalization(self.eq_normalization);
        dsp.set_volume_normalization(self.volume_normalization);
        for (channels, layout) in &self.speaker_layouts {
            dsp.update_speaker_layout(*channels, layout.clone());
        }
        self.dsp = Some(dsp);
    }
}

pub struct SourceInputProcessor {
    pub instance_id: String,
    configured_tag: String,
    input_queue: Arc<BoundedQueue<TaggedAudioPacket>>,
    output_queue: Arc<BoundedQueue<ProcessedAudioChunk>>,
    command_queue: Arc<BoundedQueue<SourceCommand>>,
    reconfigurations: Arc<AtomicU64>,
    input_worker: PLMutex<Option<ComponentHandle>>,
    command_worker: PLMutex<Option<ComponentHandle>>,
}

impl SourceInputProcessor {
    pub fn start(config: SourceProcessorConfig) -> Arc<Self> {
        let input_queue = Arc::new(BoundedQueue::drop_oldest(config.input_queue_capacity));
        let output_queue = Arc::new(BoundedQueue::drop_oldest(config.output_queue_capacity));
        let command_queue = Arc::new(BoundedQueue::drop_oldest(32));
        let reconfigurations = Arc::new(AtomicU64::new(0));

        let runtime = Arc::new(PLMutex::new(Runtime {
            dsp: None,
            output_channels: config.output_channels,
            output_rate: config.output_rate,
            volume: config.initial_volume,
            eq_gains: [1.0; EQ_BANDS],
            eq_normalization: false,
            volume_normalization: false,
            speaker_layouts: Vec::new(),
            delay_ms: 0.0,
            timeshift_sec: 0.0,
            drain_rate_multiplier: 1.0,
            tuning: config.tuning,
        }));

        let input_chunk_bytes = config.input_chunk_bytes.max(1);
        let input_worker = {
            let runtime = Arc::clone(&runtime);
            let input_queue = Arc::clone(&input_queue);
            let output_queue = Arc::clone(&output_queue);
            let reconfigurations = Arc::clone(&reconfigurations);
            let instance_id = config.instance_id.clone();
            ComponentHandle::spawn(format!("src-input-{instance_id}"), move |stop_flag| {
                let mut fragment: Vec<u8> = Vec::with_capacity(input_chunk_bytes * 2);
                let mut current_format: Option<sr_core::AudioFormat> = None;
                while !stop_flag.load(Ordering::Acquire) {
                    let Some(packet) = input_queue.pop_timeout(Duration::from_millis(50)) else {
                        if input_queue.is_empty() && stop_flag.load(Ordering::Acquire) {
                            break;
                        }
                        continue;
                    };

                    {
                        let mut runtime = runtime.lock();
                        if current_format != Some(packet.format) || runtime.dsp.is_none() {
                            log::debug!(
                                "source {instance_id} format change {current_format:?} -> {:?}, rebuilding DSP chain",
                                packet.format
                            );
                            runtime.rebuild(packet.format);
                            current_format = Some(packet.format);
                            fragment.clear();
                            reconfigurations.fetch_add(1, Ordering::Relaxed);
                        }
                    }

                    fragment.extend_from_slice(&packet.payload);
                    while fragment.len() >= input_chunk_bytes {
                        let chunk: Vec<u8> = fragment.drain(..input_chunk_bytes).collect();
                        let mut runtime = runtime.lock();
                        let effective_rate = packet.playback_rate * runtime.drain_rate_multiplier;
                        let dsp = runtime.dsp.as_mut().expect("dsp rebuilt above");
                        let samples = dsp.process_audio(&chunk, packet.chlayout1, packet.chlayout2, effective_rate);
                        drop(runtime);
                        if samples.is_empty() {
                            continue;
                        }
                        output_queue.push(ProcessedAudioChunk {
                            samples,
                            producer_ids: packet.producer_ids.clone(),
                            produced_time: Instant::now(),
                            playback_rate: packet.playback_rate,
                        });
                    }
                }
            })
        };

        let command_worker = {
            let runtime = Arc::clone(&runtime);
            let command_queue = Arc::clone(&command_queue);
            ComponentHandle::spawn(format!("src-cmd-{}", config.instance_id), move |stop_flag| {
                while !stop_flag.load(Ordering::Acquire) {
                    let Some(command) = command_queue.pop_timeout(Duration::from_millis(100)) else {
                        continue;
                    };
                    runtime.lock().apply_command(command);
                }
            })
        };

        Arc::new(Self {
            instance_id: config.instance_id,
            configured_tag: config.source_tag,
            input_queue,
            output_queue,
            command_queue,
            reconfigurations,
            input_worker: PLMutex::new(Some(input_worker)),
            command_worker: PLMutex::new(Some(command_worker)),
        })
    }

    pub fn stop(&self) {
        self.input_queue.stop();
        self.command_queue.stop();
        if let Some(mut handle) = self.input_worker.lock().take() {
            handle.stop();
        }
        if let Some(mut handle) = self.command_worker.lock().take() {
            handle.stop();
        }
    }

    pub fn input_queue(&self) -> Arc<BoundedQueue<TaggedAudioPacket>> {
        Arc::clone(&self.input_queue)
    }

    pub fn output_queue(&self) -> Arc<BoundedQueue<ProcessedAudioChunk>> {
        Arc::clone(&self.output_queue)
    }

    pub fn command_queue(&self) -> Arc<BoundedQueue<SourceCommand>> {
        Arc::clone(&self.command_queue)
    }

    pub fn reconfigurations(&self) -> u64 {
        self.reconfigurations.load(Ordering::Relaxed)
    }

    /// Wildcard-aware: a processor registered on `prefix*` matches any
    /// concrete tag beginning with `prefix`.
    pub fn matches_source_tag(&self, concrete_tag: &str) -> bool {
        tag_matches(&self.configured_tag, concrete_tag)
    }

    pub fn configured_tag(&self) -> &str {
        &self.configured_tag
    }
}

impl Drop for SourceInputProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_core::{AudioFormat, BitDepth};

    fn packet(payload_len: usize) -> TaggedAudioPacket {
        TaggedAudioPacket {
            source_tag: "192.168.1.5".to_string(),
            payload: vec![0u8; payload_len],
            received_time: Instant::now(),
            producer_timestamp: None,
            producer_ids: vec![],
            format: AudioFormat { channels: 2, sample_rate: 48000, bit_depth: BitDepth::Sixteen },
            chlayout1: 0,
            chlayout2: 0,
            playback_rate: 1.0,
        }
    }

    #[test]
    fn produces_output_chunks_from_fixed_size_fragments() {
        let config = SourceProcessorConfig::new("p1", "192.168.1.5", 2, 48000);
        let processor = SourceInputProcessor::start(config);
        let input = processor.input_queue();
        let output = processor.output_queue();

        for _ in 0..5 {
            input.push(packet(1152));
        }

        std::thread::sleep(Duration::from_millis(200));
        let mut total_chunks = 0;
        while output.try_pop().is_some() {
            total_chunks += 1;
        }
        assert!(total_chunks > 0, "expected at least one processed chunk");
        processor.stop();
    }

    #[test]
    fn format_change_triggers_reconfiguration() {
        let config = SourceProcessorConfig::new("p1", "192.168.1.5", 2, 48000);
        let processor = SourceInputProcessor::start(config);
        let input = processor.input_queue();

        input.push(packet(1152));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(processor.reconfigurations(), 1);

        let mut changed = packet(1152);
        changed.format = AudioFormat { channels: 1, sample_rate: 44100, bit_depth: BitDepth::Sixteen };
        input.push(changed);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(processor.reconfigurations(), 2);
        processor.stop();
    }

    #[test]
    fn wildcard_tag_matching() {
        let config = SourceProcessorConfig::new("p1", "192.168.1.*", 2, 48000);
        let processor = SourceInputProcessor::start(config);
        assert!(processor.matches_source_tag("192.168.1.77"));
        assert!(!processor.matches_source_tag("10.0.0.1"));
        processor.stop();
    }
}
