//! The Sink Audio Mixer: ties the Mix Scheduler, drain-ratio controller,
//! Listener Dispatcher and MP3 encoder together behind one periodic mix
//! timer running at the sink's output frame period.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as PLMutex;

use sr_core::{BoundedQueue, ComponentHandle, MixerTuning, ProcessedAudioChunk, SpeakerLayout};
use sr_dsp::clip::finalize_sample;
use sr_dsp::remix::remix_buffer;
use sr_source::SourceCommand;

use crate::drain::DrainRateController;
use crate::listener::ListenerDispatcher;
use crate::mp3::Mp3EncoderWorker;
use crate::scheduler::MixScheduler;

pub struct SinkMixerConfig {
    pub sink_id: String,
    pub output_channels: u8,
    pub output_rate: u32,
    pub output_bit_depth: sr_core::BitDepth,
    pub frame_count: usize,
    pub tuning: MixerTuning,
    /// Maps the sink's native channel count down to stereo for listeners
    /// that only want two channels (and for MP3). Identity when the sink is
    /// already stereo.
    pub stereo_downmix: SpeakerLayout,
}

#[derive(Debug, Clone, Default)]
pub struct SinkMixerStats {
    pub ticks: u64,
    pub underruns: u64,
    pub mixed_chunks: u64,
}

struct DrainTargets {
    command_queues: HashMap<String, Arc<BoundedQueue<SourceCommand>>>,
}

/// One sink's mixing pipeline: owns the Mix Scheduler (per-source ready
/// rings), the drain-ratio controller, the Listener Dispatcher, and
/// optionally an MP3 encoder worker, driven by one timer thread.
pub struct SinkAudioMixer {
    sink_id: String,
    output_channels: usize,
    output_bit_depth: sr_core::BitDepth,
    frame_count: usize,
    stereo_downmix: SpeakerLayout,
    soft_clip_threshold: f64,
    soft_clip_knee: f64,
    scheduler: Arc<MixScheduler>,
    drain: Arc<DrainRateController>,
    pub listeners: Arc<ListenerDispatcher>,
    mp3: PLMutex<Option<Arc<Mp3EncoderWorker>>>,
    drain_targets: PLMutex<DrainTargets>,
    underruns: AtomicU64,
    mixed_chunks: AtomicU64,
    ticks: AtomicU64,
    running: AtomicBool,
    timer: PLMutex<Option<ComponentHandle>>,
}

impl SinkAudioMixer {
    pub fn start(config: SinkMixerConfig) -> Arc<Self> {
        let period_ms = (config.frame_count as f64 / config.output_rate.max(1) as f64) * 1000.0;
        let scheduler = Arc::new(MixScheduler::new(config.sink_id.clone(), config.tuning.max_ready_chunks_per_source));
        let drain = Arc::new(DrainRateController::new(config.tuning.clone(), period_ms.max(1e-6)));
        let listeners = Arc::new(ListenerDispatcher::new());
        let soft_clip_threshold = config.tuning.soft_clip_threshold;
        let soft_clip_knee = config.tuning.soft_clip_knee;

        let mixer = Arc::new(Self {
            sink_id: config.sink_id.clone(),
            output_channels: config.output_channels as usize,
            output_bit_depth: config.output_bit_depth,
            frame_count: config.frame_count,
            stereo_downmix: config.stereo_downmix,
            soft_clip_threshold,
            soft_clip_knee,
            scheduler,
            drain,
            listeners,
            mp3: PLMutex::new(None),
            drain_targets: PLMutex::new(DrainTargets { command_queues: HashMap::new() }),
            underruns: AtomicU64::new(0),
            mixed_chunks: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(true),
            timer: PLMutex::new(None),
        });

        let timer = {
            let mixer = Arc::clone(&mixer);
            let period = Duration::from_secs_f64((period_ms / 1000.0).max(1e-4));
            ComponentHandle::spawn(format!("sink-mix-{}", config.sink_id), move |stop_flag| {
                let mut next_tick = Instant::now() + period;
                while !stop_flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < next_tick {
                        std::thread::sleep((next_tick - now).min(period));
                        continue;
                    }
                    mixer.tick();
                    next_tick += period;
                    // If we fell badly behind (e.g. under debugger/test load),
                    // resynchronize rather than spin catching up forever.
                    if Instant::now() > next_tick + period * 4 {
                        next_tick = Instant::now() + period;
                    }
                }
            })
        };
        *mixer.timer.lock() = Some(timer);
        mixer
    }

    pub fn sink_id(&self) -> &str {
        &self.sink_id
    }

    pub fn attach_source(
        &self,
        source_instance_id: impl Into<String>,
        source_output: Arc<BoundedQueue<ProcessedAudioChunk>>,
        command_queue: Option<Arc<BoundedQueue<SourceCommand>>>,
    ) {
        let source_instance_id = source_instance_id.into();
        log::debug!("sink {} attaching source {source_instance_id}", self.sink_id);
        self.scheduler.attach_source(source_instance_id.clone(), source_output);
        let mut targets = self.drain_targets.lock();
        if let Some(q) = command_queue {
            targets.command_queues.insert(source_instance_id, q);
        } else {
            targets.command_queues.remove(&source_instance_id);
        }
    }

    pub fn detach_source(&self, source_instance_id: &str) {
        log::debug!("sink {} detaching source {source_instance_id}", self.sink_id);
        self.scheduler.detach_source(source_instance_id);
        self.drain.remove_source(source_instance_id);
        self.drain_targets.lock().command_queues.remove(source_instance_id);
    }

    pub fn enable_mp3(&self, worker: Arc<Mp3EncoderWorker>) {
        *self.mp3.lock() = Some(worker);
    }

    pub fn disable_mp3(&self) {
        *self.mp3.lock() = None;
    }

    pub fn try_pop_mp3_frame(&self) -> Option<Vec<u8>> {
        self.mp3.lock().as_ref().and_then(|w| w.try_pop_frame())
    }

    pub fn stats(&self) -> SinkMixerStats {
        SinkMixerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            mixed_chunks: self.mixed_chunks.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(mut handle) = self.timer.lock().take() {
            handle.stop();
        }
        self.scheduler.stop();
        if let Some(mp3) = self.mp3.lock().take() {
            mp3.stop();
        }
    }

    /// One mix period: harvest, sum, clip, remix, dispatch. Executed on the
    /// timer thread only — never called concurrently with itself.
    fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let harvested = self.scheduler.harvest_tick();

        self.drive_drain_controller();

        if harvested.is_empty() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            let silence = vec![0i32; self.frame_count * self.output_channels];
            self.dispatch(&silence, &[]);
            return;
        }

        self.mixed_chunks.fetch_add(1, Ordering::Relaxed);
        let sample_count = self.frame_count * self.output_channels;
        let mut accumulator = vec![0.0f64; sample_count];
        let mut csrcs = Vec::new();
        for harvested_chunk in &harvested {
            let chunk = &harvested_chunk.chunk;
            for (acc, &sample) in accumulator.iter_mut().zip(chunk.samples.iter()) {
                *acc += sample as f64 / i32::MAX as f64;
            }
            csrcs.extend(chunk.producer_ids.iter().copied());
        }
        csrcs.sort_unstable();
        csrcs.dedup();

        let native: Vec<i32> = accumulator
            .iter()
            .map(|&s| finalize_sample(s, self.soft_clip_threshold, self.soft_clip_knee))
            .collect();
        self.dispatch(&native, &csrcs);
    }

    fn dispatch(&self, native: &[i32], csrcs: &[u32]) {
        let stereo = if self.output_channels == 2 {
            native.to_vec()
        } else {
            let native_f64: Vec<f64> = native.iter().map(|&s| s as f64 / i32::MAX as f64).collect();
            let downmixed = remix_buffer(&native_f64, &self.stereo_downmix, self.output_channels, 2, 0, 0);
            downmixed.iter().map(|&s| finalize_sample(s, self.soft_clip_threshold, self.soft_clip_knee)).collect()
        };

        if let Some(mp3) = self.mp3.lock().as_ref() {
            mp3.push_stereo_i32(&stereo);
        }

        let stereo_bytes = narrow_to_bytes(&stereo, self.output_bit_depth);
        let native_bytes = narrow_to_bytes(native, self.output_bit_depth);
        self.listeners.dispatch_frame(&stereo_bytes, &native_bytes, csrcs);
    }

    fn drive_drain_controller(&self) {
        let targets = self.drain_targets.lock();
        for (source_id, command_queue) in targets.command_queues.iter() {
            let Some(depth) = self.scheduler.ready_depth(source_id) else { continue };
            if let Some(ratio) = self.drain.observe(source_id, depth) {
                command_queue.push(SourceCommand::SetDrainRateMultiplier(ratio));
            }
        }
    }
}

impl Drop for SinkAudioMixer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Narrows interleaved i32 accumulator samples down to the sink's configured
/// output bit depth, little-endian, matching the byte layout Scream/RTP
/// payload framing expects from the data-model side of §6 (the framing
/// bytes themselves are an out-of-scope transport concern).
fn narrow_to_bytes(samples: &[i32], bit_depth: sr_core::BitDepth) -> Vec<u8> {
    use sr_core::BitDepth;
    match bit_depth {
        BitDepth::Eight => samples.iter().map(|&s| ((s >> 24) as i8) as u8).collect(),
        BitDepth::Sixteen => samples.iter().flat_map(|&s| ((s >> 16) as i16).to_le_bytes()).collect(),
        BitDepth::TwentyFour => samples
            .iter()
            .flat_map(|&s| {
                let widened = s >> 8;
                [(widened & 0xFF) as u8, ((widened >> 8) & 0xFF) as u8, ((widened >> 16) & 0xFF) as u8]
            })
            .collect(),
        BitDepth::ThirtyTwo => samples.iter().flat_map(|&s| s.to_le_bytes()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_core::BitDepth;
    use std::sync::atomic::AtomicUsize;

    struct RecordingTransport {
        frames: AtomicUsize,
    }

    impl crate::listener::EgressTransport for RecordingTransport {
        fn send_payload(&self, _bytes: &[u8], _csrcs: &[u32]) -> bool {
            self.frames.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    fn chunk(fill: i32, frames: usize, channels: usize) -> ProcessedAudioChunk {
        ProcessedAudioChunk {
            samples: vec![fill; frames * channels],
            producer_ids: vec![7],
            produced_time: Instant::now(),
            playback_rate: 1.0,
        }
    }

    fn base_config(sink_id: &str) -> SinkMixerConfig {
        SinkMixerConfig {
            sink_id: sink_id.to_string(),
            output_channels: 2,
            output_rate: 48000,
            output_bit_depth: BitDepth::Sixteen,
            frame_count: 64,
            tuning: MixerTuning { ..Default::default() },
            stereo_downmix: SpeakerLayout::identity(),
        }
    }

    #[test]
    fn silence_counts_as_underrun_when_no_source_ready() {
        let mixer = SinkAudioMixer::start(base_config("sink-a"));
        std::thread::sleep(Duration::from_millis(80));
        let stats = mixer.stats();
        assert!(stats.ticks > 0);
        assert!(stats.underruns > 0);
        mixer.stop();
    }

    #[test]
    fn mixes_and_dispatches_to_listener() {
        let mixer = SinkAudioMixer::start(base_config("sink-b"));
        let transport = Arc::new(RecordingTransport { frames: AtomicUsize::new(0) });
        mixer.listeners.add_listener("l1", crate::listener::EgressKind::ScreamUdp, transport.clone());

        let output = Arc::new(BoundedQueue::drop_oldest(8));
        output.push(chunk(1_000_000, 64, 2));
        mixer.attach_source("src-1", output, None);

        std::thread::sleep(Duration::from_millis(120));
        assert!(transport.frames.load(Ordering::Relaxed) > 0);
        mixer.stop();
    }
}
