//! MP3 Encoder: an asynchronous worker fed by a bounded, drop-oldest PCM
//! queue. The actual LAME-equivalent codec is out of scope here; this
//! module defines the boundary trait plus two test doubles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as PLMutex;

use sr_core::{BoundedQueue, ComponentHandle, PushOutcome};

/// The codec boundary a real LAME (or equivalent) binding implements.
pub trait Mp3Encoder: Send {
    fn set_bitrate_kbps(&mut self, kbps: u32);
    fn set_vbr(&mut self, enabled: bool);
    /// Encodes one block of interleaved stereo 16-bit PCM, returning zero or
    /// more complete MP3 frames (an encoder may buffer internally and emit
    /// nothing for a given call).
    fn encode(&mut self, pcm_stereo_i16: &[i16]) -> Vec<u8>;
    /// Flushes any residual encoder state, called once on worker shutdown.
    fn flush(&mut self) -> Vec<u8>;
}

/// Used when MP3 output is disabled for a sink: discards everything.
pub struct NullMp3Encoder;

impl Mp3Encoder for NullMp3Encoder {
    fn set_bitrate_kbps(&mut self, _kbps: u32) {}
    fn set_vbr(&mut self, _enabled: bool) {}
    fn encode(&mut self, _pcm_stereo_i16: &[i16]) -> Vec<u8> {
        Vec::new()
    }
    fn flush(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

/// Test double standing in for a real codec: emits the PCM it was given
/// unchanged (as little-endian bytes), so pipeline tests can assert on
/// exactly what reached the encoder without linking a real MP3 library.
pub struct PassthroughMp3Encoder {
    bitrate_kbps: u32,
    vbr_enabled: bool,
}

impl PassthroughMp3Encoder {
    pub fn new() -> Self {
        Self { bitrate_kbps: 192, vbr_enabled: false }
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    pub fn vbr_enabled(&self) -> bool {
        self.vbr_enabled
    }
}

impl Default for PassthroughMp3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp3Encoder for PassthroughMp3Encoder {
    fn set_bitrate_kbps(&mut self, kbps: u32) {
        self.bitrate_kbps = kbps;
    }
    fn set_vbr(&mut self, enabled: bool) {
        self.vbr_enabled = enabled;
    }
    fn encode(&mut self, pcm_stereo_i16: &[i16]) -> Vec<u8> {
        pcm_stereo_i16.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
    fn flush(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

/// Drives an `Mp3Encoder` on its own thread: pulls PCM blocks (already
/// narrowed to stereo 16-bit by the sink mixer), encodes, and pushes
/// complete frames into a bounded output queue.
pub struct Mp3EncoderWorker {
    pcm_queue: Arc<BoundedQueue<Vec<i16>>>,
    output_queue: Arc<BoundedQueue<Vec<u8>>>,
    dropped_pcm_blocks: Arc<AtomicU64>,
    dropped_frames: Arc<AtomicU64>,
    worker: PLMutex<Option<ComponentHandle>>,
}

impl Mp3EncoderWorker {
    pub fn start(mut encoder: Box<dyn Mp3Encoder>, bitrate_kbps: u32, vbr_enabled: bool, pcm_queue_capacity: usize, output_queue_capacity: usize) -> Arc<Self> {
        encoder.set_bitrate_kbps(bitrate_kbps);
        encoder.set_vbr(vbr_enabled);

        let pcm_queue = Arc::new(BoundedQueue::drop_oldest(pcm_queue_capacity));
        let output_queue = Arc::new(BoundedQueue::drop_oldest(output_queue_capacity));
        let dropped_frames = Arc::new(AtomicU64::new(0));

        let worker = {
            let pcm_queue = Arc::clone(&pcm_queue);
            let output_queue = Arc::clone(&output_queue);
            let dropped_frames = Arc::clone(&dropped_frames);
            ComponentHandle::spawn("mp3-encoder", move |stop_flag| {
                while !stop_flag.load(Ordering::Acquire) {
                    let Some(pcm) = pcm_queue.pop_timeout(Duration::from_millis(50)) else {
                        continue;
                    };
                    let frame = encoder.encode(&pcm);
                    if !frame.is_empty() && output_queue.push(frame) == PushOutcome::DroppedOldest {
                        dropped_frames.fetch_add(1, Ordering::Relaxed);
                    }
                }
                let tail = encoder.flush();
                if !tail.is_empty() {
                    output_queue.push(tail);
                }
            })
        };

        Arc::new(Self {
            pcm_queue,
            output_queue,
            dropped_pcm_blocks: Arc::new(AtomicU64::new(0)),
            dropped_frames,
            worker: PLMutex::new(Some(worker)),
        })
    }

    /// Narrows a stereo int32 mix accumulator down to 16-bit PCM and
    /// enqueues it for encoding.
    pub fn push_stereo_i32(&self, samples: &[i32]) {
        let narrowed: Vec<i16> = samples.iter().map(|&s| (s >> 16) as i16).collect();
        if self.pcm_queue.push(narrowed) == PushOutcome::DroppedOldest {
            self.dropped_pcm_blocks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn try_pop_frame(&self) -> Option<Vec<u8>> {
        self.output_queue.try_pop()
    }

    pub fn dropped_pcm_blocks(&self) -> u64 {
        self.dropped_pcm_blocks.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.pcm_queue.stop();
        if let Some(mut handle) = self.worker.lock().take() {
            handle.stop();
        }
    }
}

impl Drop for Mp3EncoderWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_encoder_round_trips_stereo_pcm() {
        let worker = Mp3EncoderWorker::start(Box::new(PassthroughMp3Encoder::new()), 192, false, 8, 8);
        worker.push_stereo_i32(&[0x1234_5678, -1]);
        std::thread::sleep(Duration::from_millis(100));
        let frame = worker.try_pop_frame().expect("expected an encoded frame");
        assert_eq!(frame.len(), 4);
        worker.stop();
    }

    #[test]
    fn null_encoder_never_produces_frames() {
        let worker = Mp3EncoderWorker::start(Box::new(NullMp3Encoder), 192, false, 8, 8);
        worker.push_stereo_i32(&[1, 2, 3, 4]);
        std::thread::sleep(Duration::from_millis(80));
        assert!(worker.try_pop_frame().is_none());
        worker.stop();
    }
}
