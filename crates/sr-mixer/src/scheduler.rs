//! Mix Scheduler: one worker thread per source attached to a sink, draining
//! that source's Processed-Audio-Chunk queue into a per-sink ready ring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as PLMutex;

use sr_core::{BoundedQueue, ComponentHandle, ProcessedAudioChunk, PushOutcome};

struct SourceFeed {
    ready_ring: Arc<BoundedQueue<(ProcessedAudioChunk, Instant)>>,
    worker: ComponentHandle,
    dropped: Arc<AtomicU64>,
}

/// Per-sink collection of attached sources. Order of attachment is
/// preserved so the mix timer's round-robin harvest is fair and
/// deterministic across ticks.
pub struct MixScheduler {
    sink_id: String,
    feeds: PLMutex<Vec<(String, SourceFeed)>>,
    max_ready_chunks_per_source: usize,
}

impl MixScheduler {
    pub fn new(sink_id: impl Into<String>, max_ready_chunks_per_source: usize) -> Self {
        Self {
            sink_id: sink_id.into(),
            feeds: PLMutex::new(Vec::new()),
            max_ready_chunks_per_source,
        }
    }

    pub fn sink_id(&self) -> &str {
        &self.sink_id
    }

    /// Spawns a worker draining `source_output` into a fresh ready ring for
    /// `source_instance_id`. Replaces any existing feed for the same id.
    pub fn attach_source(&self, source_instance_id: impl Into<String>, source_output: Arc<BoundedQueue<ProcessedAudioChunk>>) {
        let source_instance_id = source_instance_id.into();
        self.detach_source(&source_instance_id);

        let ready_ring = Arc::new(BoundedQueue::drop_oldest(self.max_ready_chunks_per_source.max(1)));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = {
            let ready_ring = Arc::clone(&ready_ring);
            let dropped = Arc::clone(&dropped);
            ComponentHandle::spawn(format!("mix-feed-{source_instance_id}"), move |stop_flag| {
                while !stop_flag.load(Ordering::Acquire) {
                    let Some(chunk) = source_output.pop_timeout(Duration::from_millis(50)) else {
                        continue;
                    };
                    let outcome = ready_ring.push((chunk, Instant::now()));
                    if outcome == PushOutcome::DroppedOldest {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        };

        self.feeds.lock().push((source_instance_id, SourceFeed { ready_ring, worker, dropped }));
    }

    pub fn detach_source(&self, source_instance_id: &str) -> bool {
        let mut feeds = self.feeds.lock();
        if let Some(pos) = feeds.iter().position(|(id, _)| id == source_instance_id) {
            let (_, mut feed) = feeds.remove(pos);
            feed.worker.stop();
            true
        } else {
            false
        }
    }

    pub fn attached_sources(&self) -> Vec<String> {
        self.feeds.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Harvests at most one chunk from each attached source's ready ring, in
    /// attachment order, returning the harvested chunks along with the age
    /// (arrival-to-harvest latency) of each. Sources with nothing ready are
    /// skipped, not reported as silence — the caller decides what "no
    /// source ready" means for the whole sink.
    pub fn harvest_tick(&self) -> Vec<HarvestedChunk> {
        let feeds = self.feeds.lock();
        let now = Instant::now();
        feeds
            .iter()
            .filter_map(|(id, feed)| {
                feed.ready_ring.try_pop().map(|(chunk, arrived_at)| HarvestedChunk {
                    source_instance_id: id.clone(),
                    age_ms: now.duration_since(arrived_at).as_secs_f64() * 1000.0,
                    chunk,
                })
            })
            .collect()
    }

    /// Ring depth for `source_instance_id`, used by the drain-ratio
    /// controller to compute buffer-ms.
    pub fn ready_depth(&self, source_instance_id: &str) -> Option<usize> {
        self.feeds
            .lock()
            .iter()
            .find(|(id, _)| id == source_instance_id)
            .map(|(_, feed)| feed.ready_ring.len())
    }

    pub fn dropped_count(&self, source_instance_id: &str) -> Option<u64> {
        self.feeds
            .lock()
            .iter()
            .find(|(id, _)| id == source_instance_id)
            .map(|(_, feed)| feed.dropped.load(Ordering::Relaxed))
    }

    pub fn stop(&self) {
        let mut feeds = self.feeds.lock();
        for (_, mut feed) in feeds.drain(..) {
            feed.worker.stop();
        }
    }
}

impl Drop for MixScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct HarvestedChunk {
    pub source_instance_id: String,
    pub chunk: ProcessedAudioChunk,
    pub age_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: Vec<i32>) -> ProcessedAudioChunk {
        ProcessedAudioChunk { samples, producer_ids: vec![], produced_time: Instant::now(), playback_rate: 1.0 }
    }

    #[test]
    fn harvests_at_most_one_chunk_per_source_per_tick() {
        let scheduler = MixScheduler::new("sink-1", 4);
        let output = Arc::new(BoundedQueue::drop_oldest(16));
        scheduler.attach_source("src-a", Arc::clone(&output));

        output.push(chunk(vec![1, 2]));
        output.push(chunk(vec![3, 4]));
        std::thread::sleep(Duration::from_millis(100));

        let first = scheduler.harvest_tick();
        assert_eq!(first.len(), 1);
        let second = scheduler.harvest_tick();
        assert_eq!(second.len(), 1);
        let third = scheduler.harvest_tick();
        assert!(third.is_empty());
        scheduler.stop();
    }

    #[test]
    fn detach_removes_source_from_future_harvests() {
        let scheduler = MixScheduler::new("sink-1", 4);
        let output = Arc::new(BoundedQueue::drop_oldest(16));
        scheduler.attach_source("src-a", Arc::clone(&output));
        assert!(scheduler.detach_source("src-a"));
        assert!(scheduler.attached_sources().is_empty());
    }
}
