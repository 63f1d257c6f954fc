//! The Timeshift Manager: a global, timestamp-indexed buffer serving any
//! number of registered consumers with clock-recovered, jitter-tolerant,
//! in-order dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as PLMutex;
use parking_lot::RwLock;

use sr_core::{BoundedQueue, ComponentHandle, PushOutcome, TaggedAudioPacket, TimeshiftTuning};

use crate::buffer::GlobalTimeshiftBuffer;
use crate::events::WildcardEvent;
use crate::stats::{ProcessorStats, StreamStatsSnapshot, TimeshiftManagerStats};
use crate::target::ProcessorTargetInfo;
use crate::timing::StreamTimingState;

/// Data protected by the manager's single data mutex: the global buffer and
/// the processor-targets map. Timing state per stream uses its
/// own lock (a map-of-locks) specifically so clock updates don't contend
/// this mutex.
struct TimeshiftData {
    buffer: GlobalTimeshiftBuffer,
    targets: HashMap<String, ProcessorTargetInfo>,
}

pub struct TimeshiftManager {
    tuning: TimeshiftTuning,
    data: PLMutex<TimeshiftData>,
    timing_states: RwLock<HashMap<String, Arc<PLMutex<StreamTimingState>>>>,
    inbound_queue: Arc<BoundedQueue<TaggedAudioPacket>>,
    events: Arc<BoundedQueue<WildcardEvent>>,
    total_inbound_dropped: AtomicU64,
    worker: PLMutex<Option<ComponentHandle>>,
}

impl TimeshiftManager {
    pub fn new(tuning: TimeshiftTuning) -> Arc<Self> {
        let max_duration = Duration::from_secs(tuning.max_buffer_duration_sec);
        let inbound_capacity = tuning.inbound_queue_capacity;
        let manager = Arc::new(Self {
            tuning,
            data: PLMutex::new(TimeshiftData {
                buffer: GlobalTimeshiftBuffer::new(max_duration),
                targets: HashMap::new(),
            }),
            timing_states: RwLock::new(HashMap::new()),
            inbound_queue: Arc::new(BoundedQueue::drop_oldest(inbound_capacity)),
            events: Arc::new(BoundedQueue::drop_oldest(256)),
            total_inbound_dropped: AtomicU64::new(0),
            worker: PLMutex::new(None),
        });
        manager.start();
        manager
    }

    fn start(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let handle = ComponentHandle::spawn("timeshift-manager", move |stop_flag| {
            let mut last_cleanup = Instant::now();
            let cleanup_interval = Duration::from_millis(manager.tuning.cleanup_interval_ms);
            let wait_timeout = Duration::from_millis(manager.tuning.loop_max_sleep_ms);
            while !stop_flag.load(Ordering::Acquire) {
                // Drain whatever is already queued without blocking...
                let mut drained_any = false;
                while let Some(packet) = manager.inbound_queue.try_pop() {
                    manager.ingest_packet(packet);
                    drained_any = true;
                }
                // ...then block briefly for the next one so the loop does
                // not busy-spin when idle.
                if !drained_any {
                    if let Some(packet) = manager.inbound_queue.pop_timeout(wait_timeout) {
                        manager.ingest_packet(packet);
                    }
                }

                let now = Instant::now();
                if now.duration_since(last_cleanup) >= cleanup_interval {
                    manager.cleanup(now);
                    last_cleanup = now;
                }
                manager.dispatch(now);
            }
        });
        *self.worker.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.inbound_queue.stop();
        if let Some(mut handle) = self.worker.lock().take() {
            handle.stop();
        }
    }

    /// Appends to the bounded inbound queue; overflow drops the oldest
    /// pending packet and is counted, never surfaced as an error.
    pub fn add_packet(&self, packet: TaggedAudioPacket) {
        if self.inbound_queue.push(packet) == PushOutcome::DroppedOldest {
            self.total_inbound_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn register_processor(
        &self,
        instance_id: impl Into<String>,
        source_tag: impl Into<String>,
        queue: Arc<BoundedQueue<TaggedAudioPacket>>,
        initial_delay_ms: f64,
        initial_timeshift_sec: f64,
    ) {
        let instance_id = instance_id.into();
        let source_tag = source_tag.into();
        log::debug!("registering processor {instance_id} for tag {source_tag}");
        let mut data = self.data.lock();
        let initial_index = data.buffer.len();
        let target =
            ProcessorTargetInfo::new(instance_id.clone(), source_tag, queue, initial_delay_ms, initial_timeshift_sec, initial_index);
        data.targets.insert(instance_id, target);
    }

    pub fn unregister_processor(&self, instance_id: &str) {
        if self.data.lock().targets.remove(instance_id).is_some() {
            log::debug!("unregistered processor {instance_id}");
        }
    }

    pub fn update_processor_delay(&self, instance_id: &str, delay_ms: f64) {
        if let Some(target) = self.data.lock().targets.get_mut(instance_id) {
            target.delay_ms = delay_ms;
        }
    }

    /// On a timeshift change, rescans the buffer to find the first packet
    /// whose scheduled play time (at the *new* timeshift) is still in the
    /// future, and resets the read cursor there.
    pub fn update_processor_timeshift(&self, instance_id: &str, timeshift_sec: f64) {
        let now = Instant::now();
        let mut data = self.data.lock();
        let Some(target) = data.targets.get(instance_id) else { return };
        let delay_ms = target.delay_ms;
        let mut new_index = data.buffer.len();
        for idx in 0..data.buffer.len() {
            let packet = data.buffer.get(idx).expect("index within bounds");
            let scheduled = packet.received_time
                + Duration::from_millis(delay_ms.max(0.0) as u64)
                + Duration::from_secs_f64(timeshift_sec.max(0.0));
            if scheduled >= now {
                new_index = idx;
                break;
            }
        }
        if let Some(target) = data.targets.get_mut(instance_id) {
            target.timeshift_sec = timeshift_sec;
            target.next_packet_read_index = new_index;
        }
    }

    pub fn export_recent_buffer(&self, tag: &str, lookback: Duration) -> Vec<TaggedAudioPacket> {
        self.data.lock().buffer.export_recent(tag, lookback, Instant::now())
    }

    pub fn next_wildcard_event(&self) -> Option<WildcardEvent> {
        self.events.try_pop()
    }

    pub fn reset_stream_state(&self, source_tag: &str) {
        self.timing_states.write().remove(source_tag);
    }

    pub fn get_stats(&self) -> TimeshiftManagerStats {
        let data = self.data.lock();
        let mut per_processor = HashMap::new();
        for (id, target) in data.targets.iter() {
            per_processor.insert(
                id.clone(),
                ProcessorStats {
                    dispatched: target.dispatched_count,
                    dropped: target.dropped_count,
                    late: target.late_count,
                    high_water_mark: target.high_water_mark,
                },
            );
        }
        let global_buffer_len = data.buffer.len();
        drop(data);

        let mut per_stream = HashMap::new();
        for (tag, state) in self.timing_states.read().iter() {
            let state = state.lock();
            per_stream.insert(
                tag.clone(),
                StreamStatsSnapshot {
                    jitter_ms: state.jitter_ms(),
                    playback_rate: state.playback_rate(),
                    target_buffer_ms: state.target_buffer_ms(),
                    counters: state.counters.clone(),
                },
            );
        }

        TimeshiftManagerStats {
            total_inbound_dropped: self.total_inbound_dropped.load(Ordering::Relaxed),
            global_buffer_len,
            per_stream,
            per_processor,
        }
    }

    fn ingest_packet(&self, packet: TaggedAudioPacket) {
        let now = Instant::now();
        let tag = packet.source_tag.clone();
        let nominal_sample_rate = packet.format.sample_rate;

        let state_handle = {
            let existing = self.timing_states.read().get(&tag).cloned();
            match existing {
                Some(h) => h,
                None => {
                    let handle = Arc::new(PLMutex::new(StreamTimingState::new(
                        nominal_sample_rate,
                        self.tuning.jitter_smoothing_factor,
                        now,
                        &self.tuning,
                    )));
                    self.timing_states.write().insert(tag.clone(), Arc::clone(&handle));
                    handle
                }
            }
        };

        let observed_depth_ms = self.estimate_observed_depth_ms(&tag);
        {
            let mut state = state_handle.lock();
            state.on_packet_arrival(packet.producer_timestamp, now, observed_depth_ms, &self.tuning);
        }

        let mut data = self.data.lock();
        data.buffer.push(packet);
        let new_index = data.buffer.len() - 1;

        // Wildcard binding: any unbound wildcard target whose prefix
        // matches this concrete tag binds now and starts dispatching from
        // this packet forward.
        let mut resolved = Vec::new();
        for target in data.targets.values_mut() {
            if target.is_wildcard() && target.bound_tag.is_none() {
                if let Some(prefix) = target.wildcard_prefix() {
                    if tag.starts_with(prefix) {
                        target.bound_tag = Some(tag.clone());
                        target.next_packet_read_index = new_index;
                        resolved.push((target.configured_tag.clone(), tag.clone()));
                    }
                }
            }
        }
        drop(data);

        for (wildcard, concrete) in resolved {
            log::info!("wildcard {wildcard} bound to concrete stream {concrete}");
            self.events.push(WildcardEvent::StreamTagResolved { wildcard, concrete });
        }
    }

    /// Coarse proxy for "how much audio is queued for this stream right
    /// now": buffer backlog for the tag's least-caught-up target, in
    /// milliseconds, using the stream's nominal packet duration. Good
    /// enough to drive the PI controller's error term without needing a
    /// second synchronized data structure.
    fn estimate_observed_depth_ms(&self, tag: &str) -> f64 {
        let data = self.data.lock();
        let backlog_packets = data
            .targets
            .values()
            .filter(|t| t.bound_tag.as_deref() == Some(tag))
            .map(|t| data.buffer.len().saturating_sub(t.next_packet_read_index))
            .max()
            .unwrap_or(0);
        // Packets arrive roughly every ~12ms at the Scream nominal rate;
        // this is a reasonable default when no target has bound yet.
        backlog_packets as f64 * 12.0
    }

    fn dispatch(&self, now: Instant) {
        let mut data = self.data.lock();
        let late_threshold = Duration::from_millis(self.tuning.late_packet_threshold_ms as u64);

        // Effective static delay is the max across all consumers of the
        // same concrete tag (the "unified jitter buffer" rule).
        let mut max_delay_by_tag: HashMap<String, f64> = HashMap::new();
        for target in data.targets.values() {
            if let Some(tag) = &target.bound_tag {
                let entry = max_delay_by_tag.entry(tag.clone()).or_insert(0.0);
                if target.delay_ms > *entry {
                    *entry = target.delay_ms;
                }
            }
        }

        let buffer_len = data.buffer.len();
        let timing_states = self.timing_states.read();

        for target in data.targets.values_mut() {
            let Some(tag) = target.bound_tag.clone() else { continue };
            let max_delay = *max_delay_by_tag.get(&tag).unwrap_or(&0.0);
            let target_buffer_ms = timing_states.get(&tag).map(|s| s.lock().target_buffer_ms()).unwrap_or(0.0);
            let effective_delay_ms = max_delay + target_buffer_ms;
            let playback_rate = timing_states.get(&tag).map(|s| s.lock().playback_rate()).unwrap_or(1.0);

            while target.next_packet_read_index < buffer_len {
                let packet = data.buffer.get(target.next_packet_read_index).expect("index within bounds");
                // The global buffer interleaves every ingress tag; a
                // consumer only ever dispatches against its own bound tag,
                // so packets belonging to other streams are skipped in
                // place rather than breaking the loop.
                if packet.source_tag != tag {
                    target.next_packet_read_index += 1;
                    continue;
                }
                let scheduled = packet.received_time
                    + Duration::from_millis(effective_delay_ms.max(0.0) as u64)
                    + Duration::from_secs_f64(target.timeshift_sec.max(0.0));
                if scheduled > now {
                    break;
                }
                let mut copy = packet.clone();
                copy.playback_rate = playback_rate;
                let outcome = target.queue.push(copy);
                if outcome == PushOutcome::DroppedOldest {
                    target.dropped_count += 1;
                }
                if now.duration_since(scheduled) > late_threshold {
                    target.late_count += 1;
                }
                target.dispatched_count += 1;
                target.high_water_mark = target.high_water_mark.max(target.queue.len());
                target.next_packet_read_index += 1;
            }
        }
    }

    fn cleanup(&self, now: Instant) {
        let mut data = self.data.lock();
        let min_index = data
            .targets
            .values()
            .filter(|t| t.bound_tag.is_some())
            .map(|t| t.next_packet_read_index)
            .min()
            .unwrap_or(data.buffer.len());

        let removed = data.buffer.cleanup(now, min_index);
        if removed > 0 {
            for target in data.targets.values_mut() {
                target.next_packet_read_index = target.next_packet_read_index.saturating_sub(removed);
            }
        }
    }
}
