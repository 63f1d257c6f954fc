//! One registered consumer's dispatch bookkeeping.

use std::sync::Arc;

use sr_core::{is_wildcard_tag, wildcard_prefix, BoundedQueue, TaggedAudioPacket};

/// A registered consumer of the global buffer — one per (instance_id,
/// source_tag) registration. Holds the target ring the Timeshift Manager
/// dispatches copies into, plus the per-consumer delay/timeshift and
/// dispatch cursor.
///
/// Invariant: `next_packet_read_index <= buffer.len()` at all times; cleanup
/// decrements it alongside every other target whenever the buffer's front
/// is trimmed.
pub struct ProcessorTargetInfo {
    pub instance_id: String,
    /// The tag as configured — may end in `*` for a wildcard registration.
    pub configured_tag: String,
    pub queue: Arc<BoundedQueue<TaggedAudioPacket>>,
    pub delay_ms: f64,
    pub timeshift_sec: f64,
    pub next_packet_read_index: usize,
    /// Set once a wildcard registration has been bound to a concrete tag by
    /// `stream-tag-resolved`. Always `Some(configured_tag)` for non-wildcard
    /// registrations.
    pub bound_tag: Option<String>,
    pub dispatched_count: u64,
    pub dropped_count: u64,
    pub late_count: u64,
    pub high_water_mark: usize,
}

impl ProcessorTargetInfo {
    pub fn new(
        instance_id: String,
        configured_tag: String,
        queue: Arc<BoundedQueue<TaggedAudioPacket>>,
        delay_ms: f64,
        timeshift_sec: f64,
        initial_read_index: usize,
    ) -> Self {
        let bound_tag = if is_wildcard_tag(&configured_tag) {
            None
        } else {
            Some(configured_tag.clone())
        };
        Self {
            instance_id,
            configured_tag,
            queue,
            delay_ms,
            timeshift_sec,
            next_packet_read_index: initial_read_index,
            bound_tag,
            dispatched_count: 0,
            dropped_count: 0,
            late_count: 0,
            high_water_mark: 0,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        is_wildcard_tag(&self.configured_tag)
    }

    pub fn wildcard_prefix(&self) -> Option<&str> {
        wildcard_prefix(&self.configured_tag)
    }

    pub fn matches_concrete_tag(&self, concrete: &str) -> bool {
        sr_core::tag_matches(&self.configured_tag, concrete)
    }
}
