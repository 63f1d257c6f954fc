//! Process-wide identity generators, kept as explicit owned structs rather
//! than statics (grounded on `clock_manager.cpp`'s per-format clock table
//! and the global SSRC allocator referenced by `webrtc_manager.h`, both of
//! which are narrowly-scoped singletons in the original engine).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex as PLMutex;

/// Hands out unique, monotonically increasing instance ids for newly
/// configured source paths.
pub struct InstanceIdAllocator {
    next: AtomicU64,
}

impl InstanceIdAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn allocate(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{n}")
    }
}

impl Default for InstanceIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Assigns a monotonically advancing producer timestamp per source tag for
/// packets fabricated by `write_plugin_packet`, so plugin-injected audio
/// looks to the Timeshift Manager like a normal RTP-style sample counter
/// rather than resetting to zero on every call.
pub struct PlaybackClock {
    next_timestamp: PLMutex<HashMap<String, u32>>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self { next_timestamp: PLMutex::new(HashMap::new()) }
    }

    /// Returns the timestamp to stamp onto the next packet for `source_tag`
    /// and advances the counter by `frame_count` (wrapping, matching the
    /// 32-bit RTP-style counter the rest of the pipeline assumes).
    pub fn next_timestamp(&self, source_tag: &str, frame_count: u32) -> u32 {
        let mut map = self.next_timestamp.lock();
        let entry = map.entry(source_tag.to_string()).or_insert(0);
        let ts = *entry;
        *entry = entry.wrapping_add(frame_count.max(1));
        ts
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_unique_and_prefixed() {
        let allocator = InstanceIdAllocator::new();
        let a = allocator.allocate("src");
        let b = allocator.allocate("src");
        assert_ne!(a, b);
        assert!(a.starts_with("src-"));
    }

    #[test]
    fn playback_clock_advances_independently_per_source() {
        let clock = PlaybackClock::new();
        let t1 = clock.next_timestamp("192.168.1.5", 576);
        let t2 = clock.next_timestamp("192.168.1.5", 576);
        assert_eq!(t1, 0);
        assert_eq!(t2, 576);

        let other = clock.next_timestamp("192.168.1.6", 576);
        assert_eq!(other, 0, "each source tag gets its own independent counter");
    }
}
