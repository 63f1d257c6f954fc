//! The global, timestamp-indexed ring buffer serving all registered
//! consumers. Indices handed out to consumers (`next_packet_read_index`)
//! are positions into this buffer's current `VecDeque`, not an absolute
//! monotonic counter — cleanup shifts them down as it trims the front.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sr_core::TaggedAudioPacket;

pub struct GlobalTimeshiftBuffer {
    packets: VecDeque<TaggedAudioPacket>,
    max_duration: Duration,
}

impl GlobalTimeshiftBuffer {
    pub fn new(max_duration: Duration) -> Self {
        Self { packets: VecDeque::new(), max_duration }
    }

    pub fn push(&mut self, packet: TaggedAudioPacket) {
        self.packets.push_back(packet);
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TaggedAudioPacket> {
        self.packets.get(index)
    }

    /// Trims packets from the front that are both older than the configured
    /// max duration *and* not referenced by any consumer (i.e. at an index
    /// strictly less than `min_read_index`). Returns the number removed.
    ///
    /// Callers are responsible for decrementing every registered target's
    /// `next_packet_read_index` by the returned count afterward (saturating
    /// at zero), preserving the invariant that a read index always refers
    /// to the same logical packet before and after cleanup.
    pub fn cleanup(&mut self, now: Instant, min_read_index: usize) -> usize {
        let mut removed = 0;
        while removed < min_read_index {
            let Some(front) = self.packets.front() else { break };
            if now.duration_since(front.received_time) <= self.max_duration {
                break;
            }
            self.packets.pop_front();
            removed += 1;
        }
        removed
    }

    /// Returns a concatenation of retained packets for `tag` whose arrival
    /// falls within `lookback` of `now`, used by `export_recent_buffer`.
    pub fn export_recent(&self, tag: &str, lookback: Duration, now: Instant) -> Vec<TaggedAudioPacket> {
        self.packets
            .iter()
            .filter(|p| p.source_tag == tag && now.duration_since(p.received_time) <= lookback)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_core::{AudioFormat, BitDepth};

    fn packet(tag: &str, received_time: Instant) -> TaggedAudioPacket {
        TaggedAudioPacket {
            source_tag: tag.to_string(),
            payload: vec![0; 4],
            received_time,
            producer_timestamp: None,
            producer_ids: vec![],
            format: AudioFormat { channels: 2, sample_rate: 48000, bit_depth: BitDepth::Sixteen },
            chlayout1: 0,
            chlayout2: 0,
            playback_rate: 1.0,
        }
    }

    #[test]
    fn cleanup_respects_min_read_index() {
        let mut buf = GlobalTimeshiftBuffer::new(Duration::from_secs(1));
        let old = Instant::now() - Duration::from_secs(5);
        for _ in 0..5 {
            buf.push(packet("a", old));
        }
        // Only 2 packets are "safe" to remove per the minimum read index.
        let removed = buf.cleanup(Instant::now(), 2);
        assert_eq!(removed, 2);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn cleanup_keeps_recent_packets_regardless_of_read_index() {
        let mut buf = GlobalTimeshiftBuffer::new(Duration::from_secs(300));
        buf.push(packet("a", Instant::now()));
        let removed = buf.cleanup(Instant::now(), 10);
        assert_eq!(removed, 0);
    }
}
