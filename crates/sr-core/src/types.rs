use std::time::Instant;

/// Number of speaker layout matrix rows/columns (max channel count addressed
/// by a remix matrix).
pub const MAX_LAYOUT_CHANNELS: usize = 8;

/// Number of parametric EQ bands exposed by the Audio Processor.
pub const EQ_BANDS: usize = 12;

/// Supported PCM bit depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BitDepth {
    Eight = 8,
    Sixteen = 16,
    TwentyFour = 24,
    ThirtyTwo = 32,
}

impl BitDepth {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Sixteen => 2,
            BitDepth::TwentyFour => 3,
            BitDepth::ThirtyTwo => 4,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            8 => Some(BitDepth::Eight),
            16 => Some(BitDepth::Sixteen),
            24 => Some(BitDepth::TwentyFour),
            32 => Some(BitDepth::ThirtyTwo),
            _ => None,
        }
    }
}

/// Describes the wire format of a packet or chunk: channel count, sample
/// rate, and bit depth. Two format-carrying types (packet, chunk) both embed
/// this so format-change detection is a single equality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioFormat {
    pub channels: u8,
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
}

impl AudioFormat {
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.bit_depth.bytes_per_sample()
    }
}

/// An 8x8 gain matrix used to remix from an input channel count to an output
/// channel count, plus an "auto" flag meaning: derive the matrix from the
/// two channel-layout bytes instead of using `matrix` directly.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeakerLayout {
    pub auto_mode: bool,
    pub matrix: [[f64; MAX_LAYOUT_CHANNELS]; MAX_LAYOUT_CHANNELS],
}

impl SpeakerLayout {
    /// Identity matrix (channel N of input maps 1:1 to channel N of output).
    pub fn identity() -> Self {
        let mut matrix = [[0.0; MAX_LAYOUT_CHANNELS]; MAX_LAYOUT_CHANNELS];
        for i in 0..MAX_LAYOUT_CHANNELS {
            matrix[i][i] = 1.0;
        }
        Self { auto_mode: false, matrix }
    }
}

impl Default for SpeakerLayout {
    fn default() -> Self {
        Self::identity()
    }
}

/// The unit of ingress: one timed, tagged packet of raw PCM bytes.
///
/// Invariant: `payload.len()` is an integer number of frames at
/// `format.frame_bytes()`.
#[derive(Debug, Clone)]
pub struct TaggedAudioPacket {
    pub source_tag: String,
    pub payload: Vec<u8>,
    pub received_time: Instant,
    /// 32-bit, wrap-around producer timestamp (RTP-style). `None` when the
    /// transport does not carry one (e.g. legacy Scream without RTP framing).
    pub producer_timestamp: Option<u32>,
    /// Contributing producer IDs (CSRCs), propagated to egress for annotation.
    pub producer_ids: Vec<u32>,
    pub format: AudioFormat,
    pub chlayout1: u8,
    pub chlayout2: u8,
    pub playback_rate: f64,
}

impl TaggedAudioPacket {
    pub fn frame_count(&self) -> usize {
        let frame_bytes = self.format.frame_bytes();
        if frame_bytes == 0 {
            0
        } else {
            self.payload.len() / frame_bytes
        }
    }
}

/// The unit between Source Processor and Sink Mixer: one fixed-size period
/// of interleaved 32-bit signed samples at the sink's target format.
///
/// Invariant: `samples.len() == sink_frames * sink_channels`.
#[derive(Debug, Clone)]
pub struct ProcessedAudioChunk {
    pub samples: Vec<i32>,
    pub producer_ids: Vec<u32>,
    pub produced_time: Instant,
    pub playback_rate: f64,
}

impl ProcessedAudioChunk {
    pub fn silence(frame_count: usize, channels: usize, produced_time: Instant) -> Self {
        Self {
            samples: vec![0i32; frame_count * channels],
            producer_ids: Vec::new(),
            produced_time,
            playback_rate: 1.0,
        }
    }
}

/// Returns `true` if `tag` begins with `prefix`'s non-`*` portion, honoring
/// the configuration-time `prefix*` wildcard convention.
pub fn tag_matches(configured_tag: &str, concrete_tag: &str) -> bool {
    if let Some(prefix) = configured_tag.strip_suffix('*') {
        concrete_tag.starts_with(prefix)
    } else {
        configured_tag == concrete_tag
    }
}

pub fn is_wildcard_tag(tag: &str) -> bool {
    tag.ends_with('*')
}

pub fn wildcard_prefix(tag: &str) -> Option<&str> {
    tag.strip_suffix('*')
}
