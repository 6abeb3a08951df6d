//! Captured media samples.

use std::fmt;

/// The two independent media kinds a session carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Audio => f.write_str("audio"),
        }
    }
}

/// Pixel layout of captured video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit BGR with an ignored padding byte.
    Bgrx,
}

impl PixelFormat {
    /// GStreamer caps format name.
    pub fn caps_name(&self) -> &'static str {
        match self {
            PixelFormat::Bgrx => "BGRx",
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgrx => 4,
        }
    }
}

/// One video frame in source clock time.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts_ns: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// One block of interleaved f32 audio in source clock time.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub pts_ns: u64,
    pub sample_rate: u32,
    pub channels: u32,
    pub samples: Vec<f32>,
}

impl AudioBlock {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playback duration of the block.
    pub fn duration_ns(&self) -> u64 {
        self.frames() as u64 * 1_000_000_000 / self.sample_rate.max(1) as u64
    }

    /// Little-endian byte view for encoders that take raw F32LE.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Rebuild interleaved samples from F32LE bytes. Trailing partial samples are ignored.
    pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

/// One unit of captured media.
#[derive(Debug, Clone)]
pub enum Sample {
    Video(VideoFrame),
    Audio(AudioBlock),
}

impl Sample {
    pub fn kind(&self) -> MediaKind {
        match self {
            Sample::Video(_) => MediaKind::Video,
            Sample::Audio(_) => MediaKind::Audio,
        }
    }

    /// Presentation timestamp in the source clock domain.
    pub fn pts_ns(&self) -> u64 {
        match self {
            Sample::Video(frame) => frame.pts_ns,
            Sample::Audio(block) => block.pts_ns,
        }
    }
}
