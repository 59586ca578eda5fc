/*!
    Media format descriptors.
*/

use std::fmt;

use static_assertions::assert_impl_all;

/**
    The kind of an elementary stream within a container.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/**
    Video pixel formats surfaced to consumers of decoded frames.

    This covers the formats a decoder actually emits after full-range JPEG
    variants have been normalized to their limited-range equivalents. Marked
    non-exhaustive because new decoders may surface additional formats.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12 bits per pixel
    Yuv420p,
    /// Planar YUV 4:2:2, 16 bits per pixel
    Yuv422p,
    /// Planar YUV 4:4:0, 16 bits per pixel
    Yuv440p,
    /// Planar YUV 4:4:4, 24 bits per pixel
    Yuv444p,
    /// Semi-planar YUV 4:2:0 (interleaved chroma), 12 bits per pixel
    Nv12,
    /// Packed RGB, 24 bits per pixel
    Rgb24,
    /// Packed BGR, 24 bits per pixel
    Bgr24,
    /// Packed RGBA, 32 bits per pixel
    Rgba,
    /// Packed BGRA, 32 bits per pixel
    Bgra,
}

impl PixelFormat {
    /**
        Average number of bits per pixel for this format.
    */
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Yuv420p | Self::Nv12 => 12,
            Self::Yuv422p | Self::Yuv440p => 16,
            Self::Yuv444p | Self::Rgb24 | Self::Bgr24 => 24,
            Self::Rgba | Self::Bgra => 32,
        }
    }

    /**
        Returns true if each component lives in its own plane.
    */
    pub const fn is_planar(self) -> bool {
        matches!(
            self,
            Self::Yuv420p | Self::Yuv422p | Self::Yuv440p | Self::Yuv444p
        )
    }
}

/**
    Target audio output format: sample rate and channel count.

    Consumers state the format they want their samples in; the decoder
    resamples as needed to match.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    #[inline]
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} channels", self.sample_rate, self.channels)
    }
}

assert_impl_all!(MediaKind: Send, Sync);
assert_impl_all!(PixelFormat: Send, Sync);
assert_impl_all!(AudioFormat: Send, Sync);
