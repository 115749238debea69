//! Media identifiers, timebases and sample/pixel formats

use serde::{Deserialize, Serialize};
use std::fmt;

/// Media type of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Audio samples
    Audio,
    /// Video pictures
    Video,
    /// Timed metadata
    Data,
    /// Subtitles
    Subtitle,
}

impl MediaType {
    /// Lowercase name used in logs and engine names
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Data => "data",
            MediaType::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codec identity of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    /// Raw interleaved PCM
    Pcm,
    /// AAC in ADTS framing
    Aac,
    /// Opus
    Opus,
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// VP8
    Vp8,
}

impl CodecId {
    /// Human readable codec name
    pub fn name(&self) -> &'static str {
        match self {
            CodecId::Pcm => "PCM",
            CodecId::Aac => "AAC",
            CodecId::Opus => "Opus",
            CodecId::H264 => "H.264",
            CodecId::H265 => "H.265",
            CodecId::Vp8 => "VP8",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Codec module that runs the codec for a track
///
/// Used by engine specific error heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecModule {
    /// Software implementation
    #[default]
    Default,
    /// NVIDIA NVENC/NVDEC
    Nvidia,
    /// Intel Quick Sync Video
    Qsv,
    /// Xilinx media accelerator
    Xma,
}

/// Rational unit in which a track's timestamps are expressed
///
/// A timebase of `1/90000` means one tick is 1/90000 of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timebase {
    /// Numerator
    pub num: i64,
    /// Denominator
    pub den: i64,
}

impl Timebase {
    /// Create a new timebase
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Ticks per second
    pub fn timescale(&self) -> i64 {
        if self.num == 0 {
            return 0;
        }
        self.den / self.num
    }

    /// Convert `value` expressed in `self` into `target`, rounding to nearest
    pub fn rescale(&self, value: i64, target: Timebase) -> i64 {
        let numerator = value as i128 * self.num as i128 * target.den as i128;
        let denominator = self.den as i128 * target.num as i128;
        if denominator == 0 {
            return 0;
        }
        let (numerator, denominator) = if denominator < 0 {
            (-numerator, -denominator)
        } else {
            (numerator, denominator)
        };
        let rounded = if numerator >= 0 {
            (numerator + denominator / 2) / denominator
        } else {
            (numerator - denominator / 2) / denominator
        };
        rounded as i64
    }

    /// Duration in ticks of `count` units sampled at `rate` per second
    pub fn ticks_for(&self, count: i64, rate: i64) -> i64 {
        let denominator = rate as i128 * self.num as i128;
        if denominator == 0 {
            return 0;
        }
        (count as i128 * self.den as i128 / denominator) as i64
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::new(1, 1000)
    }
}

impl fmt::Display for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Audio sample format of interleaved PCM data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Unsigned 8-bit
    U8,
    /// Signed 16-bit little endian
    S16,
    /// Signed 32-bit little endian
    S32,
    /// 32-bit float little endian
    #[default]
    F32,
    /// 64-bit float little endian
    F64,
}

impl SampleFormat {
    /// Bytes per sample of a single channel
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S32 | SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }
}

/// Audio channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    /// One channel
    Mono,
    /// Two channels
    #[default]
    Stereo,
    /// Any other channel count
    Custom(u16),
}

impl ChannelLayout {
    /// Layout for a channel count
    pub fn from_count(count: u16) -> Self {
        match count {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            n => ChannelLayout::Custom(n),
        }
    }

    /// Number of channels
    pub fn count(&self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Custom(n) => *n,
        }
    }
}

/// Video pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, three planes
    #[default]
    Yuv420p,
    /// Semi-planar YUV 4:2:0, luma plane plus interleaved chroma plane
    Nv12,
    /// Packed RGBA, 8 bits per component
    Rgba,
    /// Packed BGRA, 8 bits per component
    Bgra,
    /// Packed RGB, 8 bits per component
    Rgb24,
    /// Single 8-bit luma plane
    Gray8,
}

impl PixelFormat {
    /// Bytes needed for a tightly packed picture of the given size
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Yuv420p | PixelFormat::Nv12 => {
                let chroma = w.div_ceil(2) * h.div_ceil(2);
                w * h + chroma * 2
            }
            PixelFormat::Rgba | PixelFormat::Bgra => w * h * 4,
            PixelFormat::Rgb24 => w * h * 3,
            PixelFormat::Gray8 => w * h,
        }
    }

    /// Bytes per pixel for packed formats, `None` for planar ones
    pub fn packed_bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra => Some(4),
            PixelFormat::Rgb24 => Some(3),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Yuv420p | PixelFormat::Nv12 => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timescale() {
        assert_eq!(Timebase::new(1, 90000).timescale(), 90000);
        assert_eq!(Timebase::new(1, 48000).timescale(), 48000);
        assert_eq!(Timebase::new(0, 1000).timescale(), 0);
    }

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let ms = Timebase::new(1, 1000);
        let mpeg = Timebase::new(1, 90000);
        assert_eq!(ms.rescale(1000, mpeg), 90000);
        assert_eq!(mpeg.rescale(3003, ms), 33);
        assert_eq!(mpeg.rescale(-3003, ms), -33);

        let audio = Timebase::new(1, 44100);
        assert_eq!(audio.rescale(1024, Timebase::new(1, 48000)), 1115);
    }

    #[test]
    fn test_ticks_for_samples() {
        let tb = Timebase::new(1, 48000);
        assert_eq!(tb.ticks_for(1024, 48000), 1024);
        assert_eq!(Timebase::new(1, 90000).ticks_for(1, 30), 3000);
        assert_eq!(tb.ticks_for(1024, 0), 0);
    }

    #[test]
    fn test_buffer_sizes() {
        assert_eq!(PixelFormat::Yuv420p.buffer_size(4, 4), 24);
        assert_eq!(PixelFormat::Yuv420p.buffer_size(3, 3), 9 + 2 * 4);
        assert_eq!(PixelFormat::Rgba.buffer_size(2, 2), 16);
        assert_eq!(PixelFormat::Gray8.buffer_size(5, 1), 5);
    }

    #[test]
    fn test_channel_layout_count() {
        assert_eq!(ChannelLayout::from_count(1), ChannelLayout::Mono);
        assert_eq!(ChannelLayout::from_count(6).count(), 6);
    }
}
