//! Decoded and transformed media frames

use crate::media::{ChannelLayout, MediaType, PixelFormat, SampleFormat};
use bytes::Bytes;

/// Geometry of an audio frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioGeometry {
    /// Sample format of the interleaved payload
    pub sample_format: SampleFormat,
    /// Channel layout
    pub channel_layout: ChannelLayout,
    /// Samples per channel
    pub samples: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioGeometry {
    /// Expected payload size in bytes
    pub fn buffer_size(&self) -> usize {
        self.samples * self.channel_layout.count() as usize * self.sample_format.bytes_per_sample()
    }
}

/// Geometry of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    /// Pixel format of the tightly packed payload
    pub pixel_format: PixelFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoGeometry {
    /// Expected payload size in bytes
    pub fn buffer_size(&self) -> usize {
        self.pixel_format.buffer_size(self.width, self.height)
    }
}

/// Type specific geometry of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameGeometry {
    /// Audio samples
    Audio(AudioGeometry),
    /// Video picture
    Video(VideoGeometry),
}

/// One decoded or transformed media unit
///
/// Frames move by value down the pipeline: at most one stage works on a
/// frame at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Owning track id
    pub track_id: u32,
    /// Presentation timestamp in the track timebase
    pub pts: Option<i64>,
    /// Duration in the track timebase
    pub duration: i64,
    /// Type specific geometry
    pub geometry: FrameGeometry,
    /// Raw payload
    pub data: Bytes,
}

impl Frame {
    /// Create an audio frame
    pub fn audio(track_id: u32, geometry: AudioGeometry, data: impl Into<Bytes>) -> Self {
        Self {
            track_id,
            pts: None,
            duration: 0,
            geometry: FrameGeometry::Audio(geometry),
            data: data.into(),
        }
    }

    /// Create a video frame
    pub fn video(track_id: u32, geometry: VideoGeometry, data: impl Into<Bytes>) -> Self {
        Self {
            track_id,
            pts: None,
            duration: 0,
            geometry: FrameGeometry::Video(geometry),
            data: data.into(),
        }
    }

    /// Set presentation timestamp
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set duration
    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    /// Media type derived from the geometry
    pub fn media_type(&self) -> MediaType {
        match self.geometry {
            FrameGeometry::Audio(_) => MediaType::Audio,
            FrameGeometry::Video(_) => MediaType::Video,
        }
    }

    /// Audio geometry, if this is an audio frame
    pub fn audio_geometry(&self) -> Option<&AudioGeometry> {
        match &self.geometry {
            FrameGeometry::Audio(geometry) => Some(geometry),
            FrameGeometry::Video(_) => None,
        }
    }

    /// Video geometry, if this is a video frame
    pub fn video_geometry(&self) -> Option<&VideoGeometry> {
        match &self.geometry {
            FrameGeometry::Video(geometry) => Some(geometry),
            FrameGeometry::Audio(_) => None,
        }
    }

    /// Picture width, 0 for audio
    pub fn width(&self) -> u32 {
        self.video_geometry().map_or(0, |g| g.width)
    }

    /// Picture height, 0 for audio
    pub fn height(&self) -> u32 {
        self.video_geometry().map_or(0, |g| g.height)
    }

    /// Samples per channel, 0 for video
    pub fn samples(&self) -> usize {
        self.audio_geometry().map_or(0, |g| g.samples)
    }

    /// Check that the payload is large enough for the geometry
    pub fn is_consistent(&self) -> bool {
        let expected = match &self.geometry {
            FrameGeometry::Audio(g) => g.buffer_size(),
            FrameGeometry::Video(g) => g.buffer_size(),
        };
        self.data.len() >= expected
    }
}

/// How a completed frame relates to the stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameEvent {
    /// First frame of a stage: its geometry is now authoritative
    FormatChanged,
    /// Steady state frame
    DataReady,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_s16(samples: usize) -> AudioGeometry {
        AudioGeometry {
            sample_format: SampleFormat::S16,
            channel_layout: ChannelLayout::Stereo,
            samples,
            sample_rate: 48000,
        }
    }

    #[test]
    fn test_audio_frame_accessors() {
        let frame = Frame::audio(1, stereo_s16(4), vec![0u8; 16])
            .with_pts(100)
            .with_duration(4);

        assert_eq!(frame.media_type(), MediaType::Audio);
        assert_eq!(frame.samples(), 4);
        assert_eq!(frame.width(), 0);
        assert_eq!(frame.pts, Some(100));
        assert!(frame.is_consistent());
    }

    #[test]
    fn test_video_frame_consistency() {
        let geometry = VideoGeometry {
            pixel_format: PixelFormat::Rgba,
            width: 2,
            height: 2,
        };
        let short = Frame::video(2, geometry, vec![0u8; 15]);
        assert!(!short.is_consistent());

        let full = Frame::video(2, geometry, vec![0u8; 16]);
        assert!(full.is_consistent());
        assert_eq!(full.width(), 2);
        assert_eq!(full.height(), 2);
        assert!(full.audio_geometry().is_none());
    }
}
