//! Track descriptors
//!
//! A [`TrackDescriptor`] holds the static identity of a track together with
//! its current negotiated geometry. The decode and filter stages update the
//! geometry when frames disagree with it, so descriptors are shared as
//! [`SharedTrack`].

use crate::frame::{Frame, FrameGeometry};
use crate::media::{ChannelLayout, CodecId, CodecModule, MediaType, PixelFormat, SampleFormat, Timebase};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Track descriptor shared between the stages of one pipeline
pub type SharedTrack = Arc<RwLock<TrackDescriptor>>;

/// Static and mutable metadata of one media track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Track id
    pub id: u32,
    /// Media type
    pub media_type: MediaType,
    /// Codec identity
    pub codec_id: CodecId,
    /// Codec module, used by engine specific heuristics
    pub codec_module: CodecModule,
    /// Timestamp unit
    pub timebase: Timebase,
    /// Picture width (video)
    pub width: u32,
    /// Picture height (video)
    pub height: u32,
    /// Pixel format (video)
    pub pixel_format: PixelFormat,
    /// Nominal frame rate (video)
    pub frame_rate: Option<f64>,
    /// Sample rate in Hz (audio)
    pub sample_rate: u32,
    /// Channel layout (audio)
    pub channel_layout: ChannelLayout,
    /// Sample format (audio)
    pub sample_format: SampleFormat,
    /// Measured or configured bitrate in bits per second
    pub bitrate: u64,
}

impl TrackDescriptor {
    /// Create an audio track with a `1/sample_rate` timebase
    pub fn audio(id: u32, codec_id: CodecId, sample_rate: u32, channel_layout: ChannelLayout) -> Self {
        Self {
            id,
            media_type: MediaType::Audio,
            codec_id,
            codec_module: CodecModule::Default,
            timebase: Timebase::new(1, sample_rate.max(1) as i64),
            width: 0,
            height: 0,
            pixel_format: PixelFormat::default(),
            frame_rate: None,
            sample_rate,
            channel_layout,
            sample_format: SampleFormat::default(),
            bitrate: 0,
        }
    }

    /// Create a video track with a `1/90000` timebase
    pub fn video(id: u32, codec_id: CodecId, width: u32, height: u32) -> Self {
        Self {
            id,
            media_type: MediaType::Video,
            codec_id,
            codec_module: CodecModule::Default,
            timebase: Timebase::new(1, 90000),
            width,
            height,
            pixel_format: PixelFormat::default(),
            frame_rate: None,
            sample_rate: 0,
            channel_layout: ChannelLayout::default(),
            sample_format: SampleFormat::default(),
            bitrate: 0,
        }
    }

    /// Set timebase
    pub fn with_timebase(mut self, timebase: Timebase) -> Self {
        self.timebase = timebase;
        self
    }

    /// Set codec module
    pub fn with_codec_module(mut self, codec_module: CodecModule) -> Self {
        self.codec_module = codec_module;
        self
    }

    /// Set nominal frame rate
    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    /// Set pixel format
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// Set sample format
    pub fn with_sample_format(mut self, sample_format: SampleFormat) -> Self {
        self.sample_format = sample_format;
        self
    }

    /// Set bitrate
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Wrap into a [`SharedTrack`]
    pub fn into_shared(self) -> SharedTrack {
        Arc::new(RwLock::new(self))
    }

    /// Ticks per second of the timebase
    pub fn timescale(&self) -> i64 {
        self.timebase.timescale()
    }

    /// Update the picture size
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Adopt the geometry of `frame` as the current truth
    ///
    /// Returns `true` if any field changed.
    pub fn latch_frame(&mut self, frame: &Frame) -> bool {
        let before = self.clone();
        match &frame.geometry {
            FrameGeometry::Audio(g) => {
                self.sample_rate = g.sample_rate;
                self.channel_layout = g.channel_layout;
                self.sample_format = g.sample_format;
            }
            FrameGeometry::Video(g) => {
                self.width = g.width;
                self.height = g.height;
                self.pixel_format = g.pixel_format;
            }
        }
        let changed = before != *self;
        if changed {
            debug!(track = self.id, "Track geometry latched from frame: {:?}", frame.geometry);
        }
        changed
    }

    /// Short description used in logs
    pub fn describe(&self) -> String {
        match self.media_type {
            MediaType::Audio => format!(
                "{} {}Hz {}ch {:?} tb={}",
                self.codec_id,
                self.sample_rate,
                self.channel_layout.count(),
                self.sample_format,
                self.timebase
            ),
            MediaType::Video => format!(
                "{} {}x{} {:?} tb={}",
                self.codec_id, self.width, self.height, self.pixel_format, self.timebase
            ),
            other => format!("{} {} tb={}", self.codec_id, other, self.timebase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioGeometry, VideoGeometry};

    #[test]
    fn test_audio_track_defaults() {
        let track = TrackDescriptor::audio(1, CodecId::Aac, 48000, ChannelLayout::Stereo);
        assert_eq!(track.timebase, Timebase::new(1, 48000));
        assert_eq!(track.timescale(), 48000);
        assert_eq!(track.codec_module, CodecModule::Default);
    }

    #[test]
    fn test_latch_video_frame() {
        let mut track = TrackDescriptor::video(2, CodecId::H264, 1280, 720);
        let frame = Frame::video(
            2,
            VideoGeometry {
                pixel_format: PixelFormat::Yuv420p,
                width: 1920,
                height: 1080,
            },
            vec![],
        );

        assert!(track.latch_frame(&frame));
        assert_eq!((track.width, track.height), (1920, 1080));
        assert!(!track.latch_frame(&frame));
    }

    #[test]
    fn test_latch_audio_frame() {
        let mut track = TrackDescriptor::audio(1, CodecId::Pcm, 44100, ChannelLayout::Stereo);
        let frame = Frame::audio(
            1,
            AudioGeometry {
                sample_format: SampleFormat::S16,
                channel_layout: ChannelLayout::Mono,
                samples: 1024,
                sample_rate: 48000,
            },
            vec![],
        );

        assert!(track.latch_frame(&frame));
        assert_eq!(track.sample_rate, 48000);
        assert_eq!(track.channel_layout, ChannelLayout::Mono);
        assert_eq!(track.sample_format, SampleFormat::S16);
        // Timebase is a stream property and is left alone
        assert_eq!(track.timebase, Timebase::new(1, 44100));
    }

    #[test]
    fn test_shared_track_mutation() {
        let shared = TrackDescriptor::video(5, CodecId::H264, 640, 360).into_shared();
        shared.write().set_resolution(1280, 720);
        assert_eq!(shared.read().width, 1280);
        assert!(shared.read().describe().contains("1280x720"));
    }
}
