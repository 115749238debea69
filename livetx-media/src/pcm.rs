//! Raw PCM codec
//!
//! Interleaved PCM needs no decoding: the session wraps each access unit in
//! an audio frame described by the track geometry.

use crate::codecs::{AccessUnit, BitstreamParser, CodecFactory, CodecInfo, CodecSession, SessionError};
use crate::parser::pcm::PcmParser;
use livetx_core::{
    AudioGeometry, CodecId, Frame, MediaType, TrackDescriptor, TranscodeError, TranscodeResult,
};
use std::collections::VecDeque;

/// Factory for PCM sessions and parsers
#[derive(Debug, Clone)]
pub struct PcmCodec {
    /// Samples per channel in each access unit
    pub samples_per_unit: usize,
    /// Decoded frames a session holds before answering `TryAgain`
    pub max_pending: usize,
}

impl Default for PcmCodec {
    fn default() -> Self {
        Self {
            samples_per_unit: 1024,
            max_pending: 8,
        }
    }
}

impl PcmCodec {
    /// Create a factory cutting units of `samples_per_unit` samples
    pub fn new(samples_per_unit: usize) -> Self {
        Self {
            samples_per_unit,
            ..Self::default()
        }
    }

    fn check_track(track: &TrackDescriptor) -> TranscodeResult<()> {
        if track.media_type != MediaType::Audio {
            return Err(TranscodeError::CodecInitializationFailed {
                codec: CodecId::Pcm.to_string(),
                reason: format!("expected an audio track, got {}", track.media_type),
            });
        }
        if track.sample_rate == 0 || track.channel_layout.count() == 0 {
            return Err(TranscodeError::CodecInitializationFailed {
                codec: CodecId::Pcm.to_string(),
                reason: "sample rate and channel count must be set".to_string(),
            });
        }
        Ok(())
    }
}

impl CodecFactory for PcmCodec {
    fn codec_id(&self) -> CodecId {
        CodecId::Pcm
    }

    fn create_session(&self, track: &TrackDescriptor) -> TranscodeResult<Box<dyn CodecSession>> {
        Self::check_track(track)?;
        Ok(Box::new(PcmSession::new(track, self.max_pending)))
    }

    fn create_parser(&self, track: &TrackDescriptor) -> TranscodeResult<Box<dyn BitstreamParser>> {
        if self.samples_per_unit == 0 {
            return Err(TranscodeError::ParserUnavailable {
                codec: CodecId::Pcm.to_string(),
            });
        }
        Ok(Box::new(PcmParser::new(
            self.samples_per_unit,
            track.channel_layout.count(),
            track.sample_format,
        )))
    }
}

/// PCM decoding session
#[derive(Debug)]
pub struct PcmSession {
    track_id: u32,
    geometry: AudioGeometry,
    output: VecDeque<Frame>,
    max_pending: usize,
}

impl PcmSession {
    /// Create a session for `track`
    pub fn new(track: &TrackDescriptor, max_pending: usize) -> Self {
        Self {
            track_id: track.id,
            geometry: AudioGeometry {
                sample_format: track.sample_format,
                channel_layout: track.channel_layout,
                samples: 0,
                sample_rate: track.sample_rate,
            },
            output: VecDeque::new(),
            max_pending: max_pending.max(1),
        }
    }

    fn frame_bytes(&self) -> usize {
        self.geometry.channel_layout.count() as usize * self.geometry.sample_format.bytes_per_sample()
    }
}

impl CodecSession for PcmSession {
    fn send(&mut self, unit: &AccessUnit) -> Result<(), SessionError> {
        if self.output.len() >= self.max_pending {
            return Err(SessionError::TryAgain);
        }

        let frame_bytes = self.frame_bytes();
        if frame_bytes == 0 || unit.data.len() % frame_bytes != 0 {
            return Err(SessionError::Failed {
                reason: format!(
                    "{} bytes is not a whole number of {}-byte sample frames",
                    unit.data.len(),
                    frame_bytes
                ),
            });
        }

        let geometry = AudioGeometry {
            samples: unit.data.len() / frame_bytes,
            ..self.geometry
        };
        let mut frame = Frame::audio(self.track_id, geometry, unit.data.clone());
        frame.pts = unit.pts;
        self.output.push_back(frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Frame>, SessionError> {
        Ok(self.output.pop_front())
    }

    fn codec_info(&self) -> CodecInfo {
        CodecInfo {
            name: CodecId::Pcm.name().to_string(),
            sample_rate: Some(self.geometry.sample_rate),
            channels: Some(self.geometry.channel_layout.count()),
            resolution: None,
        }
    }
}
