//! Codec interfaces and registry
//!
//! The decode stage talks to codecs through two traits: a
//! [`BitstreamParser`] that cuts raw packet bytes into complete access
//! units, and a [`CodecSession`] that turns access units into frames.
//! Both are created per track by a [`CodecFactory`] looked up in the
//! [`CodecRegistry`].

use bytes::Bytes;
use livetx_core::{CodecId, Frame, TrackDescriptor, TranscodeError, TranscodeResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// One complete coded unit produced by a parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// Coded payload
    pub data: Bytes,
    /// Presentation timestamp assigned by the parser
    pub pts: Option<i64>,
    /// Decode timestamp assigned by the parser
    pub dts: Option<i64>,
    /// Distance to the previous stamped unit, 0 when unknown
    pub duration: i64,
    /// Random access point
    pub key_frame: bool,
}

/// Output of one parser call
#[derive(Debug, Default)]
pub struct Parsed {
    /// Bytes of the input consumed
    pub consumed: usize,
    /// Complete access units, in stream order
    pub units: Vec<AccessUnit>,
}

/// Parser failures
///
/// Both variants make the decode stage discard the rest of the current
/// packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Parser consumed nothing from a non-empty buffer
    #[error("parser made no progress on {remaining} bytes")]
    Stalled {
        /// Bytes left in the buffer
        remaining: usize,
    },
    /// Bitstream is corrupt
    #[error("corrupt bitstream: {reason}")]
    Corrupt {
        /// What was wrong
        reason: String,
    },
}

/// Codec session failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is busy, retry the same call later
    #[error("codec session busy, try again")]
    TryAgain,
    /// Session rejected the call
    #[error("codec session failed: {reason}")]
    Failed {
        /// Failure reason
        reason: String,
    },
}

/// Codec information reported once the format is known
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecInfo {
    /// Codec name
    pub name: String,
    /// Sample rate (for audio)
    pub sample_rate: Option<u32>,
    /// Channels (for audio)
    pub channels: Option<u16>,
    /// Picture size (for video)
    pub resolution: Option<(u32, u32)>,
}

impl fmt::Display for CodecInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(rate) = self.sample_rate {
            write!(f, " {}Hz", rate)?;
        }
        if let Some(channels) = self.channels {
            write!(f, " {}ch", channels)?;
        }
        if let Some((w, h)) = self.resolution {
            write!(f, " {}x{}", w, h)?;
        }
        Ok(())
    }
}

/// Stateful bitstream parser
pub trait BitstreamParser: Send {
    /// Parse `data`, the unconsumed bytes of the current packet
    ///
    /// `pts`/`dts` are the packet timestamps and are only passed on the
    /// first call for a packet; later calls on the same packet pass `None`.
    fn parse(&mut self, data: &[u8], pts: Option<i64>, dts: Option<i64>) -> Result<Parsed, ParseError>;

    /// Parser name for logs
    fn name(&self) -> &str;
}

/// Decoding session bound to one track
pub trait CodecSession: Send {
    /// Submit one access unit
    fn send(&mut self, unit: &AccessUnit) -> Result<(), SessionError>;

    /// Poll one decoded frame without blocking
    fn receive(&mut self) -> Result<Option<Frame>, SessionError>;

    /// Get codec information
    fn codec_info(&self) -> CodecInfo;
}

/// Creates sessions and parsers for one codec
pub trait CodecFactory: Send + Sync + fmt::Debug {
    /// Codec handled by this factory
    fn codec_id(&self) -> CodecId;

    /// Open a decoding session for `track`
    fn create_session(&self, track: &TrackDescriptor) -> TranscodeResult<Box<dyn CodecSession>>;

    /// Create the bitstream parser for `track`
    fn create_parser(&self, track: &TrackDescriptor) -> TranscodeResult<Box<dyn BitstreamParser>>;
}

/// Codec registry for managing available codec factories
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    factories: HashMap<CodecId, Arc<dyn CodecFactory>>,
}

impl CodecRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in codecs
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "pcm")]
        registry.register(Arc::new(crate::pcm::PcmCodec::default()));

        registry
    }

    /// Register a factory, replacing any previous one for the same codec
    pub fn register(&mut self, factory: Arc<dyn CodecFactory>) {
        let codec = factory.codec_id();
        if self.factories.insert(codec, factory).is_some() {
            debug!("Replaced codec factory for {}", codec);
        }
    }

    /// Get the factory for a codec
    pub fn get(&self, codec: CodecId) -> Option<Arc<dyn CodecFactory>> {
        self.factories.get(&codec).cloned()
    }

    /// List registered codecs
    pub fn list(&self) -> Vec<CodecId> {
        let mut codecs: Vec<_> = self.factories.keys().copied().collect();
        codecs.sort_by_key(|codec| codec.name());
        codecs
    }

    /// Open a session and a parser for `track`
    pub fn open(
        &self,
        track: &TrackDescriptor,
    ) -> TranscodeResult<(Box<dyn CodecSession>, Box<dyn BitstreamParser>)> {
        let factory = self.get(track.codec_id).ok_or(TranscodeError::CodecNotFound {
            codec: track.codec_id,
        })?;

        let session = factory.create_session(track)?;
        let parser = factory.create_parser(track)?;
        Ok((session, parser))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
