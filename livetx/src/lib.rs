//! # livetx - Real-Time Decode and Adaptive Filter Stage
//!
//! livetx sits between a demuxer and an encoder in a live transcoding
//! pipeline. Each track gets a decode stage that turns compressed packets
//! into frames on its own worker thread, and a filter stage that converts
//! those frames into the output track's format through a replaceable
//! transform engine.
//!
//! ## Key Features
//!
//! - **Threaded decoding**: one worker per track fed by a cancellable bounded queue
//! - **Timestamp recovery**: frames get a monotonic pts even when the codec withholds it
//! - **Adaptive filtering**: the engine is rebuilt on resolution changes, timestamp jumps and engine errors
//! - **Pluggable codecs and engines**: bring your own codec factories and transform engines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use livetx::{
//!     ChannelLayout, CodecId, CodecRegistry, Packet, PipelineConfig, SampleFormat,
//!     TrackDescriptor, TrackPipeline,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     livetx::logging::init(&config.logging)?;
//!
//!     let input = TrackDescriptor::audio(1, CodecId::Pcm, 48000, ChannelLayout::Stereo)
//!         .with_sample_format(SampleFormat::S16)
//!         .into_shared();
//!     let output = TrackDescriptor::audio(2, CodecId::Pcm, 44100, ChannelLayout::Stereo)
//!         .into_shared();
//!
//!     let pipeline = TrackPipeline::start(
//!         input,
//!         output,
//!         &CodecRegistry::with_defaults(),
//!         &config,
//!         Arc::new(|track, event, frame| {
//!             println!("track {} {:?}: {} samples", track, event, frame.samples());
//!         }),
//!     )?;
//!
//!     pipeline.push(Packet::new(1, vec![0u8; 4096]).with_timestamp(0))?;
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use livetx_core::{
    AudioGeometry, BoundedQueue, ChannelLayout, CodecId, CodecModule, Dequeued, ErrorCategory,
    Frame, FrameEvent, FrameGeometry, MediaType, Packet, PacketQueue, PixelFormat, QueueError,
    SampleFormat, SharedTrack, Timebase, TrackDescriptor, TranscodeError, TranscodeResult,
    VideoGeometry,
};

pub use livetx_media::{
    AccessUnit, BitstreamParser, BuiltinEngineFactory, CodecFactory, CodecInfo, CodecRegistry,
    CodecSession, Decoder, DecoderConfig, DecoderStats, EngineFactory, EngineKind, EngineState,
    FilterConfig, FilterStage, OutputHandler, ParseError, Parsed, SessionError, TransformEngine,
};

#[cfg(feature = "pcm")]
pub use livetx_media::{PcmCodec, PcmParser};

#[cfg(feature = "adts")]
pub use livetx_media::AdtsParser;

// Public API modules
pub mod config;
pub mod logging;
pub mod pipeline;

// Re-export main API types
pub use config::{LoggingConfig, PipelineConfig};
pub use pipeline::{FrameSink, TrackPipeline};
