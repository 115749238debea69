//! # livetx Media
//!
//! Decode and adaptive filter stages of the livetx real-time transform stage.
//! The decode stage turns packets into frames on a dedicated worker thread,
//! the filter stage routes those frames through a replaceable transform
//! engine and rebuilds it when the stream changes under it.

#![warn(clippy::all)]

pub mod codecs;
pub mod decoder;
pub mod engine;
pub mod filter;
pub mod parser;
#[cfg(feature = "pcm")]
pub mod pcm;

// Re-export main types
pub use codecs::{
    AccessUnit, BitstreamParser, CodecFactory, CodecInfo, CodecRegistry, CodecSession, ParseError,
    Parsed, SessionError,
};
pub use decoder::{CompleteHandler, Decoder, DecoderConfig, DecoderStats};
pub use engine::{
    BuiltinEngineFactory, EngineFactory, EngineKind, EngineState, OutputHandler, TransformEngine,
};
pub use filter::{FilterCompleteHandler, FilterConfig, FilterStage};
pub use parser::StampTracker;
#[cfg(feature = "adts")]
pub use parser::adts::AdtsParser;
#[cfg(feature = "pcm")]
pub use parser::pcm::PcmParser;
#[cfg(feature = "pcm")]
pub use pcm::{PcmCodec, PcmSession};
