//! # livetx Core
//!
//! Shared data model for the livetx real-time transform stage.
//! This crate provides the track descriptors, packets, frames and the
//! cancellable queue that the decode and filter stages are built on.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod media;
pub mod packet;
pub mod queue;
pub mod track;

// Re-export main types
pub use error::{ErrorCategory, TranscodeError, TranscodeResult};
pub use frame::{AudioGeometry, Frame, FrameEvent, FrameGeometry, VideoGeometry};
pub use media::{ChannelLayout, CodecId, CodecModule, MediaType, PixelFormat, SampleFormat, Timebase};
pub use packet::Packet;
pub use queue::{BoundedQueue, Dequeued, PacketQueue, QueueError};
pub use track::{SharedTrack, TrackDescriptor};
