//! Transform engines
//!
//! A transform engine adapts decoded frames to the geometry an encoder
//! expects: audio goes through a resampler, video through a rescaler. The
//! filter stage only sees the [`TransformEngine`] trait and builds engines
//! through an [`EngineFactory`].

pub mod resampler;
pub mod rescaler;
mod worker;

pub use resampler::Resampler;
pub use rescaler::Rescaler;

use livetx_core::{Frame, MediaType, Timebase, TrackDescriptor, TranscodeError, TranscodeResult};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::filter::FilterConfig;
use worker::{EngineWorker, FrameProcessor};

/// Receives transformed frames
pub type OutputHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// Health reported by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Processing normally
    #[default]
    Normal,
    /// Engine hit an error and its output can no longer be trusted
    Error,
}

/// Kind of engine needed for a media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Audio sample rate, channel and sample format conversion
    Resampler,
    /// Video size and pixel format conversion
    Rescaler,
}

impl EngineKind {
    /// Select the engine for `media_type`
    pub fn for_media_type(media_type: MediaType) -> TranscodeResult<Self> {
        match media_type {
            MediaType::Audio => Ok(EngineKind::Resampler),
            MediaType::Video => Ok(EngineKind::Rescaler),
            other => Err(TranscodeError::UnsupportedMediaType { media_type: other }),
        }
    }

    /// Engine kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Resampler => "resampler",
            EngineKind::Rescaler => "rescaler",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running resample or rescale capability
///
/// All methods take `&self`: the filter stage calls them concurrently under
/// a shared lock.
pub trait TransformEngine: Send + Sync {
    /// Start processing; `false` if the engine cannot run
    fn start(&self) -> bool;

    /// Stop processing; `false` if the engine did not acknowledge in time
    fn stop(&self) -> bool;

    /// Submit a frame; `false` if it was not accepted
    fn send_buffer(&self, frame: Frame) -> bool;

    /// Emit all buffered output
    fn flush(&self);

    /// Input picture width the engine was configured for
    fn input_width(&self) -> u32;

    /// Input picture height the engine was configured for
    fn input_height(&self) -> u32;

    /// Input and output are the same track
    fn is_single_track(&self) -> bool;

    /// Current health
    fn state(&self) -> EngineState;

    /// Timebase of incoming frames
    fn input_timebase(&self) -> Timebase;

    /// Timebase of emitted frames
    fn output_timebase(&self) -> Timebase;

    /// Engine name for logs
    fn name(&self) -> &str;
}

/// Builds engines for the filter stage
pub trait EngineFactory: Send + Sync {
    /// Configure an engine converting `input` into `output`
    fn create(
        &self,
        kind: EngineKind,
        input: &TrackDescriptor,
        output: &TrackDescriptor,
        single_track: bool,
        on_output: OutputHandler,
    ) -> TranscodeResult<Box<dyn TransformEngine>>;
}

/// Factory for the built-in resampler and rescaler
#[derive(Debug, Clone)]
pub struct BuiltinEngineFactory {
    /// Frames an engine buffers before `send_buffer` blocks
    pub queue_capacity: usize,
    /// Upper bound on engine stop and flush
    pub stop_timeout: Duration,
}

impl Default for BuiltinEngineFactory {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

impl BuiltinEngineFactory {
    /// Create a factory using the filter settings
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            queue_capacity: config.engine_queue_capacity,
            stop_timeout: config.stop_timeout(),
        }
    }
}

impl EngineFactory for BuiltinEngineFactory {
    fn create(
        &self,
        kind: EngineKind,
        input: &TrackDescriptor,
        output: &TrackDescriptor,
        single_track: bool,
        on_output: OutputHandler,
    ) -> TranscodeResult<Box<dyn TransformEngine>> {
        let processor: Box<dyn FrameProcessor> = match kind {
            EngineKind::Resampler => Box::new(Resampler::new(input, output)?),
            EngineKind::Rescaler => Box::new(Rescaler::new(input, output)?),
        };

        let name = format!("{}-{}-{}", kind, input.id, output.id);
        Ok(Box::new(BuiltinEngine {
            worker: EngineWorker::new(
                name,
                processor,
                on_output,
                self.queue_capacity,
                self.stop_timeout,
            ),
            input_width: input.width,
            input_height: input.height,
            input_timebase: input.timebase,
            output_timebase: output.timebase,
            single_track,
        }))
    }
}

/// Engine backed by a worker thread running a frame processor
struct BuiltinEngine {
    worker: EngineWorker,
    input_width: u32,
    input_height: u32,
    input_timebase: Timebase,
    output_timebase: Timebase,
    single_track: bool,
}

impl TransformEngine for BuiltinEngine {
    fn start(&self) -> bool {
        self.worker.start()
    }

    fn stop(&self) -> bool {
        self.worker.stop()
    }

    fn send_buffer(&self, frame: Frame) -> bool {
        self.worker.send(frame)
    }

    fn flush(&self) {
        self.worker.flush();
    }

    fn input_width(&self) -> u32 {
        self.input_width
    }

    fn input_height(&self) -> u32 {
        self.input_height
    }

    fn is_single_track(&self) -> bool {
        self.single_track
    }

    fn state(&self) -> EngineState {
        self.worker.state()
    }

    fn input_timebase(&self) -> Timebase {
        self.input_timebase
    }

    fn output_timebase(&self) -> Timebase {
        self.output_timebase
    }

    fn name(&self) -> &str {
        self.worker.name()
    }
}
