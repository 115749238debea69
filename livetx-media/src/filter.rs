//! Adaptive filter stage
//!
//! A [`FilterStage`] owns at most one transform engine and routes every
//! frame through it. Before forwarding, each frame is checked against the
//! engine: a timestamp discontinuity, a new picture size or a failed
//! accelerator engine makes the stage stop the engine and build a fresh one
//! for the current track geometry.
//!
//! ## Locking
//!
//! The engine handle sits behind one `RwLock`. Checks and forwarding run
//! under the shared lock; rebuild and stop take the exclusive lock, and an
//! engine is only ever stopped after it has been removed from the handle.

use crate::engine::{EngineFactory, EngineKind, EngineState, TransformEngine};
use livetx_core::{
    CodecModule, Frame, MediaType, SharedTrack, Timebase, TranscodeError, TranscodeResult,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Receives transformed frames as `(filter_id, frame)`
pub type FilterCompleteHandler = Arc<dyn Fn(u32, Frame) + Send + Sync>;

/// Filter stage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Seconds between consecutive timestamps that count as a discontinuity
    pub timestamp_jump_limit_secs: i64,
    /// Send the frame that caused a rebuild to the new engine
    pub replay_trigger_frame: bool,
    /// Upper bound on stopping or flushing an engine
    pub stop_timeout_ms: u64,
    /// Frames a built-in engine buffers
    pub engine_queue_capacity: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            timestamp_jump_limit_secs: 15,
            replay_trigger_frame: true,
            stop_timeout_ms: 500,
            engine_queue_capacity: 64,
        }
    }
}

impl FilterConfig {
    /// Engine stop timeout
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Active engine and the generation it was built in
struct EngineHandle {
    engine: Box<dyn TransformEngine>,
    generation: u64,
}

/// Filter stage of one input/output track pair
pub struct FilterStage {
    id: u32,
    input: SharedTrack,
    output: SharedTrack,
    kind: EngineKind,
    single_track: bool,
    jump_threshold: i64,
    config: FilterConfig,
    factory: Arc<dyn EngineFactory>,
    handler: FilterCompleteHandler,
    engine: RwLock<Option<EngineHandle>>,
    last_timestamp: Mutex<Option<i64>>,
    generation: AtomicU64,
}

impl FilterStage {
    /// Create a filter converting `input` into `output` and start its engine
    pub fn new(
        id: u32,
        input: SharedTrack,
        output: SharedTrack,
        factory: Arc<dyn EngineFactory>,
        config: FilterConfig,
        handler: FilterCompleteHandler,
    ) -> TranscodeResult<Self> {
        let (media_type, timescale) = {
            let track = input.read();
            (track.media_type, track.timescale())
        };
        let kind = EngineKind::for_media_type(media_type).map_err(|e| {
            error!(filter = id, "Unsupported media type in filter: {}", media_type);
            e
        })?;

        let filter = Self {
            id,
            single_track: Arc::ptr_eq(&input, &output),
            input,
            output,
            kind,
            jump_threshold: timescale.saturating_mul(config.timestamp_jump_limit_secs),
            config,
            factory,
            handler,
            engine: RwLock::new(None),
            last_timestamp: Mutex::new(None),
            generation: AtomicU64::new(0),
        };
        filter.rebuild()?;
        Ok(filter)
    }

    /// Create a filter whose input and output are the same track
    ///
    /// Such a filter is paired with an encoder and is never rebuilt.
    pub fn single_track(
        id: u32,
        track: SharedTrack,
        factory: Arc<dyn EngineFactory>,
        config: FilterConfig,
        handler: FilterCompleteHandler,
    ) -> TranscodeResult<Self> {
        Self::new(id, track.clone(), track, factory, config, handler)
    }

    /// Filter id passed to the completion handler
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Submit a frame
    ///
    /// Rebuilds the engine first when the frame no longer fits it. The
    /// triggering frame never reaches the engine being replaced.
    pub fn send_buffer(&self, frame: Frame) -> TranscodeResult<()> {
        let observed = {
            let guard = self.engine.read();
            let Some(handle) = guard.as_ref() else {
                return Err(TranscodeError::not_initialized(self.component()));
            };
            if !self.needs_rebuild(handle, &frame) {
                return self.forward(handle, frame);
            }
            handle.generation
        };

        self.rebuild_from(Some(observed)).map_err(|e| {
            error!(filter = self.id, "Failed to regenerate filter: {}", e);
            e
        })?;

        if !self.config.replay_trigger_frame {
            debug!(filter = self.id, "Dropping frame that triggered the rebuild");
            return Ok(());
        }

        let guard = self.engine.read();
        match guard.as_ref() {
            Some(handle) => self.forward(handle, frame),
            None => Err(TranscodeError::not_initialized(self.component())),
        }
    }

    /// Stop and release the engine
    ///
    /// Frames sent afterwards fail with `NotInitialized` until [`rebuild`]
    /// is called.
    ///
    /// [`rebuild`]: FilterStage::rebuild
    pub fn stop(&self) {
        let old = self.engine.write().take();
        if let Some(handle) = old {
            self.stop_engine(handle);
            info!(filter = self.id, "Filter stopped");
        }
    }

    /// Emit everything the engine still buffers
    pub fn flush(&self) {
        if let Some(handle) = self.engine.read().as_ref() {
            debug!(filter = self.id, engine = handle.engine.name(), "Flushing filter");
            handle.engine.flush();
        }
    }

    /// Replace the engine with one built for the current track geometry
    pub fn rebuild(&self) -> TranscodeResult<()> {
        self.rebuild_from(None)
    }

    /// Check if an engine is active
    pub fn is_running(&self) -> bool {
        self.engine.read().is_some()
    }

    /// Generation of the latest engine, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Timebase of frames entering the engine
    pub fn input_timebase(&self) -> Timebase {
        match self.engine.read().as_ref() {
            Some(handle) => handle.engine.input_timebase(),
            None => self.input.read().timebase,
        }
    }

    /// Timebase of frames leaving the engine
    pub fn output_timebase(&self) -> Timebase {
        match self.engine.read().as_ref() {
            Some(handle) => handle.engine.output_timebase(),
            None => self.output.read().timebase,
        }
    }

    /// Input track
    pub fn input_track(&self) -> &SharedTrack {
        &self.input
    }

    /// Output track
    pub fn output_track(&self) -> &SharedTrack {
        &self.output
    }

    /// Input and output are the same track
    pub fn is_single_track(&self) -> bool {
        self.single_track
    }

    fn component(&self) -> String {
        format!("filter {} ({})", self.id, self.kind)
    }

    fn forward(&self, handle: &EngineHandle, frame: Frame) -> TranscodeResult<()> {
        if handle.engine.send_buffer(frame) {
            Ok(())
        } else {
            Err(TranscodeError::EngineRejected {
                engine: handle.engine.name().to_string(),
            })
        }
    }

    /// Evaluate the rebuild triggers in order
    fn needs_rebuild(&self, handle: &EngineHandle, frame: &Frame) -> bool {
        let engine = &handle.engine;
        if engine.is_single_track() {
            return false;
        }

        if let Some(current) = frame.pts {
            let last = self.last_timestamp.lock().replace(current);
            if let Some(last) = last {
                let diff = current.saturating_sub(last).saturating_abs();
                if diff > self.jump_threshold {
                    warn!(
                        filter = self.id,
                        "The timestamp has changed unexpectedly. {} -> {} ({} > {})",
                        last,
                        current,
                        diff,
                        self.jump_threshold
                    );
                    return true;
                }
            }
        }

        let (input_id, media_type, input_module) = {
            let input = self.input.read();
            (input.id, input.media_type, input.codec_module)
        };

        if media_type == MediaType::Video
            && (frame.width() != engine.input_width() || frame.height() != engine.input_height())
        {
            info!(
                filter = self.id,
                "Changed input resolution of {} track. ({}x{} -> {}x{})",
                input_id,
                engine.input_width(),
                engine.input_height(),
                frame.width(),
                frame.height()
            );
            self.input.write().set_resolution(frame.width(), frame.height());
            return true;
        }

        if engine.state() == EngineState::Error
            && input_module == CodecModule::Xma
            && self.output.read().codec_module == CodecModule::Xma
        {
            warn!(
                filter = self.id,
                "Assuming accelerator resource allocation failed, recreating the filter"
            );
            return true;
        }

        false
    }

    /// Rebuild under the exclusive lock, draining the old engine first
    ///
    /// With `observed` set, the rebuild is skipped if another caller has
    /// already replaced that generation, and refused if the stage was
    /// stopped meanwhile.
    fn rebuild_from(&self, observed: Option<u64>) -> TranscodeResult<()> {
        let mut guard = self.engine.write();

        if let Some(observed) = observed {
            match guard.as_ref() {
                Some(handle) if handle.generation != observed => {
                    debug!(
                        filter = self.id,
                        generation = handle.generation,
                        "Engine already rebuilt"
                    );
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(TranscodeError::not_initialized(self.component())),
            }
        }

        if let Some(old) = guard.take() {
            old.engine.flush();
            self.stop_engine(old);
        }
        *guard = Some(self.create_engine()?);
        Ok(())
    }

    fn create_engine(&self) -> TranscodeResult<EngineHandle> {
        let input = self.input.read().clone();
        let output = self.output.read().clone();

        let handler = self.handler.clone();
        let id = self.id;
        let engine = self.factory.create(
            self.kind,
            &input,
            &output,
            self.single_track,
            Arc::new(move |frame| handler(id, frame)),
        )?;

        if !engine.start() {
            return Err(TranscodeError::EngineStartFailed {
                engine: engine.name().to_string(),
            });
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            filter = self.id,
            engine = engine.name(),
            generation,
            "Filter engine started: {} -> {}",
            input.describe(),
            output.describe()
        );
        Ok(EngineHandle { engine, generation })
    }

    fn stop_engine(&self, handle: EngineHandle) {
        if !handle.engine.stop() {
            warn!(
                filter = self.id,
                engine = handle.engine.name(),
                timeout_ms = self.config.stop_timeout_ms,
                "Engine did not acknowledge stop in time, releasing it anyway"
            );
        }
    }
}

impl Drop for FilterStage {
    fn drop(&mut self) {
        self.stop();
    }
}
