//! Per-track pipeline
//!
//! A [`TrackPipeline`] wires a packet queue, a decode stage and a filter
//! stage for one input/output track pair and delivers finished frames to a
//! sink.

use crate::config::PipelineConfig;
use livetx_core::{
    Frame, FrameEvent, Packet, PacketQueue, QueueError, SharedTrack, TranscodeError, TranscodeResult,
};
use livetx_media::{
    BuiltinEngineFactory, CodecRegistry, CompleteHandler, Decoder, DecoderStats, EngineFactory,
    FilterCompleteHandler, FilterStage,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Receives finished frames as `(track_id, event, frame)`
///
/// The first frame of a pipeline is delivered as
/// [`FrameEvent::FormatChanged`].
pub type FrameSink = Arc<dyn Fn(u32, FrameEvent, Frame) + Send + Sync>;

/// Decode and filter stages of one track
pub struct TrackPipeline {
    decoder: Decoder,
    filter: Arc<FilterStage>,
    queue: Arc<PacketQueue>,
    input: SharedTrack,
    output: SharedTrack,
    stopped: AtomicBool,
}

impl TrackPipeline {
    /// Start a pipeline using the built-in transform engines
    pub fn start(
        input: SharedTrack,
        output: SharedTrack,
        registry: &CodecRegistry,
        config: &PipelineConfig,
        sink: FrameSink,
    ) -> TranscodeResult<Self> {
        let factory = Arc::new(BuiltinEngineFactory::from_config(&config.filter));
        Self::start_with_engines(input, output, registry, factory, config, sink)
    }

    /// Start a pipeline whose filter builds engines with `factory`
    pub fn start_with_engines(
        input: SharedTrack,
        output: SharedTrack,
        registry: &CodecRegistry,
        factory: Arc<dyn EngineFactory>,
        config: &PipelineConfig,
        sink: FrameSink,
    ) -> TranscodeResult<Self> {
        config.validate()?;

        let (input_id, output_id) = (input.read().id, output.read().id);
        let queue = Arc::new(PacketQueue::new(
            format!("packets-{}", input_id),
            config.decoder.queue_capacity,
        ));

        let filter = Arc::new(FilterStage::new(
            output_id,
            input.clone(),
            output.clone(),
            factory,
            config.filter.clone(),
            filter_output(sink),
        )?);

        let decoder = Decoder::start(
            input.clone(),
            queue.clone(),
            registry,
            &config.decoder,
            decoder_output(input.clone(), filter.clone()),
        )?;

        info!(
            input = input_id,
            output = output_id,
            "Track pipeline started"
        );

        Ok(Self {
            decoder,
            filter,
            queue,
            input,
            output,
            stopped: AtomicBool::new(false),
        })
    }

    /// Hand a packet to the decoder, blocking while the queue is full
    pub fn push(&self, packet: Packet) -> TranscodeResult<()> {
        self.queue.enqueue(packet).map_err(|_| TranscodeError::QueueClosed {
            queue: self.queue.name().to_string(),
        })
    }

    /// Hand a packet to the decoder without blocking
    pub fn try_push(&self, packet: Packet) -> Result<(), QueueError<Packet>> {
        self.queue.try_enqueue(packet)
    }

    /// Packet queue feeding the decoder
    pub fn queue(&self) -> &Arc<PacketQueue> {
        &self.queue
    }

    /// Filter stage
    pub fn filter(&self) -> &FilterStage {
        &self.filter
    }

    /// Input track
    pub fn input_track(&self) -> &SharedTrack {
        &self.input
    }

    /// Output track
    pub fn output_track(&self) -> &SharedTrack {
        &self.output
    }

    /// Decoder counters
    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Check if the pipeline still accepts packets
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && self.decoder.is_running()
    }

    /// Stop the decoder, drain the filter and stop it
    ///
    /// Packets still queued are dropped. Stopping twice is a no-op.
    pub fn stop(&self) -> TranscodeResult<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let decoded = self.decoder.stop();
        self.filter.flush();
        self.filter.stop();
        decoded?;

        info!(input = self.input.read().id, "Track pipeline stopped");
        Ok(())
    }

    /// Stop from async code without blocking the runtime
    pub async fn shutdown(self) -> TranscodeResult<()> {
        tokio::task::spawn_blocking(move || self.stop())
            .await
            .map_err(|e| {
                error!("Pipeline shutdown task failed: {}", e);
                TranscodeError::WorkerPanicked {
                    worker: "pipeline shutdown".to_string(),
                }
            })?
    }
}

impl Drop for TrackPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Track pipeline shutdown failed: {}", e);
        }
    }
}

/// Decoder completion: latch the stabilized format, then filter
fn decoder_output(input: SharedTrack, filter: Arc<FilterStage>) -> CompleteHandler {
    Box::new(move |track_id, event, frame| {
        if event == FrameEvent::FormatChanged {
            let changed = input.write().latch_frame(&frame);
            if changed {
                info!(track = track_id, "Input format differs from track, rebuilding filter");
                if let Err(e) = filter.rebuild() {
                    error!(track = track_id, "Failed to rebuild filter: {}", e);
                }
            }
        }

        if let Err(e) = filter.send_buffer(frame) {
            match e {
                TranscodeError::NotInitialized { .. } => {
                    debug!(track = track_id, "Dropping frame: {}", e)
                }
                _ => warn!(track = track_id, "Failed to filter frame: {}", e),
            }
        }
    })
}

/// Filter completion: first frame is the format change
fn filter_output(sink: FrameSink) -> FilterCompleteHandler {
    let first = AtomicBool::new(true);
    Arc::new(move |track_id, frame| {
        let event = if first.swap(false, Ordering::AcqRel) {
            FrameEvent::FormatChanged
        } else {
            FrameEvent::DataReady
        };
        sink(track_id, event, frame);
    })
}
