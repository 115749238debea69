//! Decode stage
//!
//! A [`Decoder`] owns a codec session and a bitstream parser on a dedicated
//! worker thread. The worker drains packets from a [`PacketQueue`], cuts them
//! into access units, submits those to the session and hands decoded frames
//! to a completion handler with a defined duration and presentation
//! timestamp.

use crate::codecs::{AccessUnit, BitstreamParser, CodecRegistry, CodecSession, ParseError, SessionError};
use livetx_core::{
    Dequeued, Frame, FrameEvent, FrameGeometry, Packet, PacketQueue, SharedTrack, TranscodeError,
    TranscodeResult,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receives decoded frames as `(track_id, event, frame)`
pub type CompleteHandler = Box<dyn FnMut(u32, FrameEvent, Frame) + Send>;

/// Decode stage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Capacity of the packet queue feeding the decoder
    pub queue_capacity: usize,
    /// Worker thread name prefix, the track id is appended
    pub thread_name_prefix: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            thread_name_prefix: "livetx-dec".to_string(),
        }
    }
}

/// Snapshot of decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Packets taken from the queue
    pub packets_received: u64,
    /// Packets discarded because the parser failed
    pub parse_errors: u64,
    /// Packets invalidated because the session rejected a unit
    pub submit_errors: u64,
    /// Frames handed to the completion handler
    pub frames_emitted: u64,
    /// Frames whose PTS was recovered
    pub recovered_timestamps: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    packets_received: AtomicU64,
    parse_errors: AtomicU64,
    submit_errors: AtomicU64,
    frames_emitted: AtomicU64,
    recovered_timestamps: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DecoderStats {
        DecoderStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            submit_errors: self.submit_errors.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            recovered_timestamps: self.recovered_timestamps.load(Ordering::Relaxed),
        }
    }
}

/// Decode stage of one track
pub struct Decoder {
    track: SharedTrack,
    queue: Arc<PacketQueue>,
    running: Arc<AtomicBool>,
    stats: Arc<StatsCounters>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_name: String,
}

impl Decoder {
    /// Open the codec for `track` and start the worker
    ///
    /// Session and parser are created before the worker is spawned, so a
    /// codec that cannot be opened is reported here and the decode loop
    /// never begins.
    pub fn start(
        track: SharedTrack,
        queue: Arc<PacketQueue>,
        registry: &CodecRegistry,
        config: &DecoderConfig,
        handler: CompleteHandler,
    ) -> TranscodeResult<Self> {
        let descriptor = track.read().clone();
        let (session, parser) = registry.open(&descriptor)?;

        let worker_name = format!("{}-{}", config.thread_name_prefix, descriptor.id);
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(StatsCounters::default());

        let worker = DecodeLoop {
            track_id: descriptor.id,
            track: track.clone(),
            queue: queue.clone(),
            session,
            parser,
            handler,
            running: running.clone(),
            stats: stats.clone(),
            current: None,
            cursor: 0,
            pending: VecDeque::new(),
            first_pkt_pts: None,
            last_pts: None,
            last_duration: 0,
            emitted: false,
            needs_input: true,
        };

        let handle = thread::Builder::new()
            .name(worker_name.clone())
            .spawn(move || worker.run())
            .map_err(|source| TranscodeError::WorkerSpawn {
                worker: worker_name.clone(),
                source,
            })?;

        info!(
            track = descriptor.id,
            "Decoder started: {}",
            descriptor.describe()
        );

        Ok(Self {
            track,
            queue,
            running,
            stats,
            worker: Mutex::new(Some(handle)),
            worker_name,
        })
    }

    /// Stop the worker and release the codec
    ///
    /// Closes the packet queue so a blocked dequeue returns immediately.
    /// Stopping twice is a no-op.
    pub fn stop(&self) -> TranscodeResult<()> {
        self.running.store(false, Ordering::Release);
        self.queue.close();

        let Some(handle) = self.worker.lock().take() else {
            return Ok(());
        };
        handle.join().map_err(|_| TranscodeError::WorkerPanicked {
            worker: self.worker_name.clone(),
        })?;
        debug!(worker = %self.worker_name, "Decoder stopped");
        Ok(())
    }

    /// Check if the worker is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self
                .worker
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Track decoded by this stage
    pub fn track(&self) -> &SharedTrack {
        &self.track
    }

    /// Current counters
    pub fn stats(&self) -> DecoderStats {
        self.stats.snapshot()
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Decoder shutdown failed: {}", e);
        }
    }
}

/// State owned by the worker thread
struct DecodeLoop {
    track_id: u32,
    track: SharedTrack,
    queue: Arc<PacketQueue>,
    session: Box<dyn CodecSession>,
    parser: Box<dyn BitstreamParser>,
    handler: CompleteHandler,
    running: Arc<AtomicBool>,
    stats: Arc<StatsCounters>,

    current: Option<Packet>,
    cursor: usize,
    pending: VecDeque<AccessUnit>,

    first_pkt_pts: Option<i64>,
    last_pts: Option<i64>,
    last_duration: i64,
    emitted: bool,
    // Session had no frame on the last poll
    needs_input: bool,
}

impl DecodeLoop {
    fn run(mut self) {
        debug!(track = self.track_id, parser = self.parser.name(), "Decode loop running");

        while self.running.load(Ordering::Acquire) {
            if self.current.is_none() && self.pending.is_empty() {
                match self.next_packet() {
                    Dequeued::Item(packet) => self.begin_packet(packet),
                    Dequeued::Empty => {}
                    Dequeued::Closed => break,
                }
            }

            if self.pending.is_empty() {
                self.feed();
            }
            let submitted = self.submit_pending();
            let received = self.drain_one();

            if !submitted && !received && !self.pending.is_empty() {
                // Session is saturated and has nothing to hand back yet
                thread::sleep(Duration::from_millis(1));
            }
        }

        debug!(track = self.track_id, "Decode loop finished");
    }

    fn next_packet(&self) -> Dequeued<Packet> {
        if self.needs_input {
            match self.queue.dequeue() {
                Some(packet) => Dequeued::Item(packet),
                None => Dequeued::Closed,
            }
        } else {
            self.queue.try_dequeue()
        }
    }

    fn begin_packet(&mut self, packet: Packet) {
        StatsCounters::bump(&self.stats.packets_received);
        if packet.is_empty() {
            debug!(track = self.track_id, "Skipping empty packet");
            return;
        }
        self.current = Some(packet);
        self.cursor = 0;
    }

    /// Run the parser over the rest of the current packet
    fn feed(&mut self) {
        let Some(packet) = self.current.as_ref() else {
            return;
        };

        let remaining = &packet.data[self.cursor..];
        let (pts, dts) = if self.cursor == 0 {
            (packet.pts, packet.dts)
        } else {
            (None, None)
        };

        let result = self.parser.parse(remaining, pts, dts).and_then(|parsed| {
            if parsed.consumed == 0 && !remaining.is_empty() {
                Err(ParseError::Stalled {
                    remaining: remaining.len(),
                })
            } else {
                Ok(parsed)
            }
        });

        match result {
            Ok(parsed) => {
                self.cursor = (self.cursor + parsed.consumed).min(packet.data.len());
                if self.cursor >= packet.data.len() {
                    self.current = None;
                }
                for unit in parsed.units {
                    if self.first_pkt_pts.is_none() && unit.pts.is_some() {
                        self.first_pkt_pts = unit.pts;
                    }
                    self.pending.push_back(unit);
                }
            }
            Err(e) => {
                warn!(
                    track = self.track_id,
                    parser = self.parser.name(),
                    "Discarding rest of packet: {}",
                    e
                );
                StatsCounters::bump(&self.stats.parse_errors);
                self.current = None;
            }
        }
    }

    /// Submit queued access units; `true` if any was accepted
    fn submit_pending(&mut self) -> bool {
        let mut accepted = false;
        while let Some(unit) = self.pending.front() {
            match self.session.send(unit) {
                Ok(()) => {
                    self.pending.pop_front();
                    accepted = true;
                }
                Err(SessionError::TryAgain) => break,
                Err(SessionError::Failed { reason }) => {
                    warn!(
                        track = self.track_id,
                        "Codec rejected access unit, dropping packet: {}",
                        reason
                    );
                    StatsCounters::bump(&self.stats.submit_errors);
                    self.pending.clear();
                    self.current = None;
                    break;
                }
            }
        }
        accepted
    }

    /// Poll one frame from the session; `true` if one was emitted
    fn drain_one(&mut self) -> bool {
        match self.session.receive() {
            Ok(Some(frame)) => {
                self.needs_input = false;
                self.emit(frame);
                true
            }
            Ok(None) | Err(SessionError::TryAgain) => {
                self.needs_input = true;
                false
            }
            Err(SessionError::Failed { reason }) => {
                warn!(track = self.track_id, "Failed to receive frame: {}", reason);
                self.needs_input = true;
                false
            }
        }
    }

    fn frame_duration(&self, frame: &Frame) -> i64 {
        let track = self.track.read();
        let computed = match &frame.geometry {
            FrameGeometry::Audio(g) if g.sample_rate > 0 => {
                track.timebase.ticks_for(g.samples as i64, g.sample_rate as i64)
            }
            FrameGeometry::Video(_) => match track.frame_rate {
                Some(rate) if rate > 0.0 => (track.timescale() as f64 / rate).round() as i64,
                _ => 0,
            },
            FrameGeometry::Audio(_) => 0,
        };

        if computed > 0 {
            computed
        } else if frame.duration > 0 {
            frame.duration
        } else {
            1
        }
    }

    fn emit(&mut self, mut frame: Frame) {
        let duration = self.frame_duration(&frame);
        frame.duration = duration;

        if frame.pts.is_none() {
            let recovered = match self.last_pts {
                Some(last) => last.saturating_add(self.last_duration),
                None => self.first_pkt_pts.unwrap_or(0),
            };
            frame.pts = Some(recovered);
            StatsCounters::bump(&self.stats.recovered_timestamps);
        }
        self.last_pts = frame.pts;
        self.last_duration = duration;

        let event = if self.emitted {
            FrameEvent::DataReady
        } else {
            self.emitted = true;
            info!(
                track = self.track_id,
                codec = %self.session.codec_info(),
                "Decoder output format stabilized: {:?}",
                frame.geometry
            );
            FrameEvent::FormatChanged
        };

        StatsCounters::bump(&self.stats.frames_emitted);
        (self.handler)(self.track_id, event, frame);
    }
}
