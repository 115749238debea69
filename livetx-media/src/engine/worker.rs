//! Worker thread behind the built-in engines

use super::{EngineState, OutputHandler};
use livetx_core::{BoundedQueue, Frame, QueueError, TranscodeResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Frame transformation run on the worker thread
pub(crate) trait FrameProcessor: Send {
    /// Transform one frame into zero or more output frames
    fn process(&mut self, frame: Frame) -> TranscodeResult<Vec<Frame>>;

    /// Emit whatever is still buffered
    fn flush(&mut self) -> Vec<Frame>;
}

enum EngineCommand {
    Frame(Frame),
    Flush,
    Stop,
}

#[derive(Default)]
struct WorkerState {
    started: bool,
    exited: bool,
    failed: bool,
    flush_requested: u64,
    flush_done: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut WorkerState)) {
        f(&mut *self.state.lock());
        self.changed.notify_all();
    }

    /// Wait until `done` holds or `deadline` passes; returns `done`'s last value
    fn wait_until(&self, deadline: Instant, done: impl Fn(&WorkerState) -> bool) -> bool {
        let mut state = self.state.lock();
        while !done(&*state) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return done(&*state);
            }
        }
        true
    }
}

/// Marks the worker as exited however its thread ends
struct ExitGuard {
    queue: Arc<BoundedQueue<EngineCommand>>,
    shared: Arc<Shared>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.queue.close();
        self.shared.update(|state| state.exited = true);
    }
}

pub(crate) struct EngineWorker {
    name: String,
    queue: Arc<BoundedQueue<EngineCommand>>,
    shared: Arc<Shared>,
    processor: Mutex<Option<Box<dyn FrameProcessor>>>,
    on_output: OutputHandler,
    handle: Mutex<Option<JoinHandle<()>>>,
    stop_timeout: Duration,
}

impl EngineWorker {
    pub(crate) fn new(
        name: String,
        processor: Box<dyn FrameProcessor>,
        on_output: OutputHandler,
        queue_capacity: usize,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            queue: Arc::new(BoundedQueue::new(name.clone(), queue_capacity.max(1))),
            name,
            shared: Arc::new(Shared::default()),
            processor: Mutex::new(Some(processor)),
            on_output,
            handle: Mutex::new(None),
            stop_timeout,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn start(&self) -> bool {
        let Some(processor) = self.processor.lock().take() else {
            warn!(engine = %self.name, "Engine cannot be started twice");
            return false;
        };

        let queue = self.queue.clone();
        let shared = self.shared.clone();
        let on_output = self.on_output.clone();
        let name = self.name.clone();

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run(name, processor, queue, shared, on_output));

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                self.shared.update(|state| state.started = true);
                debug!(engine = %self.name, "Engine started");
                true
            }
            Err(e) => {
                warn!(engine = %self.name, "Failed to spawn engine worker: {}", e);
                false
            }
        }
    }

    pub(crate) fn send(&self, frame: Frame) -> bool {
        if !self.is_running() {
            return false;
        }
        self.queue.enqueue(EngineCommand::Frame(frame)).is_ok()
    }

    pub(crate) fn flush(&self) {
        if !self.is_running() {
            return;
        }

        let ticket = {
            let mut state = self.shared.state.lock();
            state.flush_requested += 1;
            state.flush_requested
        };
        if self.queue.enqueue(EngineCommand::Flush).is_err() {
            return;
        }

        let deadline = Instant::now() + self.stop_timeout;
        let done = self
            .shared
            .wait_until(deadline, |state| state.exited || state.flush_done >= ticket);
        if !done {
            warn!(engine = %self.name, "Engine flush timed out");
        }
    }

    pub(crate) fn stop(&self) -> bool {
        let Some(handle) = self.handle.lock().take() else {
            // Never started
            self.queue.close();
            return true;
        };

        match self.queue.try_enqueue(EngineCommand::Stop) {
            Ok(()) => {}
            Err(QueueError::Full(_)) => {
                let dropped = self.queue.close();
                debug!(engine = %self.name, dropped, "Engine queue full at stop, dropping frames");
            }
            Err(QueueError::Closed(_)) => {}
        }

        let deadline = Instant::now() + self.stop_timeout;
        if self.shared.wait_until(deadline, |state| state.exited) {
            if handle.join().is_err() {
                warn!(engine = %self.name, "Engine worker panicked");
            }
            debug!(engine = %self.name, "Engine stopped");
            true
        } else {
            self.queue.close();
            warn!(
                engine = %self.name,
                timeout_ms = self.stop_timeout.as_millis() as u64,
                "Engine did not stop in time, detaching worker"
            );
            false
        }
    }

    pub(crate) fn state(&self) -> EngineState {
        if self.shared.state.lock().failed {
            EngineState::Error
        } else {
            EngineState::Normal
        }
    }

    fn is_running(&self) -> bool {
        let state = self.shared.state.lock();
        state.started && !state.exited
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        if self.handle.lock().is_some() {
            self.stop();
        }
    }
}

fn run(
    name: String,
    mut processor: Box<dyn FrameProcessor>,
    queue: Arc<BoundedQueue<EngineCommand>>,
    shared: Arc<Shared>,
    on_output: OutputHandler,
) {
    let _guard = ExitGuard {
        queue: queue.clone(),
        shared: shared.clone(),
    };

    while let Some(command) = queue.dequeue() {
        match command {
            EngineCommand::Frame(frame) => match processor.process(frame) {
                Ok(frames) => frames.into_iter().for_each(|frame| on_output(frame)),
                Err(e) => {
                    warn!(engine = %name, "Engine failed to process frame: {}", e);
                    shared.update(|state| state.failed = true);
                }
            },
            EngineCommand::Flush => {
                processor.flush().into_iter().for_each(|frame| on_output(frame));
                shared.update(|state| state.flush_done += 1);
            }
            EngineCommand::Stop => break,
        }
    }
}
