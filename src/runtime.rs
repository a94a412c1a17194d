//! Background monitoring
//!
//! A [`Monitor`] owns one worker thread that pulls frames from a
//! [`FrameSource`] and drives an [`AttentionEngine`] at a fixed cadence. The
//! worker is the only writer of engine state; after every frame it publishes
//! an immutable [`SessionSnapshot`] that readers clone under a short lock.
//! Calibration and reset requests are queued in a small mutex-guarded block
//! that the worker drains after each frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;

use crate::engine::{AttentionEngine, SessionSnapshot};
use crate::error::TrackerError;
use crate::types::{Analytics, Frame, SessionSummary, Stats};

/// Producer of frames for the monitor
pub trait FrameSource: Send {
    /// Acquire the underlying device or stream
    fn open(&mut self) -> Result<(), TrackerError>;

    /// Next frame; `None` ends the stream
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Worker timing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOptions {
    /// Sleep after each frame; also the distracted tick credited per frame
    pub frame_interval: Duration,
    /// Upper bound on how long `stop()` waits for the worker
    pub stop_timeout: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Requests waiting for the worker, plus the calibration flag readers see
#[derive(Debug, Default)]
struct Control {
    /// Requested or in progress
    calibrating: bool,
    calibrate: bool,
    cancel: bool,
    reset: bool,
}

struct Shared {
    running: AtomicBool,
    calibration_done: AtomicBool,
    control: Mutex<Control>,
    snapshot: Mutex<Arc<SessionSnapshot>>,
}

impl Shared {
    fn new(initial: SessionSnapshot) -> Self {
        Self {
            running: AtomicBool::new(true),
            calibration_done: AtomicBool::new(false),
            control: Mutex::new(Control::default()),
            snapshot: Mutex::new(Arc::new(initial)),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        match self.control.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn request_calibration(&self) -> Result<(), TrackerError> {
        let mut control = self.control();
        if control.calibrating {
            return Err(TrackerError::CalibrationInProgress);
        }
        control.calibrating = true;
        control.calibrate = true;
        Ok(())
    }

    fn request_cancel(&self) -> bool {
        let mut control = self.control();
        let was_calibrating = std::mem::take(&mut control.calibrating);
        control.calibrate = false;
        control.cancel |= was_calibrating;
        was_calibrating
    }

    fn request_reset(&self) {
        let mut control = self.control();
        control.calibrating = false;
        control.calibrate = false;
        control.reset = true;
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        let snapshot = Arc::new(snapshot);
        match self.snapshot.lock() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    fn current(&self) -> Arc<SessionSnapshot> {
        match self.snapshot.lock() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }
}

/// Handle to a running monitor
pub struct Monitor {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    done: Option<Receiver<Option<SessionSummary>>>,
    options: MonitorOptions,
}

impl Monitor {
    /// Open the source and spawn the worker
    pub fn start<S>(
        mut source: S,
        engine: AttentionEngine,
        options: MonitorOptions,
    ) -> Result<Self, TrackerError>
    where
        S: FrameSource + 'static,
    {
        source.open()?;

        let engine = engine.with_tick(options.frame_interval.as_secs_f64());
        let shared = Arc::new(Shared::new(engine.snapshot()));
        let (done_tx, done_rx) = mpsc::channel();

        let worker_shared = Arc::clone(&shared);
        let interval = options.frame_interval;
        let worker = thread::Builder::new()
            .name("attention-monitor".to_string())
            .spawn(move || run_worker(source, engine, worker_shared, interval, done_tx))?;

        tracing::info!(interval_ms = interval.as_millis() as u64, "attention monitor started");
        Ok(Self {
            shared,
            worker: Some(worker),
            done: Some(done_rx),
            options,
        })
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Latest snapshot published by the worker
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.shared.current()
    }

    pub fn stats(&self) -> Stats {
        self.snapshot().stats(Utc::now())
    }

    pub fn analytics(&self) -> Analytics {
        self.snapshot().analytics(Utc::now())
    }

    /// Ask the worker to open a calibration window after its next frame
    pub fn start_calibration(&self) -> Result<(), TrackerError> {
        if !self.is_running() {
            return Err(TrackerError::NotTracking);
        }
        self.shared.request_calibration()
    }

    /// Abandon a requested or running calibration; returns whether one existed
    pub fn cancel_calibration(&self) -> bool {
        self.shared.request_cancel()
    }

    /// One-shot: true once after a calibration completes
    pub fn calibration_done(&self) -> bool {
        self.shared.calibration_done.swap(false, Ordering::AcqRel)
    }

    /// Discard the session on the worker's next iteration; tracking continues
    pub fn reset(&self) {
        self.shared.request_reset();
    }

    /// Stop the worker and return the flushed session summary.
    ///
    /// Idempotent. Waits at most `stop_timeout`; a worker that has not
    /// finished by then is left to exit on its own.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        let done = self.done.take()?;
        self.shared.running.store(false, Ordering::Release);

        match done.recv_timeout(self.options.stop_timeout) {
            Ok(summary) => {
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        tracing::warn!(
                            error = %TrackerError::WorkerPanicked,
                            "monitor worker failed"
                        );
                    }
                }
                tracing::info!("attention monitor stopped");
                summary
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = self.options.stop_timeout.as_millis() as u64,
                    "monitor worker did not stop in time"
                );
                self.worker.take();
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                if let Some(worker) = self.worker.take() {
                    let _ = worker.join();
                }
                tracing::warn!(error = %TrackerError::WorkerPanicked, "monitor worker failed");
                None
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<S: FrameSource>(
    mut source: S,
    mut engine: AttentionEngine,
    shared: Arc<Shared>,
    interval: Duration,
    done: Sender<Option<SessionSummary>>,
) {
    while shared.running.load(Ordering::Acquire) {
        let Some(frame) = source.next_frame() else {
            tracing::debug!("frame source exhausted");
            break;
        };

        engine.process_frame(frame.landmarks.as_ref(), Utc::now());
        apply_commands(&mut engine, &shared);
        let calibrated = engine.take_calibration_done();
        shared.publish(engine.snapshot());
        if calibrated {
            shared.calibration_done.store(true, Ordering::Release);
        }

        thread::sleep(interval);
    }

    let summary = engine.stop(Utc::now());
    shared.publish(engine.snapshot());
    shared.running.store(false, Ordering::Release);
    let _ = done.send(summary);
}

/// Drain pending requests, reset first and start last, then take the
/// calibration flag from the engine so a rejected or closed window clears it
fn apply_commands(engine: &mut AttentionEngine, shared: &Shared) {
    let mut control = shared.control();
    if std::mem::take(&mut control.reset) {
        engine.reset();
        tracing::info!("attention session reset");
    }
    if std::mem::take(&mut control.cancel) && engine.cancel_calibration() {
        tracing::info!("calibration cancelled");
    }
    if std::mem::take(&mut control.calibrate) {
        if let Err(e) = engine.start_calibration(Utc::now()) {
            tracing::warn!(error = %e, "calibration request rejected");
        }
    }
    control.calibrating = engine.is_calibrating();
}
