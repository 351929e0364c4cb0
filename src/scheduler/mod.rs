//! Frame scheduling across the three execution contexts.
//!
//! The camera context calls [`FrameGate::on_frame`] once per delivered frame. The gate decides
//! without blocking: drop (not ready, busy, too soon, closed) or hand the frame to the single
//! worker thread. The worker converts, preprocesses, infers, optionally alerts, and publishes a
//! [`UiEvent`] to the UI context through [`UiSink`].
//!
//! At most one frame is in flight. The busy flag is raised by the gate on dispatch and lowered
//! by the worker when the frame reaches a terminal state, so a slow model drops frames at the
//! gate instead of queueing them.

mod state;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender, TrySendError};

use crate::alert::AlertSignal;
use crate::convert::YuvMatrix;
use crate::frame::RawFrame;
use crate::infer::TensorLayout;
use crate::pacer::{FramePacer, PacingState, DEFAULT_MIN_INTERVAL};
use crate::preprocess::PreprocessSettings;

pub use state::{
    ui_channel, AlertToggle, DisplayState, InferenceResult, Label, Labels, PreviewState,
    UiEvent, UiSink, UiState, INITIAL_STATUS,
};
pub use worker::EngineLoader;

use worker::{Job, Worker};

/// Lifecycle of one frame. `Dropped`, `Published` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Captured,
    Dropped,
    Accepted,
    Converting,
    Preprocessing,
    Inferring,
    Published,
    Failed,
}

impl FrameState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FrameState::Dropped | FrameState::Published | FrameState::Failed
        )
    }

    /// Legal single-step transitions; the gate and the worker only ever take these.
    pub fn can_advance_to(self, next: FrameState) -> bool {
        use FrameState::*;
        match (self, next) {
            (Captured, Dropped | Accepted) => true,
            (Accepted, Converting) => true,
            (Converting, Preprocessing) => true,
            (Preprocessing, Inferring) => true,
            (Inferring, Published) => true,
            (Accepted | Converting | Preprocessing | Inferring, Failed) => true,
            _ => false,
        }
    }
}

/// A frame's position in the `FrameState` machine. Travels with the frame from gate to worker.
#[derive(Debug)]
pub(crate) struct FrameTrace {
    sequence: u64,
    state: FrameState,
}

impl FrameTrace {
    pub(crate) fn captured(sequence: u64) -> Self {
        log::trace!("PipelineScheduler: frame {} {:?}", sequence, FrameState::Captured);
        Self {
            sequence,
            state: FrameState::Captured,
        }
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn state(&self) -> FrameState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: FrameState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "frame {}: illegal transition {:?} -> {:?}",
            self.sequence,
            self.state,
            next
        );
        log::trace!(
            "PipelineScheduler: frame {} {:?} -> {:?}",
            self.sequence,
            self.state,
            next
        );
        self.state = next;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Model not loaded yet, or failed to load.
    NotReady,
    /// A frame is still in flight on the worker.
    Busy,
    /// Arrived sooner than the pacing interval.
    Paced,
    /// Scheduler shut down.
    Closed,
}

/// What the gate did with a frame. The frame itself has been released or handed off either way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDisposition {
    Dispatched,
    Dropped(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    /// Label is positive strictly above this confidence.
    pub positive: f32,
    /// Alert fires strictly above this confidence, when enabled.
    pub alert: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            positive: 0.5,
            alert: 0.75,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerSettings {
    pub min_interval: Duration,
    pub matrix: YuvMatrix,
    pub preprocess: PreprocessSettings,
    pub layout: TensorLayout,
    pub thresholds: Thresholds,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            matrix: YuvMatrix::default(),
            preprocess: PreprocessSettings::default(),
            layout: TensorLayout::default(),
            thresholds: Thresholds::default(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SchedulerStats {
    seen: AtomicU64,
    dispatched: AtomicU64,
    dropped_not_ready: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_paced: AtomicU64,
    dropped_closed: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) cancelled: AtomicU64,
}

/// Point-in-time counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub seen: u64,
    pub dispatched: u64,
    pub dropped_not_ready: u64,
    pub dropped_busy: u64,
    pub dropped_paced: u64,
    pub dropped_closed: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_not_ready + self.dropped_busy + self.dropped_paced + self.dropped_closed
    }
}

/// State shared by the gate and the worker.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) ready: AtomicBool,
    pub(crate) busy: AtomicBool,
    closed: AtomicBool,
    pub(crate) stats: SchedulerStats,
}

impl Shared {
    fn snapshot(&self) -> StatsSnapshot {
        let s = &self.stats;
        StatsSnapshot {
            seen: s.seen.load(Ordering::Relaxed),
            dispatched: s.dispatched.load(Ordering::Relaxed),
            dropped_not_ready: s.dropped_not_ready.load(Ordering::Relaxed),
            dropped_busy: s.dropped_busy.load(Ordering::Relaxed),
            dropped_paced: s.dropped_paced.load(Ordering::Relaxed),
            dropped_closed: s.dropped_closed.load(Ordering::Relaxed),
            completed: s.completed.load(Ordering::Relaxed),
            failed: s.failed.load(Ordering::Relaxed),
            cancelled: s.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Camera-context entry point. Cheap to clone.
#[derive(Clone)]
pub struct FrameGate {
    shared: Arc<Shared>,
    pacer: FramePacer,
    pacing: Arc<Mutex<PacingState>>,
    work_tx: Sender<Job>,
}

impl FrameGate {
    /// Decide the fate of one frame without waiting on inference.
    pub fn on_frame(&self, frame: RawFrame) -> FrameDisposition {
        self.on_frame_at(frame, Instant::now())
    }

    /// Same as `on_frame`, with an explicit arrival time for the pacer.
    pub fn on_frame_at(&self, frame: RawFrame, now: Instant) -> FrameDisposition {
        let stats = &self.shared.stats;
        stats.seen.fetch_add(1, Ordering::Relaxed);
        let trace = FrameTrace::captured(frame.sequence());

        if self.shared.closed.load(Ordering::SeqCst) {
            return self.drop_frame(frame, trace, DropReason::Closed);
        }
        if !self.shared.ready.load(Ordering::SeqCst) {
            return self.drop_frame(frame, trace, DropReason::NotReady);
        }
        // Busy is checked before pacing so a busy rejection does not use up the pacing slot.
        if self.shared.busy.load(Ordering::SeqCst) {
            return self.drop_frame(frame, trace, DropReason::Busy);
        }
        let accepted = {
            let mut pacing = self.pacing.lock().unwrap_or_else(PoisonError::into_inner);
            self.pacer.should_process(now, &mut pacing)
        };
        if !accepted {
            return self.drop_frame(frame, trace, DropReason::Paced);
        }
        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.drop_frame(frame, trace, DropReason::Busy);
        }

        match self.work_tx.try_send(Job {
            frame,
            trace,
            accepted_at: now,
        }) {
            Ok(()) => {
                stats.dispatched.fetch_add(1, Ordering::Relaxed);
                FrameDisposition::Dispatched
            }
            Err(TrySendError::Full(job)) => {
                self.shared.busy.store(false, Ordering::SeqCst);
                self.drop_frame(job.frame, job.trace, DropReason::Busy)
            }
            Err(TrySendError::Disconnected(job)) => {
                self.shared.busy.store(false, Ordering::SeqCst);
                self.drop_frame(job.frame, job.trace, DropReason::Closed)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.snapshot()
    }

    fn drop_frame(
        &self,
        frame: RawFrame,
        mut trace: FrameTrace,
        reason: DropReason,
    ) -> FrameDisposition {
        let stats = &self.shared.stats;
        let counter = match reason {
            DropReason::NotReady => &stats.dropped_not_ready,
            DropReason::Busy => &stats.dropped_busy,
            DropReason::Paced => &stats.dropped_paced,
            DropReason::Closed => &stats.dropped_closed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        drop(frame);
        trace.advance(FrameState::Dropped);
        log::trace!(
            "PipelineScheduler: frame {} dropped ({:?})",
            trace.sequence(),
            reason
        );
        FrameDisposition::Dropped(reason)
    }
}

/// Owns the worker thread. Dropping it shuts the worker down.
pub struct PipelineScheduler {
    gate: FrameGate,
    cancel_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl PipelineScheduler {
    /// Spawn the worker. The model loads on the worker thread; the gate drops every frame as
    /// not ready until that finishes, and forever if it fails.
    pub fn start(
        settings: SchedulerSettings,
        loader: EngineLoader,
        ui: UiSink,
        alert: Option<Arc<AlertSignal>>,
        alert_enabled: AlertToggle,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared::default());
        // Capacity one: the in-flight frame. The busy flag keeps it from ever filling further.
        let (work_tx, work_rx) = bounded::<Job>(1);
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        let worker = Worker {
            settings,
            shared: Arc::clone(&shared),
            work_rx,
            cancel_rx,
            ui,
            alert,
            alert_enabled,
        }
        .spawn(loader)?;

        Ok(Self {
            gate: FrameGate {
                shared,
                pacer: FramePacer::new(settings.min_interval),
                pacing: Arc::new(Mutex::new(PacingState::default())),
                work_tx,
            },
            cancel_tx: Some(cancel_tx),
            worker: Some(worker),
        })
    }

    pub fn gate(&self) -> FrameGate {
        self.gate.clone()
    }

    pub fn on_frame(&self, frame: RawFrame) -> FrameDisposition {
        self.gate.on_frame(frame)
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.gate.stats()
    }

    /// Wait until no frame is in flight, up to `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.gate.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Close the gate, cancel pending work and join the worker. Idempotent.
    pub fn shutdown(&mut self) {
        self.gate.shared.closed.store(true, Ordering::SeqCst);
        // Dropping the sender disconnects the cancel channel, which the worker polls.
        drop(self.cancel_tx.take());
        if let Some(handle) = self.worker.take() {
            log::info!("PipelineScheduler: stopping worker");
            if handle.join().is_err() {
                log::error!("PipelineScheduler: worker thread panicked");
            }
        }
    }
}

impl Drop for PipelineScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
