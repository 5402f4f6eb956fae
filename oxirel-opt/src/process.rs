//! Cooperative pause/resume and progress reporting.
//!
//! Solvers never block on the host. They call [`SolveControl::checkpoint`]
//! at loop boundaries (branch, iteration, flip) and return
//! [`SolveError::Paused`] when a pause was requested, leaving their
//! resumable state (work stacks, iteration counters, accumulated clauses)
//! in place. [`Process`] wraps a solver in this protocol on a dedicated
//! worker thread: `pause` raises the flag and joins the worker, `resume`
//! spawns a fresh worker that continues from the saved state.

use crate::error::{Result, SolveError};
use crate::solution::{ConsistencySolver, Solution};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Receives progress reports from a running solver.
pub trait ProgressListener: Send + Sync {
    /// `fraction` is in `[0, 1]`; solvers may only approximate it.
    fn on_progress(&self, fraction: f64, message: &str);
}

impl<F> ProgressListener for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn on_progress(&self, fraction: f64, message: &str) {
        self(fraction, message)
    }
}

#[derive(Default)]
struct ControlState {
    pause: AtomicBool,
    cancel: AtomicBool,
    listeners: Mutex<Vec<Arc<dyn ProgressListener>>>,
}

/// Cloneable handle shared between a solver and whoever drives it.
#[derive(Clone, Default)]
pub struct SolveControl {
    inner: Arc<ControlState>,
}

impl SolveControl {
    /// Fresh control with no flags raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// `Err(Cancelled)` or `Err(Paused)` when the solver must stop here.
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        if self.inner.cancel.load(Ordering::Acquire) {
            return Err(SolveError::Cancelled);
        }
        if self.inner.pause.load(Ordering::Acquire) {
            return Err(SolveError::Paused);
        }
        Ok(())
    }

    /// Ask the solver to stop at its next checkpoint.
    pub fn request_pause(&self) {
        self.inner.pause.store(true, Ordering::Release);
    }

    /// Lower the pause flag.
    pub fn clear_pause(&self) {
        self.inner.pause.store(false, Ordering::Release);
    }

    /// Whether a pause is pending.
    pub fn is_pause_requested(&self) -> bool {
        self.inner.pause.load(Ordering::Acquire)
    }

    /// Ask the solver to give up at its next checkpoint.
    pub fn request_cancel(&self) {
        self.inner.cancel.store(true, Ordering::Release);
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn ProgressListener>) {
        self.inner.listeners.lock().push(listener);
    }

    /// Forward a progress report to every listener.
    pub fn report(&self, fraction: f64, message: &str) {
        let fraction = fraction.clamp(0.0, 1.0);
        for listener in self.inner.listeners.lock().iter() {
            listener.on_progress(fraction, message);
        }
    }
}

impl fmt::Debug for SolveControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolveControl")
            .field("pause", &self.inner.pause.load(Ordering::Relaxed))
            .field("cancel", &self.inner.cancel.load(Ordering::Relaxed))
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

/// Lifecycle of a [`Process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, not started.
    Idle,
    /// Worker thread running.
    Running,
    /// Pause requested, worker not yet joined.
    Pausing,
    /// Worker joined at a checkpoint; can be resumed.
    Paused,
    /// Solve completed with a solution.
    Finished,
    /// Solve completed with an error.
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Idle => "idle",
            ProcessState::Running => "running",
            ProcessState::Pausing => "pausing",
            ProcessState::Paused => "paused",
            ProcessState::Finished => "finished",
            ProcessState::Failed => "failed",
        };
        f.write_str(s)
    }
}

type Worker<S> = JoinHandle<(S, Result<Solution>)>;

/// A solver driven on a worker thread.
pub struct Process<S: ConsistencySolver + 'static> {
    solver: Option<S>,
    worker: Option<Worker<S>>,
    control: SolveControl,
    state: ProcessState,
    outcome: Option<Result<Solution>>,
    message: String,
}

impl<S: ConsistencySolver + 'static> Process<S> {
    /// Wrap `solver`.
    pub fn new(solver: S) -> Self {
        Self {
            solver: Some(solver),
            worker: None,
            control: SolveControl::new(),
            state: ProcessState::Idle,
            outcome: None,
            message: "idle".to_string(),
        }
    }

    /// Register a progress listener.
    pub fn add_progress_listener(&self, listener: impl ProgressListener + 'static) {
        self.control.add_listener(Arc::new(listener));
    }

    /// Shared control handle.
    pub fn control(&self) -> &SolveControl {
        &self.control
    }

    /// Spawn the worker. A paused process is resumed; other states are
    /// left alone.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            ProcessState::Idle => self.spawn(),
            ProcessState::Paused => self.resume(),
            state => {
                warn!(%state, "start ignored");
                Ok(())
            }
        }
    }

    /// Request a pause and wait for the worker to reach a checkpoint.
    ///
    /// The solve may complete before it sees the flag; the process is then
    /// `Finished` (or `Failed`) rather than `Paused`.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != ProcessState::Running {
            return Err(SolveError::CannotPause(self.state.to_string()));
        }
        self.control.request_pause();
        self.state = ProcessState::Pausing;
        self.message = "pausing".to_string();
        self.join()
    }

    /// Continue a paused solve on a fresh worker.
    pub fn resume(&mut self) -> Result<()> {
        if self.state != ProcessState::Paused {
            warn!(state = %self.state, "resume ignored");
            return Ok(());
        }
        self.control.clear_pause();
        info!("resuming solve");
        self.spawn()
    }

    /// Ask the worker to give up at its next checkpoint.
    pub fn cancel(&self) {
        self.control.request_cancel();
    }

    /// Block until the solve completes and return its outcome.
    pub fn wait(&mut self) -> Result<Solution> {
        if matches!(self.state, ProcessState::Running | ProcessState::Pausing) {
            self.join()?;
        }
        match self.state {
            ProcessState::Idle => Err(SolveError::NotStarted),
            ProcessState::Paused => Err(SolveError::Paused),
            _ => self.outcome.take().unwrap_or(Err(SolveError::NotStarted)),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Human-readable state.
    pub fn state_message(&self) -> &str {
        &self.message
    }

    /// The solver, when no worker owns it.
    pub fn solver(&self) -> Option<&S> {
        self.solver.as_ref()
    }

    /// Take the solver back, when no worker owns it.
    pub fn into_solver(mut self) -> Option<S> {
        self.solver.take()
    }

    fn spawn(&mut self) -> Result<()> {
        let Some(mut solver) = self.solver.take() else {
            return Err(SolveError::NotStarted);
        };
        let control = self.control.clone();
        let name = solver.name();
        match std::thread::Builder::new()
            .name(format!("oxirel-{}", name))
            .spawn(move || {
                let result = solver.solve(&control);
                (solver, result)
            }) {
            Ok(handle) => {
                self.worker = Some(handle);
                self.state = ProcessState::Running;
                self.message = format!("running {}", name);
                debug!(solver = name, "worker started");
                Ok(())
            }
            Err(e) => Err(SolveError::Config(format!("cannot spawn worker: {}", e))),
        }
    }

    fn join(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        let Ok((solver, result)) = handle.join() else {
            self.state = ProcessState::Failed;
            self.message = "worker panicked".to_string();
            return Err(SolveError::WorkerPanicked);
        };
        self.solver = Some(solver);
        match result {
            Err(SolveError::Paused) => {
                self.state = ProcessState::Paused;
                self.message = "paused".to_string();
                info!("solve paused");
            }
            Ok(solution) => {
                self.state = ProcessState::Finished;
                self.message = format!("finished: {}", solution);
                self.outcome = Some(Ok(solution));
            }
            Err(e) => {
                self.state = ProcessState::Failed;
                self.message = format!("failed: {}", e);
                self.outcome = Some(Err(e));
            }
        }
        Ok(())
    }
}

impl<S: ConsistencySolver + 'static> Drop for Process<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.control.request_cancel();
            let _ = handle.join();
        }
    }
}
