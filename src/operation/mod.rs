//! Long-running wipe operations.
//!
//! An operation walks a queue of targets (files for [`DeleteOperation`],
//! one directory per mount for [`FillOperation`]) one sub-step at a time.
//! Each sub-step runs the pass engine on the blocking thread pool. The
//! caller observes the run through [`Handlers`] and an [`OperationHandle`]
//! and never touches the queue itself.
//!
//! Every launch that returns a handle delivers exactly one
//! [`Finished`] notification.

mod delete;
mod fill;
mod progress;

pub use delete::{DeleteOperation, DeleteOptions};
pub use fill::FillOperation;
pub use progress::{OperationKind, ProgressAggregator, ProgressStep};

use crate::engine::{CancelFlag, PassEngine, Progress};
use crate::error::{Error, Result};
use crate::target::WipeTarget;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{info, warn};

/// Terminal notification of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub success: bool,
    /// Human-readable cause on failure or cancellation.
    pub message: Option<String>,
}

impl Finished {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;
type PulseFn = Box<dyn Fn() + Send + Sync>;
type FinishedFn = Box<dyn FnOnce(Finished) + Send>;

/// Caller callbacks for one launch.
pub struct Handlers {
    on_progress: ProgressFn,
    on_pulse: Option<PulseFn>,
    on_finished: FinishedFn,
}

impl Handlers {
    pub fn new<P, F>(on_progress: P, on_finished: F) -> Self
    where
        P: Fn(f64) + Send + Sync + 'static,
        F: FnOnce(Finished) + Send + 'static,
    {
        Self {
            on_progress: Box::new(on_progress),
            on_pulse: None,
            on_finished: Box::new(on_finished),
        }
    }

    /// Called while a step reports indeterminate progress.
    pub fn with_pulse<F>(mut self, on_pulse: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_pulse = Some(Box::new(on_pulse));
        self
    }
}

/// Lifecycle of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Idle,
    Filtering,
    /// Index of the target being processed.
    Running(usize),
    Completed,
    Failed(String),
    Canceled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed(_) | OperationStatus::Canceled
        )
    }
}

/// State shared between a running operation and its handles.
#[derive(Debug)]
struct Control {
    cancel: CancelFlag,
    status: Mutex<OperationStatus>,
    step: Mutex<ProgressStep>,
    done: watch::Sender<bool>,
}

impl Control {
    fn new(kind: OperationKind, targets: usize, passes: u32) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            cancel: CancelFlag::new(),
            status: Mutex::new(OperationStatus::Idle),
            step: Mutex::new(ProgressStep {
                kind,
                targets,
                passes,
                ..Default::default()
            }),
            done,
        })
    }

    fn set_status(&self, status: OperationStatus) {
        *lock(&self.status) = status;
    }

    fn begin_target(&self, index: usize) {
        self.set_status(OperationStatus::Running(index));
        let mut step = lock(&self.step);
        step.target = index + 1;
        step.pass = 0;
    }
}

/// Caller-side view of a launched operation.
///
/// Cloning is cheap; all clones observe the same run.
#[derive(Clone)]
pub struct OperationHandle {
    kind: OperationKind,
    control: Arc<Control>,
    engine: Arc<dyn PassEngine>,
}

impl OperationHandle {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Request cancellation. Idempotent; a no-op once finished.
    pub fn cancel(&self) {
        if self.is_finished() || self.status().is_terminal() {
            return;
        }
        if self.control.cancel.cancel() {
            info!("Cancel requested for {:?} operation", self.kind);
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.control.cancel.is_canceled()
    }

    /// Whether the pass engine is still running a step.
    pub fn is_busy(&self) -> bool {
        self.engine.is_busy()
    }

    pub fn is_finished(&self) -> bool {
        *self.control.done.borrow()
    }

    pub fn status(&self) -> OperationStatus {
        lock(&self.control.status).clone()
    }

    pub fn step(&self) -> ProgressStep {
        *lock(&self.control.step)
    }

    /// Resolve after the finished notification has been delivered.
    pub async fn wait(&self) {
        let mut done = self.control.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("kind", &self.kind)
            .field("engine", &self.engine.name())
            .field("status", &self.status())
            .finish()
    }
}

/// Mutable run state, owned by the running task.
#[derive(Debug)]
pub(crate) struct OperationState {
    queue: VecDeque<WipeTarget>,
    completed: Vec<WipeTarget>,
    total_count: usize,
    current: Option<WipeTarget>,
    canceled: bool,
}

impl OperationState {
    fn new(targets: Vec<WipeTarget>) -> Self {
        Self {
            total_count: targets.len(),
            queue: targets.into(),
            completed: Vec::new(),
            current: None,
            canceled: false,
        }
    }

    /// Move the next queued target into the current slot.
    fn next(&mut self) -> Option<&WipeTarget> {
        self.current = self.queue.pop_front();
        self.current.as_ref()
    }

    fn has_next(&self) -> bool {
        !self.queue.is_empty()
    }

    fn finish_current(&mut self) {
        if let Some(target) = self.current.take() {
            self.completed.push(target);
        }
    }

    fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Which targets were done, interrupted and never started.
    fn summary(&self) -> String {
        let mut parts = vec![format!(
            "Completed {} of {}{}",
            self.completed.len(),
            self.total_count,
            join_targets(&self.completed, ": ")
        )];
        if self.canceled {
            if let Some(current) = &self.current {
                parts.push(format!("Interrupted: {}", current));
            }
        }
        if !self.queue.is_empty() {
            parts.push(format!(
                "Not processed{}",
                join_targets(self.queue.iter(), ": ")
            ));
        }
        parts.join(". ") + "."
    }
}

fn join_targets<'a>(targets: impl IntoIterator<Item = &'a WipeTarget>, prefix: &str) -> String {
    let names: Vec<String> = targets.into_iter().map(|t| t.to_string()).collect();
    if names.is_empty() {
        String::new()
    } else {
        format!("{}{}", prefix, names.join(", "))
    }
}

/// Progress fan-out used from the blocking pool.
struct Reporter {
    on_progress: ProgressFn,
    on_pulse: Option<PulseFn>,
    aggregator: Mutex<ProgressAggregator>,
    control: Arc<Control>,
}

impl Reporter {
    fn engine_progress(&self, completed: usize, progress: Progress) {
        match progress {
            Progress::Fraction(fraction) => self.emit(completed, fraction),
            Progress::Pulse => {
                if let Some(on_pulse) = &self.on_pulse {
                    on_pulse();
                }
            }
            Progress::PassStarted { pass, total } => {
                let mut step = lock(&self.control.step);
                step.pass = pass;
                step.passes = total;
            }
        }
    }

    fn emit(&self, completed: usize, fraction: f64) {
        let value = lock(&self.aggregator).update(completed, fraction);
        if let Some(value) = value {
            (self.on_progress)(value);
        }
    }

    fn complete(&self) {
        let value = lock(&self.aggregator).complete();
        if let Some(value) = value {
            (self.on_progress)(value);
        }
    }
}

/// Delivers the finished notification exactly once, even if the task is
/// dropped or panics first.
struct FinishOnce {
    on_finished: Mutex<Option<FinishedFn>>,
    control: Arc<Control>,
}

impl FinishOnce {
    fn new(on_finished: FinishedFn, control: Arc<Control>) -> Self {
        Self {
            on_finished: Mutex::new(Some(on_finished)),
            control,
        }
    }

    fn finish(self, status: OperationStatus, finished: Finished) {
        self.deliver(status, finished);
    }

    fn deliver(&self, status: OperationStatus, finished: Finished) {
        let Some(on_finished) = lock(&self.on_finished).take() else {
            return;
        };
        self.control.set_status(status);
        on_finished(finished);
        self.control.done.send_replace(true);
    }
}

impl Drop for FinishOnce {
    fn drop(&mut self) {
        if lock(&self.on_finished).is_some() {
            warn!("Operation ended without reporting, delivering failure");
            let message = "The operation was aborted before completing".to_string();
            self.deliver(OperationStatus::Failed(message.clone()), Finished::failed(message));
        }
    }
}

/// Everything a running operation task needs.
struct Runner {
    kind: OperationKind,
    control: Arc<Control>,
    engine: Arc<dyn PassEngine>,
    reporter: Arc<Reporter>,
    finisher: FinishOnce,
}

impl Runner {
    /// Wire up shared state and return the runner plus the caller's handle.
    fn start(
        kind: OperationKind,
        control: Arc<Control>,
        engine: Arc<dyn PassEngine>,
        targets: usize,
        handlers: Handlers,
    ) -> (Self, OperationHandle) {
        let Handlers {
            on_progress,
            on_pulse,
            on_finished,
        } = handlers;

        let reporter = Arc::new(Reporter {
            on_progress,
            on_pulse,
            aggregator: Mutex::new(ProgressAggregator::new(targets)),
            control: Arc::clone(&control),
        });
        let handle = OperationHandle {
            kind,
            control: Arc::clone(&control),
            engine: Arc::clone(&engine),
        };
        let runner = Self {
            kind,
            finisher: FinishOnce::new(on_finished, Arc::clone(&control)),
            control,
            engine,
            reporter,
        };
        (runner, handle)
    }

    fn is_canceled(&self) -> bool {
        self.control.cancel.is_canceled()
    }

    /// Run one engine step on the blocking pool and wait for it, teardown
    /// included.
    async fn run_step<T, F>(&self, completed: usize, step: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PassEngine, &dyn Fn(Progress), &CancelFlag) -> Result<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let reporter = Arc::clone(&self.reporter);
        let cancel = self.control.cancel.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let progress = |p: Progress| reporter.engine_progress(completed, p);
            step(engine.as_ref(), &progress, &cancel)
        })
        .await;

        joined.unwrap_or_else(|e| {
            Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("wipe worker failed: {}", e),
            )))
        })
    }

    fn milestone(&self, completed: usize) {
        self.reporter.emit(completed, 0.0);
    }

    fn complete(self, state: &OperationState) {
        info!(
            "{:?} operation completed ({} targets)",
            self.kind,
            state.completed_count()
        );
        self.reporter.complete();
        self.finisher
            .finish(OperationStatus::Completed, Finished::succeeded());
    }

    fn cancel(self, state: &mut OperationState) {
        state.canceled = true;
        let message = format!("Operation was canceled. {}", state.summary());
        info!("{:?} operation canceled: {}", self.kind, message);
        self.finisher
            .finish(OperationStatus::Canceled, Finished::failed(message));
    }

    fn fail(self, state: &OperationState, error: &Error) {
        let target = state
            .current
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_default();
        let message = format!(
            "Failed to wipe \"{}\": {}. {}",
            target,
            error,
            state.summary()
        );
        warn!("{:?} operation failed: {}", self.kind, message);
        self.finisher
            .finish(OperationStatus::Failed(message.clone()), Finished::failed(message));
    }
}

fn current_runtime() -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)
}

/// Lock a mutex, recovering the data if a callback panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
