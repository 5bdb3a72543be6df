//! Shared helpers for operation tests.

#![allow(dead_code)]

use secure_wipe::engine::{BusyLock, CancelFlag, FillReport, PassEngine, Progress};
use secure_wipe::{Error, Finished, Handlers, PassPolicy, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// What the fake engine does for a given path.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail,
    NoSpace,
    /// Report indeterminate progress three times, then succeed.
    Pulse,
    /// Report the start, then run until canceled.
    BlockUntilCanceled,
}

/// Pass engine that follows a script instead of touching the disk.
#[derive(Default)]
pub struct FakeEngine {
    busy: BusyLock,
    script: Mutex<Vec<(PathBuf, Step)>>,
    calls: Mutex<Vec<PathBuf>>,
    started: Mutex<Option<mpsc::UnboundedSender<PathBuf>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, path: impl Into<PathBuf>, step: Step) -> Self {
        self.script.lock().unwrap().push((path.into(), step));
        self
    }

    /// Receives every path a blocking step starts on.
    pub fn started(&self) -> mpsc::UnboundedReceiver<PathBuf> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.started.lock().unwrap() = Some(tx);
        rx
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    fn step_for(&self, path: &Path) -> Step {
        self.script
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, s)| s.clone())
            .unwrap_or(Step::Succeed)
    }

    fn run(&self, path: &Path, progress: &dyn Fn(Progress), cancel: &CancelFlag) -> Result<()> {
        let _guard = self.busy.try_acquire()?;
        self.calls.lock().unwrap().push(path.to_path_buf());

        progress(Progress::PassStarted { pass: 1, total: 1 });
        progress(Progress::Fraction(0.5));

        match self.step_for(path) {
            Step::Succeed => {
                progress(Progress::Fraction(1.0));
                Ok(())
            }
            Step::Fail => Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "simulated failure",
            ))),
            Step::Pulse => {
                for _ in 0..3 {
                    progress(Progress::Pulse);
                }
                progress(Progress::Fraction(1.0));
                Ok(())
            }
            Step::NoSpace => Err(Error::NoSpaceDuringSetup(path.to_path_buf())),
            Step::BlockUntilCanceled => {
                if let Some(tx) = self.started.lock().unwrap().as_ref() {
                    let _ = tx.send(path.to_path_buf());
                }
                let deadline = Instant::now() + Duration::from_secs(10);
                while !cancel.is_canceled() {
                    assert!(Instant::now() < deadline, "step was never canceled");
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(Error::Interrupted)
            }
        }
    }
}

impl PassEngine for FakeEngine {
    fn run_file_passes(
        &self,
        path: &Path,
        _policy: &PassPolicy,
        progress: &dyn Fn(Progress),
        cancel: &CancelFlag,
    ) -> Result<()> {
        self.run(path, progress, cancel)
    }

    fn run_fill(
        &self,
        dir: &Path,
        _policy: &PassPolicy,
        progress: &dyn Fn(Progress),
        cancel: &CancelFlag,
    ) -> Result<FillReport> {
        self.run(dir, progress, cancel)?;
        Ok(FillReport {
            bytes_written: 4096,
            fillers: Vec::new(),
        })
    }

    fn busy(&self) -> &BusyLock {
        &self.busy
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Everything the callbacks observed.
#[derive(Default)]
pub struct Recorded {
    pub progress: Mutex<Vec<f64>>,
    pub pulses: Mutex<usize>,
    pub finished: Mutex<Vec<Finished>>,
}

impl Recorded {
    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().unwrap().clone()
    }

    pub fn pulses(&self) -> usize {
        *self.pulses.lock().unwrap()
    }

    pub fn finished(&self) -> Vec<Finished> {
        self.finished.lock().unwrap().clone()
    }

    /// The single finished notification.
    pub fn outcome(&self) -> Finished {
        let finished = self.finished();
        assert_eq!(finished.len(), 1, "expected exactly one finished notification");
        finished[0].clone()
    }
}

pub fn recording_handlers() -> (Handlers, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let progress = Arc::clone(&recorded);
    let pulse = Arc::clone(&recorded);
    let finished = Arc::clone(&recorded);

    let handlers = Handlers::new(
        move |value| progress.progress.lock().unwrap().push(value),
        move |outcome| finished.finished.lock().unwrap().push(outcome),
    )
    .with_pulse(move || *pulse.pulses.lock().unwrap() += 1);

    (handlers, recorded)
}

pub fn assert_monotonic(values: &[f64]) {
    for pair in values.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {:?}", values);
    }
    assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
}
