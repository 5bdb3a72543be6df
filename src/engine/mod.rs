//! Pass engine abstraction.
//!
//! The engine is the primitive both operations drive: it overwrites a
//! single file, or fills and scrubs the free space of one directory. It is
//! synchronous; operations run it on the blocking thread pool.

mod overwrite;
pub mod pattern;

pub use overwrite::OverwriteEngine;

use crate::config::PassPolicy;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Progress reported by a running engine step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Fraction of the current step in `[0, 1]`.
    Fraction(f64),
    /// Work is happening but its extent is unknown.
    Pulse,
    /// A new pass has started (1-based).
    PassStarted { pass: u32, total: u32 },
}

/// Outcome of a successful fill step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Bytes written before the device reported full.
    pub bytes_written: u64,
    /// Filler files that were created, overwritten and deleted.
    pub fillers: Vec<PathBuf>,
}

/// Latched cancellation request shared between an operation and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` for the first request only.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Marks an engine as running a step.
///
/// Waiters are woken as soon as the holding [`BusyGuard`] is dropped, so a
/// caller can chain the next step without polling.
#[derive(Debug, Default)]
pub struct BusyLock {
    busy: AtomicBool,
    released: Notify,
}

impl BusyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, failing with [`Error::Busy`] if a step is running.
    pub fn try_acquire(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(BusyGuard { lock: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Resolve once no step holds the lock.
    pub async fn idle(&self) {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if !self.is_busy() {
                return;
            }
            released.await;
        }
    }
}

/// Releases its [`BusyLock`] when dropped.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    lock: &'a BusyLock,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
        self.lock.released.notify_waiters();
    }
}

/// Pluggable overwrite primitive.
///
/// Implementations must honour `cancel` only between discrete steps and
/// must never leave a filler file behind un-overwritten.
pub trait PassEngine: Send + Sync {
    /// Overwrite `path` per `policy`, then truncate and unlink it.
    ///
    /// Progress fractions cover all passes of this file, including the
    /// partially written current pass.
    fn run_file_passes(
        &self,
        path: &Path,
        policy: &PassPolicy,
        progress: &dyn Fn(Progress),
        cancel: &CancelFlag,
    ) -> Result<()>;

    /// Fill the free space below `dir`, then scrub and delete the filler.
    ///
    /// Running out of space while filling is the expected end of the
    /// write phase. Failing to create the filler at all is
    /// [`Error::NoSpaceDuringSetup`].
    fn run_fill(
        &self,
        dir: &Path,
        policy: &PassPolicy,
        progress: &dyn Fn(Progress),
        cancel: &CancelFlag,
    ) -> Result<FillReport>;

    /// Lock held for the whole duration of a step, teardown included.
    fn busy(&self) -> &BusyLock;

    fn is_busy(&self) -> bool {
        self.busy().is_busy()
    }

    /// Name of this engine (for logging).
    fn name(&self) -> &'static str;
}
