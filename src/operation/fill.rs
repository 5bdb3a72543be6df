//! Free-space filling, one directory per mount point.

use super::{
    current_runtime, Control, Handlers, OperationHandle, OperationKind, OperationState, OperationStatus,
    Runner,
};
use crate::config::PassPolicy;
use crate::engine::PassEngine;
use crate::error::{Error, Result};
use crate::mount::{filter_to_one_per_mount, MountLookup, SystemMounts};
use crate::target::{TargetKind, WipeTarget};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Fills and scrubs the free space of every mount the given paths live on.
#[derive(Clone)]
pub struct FillOperation {
    engine: Arc<dyn PassEngine>,
    policy: PassPolicy,
    mounts: Arc<dyn MountLookup>,
}

impl FillOperation {
    /// Create a fill operation resolving mounts from the running system.
    pub fn new(engine: Arc<dyn PassEngine>, policy: PassPolicy) -> Self {
        Self {
            engine,
            policy,
            mounts: Arc::new(SystemMounts::load()),
        }
    }

    /// Use a different mount table.
    pub fn with_mounts(mut self, mounts: Arc<dyn MountLookup>) -> Self {
        self.mounts = mounts;
        self
    }

    /// Reduce `paths` to one directory per mount and start filling them.
    ///
    /// Mount resolution happens before this returns; any path that cannot
    /// be resolved fails the launch and nothing is written.
    pub fn launch<I, P>(&self, paths: I, handlers: Handlers) -> Result<OperationHandle>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<_> = paths.into_iter().collect();
        if paths.is_empty() {
            return Err(Error::NothingToDo);
        }
        self.policy.validate()?;
        let runtime = current_runtime()?;

        let control = Control::new(OperationKind::Fill, paths.len(), self.policy.total_passes());
        control.set_status(OperationStatus::Filtering);

        let filtered = match filter_to_one_per_mount(&paths, self.mounts.as_ref()) {
            Ok(filtered) => filtered,
            Err(e) => {
                control.set_status(OperationStatus::Failed(e.to_string()));
                return Err(e);
            }
        };

        for (dir, mount) in filtered.iter() {
            info!("Will fill {} on mount {}", dir.display(), mount);
        }
        let targets: Vec<WipeTarget> = filtered
            .work_paths
            .into_iter()
            .map(|dir| WipeTarget::new(dir, TargetKind::Directory))
            .collect();

        super::lock(&control.step).targets = targets.len();
        let (runner, handle) = Runner::start(
            OperationKind::Fill,
            control,
            Arc::clone(&self.engine),
            targets.len(),
            handlers,
        );

        runtime.spawn(run(runner, OperationState::new(targets), self.policy));
        Ok(handle)
    }
}

async fn run(runner: Runner, mut state: OperationState, policy: PassPolicy) {
    while state.has_next() {
        if runner.is_canceled() {
            runner.cancel(&mut state);
            return;
        }

        // A previous step may still be releasing the engine.
        runner.engine.busy().idle().await;

        let completed = state.completed_count();
        let Some(target) = state.next().cloned() else {
            break;
        };
        runner.control.begin_target(completed);
        info!("Filling free space of {} ({}/{})", target, completed + 1, state.total_count);

        let dir = target.path;
        let result = runner
            .run_step(completed, move |engine, progress, cancel| {
                engine.run_fill(&dir, &policy, progress, cancel)
            })
            .await;

        match result {
            Ok(report) => {
                info!(
                    "Wrote and scrubbed {} bytes in {} filler files",
                    report.bytes_written,
                    report.fillers.len()
                );
                state.finish_current();
                runner.milestone(state.completed_count());
            }
            Err(e) if e.is_interrupted() => {
                runner.cancel(&mut state);
                return;
            }
            Err(e) => {
                runner.fail(&state, &e);
                return;
            }
        }
    }

    runner.complete(&state);
}
