//! Secure deletion of a list of files and directory trees.

use super::{current_runtime, Control, Handlers, OperationHandle, OperationKind, OperationState, Runner};
use crate::config::PassPolicy;
use crate::engine::{CancelFlag, PassEngine, Progress};
use crate::error::{Error, Result};
use crate::target::WipeTarget;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Extra behaviour of a delete run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Remove parent directories left empty by a deletion.
    pub prune_empty_parents: bool,
}

/// Overwrites and unlinks targets one after another, stopping at the first
/// failure.
#[derive(Clone)]
pub struct DeleteOperation {
    engine: Arc<dyn PassEngine>,
    policy: PassPolicy,
    options: DeleteOptions,
}

impl DeleteOperation {
    pub fn new(engine: Arc<dyn PassEngine>, policy: PassPolicy) -> Self {
        Self {
            engine,
            policy,
            options: DeleteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DeleteOptions) -> Self {
        self.options = options;
        self
    }

    /// Start deleting `targets` in order.
    ///
    /// Must be called from within a Tokio runtime. Returns immediately; the
    /// outcome arrives through `handlers`.
    pub fn launch(&self, targets: Vec<WipeTarget>, handlers: Handlers) -> Result<OperationHandle> {
        if targets.is_empty() {
            return Err(Error::NothingToDo);
        }
        self.policy.validate()?;
        let runtime = current_runtime()?;

        let control = Control::new(
            OperationKind::Delete,
            targets.len(),
            self.policy.total_passes(),
        );
        let (runner, handle) = Runner::start(
            OperationKind::Delete,
            control,
            Arc::clone(&self.engine),
            targets.len(),
            handlers,
        );

        info!(
            "Deleting {} targets with {} passes using {} engine",
            targets.len(),
            self.policy.total_passes(),
            self.engine.name()
        );
        runtime.spawn(run(runner, OperationState::new(targets), self.policy, self.options));
        Ok(handle)
    }
}

async fn run(runner: Runner, mut state: OperationState, policy: PassPolicy, options: DeleteOptions) {
    while state.has_next() {
        if runner.is_canceled() {
            runner.cancel(&mut state);
            return;
        }

        let completed = state.completed_count();
        let Some(target) = state.next().cloned() else {
            break;
        };
        runner.control.begin_target(completed);
        info!("Wiping {} ({}/{})", target, completed + 1, state.total_count);

        let result = runner
            .run_step(completed, move |engine, progress, cancel| {
                wipe_target(engine, &target, &policy, options, progress, cancel)
            })
            .await;

        match result {
            Ok(()) => {
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

fn wipe_target(
    engine: &dyn PassEngine,
    target: &WipeTarget,
    policy: &PassPolicy,
    options: DeleteOptions,
    progress: &dyn Fn(Progress),
    cancel: &CancelFlag,
) -> Result<()> {
    if target.is_dir() {
        wipe_tree(engine, &target.path, policy, progress, cancel)?;
    } else {
        engine.run_file_passes(&target.path, policy, progress, cancel)?;
    }

    if options.prune_empty_parents {
        prune_empty_parents(&target.path);
    }
    Ok(())
}

/// Wipe every file below `root`, then remove the directories bottom-up.
///
/// Symlinks are unlinked without being followed. Cancellation is checked
/// between files.
fn wipe_tree(
    engine: &dyn PassEngine,
    root: &Path,
    policy: &PassPolicy,
    progress: &dyn Fn(Progress),
    cancel: &CancelFlag,
) -> Result<()> {
    let entries = WalkDir::new(root)
        .follow_links(false)
        .contents_first(true)
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(io::Error::from)?;

    let files = entries.iter().filter(|e| !e.file_type().is_dir()).count();
    debug!("{} holds {} files", root.display(), files);

    let mut done = 0usize;
    for entry in &entries {
        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())?;
            continue;
        }
        if cancel.is_canceled() {
            info!("Cancel requested, {} of {} files wiped below {}", done, files, root.display());
            return Err(Error::Interrupted);
        }

        let base = done as f64;
        let scale = files as f64;
        engine.run_file_passes(
            entry.path(),
            policy,
            &|p| match p {
                Progress::Fraction(f) => progress(Progress::Fraction((base + f) / scale)),
                other => progress(other),
            },
            cancel,
        )?;
        done += 1;
    }

    progress(Progress::Fraction(1.0));
    Ok(())
}

/// Remove now-empty ancestors of `path`, stopping at the first one that
/// cannot be removed.
fn prune_empty_parents(path: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.parent().is_none() {
            break;
        }
        if let Err(e) = fs::remove_dir(dir) {
            debug!("Stopped pruning at {}: {}", dir.display(), e);
            break;
        }
        debug!("Pruned empty directory {}", dir.display());
        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::OverwriteEngine;
    use tempfile::TempDir;

    fn engine() -> OverwriteEngine {
        OverwriteEngine::new(EngineConfig::new(4096, None))
    }

    #[test]
    fn test_wipe_tree_removes_everything() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("top.txt"), b"top").unwrap();
        fs::write(root.join("a/mid.txt"), vec![7u8; 9000]).unwrap();
        fs::write(root.join("a/b/deep.txt"), b"deep").unwrap();

        let policy = PassPolicy::new(1, true, false);
        let seen = std::sync::Mutex::new(Vec::new());
        wipe_tree(
            &engine(),
            &root,
            &policy,
            &|p| {
                if let Progress::Fraction(f) = p {
                    seen.lock().unwrap().push(f);
                }
            },
            &CancelFlag::new(),
        )
        .unwrap();

        assert!(!root.exists());
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[cfg(unix)]
    #[test]
    fn test_wipe_tree_does_not_follow_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("keep.txt");
        fs::write(&outside, b"keep me").unwrap();

        let root = dir.path().join("tree");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let policy = PassPolicy::new(1, true, false);
        wipe_tree(&engine(), &root, &policy, &|_| {}, &CancelFlag::new()).unwrap();

        assert!(!root.exists());
        assert_eq!(fs::read(&outside).unwrap(), b"keep me");
    }

    #[test]
    fn test_canceled_tree_stops_between_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("one"), b"1").unwrap();
        fs::write(root.join("two"), b"2").unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let policy = PassPolicy::new(1, true, false);
        let err = wipe_tree(&engine(), &root, &policy, &|_| {}, &cancel).unwrap_err();

        assert!(err.is_interrupted());
        assert!(root.join("one").exists());
        assert!(root.join("two").exists());
    }

    #[test]
    fn test_prune_stops_at_non_empty_parent() {
        let dir = TempDir::new().unwrap();
        let keep = dir.path().join("keep");
        let nested = keep.join("x/y");
        fs::create_dir_all(&nested).unwrap();
        fs::write(keep.join("sibling"), b"s").unwrap();

        prune_empty_parents(&nested.join("gone.txt"));

        assert!(!keep.join("x").exists());
        assert!(keep.exists());
    }
}
