//! Integration tests for secure deletion.

mod common;

use common::{assert_monotonic, recording_handlers, FakeEngine, Step};
use secure_wipe::operation::OperationHandle;
use secure_wipe::{
    DeleteOperation, DeleteOptions, EngineConfig, Error, OperationStatus, OverwriteEngine,
    PassPolicy, TargetKind, WipeTarget,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn file_targets(names: &[&str]) -> Vec<WipeTarget> {
    names
        .iter()
        .map(|n| WipeTarget::new(PathBuf::from("/wipe").join(n), TargetKind::File))
        .collect()
}

fn policy() -> PassPolicy {
    PassPolicy::new(2, true, true)
}

async fn wait(handle: &OperationHandle) {
    tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("operation did not finish in time");
}

#[tokio::test]
async fn test_all_targets_deleted_in_order() {
    let engine = Arc::new(FakeEngine::new());
    let (handlers, recorded) = recording_handlers();

    let handle = DeleteOperation::new(engine.clone(), policy())
        .launch(file_targets(&["a", "b", "c"]), handlers)
        .unwrap();
    wait(&handle).await;

    let outcome = recorded.outcome();
    assert!(outcome.success);
    assert_eq!(outcome.message, None);
    assert_eq!(handle.status(), OperationStatus::Completed);
    assert!(handle.is_finished());
    assert!(!handle.is_busy());

    let calls = engine.calls();
    assert_eq!(
        calls,
        vec![
            PathBuf::from("/wipe/a"),
            PathBuf::from("/wipe/b"),
            PathBuf::from("/wipe/c")
        ]
    );

    let progress = recorded.progress();
    assert_monotonic(&progress);
    assert_eq!(progress.last(), Some(&1.0));
}

#[tokio::test]
async fn test_first_failure_stops_the_run() {
    let engine = Arc::new(FakeEngine::new().on("/wipe/b", Step::Fail));
    let (handlers, recorded) = recording_handlers();

    let handle = DeleteOperation::new(engine.clone(), policy())
        .launch(file_targets(&["a", "b", "c"]), handlers)
        .unwrap();
    wait(&handle).await;

    assert_eq!(
        engine.calls(),
        vec![PathBuf::from("/wipe/a"), PathBuf::from("/wipe/b")]
    );

    let outcome = recorded.outcome();
    assert!(!outcome.success);
    let message = outcome.message.unwrap();
    assert!(message.contains("\"/wipe/b\""), "{}", message);
    assert!(message.contains("simulated failure"), "{}", message);
    assert!(message.contains("Completed 1 of 3: /wipe/a"), "{}", message);
    assert!(message.contains("Not processed: /wipe/c"), "{}", message);
    assert!(matches!(handle.status(), OperationStatus::Failed(_)));

    let progress = recorded.progress();
    assert_monotonic(&progress);
    assert!(progress.last().copied().unwrap_or(0.0) < 1.0);
}

#[tokio::test]
async fn test_cancel_finishes_current_file_and_skips_rest() {
    let engine = Arc::new(FakeEngine::new().on("/wipe/b", Step::BlockUntilCanceled));
    let mut started = engine.started();
    let (handlers, recorded) = recording_handlers();

    let handle = DeleteOperation::new(engine.clone(), policy())
        .launch(file_targets(&["a", "b", "c"]), handlers)
        .unwrap();

    let busy_on = started.recv().await.unwrap();
    assert_eq!(busy_on, PathBuf::from("/wipe/b"));
    assert_eq!(handle.step().to_string(), "File 2 out of 3, pass 1 out of 1");
    assert!(handle.is_busy());

    handle.cancel();
    handle.cancel();
    wait(&handle).await;

    assert_eq!(handle.status(), OperationStatus::Canceled);
    assert_eq!(engine.calls().len(), 2);

    let outcome = recorded.outcome();
    assert!(!outcome.success);
    let message = outcome.message.unwrap();
    assert!(message.contains("canceled"), "{}", message);
    assert!(message.contains("Interrupted: /wipe/b"), "{}", message);
    assert!(message.contains("Not processed: /wipe/c"), "{}", message);
}

#[tokio::test]
async fn test_cancel_after_finish_is_a_no_op() {
    let engine = Arc::new(FakeEngine::new());
    let (handlers, recorded) = recording_handlers();

    let handle = DeleteOperation::new(engine, policy())
        .launch(file_targets(&["a"]), handlers)
        .unwrap();
    wait(&handle).await;

    handle.cancel();
    assert!(!handle.is_cancel_requested());
    assert_eq!(handle.status(), OperationStatus::Completed);
    assert_eq!(recorded.finished().len(), 1);
}

#[tokio::test]
async fn test_empty_target_list_is_rejected() {
    let engine = Arc::new(FakeEngine::new());
    let (handlers, recorded) = recording_handlers();

    let err = DeleteOperation::new(engine, policy())
        .launch(Vec::new(), handlers)
        .unwrap_err();

    assert!(matches!(err, Error::NothingToDo));
    assert_eq!(err.to_string(), "Nothing to do!");
    assert!(recorded.finished().is_empty());
}

#[tokio::test]
async fn test_invalid_policy_is_rejected() {
    let engine = Arc::new(FakeEngine::new());
    let (handlers, _) = recording_handlers();

    let err = DeleteOperation::new(engine.clone(), PassPolicy::new(0, true, true))
        .launch(file_targets(&["a"]), handlers)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidPolicy(_)));
    assert!(engine.calls().is_empty());
}

#[test]
fn test_launch_requires_runtime() {
    let engine = Arc::new(FakeEngine::new());
    let (handlers, _) = recording_handlers();

    let err = DeleteOperation::new(engine, policy())
        .launch(file_targets(&["a"]), handlers)
        .unwrap_err();
    assert!(matches!(err, Error::NoRuntime));
}

#[tokio::test]
async fn test_real_files_are_overwritten_and_removed() {
    let dir = TempDir::new().unwrap();
    let sizes = [10usize, 5000, 12_345];
    let paths: Vec<PathBuf> = sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            let path = dir.path().join(format!("secret_{}.bin", i));
            fs::write(&path, vec![0x5Au8; *size]).unwrap();
            path
        })
        .collect();

    let engine = Arc::new(OverwriteEngine::new(EngineConfig::new(4096, None)));
    let (handlers, recorded) = recording_handlers();
    let handle = DeleteOperation::new(engine, PassPolicy::new(2, false, true))
        .launch(WipeTarget::from_paths(&paths).unwrap(), handlers)
        .unwrap();
    wait(&handle).await;

    let outcome = recorded.outcome();
    assert!(outcome.success, "{:?}", outcome.message);
    for path in &paths {
        assert!(!path.exists(), "{} still exists", path.display());
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

    let progress = recorded.progress();
    assert_monotonic(&progress);
    for boundary in [1.0 / 3.0, 2.0 / 3.0] {
        assert!(
            progress.iter().any(|v| (v - boundary).abs() < 0.02),
            "no value near {} in {:?}",
            boundary,
            progress
        );
    }
    assert_eq!(progress.last(), Some(&1.0));
}

#[tokio::test]
async fn test_directory_target_and_pruning() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("outer/inner/tree");
    fs::create_dir_all(tree.join("sub")).unwrap();
    fs::write(tree.join("a.txt"), b"alpha").unwrap();
    fs::write(tree.join("sub/b.txt"), b"beta").unwrap();
    fs::write(dir.path().join("outer/keep.txt"), b"keep").unwrap();

    let engine = Arc::new(OverwriteEngine::new(EngineConfig::new(4096, None)));
    let (handlers, recorded) = recording_handlers();
    let handle = DeleteOperation::new(engine, PassPolicy::new(1, true, false))
        .with_options(DeleteOptions {
            prune_empty_parents: true,
        })
        .launch(vec![WipeTarget::from_path(&tree).unwrap()], handlers)
        .unwrap();
    wait(&handle).await;

    assert!(recorded.outcome().success);
    assert!(!tree.exists());
    assert!(!dir.path().join("outer/inner").exists());
    assert!(dir.path().join("outer/keep.txt").exists());
}
