//! Secure Wipe
//!
//! Secure deletion of files and secure filling of free disk space, driven
//! as cancellable background operations with aggregated progress.
//!
//! # Features
//!
//! - **Delete**: Overwrite files (or whole trees) with multiple passes, then truncate and unlink them
//! - **Fill**: Fill the free space of each mount once with filler files, then scrub and remove them
//! - **Mount Filtering**: Reduce any set of paths to one work directory per mount point
//! - **Cancellation**: Stop at the next pass boundary without leaving filler data behind
//! - **CLI Interface**: `secure-wipe delete | fill | mounts`
//!
//! # Architecture
//!
//! ```text
//! targets → Operation (tokio task) → PassEngine (blocking pool) → disk
//!                │
//!                └→ progress / finished callbacks
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use secure_wipe::{DeleteOperation, Handlers, OverwriteEngine, PassPolicy, WipeMode, WipeTarget};
//! use std::sync::Arc;
//!
//! # async fn example() -> secure_wipe::Result<()> {
//! let engine = Arc::new(OverwriteEngine::default());
//! let policy = PassPolicy::from_mode(WipeMode::Insecure, false, true);
//! let targets = WipeTarget::from_paths(["/tmp/secret.txt"])?;
//!
//! let handle = DeleteOperation::new(engine, policy).launch(
//!     targets,
//!     Handlers::new(
//!         |fraction| println!("{:.0}%", fraction * 100.0),
//!         |finished| println!("success: {}", finished.success),
//!     ),
//! )?;
//! handle.wait().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod mount;
pub mod operation;
pub mod target;

pub use config::{EngineConfig, PassPolicy, WipeMode};
pub use engine::{OverwriteEngine, PassEngine};
pub use error::{Error, Result};
pub use operation::{
    DeleteOperation, DeleteOptions, FillOperation, Finished, Handlers, OperationHandle,
    OperationStatus,
};
pub use target::{TargetKind, WipeTarget};
