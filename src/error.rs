//! Error types for secure wipe operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for secure wipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, deleting or filling.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during a pass, fill, unlink or lookup.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Target is not a local filesystem path.
    #[error("Location is not supported: {0}")]
    UnsupportedLocation(String),

    /// No mount point found while ascending from the path.
    #[error("No mount point found for path \"{}\"", .0.display())]
    MissingMount(PathBuf),

    /// Mount exists but has no local filesystem path.
    #[error("Mount \"{}\" is not local", .0.display())]
    RemoteMount(PathBuf),

    /// The filler file could not even be created.
    #[error("Not enough space to create a filler file in \"{}\"", .0.display())]
    NoSpaceDuringSetup(PathBuf),

    /// Canceled by the caller.
    #[error("Operation was canceled")]
    Interrupted,

    /// Launch was called with an empty target list.
    #[error("Nothing to do!")]
    NothingToDo,

    /// Pass policy failed validation.
    #[error("Invalid pass policy: {0}")]
    InvalidPolicy(String),

    /// The pass engine is still running another step.
    #[error("Pass engine is busy")]
    Busy,

    /// Operations must be launched from within a Tokio runtime.
    #[error("No async runtime available to run the operation")]
    NoRuntime,

    /// Configuration file could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// Whether this error is the result of a cancellation request.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}
