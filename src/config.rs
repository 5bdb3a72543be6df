//! Configuration constants and types for secure wipe operations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size of each overwrite write (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: usize = 4096;

/// Largest accepted pass count.
pub const MAX_PASSES: u32 = 1000;

/// Prefix of filler files created while filling free space.
pub const FILLER_PREFIX: &str = ".secure-wipe-fill-";

/// Pass counts of the wipe mode presets.
pub mod mode_passes {
    /// Secure, recommended.
    pub const NORMAL: u32 = 38;

    /// Insecure, but faster.
    pub const INSECURE: u32 = 2;

    /// Very insecure, but fastest.
    pub const VERY_INSECURE: u32 = 1;
}

/// Named pass-count presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WipeMode {
    #[default]
    Normal,
    Insecure,
    VeryInsecure,
}

impl WipeMode {
    /// Number of overwrite passes for this mode.
    pub fn pass_count(self) -> u32 {
        match self {
            WipeMode::Normal => mode_passes::NORMAL,
            WipeMode::Insecure => mode_passes::INSECURE,
            WipeMode::VeryInsecure => mode_passes::VERY_INSECURE,
        }
    }

    /// The preset writing exactly `pass_count` passes, if any.
    pub fn from_pass_count(pass_count: u32) -> Option<Self> {
        [WipeMode::Normal, WipeMode::Insecure, WipeMode::VeryInsecure]
            .into_iter()
            .find(|mode| mode.pass_count() == pass_count)
    }

    /// Short description shown next to the pass count.
    pub fn description(self) -> &'static str {
        match self {
            WipeMode::Normal => "secure, recommended",
            WipeMode::Insecure => "insecure, but faster",
            WipeMode::VeryInsecure => "very insecure, but fastest",
        }
    }
}

/// How a file or filler extent gets overwritten.
///
/// Fixed for the lifetime of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassPolicy {
    /// Number of pattern passes (not counting the final zero pass).
    pub pass_count: u32,

    /// Skip the OS entropy source and per-pass sync.
    pub fast_mode: bool,

    /// Add one zero-fill pass after the pattern passes.
    pub final_zero_pass: bool,
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self::from_mode(WipeMode::default(), false, true)
    }
}

impl PassPolicy {
    /// Create a policy with an explicit pass count.
    pub fn new(pass_count: u32, fast_mode: bool, final_zero_pass: bool) -> Self {
        Self {
            pass_count,
            fast_mode,
            final_zero_pass,
        }
    }

    /// Create a policy from a mode preset.
    pub fn from_mode(mode: WipeMode, fast_mode: bool, final_zero_pass: bool) -> Self {
        Self::new(mode.pass_count(), fast_mode, final_zero_pass)
    }

    /// Total passes actually written, including the zero pass.
    pub fn total_passes(&self) -> u32 {
        self.pass_count.saturating_add(u32::from(self.final_zero_pass))
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if self.pass_count == 0 {
            return Err(Error::InvalidPolicy(
                "pass count must be at least 1".to_string(),
            ));
        }
        if self.pass_count > MAX_PASSES {
            return Err(Error::InvalidPolicy(format!(
                "pass count must be at most {}",
                MAX_PASSES
            )));
        }
        Ok(())
    }

    /// Load and validate a policy from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let policy: PassPolicy = serde_json::from_str(&raw)?;
        policy.validate()?;
        Ok(policy)
    }
}

/// Tuning of the bundled overwrite engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bytes per write call.
    pub chunk_size: usize,

    /// Stop filling once a single fill run has written this many bytes.
    /// `None` fills until the device reports full.
    pub fill_limit: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            fill_limit: None,
        }
    }
}

impl EngineConfig {
    /// Create an engine configuration with custom settings.
    ///
    /// Chunks smaller than [`MIN_CHUNK_SIZE`] are raised to it; a zero fill
    /// limit means no limit.
    pub fn new(chunk_size: usize, fill_limit: Option<u64>) -> Self {
        Self {
            chunk_size: chunk_size.max(MIN_CHUNK_SIZE),
            fill_limit: fill_limit.filter(|&limit| limit > 0),
        }
    }
}
