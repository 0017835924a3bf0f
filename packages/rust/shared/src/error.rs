//! Error types for SkillForge.
//!
//! Library crates use [`SkillForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Attempt-level failures (a workflow invocation erroring or timing out) are
//! *values*, not errors; see `AttemptOutcome` in `types`. The variants here
//! cover problems the run itself cannot absorb.

use std::path::PathBuf;

/// Top-level error type for all SkillForge operations.
#[derive(Debug, thiserror::Error)]
pub enum SkillForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Invalid input rejected before any output is created.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Workflow subprocess setup error (spawn plumbing, output capture).
    #[error("workflow error: {0}")]
    Workflow(String),

    /// The persisted run status document is unreadable or inconsistent.
    /// Fatal: state integrity takes priority over continuing.
    #[error("status store corruption: {0}")]
    StatusCorruption(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SkillForgeError>;

impl SkillForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
