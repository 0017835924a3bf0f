//! Shared types, error model, and configuration for SkillForge.
//!
//! This crate is the foundation depended on by all other SkillForge crates.
//! It provides:
//! - [`SkillForgeError`] — the unified error type
//! - Domain types ([`RunStatus`], [`IterationRecord`], [`AttemptRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], [`BatchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, DefaultsConfig, WorkflowConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from,
};
pub use error::{Result, SkillForgeError};
pub use types::{
    ArtifactRef, AttemptOutcome, AttemptRecord, CURRENT_SCHEMA_VERSION, IterationRecord,
    IterationState, REPORT_FILE_NAME, RunId, RunOutcome, RunStatus, STATUS_FILE_NAME, slugify,
};
