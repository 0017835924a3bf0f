//! Application configuration for SkillForge.
//!
//! User config lives at `~/.skillforge/skillforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkillForgeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "skillforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".skillforge";

// ---------------------------------------------------------------------------
// Config structs (matching skillforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Batch execution defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// External workflow command settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default run output directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Default iteration count.
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Default concurrency limit.
    #[serde(default = "default_parallel")]
    pub parallel: u32,

    /// Default per-attempt timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Default retry budget per iteration (attempts = retries + 1).
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Fixed delay between a failed attempt and its retry, in seconds.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            iterations: default_iterations(),
            parallel: default_parallel(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

fn default_output_dir() -> String {
    "~/skillforge-runs".into()
}
fn default_iterations() -> u32 {
    1
}
fn default_parallel() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    14_400
}
fn default_retries() -> u32 {
    3
}
fn default_backoff_secs() -> u64 {
    10
}

/// `[workflow]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Program invoked once per attempt.
    #[serde(default = "default_command")]
    pub command: String,

    /// Fixed permission/tool flags passed before the positional topic.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Directories the workflow writes skill files into as a side effect.
    /// Scanned by the artifact collector after each successful iteration.
    #[serde(default = "default_artifact_dirs")]
    pub artifact_dirs: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            artifact_dirs: default_artifact_dirs(),
        }
    }
}

fn default_command() -> String {
    "claude".into()
}
fn default_args() -> Vec<String> {
    vec!["--print".into(), "--dangerously-skip-permissions".into()]
}
fn default_artifact_dirs() -> Vec<String> {
    vec![".roo/skills".into(), ".claude/skills".into()]
}

// ---------------------------------------------------------------------------
// Batch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime batch configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Topic handed to the workflow as its sole positional argument.
    pub topic: String,
    /// Requested iteration count.
    pub iterations: u32,
    /// Maximum concurrently running iterations.
    pub parallel: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retry budget per iteration (attempts = max_retries + 1).
    pub max_retries: u32,
    /// Fixed backoff between a failed attempt and its retry.
    pub backoff: Duration,
    /// Root directory run directories are created under.
    pub output_dir: PathBuf,
    /// Workflow program.
    pub command: String,
    /// Fixed flags passed before the topic.
    pub args: Vec<String>,
    /// Directories scanned for produced artifacts.
    pub artifact_dirs: Vec<PathBuf>,
}

impl BatchConfig {
    /// Build a runtime config for `topic` from app-config defaults.
    pub fn from_app_config(topic: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            topic: topic.into(),
            iterations: config.defaults.iterations,
            parallel: config.defaults.parallel,
            timeout: Duration::from_secs(config.defaults.timeout_secs),
            max_retries: config.defaults.retries,
            backoff: Duration::from_secs(config.defaults.backoff_secs),
            output_dir: expand_home(&config.defaults.output_dir),
            command: config.workflow.command.clone(),
            args: config.workflow.args.clone(),
            artifact_dirs: config
                .workflow
                .artifact_dirs
                .iter()
                .map(|d| expand_home(d))
                .collect(),
        }
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.skillforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SkillForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.skillforge/skillforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SkillForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SkillForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SkillForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SkillForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SkillForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("artifact_dirs"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.timeout_secs, 14_400);
        assert_eq!(parsed.defaults.retries, 3);
        assert_eq!(parsed.workflow.command, "claude");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
parallel = 4

[workflow]
command = "roo-agent"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.parallel, 4);
        assert_eq!(config.defaults.iterations, 1);
        assert_eq!(config.workflow.command, "roo-agent");
        assert_eq!(config.workflow.artifact_dirs.len(), 2);
    }

    #[test]
    fn batch_config_from_app_config() {
        let app = AppConfig::default();
        let batch = BatchConfig::from_app_config("fastapi", &app);
        assert_eq!(batch.topic, "fastapi");
        assert_eq!(batch.parallel, 1);
        assert_eq!(batch.timeout, Duration::from_secs(14_400));
        assert_eq!(batch.backoff, Duration::from_secs(10));
        assert_eq!(batch.artifact_dirs.len(), 2);
    }

    #[test]
    fn expand_home_passthrough_for_relative() {
        assert_eq!(expand_home("runs/out"), PathBuf::from("runs/out"));
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }
}
