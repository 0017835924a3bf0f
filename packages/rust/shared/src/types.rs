//! Core domain types for SkillForge batch runs.
//!
//! These types make up the persisted `STATUS.json` document and the in-memory
//! run model: a [`RunStatus`] owns N [`IterationRecord`]s, each of which owns
//! its [`AttemptRecord`]s and collected [`ArtifactRef`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for the STATUS.json format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Name of the persisted run status document inside a run directory.
pub const STATUS_FILE_NAME: &str = "STATUS.json";

/// Name of the generated report inside a run directory.
pub const REPORT_FILE_NAME: &str = "REPORT.md";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Filesystem-safe run identifier: `<topic-slug>-<YYYYmmdd-HHMMSS>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Build a run identifier from a topic and a start timestamp.
    pub fn new(topic: &str, started_at: DateTime<Utc>) -> Self {
        let slug = slugify(topic);
        Self(format!("{slug}-{}", started_at.format("%Y%m%d-%H%M%S")))
    }

    /// The identifier as a path-safe string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reduce a free-form topic to a filesystem-safe kebab-case slug.
pub fn slugify(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    let mut last_dash = true;
    for ch in topic.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "topic".to_string()
    } else {
        slug.truncate(64.min(slug.len()));
        slug.trim_end_matches('-').to_string()
    }
}

// ---------------------------------------------------------------------------
// State enums
// ---------------------------------------------------------------------------

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Iterations are still being executed.
    Running,
    /// Every iteration completed.
    Completed,
    /// At least one iteration failed; the rest completed.
    Partial,
    /// The run was aborted by a fatal error before all iterations settled.
    Failed,
}

impl RunOutcome {
    /// Lowercase label used in reports and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// Lifecycle state of a single iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl IterationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this state is terminal (no further attempts will run).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Outcome of a single workflow invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// The workflow exited zero.
    Success,
    /// The workflow exited non-zero or could not be spawned.
    Error,
    /// The per-attempt timeout elapsed and the process tree was killed.
    Timeout,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One concrete execution of the external workflow. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number within its iteration.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    /// Short failure description (exit code, timeout note). Absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Run-dir-relative path of the captured raw output stream.
    pub output_path: String,
}

/// A file produced by the workflow and retained under the run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Owning iteration index.
    pub iteration: u32,
    /// Path relative to `iteration-<n>/artifacts/`.
    pub path: String,
    /// Original location the file was copied from.
    pub source: String,
    /// SHA-256 of the copied content.
    pub sha256: String,
    pub size_bytes: u64,
    pub collected_at: DateTime<Utc>,
}

/// One unit of requested work, retried as needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based index, unique within the run.
    pub index: u32,
    pub status: IterationState,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
}

impl IterationRecord {
    /// Fresh record in the `pending` state.
    pub fn pending(index: u32) -> Self {
        Self {
            index,
            status: IterationState::Pending,
            attempts: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// Message of the last failed attempt, if the iteration failed.
    pub fn last_error(&self) -> Option<&str> {
        if self.status != IterationState::Failed {
            return None;
        }
        self.attempts.last().and_then(|a| a.message.as_deref())
    }

    /// Wall-clock span from first attempt start to last attempt end.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let first = self.attempts.first()?;
        let last = self.attempts.last()?;
        Some(last.completed_at - first.started_at)
    }
}

// ---------------------------------------------------------------------------
// RunStatus (the STATUS.json document)
// ---------------------------------------------------------------------------

/// The full persisted state of one executor invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    pub run_id: RunId,
    pub topic: String,
    pub status: RunOutcome,
    pub iterations_requested: u32,
    /// Effective concurrency limit (already capped at the iteration count).
    pub parallel: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Exactly `iterations_requested` entries, ordered by index.
    pub iterations: Vec<IterationRecord>,
}

impl RunStatus {
    /// Initialize a new run document with every iteration `pending`.
    pub fn new(
        run_id: RunId,
        topic: impl Into<String>,
        iterations: u32,
        parallel: u32,
        timeout_secs: u64,
        max_retries: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id,
            topic: topic.into(),
            status: RunOutcome::Running,
            iterations_requested: iterations,
            parallel,
            timeout_secs,
            max_retries,
            started_at,
            completed_at: None,
            iterations: (1..=iterations).map(IterationRecord::pending).collect(),
        }
    }

    /// Look up an iteration by its 1-based index.
    pub fn iteration(&self, index: u32) -> Option<&IterationRecord> {
        self.iterations.iter().find(|it| it.index == index)
    }

    /// Mutable lookup by 1-based index.
    pub fn iteration_mut(&mut self, index: u32) -> Option<&mut IterationRecord> {
        self.iterations.iter_mut().find(|it| it.index == index)
    }

    pub fn completed_count(&self) -> u32 {
        self.count_state(IterationState::Completed)
    }

    pub fn failed_count(&self) -> u32 {
        self.count_state(IterationState::Failed)
    }

    fn count_state(&self, state: IterationState) -> u32 {
        self.iterations.iter().filter(|it| it.status == state).count() as u32
    }

    /// Total artifacts collected across all iterations.
    pub fn artifact_count(&self) -> usize {
        self.iterations.iter().map(|it| it.artifacts.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().expect("timestamp")
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("FastAPI Development"), "fastapi-development");
        assert_eq!(slugify("rust async/await!"), "rust-async-await");
        assert_eq!(slugify("  "), "topic");
        assert_eq!(slugify("--already--dashed--"), "already-dashed");
    }

    #[test]
    fn run_id_is_path_safe() {
        let id = RunId::new("LangGraph: agents & tools", ts("2026-03-01T09:30:00Z"));
        assert_eq!(id.as_str(), "langgraph-agents-tools-20260301-093000");
        assert!(!id.as_str().contains(['/', ' ', ':']));
    }

    #[test]
    fn new_run_has_exactly_n_pending_iterations() {
        let status = RunStatus::new(
            RunId::new("demo", ts("2026-03-01T00:00:00Z")),
            "demo",
            5,
            2,
            60,
            3,
            ts("2026-03-01T00:00:00Z"),
        );
        assert_eq!(status.iterations.len(), 5);
        assert!(
            status
                .iterations
                .iter()
                .all(|it| it.status == IterationState::Pending)
        );
        assert_eq!(status.iterations[4].index, 5);
        assert_eq!(status.completed_count(), 0);
        assert_eq!(status.failed_count(), 0);
    }

    #[test]
    fn status_roundtrip() {
        let mut status = RunStatus::new(
            RunId::new("demo", ts("2026-03-01T00:00:00Z")),
            "demo",
            2,
            1,
            60,
            0,
            ts("2026-03-01T00:00:00Z"),
        );
        let it = status.iteration_mut(1).unwrap();
        it.status = IterationState::Failed;
        it.attempts.push(AttemptRecord {
            attempt: 1,
            started_at: ts("2026-03-01T00:00:01Z"),
            completed_at: ts("2026-03-01T00:00:05Z"),
            outcome: AttemptOutcome::Error,
            message: Some("exit status 1".into()),
            output_path: "iteration-1/output.md".into(),
        });

        let json = serde_json::to_string_pretty(&status).expect("serialize");
        let parsed: RunStatus = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(parsed.failed_count(), 1);
        assert_eq!(parsed.iteration(1).unwrap().last_error(), Some("exit status 1"));
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&IterationState::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&AttemptOutcome::Timeout).unwrap(),
            "\"timeout\""
        );
        assert_eq!(
            serde_json::to_string(&RunOutcome::Partial).unwrap(),
            "\"partial\""
        );
    }

    #[test]
    fn iteration_duration_spans_attempts() {
        let mut it = IterationRecord::pending(1);
        assert!(it.duration().is_none());
        it.attempts.push(AttemptRecord {
            attempt: 1,
            started_at: ts("2026-03-01T00:00:00Z"),
            completed_at: ts("2026-03-01T00:00:10Z"),
            outcome: AttemptOutcome::Error,
            message: Some("exit status 1".into()),
            output_path: "iteration-1/output.md".into(),
        });
        it.attempts.push(AttemptRecord {
            attempt: 2,
            started_at: ts("2026-03-01T00:00:20Z"),
            completed_at: ts("2026-03-01T00:00:30Z"),
            outcome: AttemptOutcome::Success,
            message: None,
            output_path: "iteration-1/output.md".into(),
        });
        assert_eq!(it.duration().unwrap().num_seconds(), 30);
    }
}
