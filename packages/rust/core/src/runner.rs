//! Iteration runner and retry policy.
//!
//! One iteration is a bounded sequence of workflow attempts: invoke, and on
//! error or timeout wait a fixed backoff and try again, up to
//! `max_retries + 1` attempts total. The runner never touches the status
//! store; it returns a tagged [`IterationResult`] the scheduler records, so
//! write-back stays centralized and race-free.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use skillforge_shared::{ArtifactRef, AttemptOutcome, AttemptRecord, IterationState};

use crate::collector::{self, CollectSpec};
use crate::workflow::{self, InvocationOutcome, InvocationSpec, WorkflowCommand};

/// Everything one iteration needs to run independently of its siblings.
#[derive(Debug, Clone)]
pub struct IterationContext {
    /// 1-based iteration index.
    pub index: u32,
    pub topic: String,
    pub run_dir: PathBuf,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Total attempt budget (`max_retries + 1`).
    pub max_attempts: u32,
    /// Fixed delay between a failed attempt and its retry.
    pub backoff: Duration,
    /// Directories scanned for produced artifacts after success.
    pub artifact_dirs: Vec<PathBuf>,
}

/// Terminal result of one iteration, carrying its full attempt history.
#[derive(Debug, Clone)]
pub enum IterationResult {
    /// An attempt succeeded; artifacts were collected.
    Completed {
        index: u32,
        attempts: Vec<AttemptRecord>,
        artifacts: Vec<ArtifactRef>,
    },
    /// The attempt budget was exhausted; the final attempt errored.
    Failed {
        index: u32,
        attempts: Vec<AttemptRecord>,
    },
    /// The attempt budget was exhausted; the final attempt timed out.
    TimedOut {
        index: u32,
        attempts: Vec<AttemptRecord>,
    },
}

impl IterationResult {
    pub fn index(&self) -> u32 {
        match self {
            Self::Completed { index, .. }
            | Self::Failed { index, .. }
            | Self::TimedOut { index, .. } => *index,
        }
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::Completed { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::TimedOut { attempts, .. } => attempts,
        }
    }

    /// Collected artifacts (empty for failures).
    pub fn artifacts(&self) -> &[ArtifactRef] {
        match self {
            Self::Completed { artifacts, .. } => artifacts,
            _ => &[],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The iteration state this result settles into.
    pub fn terminal_state(&self) -> IterationState {
        if self.is_success() {
            IterationState::Completed
        } else {
            IterationState::Failed
        }
    }

    /// Message of the final attempt, for failed iterations.
    pub fn last_error(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { attempts, .. } | Self::TimedOut { attempts, .. } => {
                attempts.last().and_then(|a| a.message.as_deref())
            }
        }
    }
}

/// Run one iteration to a terminal result. Never returns an error: every
/// failure mode is folded into the result value.
pub async fn run_iteration(
    command: &WorkflowCommand,
    ctx: &IterationContext,
) -> IterationResult {
    let iter_dir = ctx.run_dir.join(format!("iteration-{}", ctx.index));
    if let Err(e) = std::fs::create_dir_all(&iter_dir) {
        warn!(index = ctx.index, error = %e, "cannot create iteration directory");
        let now = Utc::now();
        return IterationResult::Failed {
            index: ctx.index,
            attempts: vec![AttemptRecord {
                attempt: 1,
                started_at: now,
                completed_at: now,
                outcome: AttemptOutcome::Error,
                message: Some(format!("cannot create iteration directory: {e}")),
                output_path: String::new(),
            }],
        };
    }

    let output_path = iter_dir.join("output.md");
    let output_rel = format!("iteration-{}/output.md", ctx.index);

    // Artifact freshness marker: taken before the first attempt so output
    // from any attempt of this iteration qualifies, but nothing older does.
    let marker = Utc::now();

    let mut attempts: Vec<AttemptRecord> = Vec::new();

    for attempt_no in 1..=ctx.max_attempts {
        let spec = InvocationSpec {
            topic: &ctx.topic,
            iteration: ctx.index,
            run_dir: &ctx.run_dir,
            output_path: &output_path,
            timeout: ctx.timeout,
        };

        let started_at = Utc::now();
        let invocation = workflow::invoke(command, &spec).await;
        let completed_at = Utc::now();

        let (outcome, message) = match invocation {
            Ok(InvocationOutcome::Success) => (AttemptOutcome::Success, None),
            Ok(InvocationOutcome::Error { message }) => (AttemptOutcome::Error, Some(message)),
            Ok(InvocationOutcome::TimedOut) => (
                AttemptOutcome::Timeout,
                Some(format!("timed out after {}s", ctx.timeout.as_secs())),
            ),
            // Output-capture plumbing failed; treat like any attempt error so
            // the retry policy still applies.
            Err(e) => (AttemptOutcome::Error, Some(e.to_string())),
        };

        attempts.push(AttemptRecord {
            attempt: attempt_no,
            started_at,
            completed_at,
            outcome,
            message,
            output_path: output_rel.clone(),
        });

        match outcome {
            AttemptOutcome::Success => {
                info!(
                    index = ctx.index,
                    attempt = attempt_no,
                    "iteration succeeded"
                );
                let artifacts = collect_artifacts(ctx, marker, &iter_dir);
                return IterationResult::Completed {
                    index: ctx.index,
                    attempts,
                    artifacts,
                };
            }
            AttemptOutcome::Error | AttemptOutcome::Timeout => {
                if attempt_no < ctx.max_attempts {
                    info!(
                        index = ctx.index,
                        attempt = attempt_no,
                        outcome = outcome.as_str(),
                        backoff_secs = ctx.backoff.as_secs(),
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(ctx.backoff).await;
                }
            }
        }
    }

    let timed_out = attempts
        .last()
        .is_some_and(|a| a.outcome == AttemptOutcome::Timeout);

    warn!(
        index = ctx.index,
        attempts = attempts.len(),
        "iteration exhausted its attempt budget"
    );

    if timed_out {
        IterationResult::TimedOut {
            index: ctx.index,
            attempts,
        }
    } else {
        IterationResult::Failed {
            index: ctx.index,
            attempts,
        }
    }
}

/// Collect artifacts for a successful iteration. Collection problems degrade
/// to an empty list; the iteration itself stays completed.
fn collect_artifacts(
    ctx: &IterationContext,
    marker: chrono::DateTime<Utc>,
    iter_dir: &std::path::Path,
) -> Vec<ArtifactRef> {
    let spec = CollectSpec {
        iteration: ctx.index,
        topic: &ctx.topic,
        marker,
        artifact_dirs: &ctx.artifact_dirs,
        dest_dir: iter_dir,
    };

    match collector::collect(&spec) {
        Ok(refs) => refs,
        Err(e) => {
            warn!(index = ctx.index, error = %e, "artifact collection failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sf-runner-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sh(script: &str) -> WorkflowCommand {
        WorkflowCommand::new("sh", vec!["-c".into(), script.into()])
    }

    fn ctx(run_dir: &Path, max_attempts: u32) -> IterationContext {
        IterationContext {
            index: 1,
            topic: "demo".into(),
            run_dir: run_dir.to_path_buf(),
            timeout: Duration::from_secs(10),
            max_attempts,
            backoff: Duration::ZERO,
            artifact_dirs: vec![],
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let dir = temp_dir();
        let result = run_iteration(&sh("echo done"), &ctx(&dir, 3)).await;

        assert!(result.is_success());
        assert_eq!(result.attempts().len(), 1);
        assert_eq!(result.attempts()[0].outcome, AttemptOutcome::Success);
        assert_eq!(result.terminal_state(), IterationState::Completed);
        assert!(dir.join("iteration-1/output.md").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn single_failure_with_no_retry_budget() {
        let dir = temp_dir();
        let result = run_iteration(&sh("exit 1"), &ctx(&dir, 1)).await;

        assert!(!result.is_success());
        assert_eq!(result.attempts().len(), 1);
        assert_eq!(result.last_error(), Some("exit status 1"));
        assert!(matches!(result, IterationResult::Failed { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn exhausts_full_attempt_budget() {
        let dir = temp_dir();
        let result = run_iteration(&sh("exit 7"), &ctx(&dir, 3)).await;

        assert_eq!(result.attempts().len(), 3);
        assert!(
            result
                .attempts()
                .iter()
                .all(|a| a.outcome == AttemptOutcome::Error)
        );
        assert_eq!(result.terminal_state(), IterationState::Failed);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let dir = temp_dir();
        let flag = dir.join("first-attempt-done");
        let script = format!(
            "if [ -f {flag} ]; then exit 0; else touch {flag}; exit 1; fi",
            flag = flag.display()
        );
        let result = run_iteration(&sh(&script), &ctx(&dir, 3)).await;

        assert!(result.is_success());
        assert_eq!(result.attempts().len(), 2);
        assert_eq!(result.attempts()[0].outcome, AttemptOutcome::Error);
        assert_eq!(result.attempts()[1].outcome, AttemptOutcome::Success);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn timeout_is_recorded_and_retried() {
        let dir = temp_dir();
        let mut context = ctx(&dir, 2);
        context.timeout = Duration::from_millis(300);

        let result = run_iteration(&sh("sleep 30"), &context).await;

        assert!(matches!(result, IterationResult::TimedOut { .. }));
        assert_eq!(result.attempts().len(), 2);
        assert!(
            result
                .attempts()
                .iter()
                .all(|a| a.outcome == AttemptOutcome::Timeout)
        );
        assert!(result.last_error().unwrap().contains("timed out"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn collects_artifacts_on_success() {
        let dir = temp_dir();
        let skills_dir = dir.join("skills-out");
        std::fs::create_dir_all(&skills_dir).unwrap();

        let script = format!(
            "echo '# Generated Skill' > {}/SKILL.md",
            skills_dir.display()
        );
        let mut context = ctx(&dir, 1);
        context.artifact_dirs = vec![skills_dir];

        let result = run_iteration(&sh(&script), &context).await;

        assert!(result.is_success());
        assert_eq!(result.artifacts().len(), 1);
        assert_eq!(result.artifacts()[0].path, "SKILL.md");
        assert!(dir.join("iteration-1/artifacts/SKILL.md").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
