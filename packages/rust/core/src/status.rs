//! Durable run status store.
//!
//! One JSON document (`STATUS.json`) per run, mutated exclusively through a
//! [`StatusStore`] handle: the document lives behind a `tokio::sync::Mutex`
//! and every mutation is a full serialize-and-atomic-replace (write to a temp
//! file, then rename). Concurrent iterations never touch the file directly;
//! they return results and the scheduler records them here, one at a time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use skillforge_shared::{
    ArtifactRef, AttemptRecord, IterationState, Result, RunOutcome, RunStatus, STATUS_FILE_NAME,
    SkillForgeError,
};

/// Single-writer handle over a run's `STATUS.json`.
pub struct StatusStore {
    path: PathBuf,
    doc: Mutex<RunStatus>,
}

impl StatusStore {
    /// Create the store and persist the initial document (all iterations
    /// `pending`). The run directory must already exist.
    pub async fn initialize(run_dir: &Path, status: RunStatus) -> Result<Self> {
        let path = run_dir.join(STATUS_FILE_NAME);
        persist(&path, &status)?;

        info!(
            path = %path.display(),
            iterations = status.iterations_requested,
            "status store initialized"
        );

        Ok(Self {
            path,
            doc: Mutex::new(status),
        })
    }

    /// Path of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current in-memory copy of the document.
    pub async fn snapshot(&self) -> RunStatus {
        self.doc.lock().await.clone()
    }

    /// Mark an iteration as dequeued and running.
    pub async fn record_iteration_running(&self, index: u32) -> Result<()> {
        let mut doc = self.doc.lock().await;
        let iteration = lookup(&mut doc, index)?;
        iteration.status = IterationState::Running;
        persist(&self.path, &doc)
    }

    /// Append one immutable attempt record to an iteration.
    pub async fn record_attempt(&self, index: u32, attempt: AttemptRecord) -> Result<()> {
        let mut doc = self.doc.lock().await;
        let max_attempts = doc.max_retries as usize + 1;
        let iteration = lookup(&mut doc, index)?;

        if iteration.attempts.len() >= max_attempts {
            return Err(SkillForgeError::StatusCorruption(format!(
                "iteration {index} already has {max_attempts} attempts"
            )));
        }

        iteration.attempts.push(attempt);
        persist(&self.path, &doc)
    }

    /// Record an iteration's terminal state and its collected artifacts.
    pub async fn record_iteration_terminal(
        &self,
        index: u32,
        state: IterationState,
        artifacts: Vec<ArtifactRef>,
    ) -> Result<()> {
        if !state.is_terminal() {
            return Err(SkillForgeError::StatusCorruption(format!(
                "non-terminal state {state:?} recorded for iteration {index}"
            )));
        }

        let mut doc = self.doc.lock().await;
        let iteration = lookup(&mut doc, index)?;
        iteration.status = state;
        iteration.artifacts = artifacts;

        debug!(index, state = state.as_str(), "iteration settled");
        persist(&self.path, &doc)
    }

    /// Record the overall outcome and completion time, returning the final
    /// document.
    pub async fn finalize(
        &self,
        outcome: RunOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<RunStatus> {
        let mut doc = self.doc.lock().await;
        doc.status = outcome;
        doc.completed_at = Some(completed_at);
        persist(&self.path, &doc)?;

        info!(
            status = outcome.as_str(),
            completed = doc.completed_count(),
            failed = doc.failed_count(),
            "run finalized"
        );

        Ok(doc.clone())
    }
}

/// Load a persisted status document, e.g. to regenerate a report.
pub fn load_status(path: &Path) -> Result<RunStatus> {
    let content = std::fs::read_to_string(path).map_err(|e| SkillForgeError::io(path, e))?;

    serde_json::from_str(&content).map_err(|e| {
        SkillForgeError::StatusCorruption(format!("{}: {e}", path.display()))
    })
}

fn lookup<'a>(
    doc: &'a mut RunStatus,
    index: u32,
) -> Result<&'a mut skillforge_shared::IterationRecord> {
    doc.iteration_mut(index).ok_or_else(|| {
        SkillForgeError::StatusCorruption(format!("unknown iteration index {index}"))
    })
}

/// Full-document write: serialize to a temp file, then atomically rename.
fn persist(path: &Path, doc: &RunStatus) -> Result<()> {
    let json = serde_json::to_string_pretty(doc).map_err(|e| {
        SkillForgeError::StatusCorruption(format!("serialization failed: {e}"))
    })?;

    let temp = path.with_extension("json.tmp");
    std::fs::write(&temp, &json).map_err(|e| SkillForgeError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| SkillForgeError::io(path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillforge_shared::{AttemptOutcome, RunId};
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sf-status-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn make_status(iterations: u32, max_retries: u32) -> RunStatus {
        let started_at = Utc::now();
        RunStatus::new(
            RunId::new("demo", started_at),
            "demo",
            iterations,
            1,
            60,
            max_retries,
            started_at,
        )
    }

    fn attempt(n: u32, outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            attempt: n,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            outcome,
            message: match outcome {
                AttemptOutcome::Success => None,
                _ => Some("exit status 1".into()),
            },
            output_path: "iteration-1/output.md".into(),
        }
    }

    #[tokio::test]
    async fn initialize_persists_document() {
        let dir = temp_dir();
        let store = StatusStore::initialize(&dir, make_status(3, 0)).await.unwrap();

        let loaded = load_status(store.path()).unwrap();
        assert_eq!(loaded.iterations.len(), 3);
        assert_eq!(loaded.status, RunOutcome::Running);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn record_and_reload_roundtrip() {
        let dir = temp_dir();
        let store = StatusStore::initialize(&dir, make_status(2, 1)).await.unwrap();

        store.record_iteration_running(1).await.unwrap();
        store
            .record_attempt(1, attempt(1, AttemptOutcome::Error))
            .await
            .unwrap();
        store
            .record_attempt(1, attempt(2, AttemptOutcome::Success))
            .await
            .unwrap();
        store
            .record_iteration_terminal(1, IterationState::Completed, vec![])
            .await
            .unwrap();

        let loaded = load_status(store.path()).unwrap();
        let it = loaded.iteration(1).unwrap();
        assert_eq!(it.status, IterationState::Completed);
        assert_eq!(it.attempts.len(), 2);
        assert_eq!(it.attempts[1].outcome, AttemptOutcome::Success);
        assert_eq!(loaded.iteration(2).unwrap().status, IterationState::Pending);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn attempt_overflow_is_corruption() {
        let dir = temp_dir();
        let store = StatusStore::initialize(&dir, make_status(1, 0)).await.unwrap();

        store
            .record_attempt(1, attempt(1, AttemptOutcome::Error))
            .await
            .unwrap();
        let err = store
            .record_attempt(1, attempt(2, AttemptOutcome::Error))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillForgeError::StatusCorruption(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unknown_iteration_is_corruption() {
        let dir = temp_dir();
        let store = StatusStore::initialize(&dir, make_status(1, 0)).await.unwrap();

        let err = store.record_iteration_running(9).await.unwrap_err();
        assert!(matches!(err, SkillForgeError::StatusCorruption(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn finalize_sets_outcome_and_timestamp() {
        let dir = temp_dir();
        let store = StatusStore::initialize(&dir, make_status(1, 0)).await.unwrap();

        let finalized = store.finalize(RunOutcome::Partial, Utc::now()).await.unwrap();
        assert_eq!(finalized.status, RunOutcome::Partial);
        assert!(finalized.completed_at.is_some());

        let loaded = load_status(store.path()).unwrap();
        assert_eq!(loaded.status, RunOutcome::Partial);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = temp_dir();
        let store = StatusStore::initialize(&dir, make_status(1, 0)).await.unwrap();
        store.record_iteration_running(1).await.unwrap();

        for entry in std::fs::read_dir(&dir).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "temp file left behind: {name}");
        }
        drop(store);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn garbage_document_is_corruption() {
        let dir = temp_dir();
        let path = dir.join(STATUS_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();

        let err = load_status(&path).unwrap_err();
        assert!(matches!(err, SkillForgeError::StatusCorruption(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
