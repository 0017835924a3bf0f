//! End-to-end batch execution: validate → run dir → status store → scheduler
//! → finalize → report.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument};

use skillforge_shared::{
    BatchConfig, IterationState, Result, RunId, RunOutcome, RunStatus, SkillForgeError,
};

use crate::report;
use crate::runner::IterationResult;
use crate::scheduler;
use crate::status::StatusStore;
use crate::workflow::WorkflowCommand;

/// Aggregate result of one batch run.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: RunId,
    /// `completed` iff zero iterations failed, else `partial`.
    pub status: RunOutcome,
    pub completed: u32,
    pub failed: u32,
    /// One terminal result per iteration, sorted by index.
    pub iterations: Vec<IterationResult>,
    pub run_dir: PathBuf,
    pub report_path: PathBuf,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when an iteration is dequeued and starts running.
    fn iteration_started(&self, index: u32, total: u32);
    /// Called when an iteration settles.
    fn iteration_finished(&self, index: u32, state: IterationState, attempts: u32);
    /// Called when the run completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn iteration_started(&self, _index: u32, _total: u32) {}
    fn iteration_finished(&self, _index: u32, _state: IterationState, _attempts: u32) {}
    fn done(&self, _result: &RunResult) {}
}

/// Run the full batch.
///
/// 1. Validate the configuration (before any output is created)
/// 2. Create the run directory and initialize the status store
/// 3. Drain all iterations through the scheduler
/// 4. Finalize the status document
/// 5. Generate REPORT.md
#[instrument(skip_all, fields(topic = %cfg.topic, iterations = cfg.iterations, parallel = cfg.parallel))]
pub async fn execute(cfg: &BatchConfig, progress: &dyn ProgressReporter) -> Result<RunResult> {
    validate_config(cfg)?;

    let start = Instant::now();
    let started_at = Utc::now();
    let run_id = RunId::new(&cfg.topic, started_at);
    let run_dir = cfg.output_dir.join(run_id.as_str());

    std::fs::create_dir_all(&run_dir).map_err(|e| SkillForgeError::io(&run_dir, e))?;

    info!(%run_id, run_dir = %run_dir.display(), "starting batch run");

    progress.phase("Initializing run");
    let parallel = cfg.parallel.min(cfg.iterations);
    let status = RunStatus::new(
        run_id.clone(),
        cfg.topic.clone(),
        cfg.iterations,
        parallel,
        cfg.timeout.as_secs(),
        cfg.max_retries,
        started_at,
    );
    let store = StatusStore::initialize(&run_dir, status).await?;

    let command = WorkflowCommand::new(cfg.command.clone(), cfg.args.clone());

    progress.phase("Executing iterations");
    let results = match scheduler::run_all(&command, cfg, &run_dir, &store, progress).await {
        Ok(results) => results,
        Err(e) => {
            // State integrity over continuing: mark the run failed (best
            // effort, the store may be the thing that broke) and bail.
            let _ = store.finalize(RunOutcome::Failed, Utc::now()).await;
            return Err(e);
        }
    };

    let failed = results.iter().filter(|r| !r.is_success()).count() as u32;
    let completed = results.len() as u32 - failed;
    let outcome = if failed == 0 {
        RunOutcome::Completed
    } else {
        RunOutcome::Partial
    };

    progress.phase("Generating report");
    let final_status = store.finalize(outcome, Utc::now()).await?;
    let report_path = report::write(&run_dir, &final_status)?;

    let result = RunResult {
        run_id,
        status: outcome,
        completed,
        failed,
        iterations: results,
        run_dir,
        report_path,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        run_id = %result.run_id,
        status = result.status.as_str(),
        completed = result.completed,
        failed = result.failed,
        elapsed_ms = result.elapsed.as_millis(),
        "batch run complete"
    );

    Ok(result)
}

/// Reject invalid configurations before any output directory exists.
fn validate_config(cfg: &BatchConfig) -> Result<()> {
    if cfg.topic.trim().is_empty() {
        return Err(SkillForgeError::validation("topic must not be empty"));
    }
    if cfg.iterations < 1 {
        return Err(SkillForgeError::validation("iterations must be >= 1"));
    }
    if cfg.parallel < 1 {
        return Err(SkillForgeError::validation("parallel must be >= 1"));
    }
    if cfg.timeout.is_zero() {
        return Err(SkillForgeError::validation("timeout must be > 0"));
    }
    if cfg.command.trim().is_empty() {
        return Err(SkillForgeError::validation(
            "workflow command must not be empty",
        ));
    }
    Ok(())
}
