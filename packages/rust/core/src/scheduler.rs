//! Bounded-concurrency iteration scheduler.
//!
//! Drains indices `1..=N` in ascending order through a keyed in-flight set
//! (a `JoinSet` plus a task-id → index map), launching iteration runners up
//! to the concurrency limit. Each completion is consumed exactly once, at the
//! moment its own task finishes, and recorded through the single status
//! writer; completion order is unconstrained and never assumed.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use skillforge_shared::{BatchConfig, Result};

use crate::executor::ProgressReporter;
use crate::runner::{self, IterationContext, IterationResult};
use crate::status::StatusStore;
use crate::workflow::WorkflowCommand;

/// Execute every iteration of a run, at most `cfg.parallel` at a time.
///
/// Returns one terminal result per iteration, sorted by index. Errors only on
/// status-store failures; iteration failures are values in the result list.
#[instrument(skip_all, fields(iterations = cfg.iterations, parallel = cfg.parallel))]
pub async fn run_all(
    command: &WorkflowCommand,
    cfg: &BatchConfig,
    run_dir: &Path,
    store: &StatusStore,
    progress: &dyn ProgressReporter,
) -> Result<Vec<IterationResult>> {
    let total = cfg.iterations;
    let limit = cfg.parallel.min(total).max(1) as usize;

    let mut pending: VecDeque<u32> = (1..=total).collect();
    let mut in_flight: JoinSet<IterationResult> = JoinSet::new();
    let mut task_index: HashMap<tokio::task::Id, u32> = HashMap::new();
    let mut results: Vec<IterationResult> = Vec::with_capacity(total as usize);

    info!(total, limit, "scheduler starting");

    while !pending.is_empty() || !in_flight.is_empty() {
        // Fill free slots in ascending index order.
        while in_flight.len() < limit {
            let Some(index) = pending.pop_front() else {
                break;
            };

            store.record_iteration_running(index).await?;
            progress.iteration_started(index, total);

            let command = command.clone();
            let ctx = IterationContext {
                index,
                topic: cfg.topic.clone(),
                run_dir: run_dir.to_path_buf(),
                timeout: cfg.timeout,
                max_attempts: cfg.max_retries + 1,
                backoff: cfg.backoff,
                artifact_dirs: cfg.artifact_dirs.clone(),
            };

            let handle = in_flight.spawn(async move { runner::run_iteration(&command, &ctx).await });
            task_index.insert(handle.id(), index);
        }

        // Suspend until one in-flight iteration settles.
        let Some(joined) = in_flight.join_next_with_id().await else {
            break;
        };

        let result = match joined {
            Ok((id, result)) => {
                task_index.remove(&id);
                result
            }
            Err(join_err) => {
                // Runners return values for every failure mode, so a join
                // error means the task itself died. Fold it into a failed
                // iteration rather than aborting siblings.
                let id = join_err.id();
                let Some(index) = task_index.remove(&id) else {
                    error!(error = %join_err, "orphan task completion, ignoring");
                    continue;
                };
                error!(index, error = %join_err, "iteration task aborted");
                IterationResult::Failed {
                    index,
                    attempts: Vec::new(),
                }
            }
        };

        record_result(store, &result).await?;
        progress.iteration_finished(
            result.index(),
            result.terminal_state(),
            result.attempts().len() as u32,
        );
        results.push(result);
    }

    results.sort_by_key(|r| r.index());

    info!(
        completed = results.iter().filter(|r| r.is_success()).count(),
        failed = results.iter().filter(|r| !r.is_success()).count(),
        "scheduler drained"
    );

    Ok(results)
}

/// Centralized write-back for one settled iteration.
async fn record_result(store: &StatusStore, result: &IterationResult) -> Result<()> {
    for attempt in result.attempts() {
        store.record_attempt(result.index(), attempt.clone()).await?;
    }
    store
        .record_iteration_terminal(
            result.index(),
            result.terminal_state(),
            result.artifacts().to_vec(),
        )
        .await
}
