//! Run report generation.
//!
//! `REPORT.md` is a pure read-side projection over the final status document:
//! the same `STATUS.json` always renders to the same bytes, so a report can
//! be regenerated at any time without re-executing anything. No wall-clock
//! values are injected at generation time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use skillforge_shared::{
    IterationRecord, REPORT_FILE_NAME, Result, RunStatus, SkillForgeError,
};

/// Render the report for a run's status document.
///
/// Iterations are sorted by index for display; completion order is never
/// assumed.
pub fn generate(status: &RunStatus) -> String {
    let mut iterations: Vec<&IterationRecord> = status.iterations.iter().collect();
    iterations.sort_by_key(|it| it.index);

    let mut out = String::new();
    summary_section(&mut out, status);
    iteration_table(&mut out, &iterations);
    artifact_listing(&mut out, &iterations);
    out
}

/// Render and persist `REPORT.md` in the run directory.
pub fn write(run_dir: &Path, status: &RunStatus) -> Result<PathBuf> {
    let path = run_dir.join(REPORT_FILE_NAME);
    std::fs::write(&path, generate(status)).map_err(|e| SkillForgeError::io(&path, e))?;
    Ok(path)
}

fn summary_section(out: &mut String, status: &RunStatus) {
    out.push_str("# Batch Run Report\n\n");
    out.push_str("## Summary\n\n");
    out.push_str(&format!("- **Topic**: {}\n", status.topic));
    out.push_str(&format!("- **Run ID**: `{}`\n", status.run_id));
    out.push_str(&format!("- **Status**: {}\n", status.status.as_str()));
    out.push_str(&format!(
        "- **Iterations**: {} requested, {} completed, {} failed\n",
        status.iterations_requested,
        status.completed_count(),
        status.failed_count()
    ));
    out.push_str(&format!(
        "- **Artifacts collected**: {}\n",
        status.artifact_count()
    ));
    out.push_str(&format!("- **Parallelism**: {}\n", status.parallel));
    out.push_str(&format!(
        "- **Timeout per attempt**: {}s\n",
        status.timeout_secs
    ));
    out.push_str(&format!("- **Retry budget**: {}\n", status.max_retries));
    out.push_str(&format!("- **Started**: {}\n", fmt_ts(status.started_at)));
    match status.completed_at {
        Some(ts) => {
            out.push_str(&format!("- **Finished**: {}\n", fmt_ts(ts)));
            out.push_str(&format!(
                "- **Duration**: {}\n",
                fmt_duration(ts - status.started_at)
            ));
        }
        None => out.push_str("- **Finished**: still running\n"),
    }
    out.push('\n');
}

fn iteration_table(out: &mut String, iterations: &[&IterationRecord]) {
    out.push_str("## Iterations\n\n");
    out.push_str("| # | Status | Attempts | Duration | Artifacts | Last error |\n");
    out.push_str("|---|--------|----------|----------|-----------|------------|\n");

    for it in iterations {
        let duration = it
            .duration()
            .map(fmt_duration)
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            it.index,
            it.status.as_str(),
            it.attempts.len(),
            duration,
            it.artifacts.len(),
            table_cell(it.last_error())
        ));
    }
    out.push('\n');
}

fn artifact_listing(out: &mut String, iterations: &[&IterationRecord]) {
    out.push_str("## Artifacts\n\n");

    let total: usize = iterations.iter().map(|it| it.artifacts.len()).sum();
    if total == 0 {
        out.push_str("No artifacts were collected.\n");
        return;
    }

    for it in iterations {
        if it.artifacts.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "### Iteration {} ({})\n\n",
            it.index,
            it.artifacts.len()
        ));
        for artifact in &it.artifacts {
            out.push_str(&format!(
                "- `{}` ({} bytes, sha256 `{}`)\n",
                artifact.path,
                artifact.size_bytes,
                &artifact.sha256[..artifact.sha256.len().min(12)]
            ));
        }
        out.push('\n');
    }
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn fmt_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Flatten a failure message into a single markdown table cell.
fn table_cell(msg: Option<&str>) -> String {
    let Some(msg) = msg else {
        return String::new();
    };
    let flat: String = msg
        .replace('|', "\\|")
        .replace('\n', " ")
        .chars()
        .take(80)
        .collect();
    flat
}
