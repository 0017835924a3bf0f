//! Artifact collection.
//!
//! After an iteration completes, the workflow's known output locations are
//! scanned for files written at or after a marker timestamp taken just before
//! the iteration's first attempt. Matches are copied (never moved) into
//! `iteration-<n>/artifacts/` together with a `metadata.json` record.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use skillforge_shared::{ArtifactRef, Result, SkillForgeError};

/// Name of the per-iteration artifact metadata record.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Inputs for one collection pass.
#[derive(Debug)]
pub struct CollectSpec<'a> {
    /// Owning iteration index.
    pub iteration: u32,
    pub topic: &'a str,
    /// Files modified before this instant are stale output from earlier runs
    /// and are ignored. Taken immediately before the iteration's first
    /// attempt; using the run's start time instead would sweep in siblings'
    /// leftovers.
    pub marker: DateTime<Utc>,
    /// Directories the workflow writes into as a side effect.
    pub artifact_dirs: &'a [PathBuf],
    /// The iteration's directory (`run-dir/iteration-<n>`).
    pub dest_dir: &'a Path,
}

/// The `metadata.json` structure written next to collected files.
#[derive(Debug, Serialize)]
struct ArtifactManifest<'a> {
    iteration: u32,
    topic: &'a str,
    collected_at: DateTime<Utc>,
    count: usize,
    artifacts: &'a [ArtifactRef],
}

/// Collect fresh workflow output for a completed iteration.
///
/// Zero matches is not an error. A single file's copy failure is logged and
/// skipped; only failure to create the destination tree or write the metadata
/// record aborts the collection.
pub fn collect(spec: &CollectSpec<'_>) -> Result<Vec<ArtifactRef>> {
    let artifacts_dir = spec.dest_dir.join("artifacts");
    std::fs::create_dir_all(&artifacts_dir)
        .map_err(|e| SkillForgeError::io(&artifacts_dir, e))?;

    let cutoff = SystemTime::from(spec.marker);
    let mut refs: Vec<ArtifactRef> = Vec::new();

    for root in spec.artifact_dirs {
        if !root.is_dir() {
            debug!(root = %root.display(), "artifact directory absent, skipping");
            continue;
        }

        let mut fresh: Vec<PathBuf> = Vec::new();
        scan_fresh_files(root, cutoff, &mut fresh);
        fresh.sort();

        for source in fresh {
            let Ok(rel) = source.strip_prefix(root) else {
                continue;
            };
            let dest = artifacts_dir.join(rel);

            if dest.exists() {
                warn!(path = %rel.display(), "artifact name already collected, skipping");
                continue;
            }

            if let Some(parent) = dest.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!(path = %dest.display(), error = %e, "cannot create artifact subdir, skipping");
                    continue;
                }
            }

            if let Err(e) = std::fs::copy(&source, &dest) {
                warn!(
                    source = %source.display(),
                    error = %e,
                    "artifact copy failed, skipping"
                );
                continue;
            }

            match fingerprint(&dest) {
                Ok((sha256, size_bytes)) => refs.push(ArtifactRef {
                    iteration: spec.iteration,
                    path: rel.to_string_lossy().to_string(),
                    source: source.to_string_lossy().to_string(),
                    sha256,
                    size_bytes,
                    collected_at: Utc::now(),
                }),
                Err(e) => {
                    warn!(path = %dest.display(), error = %e, "artifact fingerprint failed, skipping");
                    let _ = std::fs::remove_file(&dest);
                }
            }
        }
    }

    let manifest = ArtifactManifest {
        iteration: spec.iteration,
        topic: spec.topic,
        collected_at: Utc::now(),
        count: refs.len(),
        artifacts: &refs,
    };
    write_manifest(&artifacts_dir.join(METADATA_FILE_NAME), &manifest)?;

    info!(
        iteration = spec.iteration,
        count = refs.len(),
        "artifact collection complete"
    );

    Ok(refs)
}

/// Recursively gather files whose modification time is at or after `cutoff`.
/// Unreadable entries are skipped rather than failing the scan.
fn scan_fresh_files(dir: &Path, cutoff: SystemTime, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read artifact directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_fresh_files(&path, cutoff, out);
            continue;
        }

        let fresh = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|mtime| mtime >= cutoff)
            .unwrap_or(false);

        if fresh {
            out.push(path);
        } else {
            debug!(path = %path.display(), "stale file ignored");
        }
    }
}

/// SHA-256 and byte size of a file's content.
fn fingerprint(path: &Path) -> std::io::Result<(String, u64)> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok((format!("{:x}", hasher.finalize()), content.len() as u64))
}

fn write_manifest(path: &Path, manifest: &ArtifactManifest<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)
        .map_err(|e| SkillForgeError::Workflow(format!("metadata serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| SkillForgeError::io(path, e))
}
