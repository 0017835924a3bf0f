//! External workflow invocation.
//!
//! Spawns the skill-generation agent CLI for a single attempt, captures its
//! combined output to a file, and races the child against the per-attempt
//! timeout. On expiry the child's whole process group is killed and reaped
//! before the caller proceeds, so no orphaned descendants survive an attempt.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use skillforge_shared::{Result, SkillForgeError};

/// The external command invoked once per attempt: program plus the fixed
/// permission/tool flags, with the topic appended as the sole positional
/// argument.
#[derive(Debug, Clone)]
pub struct WorkflowCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkflowCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// What a single invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The process exited zero.
    Success,
    /// The process exited non-zero, died to a signal, or failed to spawn.
    Error { message: String },
    /// The timeout elapsed; the process group was killed and reaped.
    TimedOut,
}

/// Inputs for one invocation.
#[derive(Debug)]
pub struct InvocationSpec<'a> {
    pub topic: &'a str,
    pub iteration: u32,
    /// Run directory, exported to the child as `SKILLFORGE_RUN_DIR`.
    pub run_dir: &'a Path,
    /// File the child's stdout and stderr are captured to (truncated first).
    pub output_path: &'a Path,
    pub timeout: Duration,
}

/// Run the workflow once. Infrastructure failures around output capture are
/// returned as errors; everything the process itself does (including refusing
/// to spawn) is an [`InvocationOutcome`] the retry policy can act on.
pub async fn invoke(
    command: &WorkflowCommand,
    spec: &InvocationSpec<'_>,
) -> Result<InvocationOutcome> {
    let stdout_file = std::fs::File::create(spec.output_path)
        .map_err(|e| SkillForgeError::io(spec.output_path, e))?;
    let stderr_file = stdout_file
        .try_clone()
        .map_err(|e| SkillForgeError::Workflow(format!("output handle clone failed: {e}")))?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .arg(spec.topic)
        .env("SKILLFORGE_ITERATION", spec.iteration.to_string())
        .env("SKILLFORGE_RUN_DIR", spec.run_dir.as_os_str())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .kill_on_drop(true);

    // Own process group so a timeout kill reaches descendants too.
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(
        program = %command.program,
        iteration = spec.iteration,
        timeout_secs = spec.timeout.as_secs(),
        "spawning workflow"
    );

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(InvocationOutcome::Error {
                message: format!("failed to spawn `{}`: {e}", command.program),
            });
        }
    };

    match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(InvocationOutcome::Success),
        Ok(Ok(status)) => Ok(InvocationOutcome::Error {
            message: describe_exit(&status),
        }),
        Ok(Err(e)) => Ok(InvocationOutcome::Error {
            message: format!("failed to wait for workflow: {e}"),
        }),
        Err(_elapsed) => {
            kill_process_group(&mut child).await;
            Ok(InvocationOutcome::TimedOut)
        }
    }
}

/// Human-readable description of a non-success exit status.
fn describe_exit(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Kill the child's entire process group, then reap the child itself.
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child is its own group leader (process_group(0) at spawn), so a
        // negative pid signals the whole tree.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill timed-out workflow process");
    }
}
