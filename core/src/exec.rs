use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use agent_loop_protocol::protocol::ApplyPatchCommand;
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent_services::ActionExecutor;
use crate::apply_patch::APPLY_PATCH_PROGRAM;

pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 10_000;

/// Exit code reported when the process was killed by a signal.
const SIGNAL_EXIT_CODE: i32 = -1;

/// An approved action, ready to hand to an [`ActionExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExecAction {
    Command {
        command: Vec<String>,
        cwd: PathBuf,
        timeout_ms: Option<u64>,
    },
    ApplyPatch {
        patch: ApplyPatchCommand,
        cwd: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecOutput {
    /// stdout followed by stderr, the way a terminal would interleave them
    /// when neither stream is redirected.
    pub fn aggregated_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end_matches('\n'), self.stderr),
        }
    }
}

/// Failures the model is told about. The turn carries on unless the error is
/// [`ExecError::Fatal`].
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command timed out after {} milliseconds", .0.as_millis())]
    Timeout(Duration),

    #[error("execution aborted")]
    Aborted,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Fatal(String),
}

/// Runs commands as child processes of the current one, without a sandbox.
///
/// Patches are applied by invoking the `apply_patch` program found on `PATH`
/// with the patch text as its single argument.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    default_timeout: Duration,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_EXEC_TIMEOUT_MS))
    }
}

impl ShellExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    async fn spawn_and_wait(
        &self,
        argv: &[String],
        cwd: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;

        debug!(?argv, cwd = %cwd.display(), "spawning command");
        let start = Instant::now();
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Dropping the wait future drops the child, which kills it.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecError::Aborted),
            res = tokio::time::timeout(timeout, child.wait_with_output()) => match res {
                Ok(output) => {
                    let output = output?;
                    Ok(ExecOutput {
                        exit_code: output.status.code().unwrap_or(SIGNAL_EXIT_CODE),
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                        duration: start.elapsed(),
                    })
                }
                Err(_) => Err(ExecError::Timeout(timeout)),
            },
        }
    }
}

#[async_trait]
impl ActionExecutor for ShellExecutor {
    async fn execute(
        &self,
        action: ExecAction,
        cancel: CancellationToken,
    ) -> Result<ExecOutput, ExecError> {
        match action {
            ExecAction::Command {
                command,
                cwd,
                timeout_ms,
            } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.default_timeout);
                self.spawn_and_wait(&command, &cwd, timeout, &cancel).await
            }
            ExecAction::ApplyPatch { patch, cwd } => {
                let argv = vec![APPLY_PATCH_PROGRAM.to_string(), patch.patch];
                self.spawn_and_wait(&argv, &cwd, self.default_timeout, &cancel)
                    .await
            }
        }
    }
}
