//! Shell command runner abstraction for `run` actions.
//!
//! The [`CommandRunner`] trait decouples the action executor from real process
//! spawning. Tests use scripted runners that return predetermined output (or a
//! simulated hang) without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::io::process::{CancelToken, run_command_with_timeout};

/// Parameters for one shell command.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Command text passed to `sh -c`.
    pub command: String,
    /// Working directory for the shell.
    pub workdir: PathBuf,
    /// Maximum time to wait before killing the shell.
    pub timeout: Duration,
    /// Keep at most this many trailing bytes of each stream.
    pub output_limit_bytes: usize,
}

/// What a command left behind, ready to feed back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCapture {
    /// Stdout followed by stderr, plus any truncation/timeout notices.
    pub text: String,
    /// Exit code, if the shell exited normally. Never shown to the model.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandCapture {
    /// Capture for a command that finished normally with the given combined output.
    pub fn completed(text: impl Into<String>, exit_code: i32) -> Self {
        Self {
            text: text.into(),
            exit_code: Some(exit_code),
            timed_out: false,
            cancelled: false,
        }
    }
}

/// Abstraction over command execution backends.
pub trait CommandRunner {
    /// Run `request.command` through a shell and capture its combined output.
    ///
    /// A nonzero exit, timeout or cancellation is not an error; only failing to
    /// start the shell is.
    fn run(&self, request: &CommandRequest) -> Result<CommandCapture>;
}

/// Runner that spawns `sh -c <command>`.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    cancel: CancelToken,
}

impl ShellRunner {
    /// `cancel` kills the command in flight. The token is cleared once that
    /// command is gone, so the next command runs normally.
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl CommandRunner for ShellRunner {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &CommandRequest) -> Result<CommandCapture> {
        info!(workdir = %request.workdir.display(), "running shell command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&request.command)
            .current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            request.timeout,
            request.output_limit_bytes,
            &self.cancel,
        )
        .context("run shell command")?;

        let mut text = String::new();
        text.push_str(&output.stdout_truncated_notice());
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        text.push_str(&output.stderr_truncated_notice());
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "shell command timed out");
            text.push_str(&format!(
                "\n[command timed out after {}s]\n",
                request.timeout.as_secs()
            ));
        }
        if output.cancelled {
            text.push_str("\n[command cancelled]\n");
        }

        Ok(CommandCapture {
            text,
            exit_code: output.status.code(),
            timed_out: output.timed_out,
            cancelled: output.cancelled,
        })
    }
}
