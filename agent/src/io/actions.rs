//! Action executor: dispatches one parsed proposal to its handler.
//!
//! The executor keeps no state between steps. Each branch yields exactly one
//! feedback message and performs at most one side effect. Writes and commands
//! are gated by the [`Approver`]; a denial is a normal outcome, not an error.
//! Missing fields and read/write failures are reported back to the model.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::action::{ActionKind, ActionProposal};
use crate::core::feedback;
use crate::io::approval::Approver;
use crate::io::shell::{CommandRequest, CommandRunner};

/// Limits for command execution in `run` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    /// Maximum time before killing the command.
    pub timeout: Duration,
    /// Keep at most this many trailing bytes of each of stdout/stderr.
    pub output_limit_bytes: usize,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Result of executing one proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The model declared the goal complete.
    Done,
    /// Nothing ran; tell the model what happened.
    Feedback(String),
    /// A command ran; its output replaces the loop's last output.
    Ran {
        command: String,
        output: String,
        feedback: String,
    },
}

impl ActionOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Message to append to the conversation, if any.
    pub fn feedback(&self) -> Option<&str> {
        match self {
            Self::Done => None,
            Self::Feedback(feedback) | Self::Ran { feedback, .. } => Some(feedback.as_str()),
        }
    }

    /// New value for the loop's last command output; `None` leaves it unchanged.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::Ran { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }
}

pub struct ActionExecutor<A, R> {
    approver: A,
    runner: R,
    workdir: PathBuf,
    limits: CommandLimits,
}

impl<A: Approver, R: CommandRunner> ActionExecutor<A, R> {
    /// Relative paths in proposals resolve against `workdir`, which is also the
    /// working directory of every command.
    pub fn new(approver: A, runner: R, workdir: impl Into<PathBuf>, limits: CommandLimits) -> Self {
        Self {
            approver,
            runner,
            workdir: workdir.into(),
            limits,
        }
    }

    pub fn approver(&self) -> &A {
        &self.approver
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Execute one proposal.
    ///
    /// Errors are reserved for a broken environment: the approver failing to
    /// read an answer, or the shell failing to start.
    #[instrument(skip_all, fields(action = %proposal.action))]
    pub fn execute(&self, proposal: &ActionProposal) -> Result<ActionOutcome> {
        match &proposal.action {
            ActionKind::Done => {
                info!("model declared done");
                Ok(ActionOutcome::Done)
            }
            ActionKind::Read => Ok(self.read(&proposal.path)),
            ActionKind::Write => self.write(&proposal.path, &proposal.content),
            ActionKind::Run => self.run(&proposal.command),
            ActionKind::Unknown(name) => {
                debug!(name = %name, "unknown action");
                Ok(ActionOutcome::Feedback(feedback::unknown_action(name)))
            }
        }
    }

    fn read(&self, path: &str) -> ActionOutcome {
        if path.is_empty() {
            return ActionOutcome::Feedback(feedback::MISSING_READ_PATH.to_string());
        }
        let content = match fs::read_to_string(self.resolve(path)) {
            Ok(content) => content,
            Err(err) => {
                debug!(path, err = %err, "read failed");
                feedback::read_error(path, err)
            }
        };
        ActionOutcome::Feedback(feedback::read_result(path, &content))
    }

    fn write(&self, path: &str, content: &str) -> Result<ActionOutcome> {
        if path.is_empty() {
            return Ok(ActionOutcome::Feedback(
                feedback::MISSING_WRITE_PATH.to_string(),
            ));
        }
        let bytes = content.len();
        if !self
            .approver
            .approve(&feedback::write_approval(path, bytes))?
        {
            info!(path, "write denied");
            return Ok(ActionOutcome::Feedback(feedback::WRITE_DENIED.to_string()));
        }

        let target = self.resolve(path);
        let message = match write_with_parents(&target, content) {
            Ok(()) => {
                info!(path, bytes, "file written");
                feedback::wrote(path, bytes)
            }
            Err(err) => {
                warn!(path, err = %err, "write failed");
                feedback::write_error(path, err)
            }
        };
        Ok(ActionOutcome::Feedback(message))
    }

    fn run(&self, command: &str) -> Result<ActionOutcome> {
        if command.is_empty() {
            return Ok(ActionOutcome::Feedback(
                feedback::MISSING_RUN_COMMAND.to_string(),
            ));
        }
        if !self.approver.approve(&feedback::command_approval(command))? {
            info!(command, "command denied");
            return Ok(ActionOutcome::Feedback(feedback::COMMAND_DENIED.to_string()));
        }

        let capture = self.runner.run(&CommandRequest {
            command: command.to_string(),
            workdir: self.workdir.clone(),
            timeout: self.limits.timeout,
            output_limit_bytes: self.limits.output_limit_bytes,
        })?;
        info!(command, exit_code = ?capture.exit_code, output_bytes = capture.text.len(), "command finished");

        Ok(ActionOutcome::Ran {
            command: command.to_string(),
            feedback: feedback::command_result(command, &capture.text),
            output: capture.text,
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.workdir.join(path)
    }
}

fn write_with_parents(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}
