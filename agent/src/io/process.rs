//! Helpers for running child processes with timeouts, cancellation and bounded output.

use std::collections::VecDeque;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How often a running child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag that asks an in-flight command to stop.
///
/// Clones observe the same flag. A cancellation applies to one command: the
/// command in flight, or the next one if none is running. The flag is cleared
/// once that command has been killed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Captured child process output.
///
/// Each stream keeps its last `output_limit_bytes`; `*_truncated` counts the
/// leading bytes that were dropped.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self) -> String {
        dropped_notice("stdout", self.stdout_truncated)
    }

    pub fn stderr_truncated_notice(&self) -> String {
        dropped_notice("stderr", self.stderr_truncated)
    }
}

fn dropped_notice(stream: &str, dropped: usize) -> String {
    if dropped > 0 {
        format!("[{stream}: first {dropped} bytes dropped]\n")
    } else {
        String::new()
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory. The tail of each stream is kept, since test runners print
/// their summary last; older bytes are discarded while the pipe keeps draining.
///
/// The child is killed when `timeout` elapses or `cancel` is triggered. Only the direct child
/// is killed: a grandchild that inherited the pipes keeps output collection waiting until it
/// exits.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: &CancelToken,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    // An unrepresentable deadline means the timeout never fires.
    let deadline = Instant::now().checked_add(timeout);
    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        if cancel.is_cancelled() {
            warn!("command cancelled, killing");
            cancelled = true;
            cancel.clear();
            child.kill().context("kill command")?;
            break child.wait().context("wait command after kill")?;
        }
        let now = Instant::now();
        if let Some(deadline) = deadline
            && now >= deadline
        {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            break child.wait().context("wait command after kill")?;
        }
        let slice = deadline.map_or(POLL_INTERVAL, |deadline| POLL_INTERVAL.min(deadline - now));
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            break status;
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        cancelled,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Drain `reader`, keeping only the last `limit` bytes.
fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut tail = VecDeque::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        tail.extend(&chunk[..n]);
        let excess = tail.len().saturating_sub(limit);
        if excess > 0 {
            tail.drain(..excess);
            dropped += excess;
        }
    }

    Ok((Vec::from(tail), dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stderr_separately() {
        let output = run_command_with_timeout(
            sh("echo out; echo err 1>&2; exit 3"),
            Duration::from_secs(30),
            1000,
            &CancelToken::new(),
        )
        .expect("run");

        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
        assert_eq!(output.status.code(), Some(3));
        assert!(!output.timed_out);
        assert!(!output.cancelled);
    }

    #[test]
    fn keeps_tail_beyond_limit_and_reports_notice() {
        let output = run_command_with_timeout(
            sh("printf 0123456789"),
            Duration::from_secs(30),
            4,
            &CancelToken::new(),
        )
        .expect("run");

        assert_eq!(output.stdout, b"6789");
        assert_eq!(output.stdout_truncated, 6);
        assert_eq!(
            output.stdout_truncated_notice(),
            "[stdout: first 6 bytes dropped]\n"
        );
        assert_eq!(output.stderr_truncated_notice(), "");
    }

    #[test]
    fn summary_at_end_of_long_output_survives() {
        let output = run_command_with_timeout(
            sh("i=0; while [ $i -lt 2000 ]; do echo line $i; i=$((i+1)); done; echo '5 passed'"),
            Duration::from_secs(30),
            64,
            &CancelToken::new(),
        )
        .expect("run");

        assert!(output.stdout.ends_with(b"5 passed\n"));
        assert_eq!(output.stdout.len(), 64);
        assert!(output.stdout_truncated > 0);
    }

    #[test]
    fn pre_cancelled_token_kills_without_waiting() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let started = Instant::now();
        let output =
            run_command_with_timeout(sh("exec sleep 30"), Duration::from_secs(60), 1000, &cancel)
                .expect("run");

        assert!(output.cancelled);
        assert!(!output.timed_out);
        assert!(!output.status.success());
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn cancellation_is_cleared_after_the_killed_command() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let first =
            run_command_with_timeout(sh("exec sleep 30"), Duration::from_secs(60), 1000, &cancel)
                .expect("first run");
        assert!(first.cancelled);
        assert!(!cancel.is_cancelled());

        let second = run_command_with_timeout(sh("echo second"), Duration::from_secs(30), 1000, &cancel)
            .expect("second run");
        assert!(!second.cancelled);
        assert_eq!(second.stdout, b"second\n");
    }

    #[test]
    fn clones_share_cancellation() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let err = run_command_with_timeout(
            Command::new("/nonexistent/definitely-not-here"),
            Duration::from_secs(1),
            1000,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
