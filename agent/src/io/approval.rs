//! Human approval gate for side-effecting actions.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tracing::debug;

/// Decides whether a described side effect may proceed.
///
/// Implementations may block for as long as they like; the loop waits.
pub trait Approver {
    fn approve(&self, description: &str) -> Result<bool>;
}

/// Asks on the interactive console with a `[y/N]` prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleApprover;

impl Approver for ConsoleApprover {
    fn approve(&self, description: &str) -> Result<bool> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        prompt_approval(&mut stdin.lock(), &mut stdout.lock(), description)
    }
}

/// Print `description` and an approval prompt, then read one answer line.
///
/// Only `y` (any case, surrounding whitespace ignored) approves. End of input
/// counts as a denial.
pub fn prompt_approval<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    description: &str,
) -> Result<bool> {
    write!(output, "{description}\nApprove? [y/N] ").context("write approval prompt")?;
    output.flush().context("flush approval prompt")?;

    let mut answer = String::new();
    let read = input
        .read_line(&mut answer)
        .context("read approval answer")?;
    if read == 0 {
        debug!("approval input closed, treating as denial");
        // Keep the console tidy when stdin is not interactive.
        writeln!(output).context("write newline")?;
        return Ok(false);
    }
    Ok(is_affirmative(&answer))
}

pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}
