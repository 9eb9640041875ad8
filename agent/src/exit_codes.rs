//! Stable exit codes for the `agent-loop` CLI.

/// The model declared `done`, or the success substring appeared in command output.
pub const OK: i32 = 0;
/// The run aborted: backend failure, broken config, or an I/O error outside the recovery policy.
pub const ERROR: i32 = 1;
/// The step budget ran out before success.
pub const MAX_STEPS: i32 = 2;
