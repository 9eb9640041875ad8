//! Human-approved coding agent loop.
//!
//! A language model proposes one JSON action per step; the loop asks a human
//! before any write or command, executes what was approved and feeds the
//! result back until the success text shows up in command output, the model
//! declares itself done, or the step budget runs out. The crate keeps a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (action parsing, conversation,
//!   feedback text). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (chat backend, console approval,
//!   shell commands, filesystem, session log). Each sits behind a trait or
//!   plain struct so tests can substitute it.
//!
//! Orchestration modules ([`step`], [`looping`]) tie core logic to I/O.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
