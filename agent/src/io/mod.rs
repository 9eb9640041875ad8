//! I/O for the agent loop: model backend, approval, shell, filesystem and session log.

pub mod actions;
pub mod approval;
pub mod config;
pub mod model;
pub mod process;
pub mod prompt;
pub mod session_log;
pub mod shell;
