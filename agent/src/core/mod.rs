//! Deterministic, pure logic shared by the agent loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (model replies, message history) and return deterministic outputs
//! suitable for tests.

pub mod action;
pub mod conversation;
pub mod feedback;
