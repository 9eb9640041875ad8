//! Fixed feedback texts appended to the conversation after each step.
//!
//! The model reads these verbatim, so their wording is part of the protocol.

use std::fmt::Display;

pub const INVALID_JSON: &str =
    "Your last response was not valid JSON. Reply again with ONLY the JSON object.";
pub const MISSING_READ_PATH: &str = "Missing 'path' for read.";
pub const MISSING_WRITE_PATH: &str = "Missing 'path' for write.";
pub const MISSING_RUN_COMMAND: &str = "Missing 'command' for run.";
pub const WRITE_DENIED: &str = "Write not approved. Propose another step.";
pub const COMMAND_DENIED: &str = "Command not approved. Propose another step.";

pub fn read_result(path: &str, content: &str) -> String {
    format!("READ {path}\n{content}")
}

pub fn read_error(path: &str, err: impl Display) -> String {
    format!("ERROR reading {path}: {err}")
}

pub fn wrote(path: &str, bytes: usize) -> String {
    format!("WROTE {path} ({bytes} bytes).")
}

pub fn write_error(path: &str, err: impl Display) -> String {
    format!("ERROR writing {path}: {err}")
}

pub fn command_result(command: &str, output: &str) -> String {
    format!("COMMAND: {command}\nOUTPUT:\n{output}")
}

pub fn unknown_action(name: &str) -> String {
    format!("Unknown action '{name}'. Use run/write/read/done.")
}

/// Description shown to the gatekeeper before a write.
pub fn write_approval(path: &str, bytes: usize) -> String {
    format!("Proposed write to {path} ({bytes} bytes).")
}

/// Description shown to the gatekeeper before a command runs.
pub fn command_approval(command: &str) -> String {
    format!("Proposed command:\n  {command}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_result_puts_output_on_its_own_lines() {
        assert_eq!(
            command_result("echo hi", "hi\n"),
            "COMMAND: echo hi\nOUTPUT:\nhi\n"
        );
    }

    #[test]
    fn unknown_action_names_the_value() {
        assert_eq!(
            unknown_action("delete_everything"),
            "Unknown action 'delete_everything'. Use run/write/read/done."
        );
    }
}
