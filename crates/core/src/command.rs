// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote command execution types, shared by the RTR façade (`run`/`status`)
//! and the platform adapters that synthesize the command strings (§4.2,
//! §4.4).

use serde::{Deserialize, Serialize};

/// Privilege level a command should run under. RTR routes commands to one
/// of three queues: a read-only set for commands that only inspect the
/// host, an unprivileged "active-responder" set, and a privileged "admin"
/// set; §4.4's platform adapters pick whichever the operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Read,
    Responder,
    Admin,
}

/// A command queued for execution inside an RTR session, as synthesized by
/// a platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub privilege: Privilege,
    /// The base command name RTR expects, e.g. `"runscript"`, `"get"`,
    /// `"ls"`.
    pub base_command: String,
    /// The fully assembled command line/arguments understood by the
    /// target shell (PowerShell on Windows, POSIX sh elsewhere).
    pub command_line: String,
}

impl CommandRequest {
    pub fn new(privilege: Privilege, base_command: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self { privilege, base_command: base_command.into(), command_line: command_line.into() }
    }
}

/// Lifecycle status of a queued command, as reported by RTR's `status`
/// polling endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Queued,
    Running,
    Complete,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Complete | CommandStatus::Failed)
    }
}

/// The outcome of a completed (or still-running) command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        self.status == CommandStatus::Complete && self.exit_code.unwrap_or(0) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!CommandStatus::Queued.is_terminal());
        assert!(!CommandStatus::Running.is_terminal());
        assert!(CommandStatus::Complete.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
    }

    #[test]
    fn succeeded_requires_complete_and_zero_exit() {
        let ok = CommandResult {
            status: CommandStatus::Complete,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert!(ok.succeeded());

        let bad_exit = CommandResult { exit_code: Some(1), ..ok.clone() };
        assert!(!bad_exit.succeeded());

        let still_running = CommandResult { status: CommandStatus::Running, ..ok };
        assert!(!still_running.succeeded());
    }
}
