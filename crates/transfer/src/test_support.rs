// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared [`CommandExecutor`] fixture for downstream crates' tests.

use crate::manager::CommandExecutor;
use async_trait::async_trait;
use fnerd_core::command::{CommandRequest, CommandResult, CommandStatus};
use fnerd_core::error::CollectionError;
use fnerd_core::session::SessionId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// A [`CommandExecutor`] that returns pre-scripted results in call order,
/// recording every request it was handed.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<Result<CommandResult, CollectionError>>>,
    requests: Mutex<Vec<CommandRequest>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&self, stdout: impl Into<String>) {
        self.responses.lock().push_back(Ok(CommandResult {
            status: CommandStatus::Complete,
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }));
    }

    pub fn push_error(&self, err: CollectionError) {
        self.responses.lock().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, _session_id: &SessionId, request: &CommandRequest, _timeout: Duration) -> Result<CommandResult, CollectionError> {
        self.requests.lock().push(request.clone());
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Ok(CommandResult { status: CommandStatus::Complete, stdout: String::new(), stderr: String::new(), exit_code: Some(0) })
        })
    }
}
