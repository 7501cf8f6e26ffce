// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`RtrClient`] for engine/executor tests, behind the
//! `test-support` feature.

use crate::client::{CloudRequestId, FileChunk, RtrClient};
use async_trait::async_trait;
use fnerd_core::command::{CommandRequest, CommandResult, CommandStatus};
use fnerd_core::error::CollectionError;
use fnerd_core::host::{AgentId, Host};
use fnerd_core::remote_artifact::RemoteFileDescriptor;
use fnerd_core::session::{BatchSession, Session, SessionId, SessionStatus};
use futures_util::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Canned behavior for one command submitted via `run`.
#[derive(Clone)]
pub struct ScriptedCommand {
    pub result: CommandResult,
    /// How many `status` polls should report `Running` before the scripted
    /// `result` is returned — models RUN_MONITOR's polling cadence.
    pub polls_before_complete: u32,
}

impl ScriptedCommand {
    pub fn immediate(result: CommandResult) -> Self {
        Self { result, polls_before_complete: 0 }
    }
}

#[derive(Default)]
struct FakeState {
    hosts: HashMap<String, Host>,
    sessions: HashMap<SessionId, Session>,
    files: HashMap<SessionId, Vec<RemoteFileDescriptor>>,
    file_bytes: HashMap<String, Vec<u8>>,
    commands: HashMap<CloudRequestId, (ScriptedCommand, u32)>,
    next_cloud_request: u64,
    discover_calls: HashMap<String, u32>,
    closed_sessions: Vec<SessionId>,
    /// Substring of `command_line` -> queued stdout responses, consumed in
    /// order (the last one repeats once exhausted). Lets a test drive a
    /// sequence of distinct replies to the same repeatedly-polled command
    /// (e.g. a file size that grows across `stat` samples before settling).
    scripted_stdout: Vec<(String, VecDeque<String>)>,
    default_files: Option<Vec<RemoteFileDescriptor>>,
    sent_commands: Vec<CommandRequest>,
}

/// An in-memory stand-in for the cloud RTR API, driven entirely by
/// test-supplied fixtures — no network calls, no retries, no sleeping.
#[derive(Clone, Default)]
pub struct FakeRtrClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRtrClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_host(&self, host: Host) {
        self.state.lock().hosts.insert(host.hostname.clone(), host);
    }

    pub fn seed_files(&self, session_id: SessionId, files: Vec<RemoteFileDescriptor>) {
        self.state.lock().files.insert(session_id, files);
    }

    /// Stage files for whichever session ends up asking, for callers that
    /// don't control the `SessionId` `acquire` generates (e.g. a test
    /// driving the engine end to end rather than calling `init_session`
    /// directly). `list_files` returns this list for any session with no
    /// more specific entry of its own.
    pub fn seed_files_for_any_session(&self, files: Vec<RemoteFileDescriptor>) {
        self.state.lock().default_files = Some(files);
    }

    pub fn seed_file_bytes(&self, sha256: impl Into<String>, bytes: Vec<u8>) {
        self.state.lock().file_bytes.insert(sha256.into(), bytes);
    }

    pub fn discover_call_count(&self, hostname: &str) -> u32 {
        self.state.lock().discover_calls.get(hostname).copied().unwrap_or(0)
    }

    pub fn closed_sessions(&self) -> Vec<SessionId> {
        self.state.lock().closed_sessions.clone()
    }

    /// Every command `run` has received so far, in submission order. Lets a
    /// test assert a specific adapter-synthesized command was sent without
    /// scripting its result.
    pub fn sent_commands(&self) -> Vec<CommandRequest> {
        self.state.lock().sent_commands.clone()
    }

    /// Schedule the result `run` submitting this exact command line should
    /// eventually report; keyed loosely since the fake isn't matching real
    /// command semantics, only test-authored fixtures.
    pub fn queue_command_result(&self, scripted: ScriptedCommand) -> CloudRequestId {
        let mut state = self.state.lock();
        state.next_cloud_request += 1;
        let id = CloudRequestId(format!("fake-req-{}", state.next_cloud_request));
        state.commands.insert(id.clone(), (scripted, 0));
        id
    }

    /// Queue a sequence of stdout replies for every `run` whose
    /// `command_line` contains `pattern`. Each call to that command
    /// consumes the next reply; once the queue is drained, the last reply
    /// keeps repeating.
    pub fn script_stdout(&self, pattern: impl Into<String>, replies: impl IntoIterator<Item = impl Into<String>>) {
        let replies = replies.into_iter().map(Into::into).collect();
        self.state.lock().scripted_stdout.push((pattern.into(), replies));
    }
}

#[async_trait]
impl RtrClient for FakeRtrClient {
    async fn discover_host(&self, hostname: &str, _force_refresh: bool) -> Result<Host, CollectionError> {
        let mut state = self.state.lock();
        *state.discover_calls.entry(hostname.to_string()).or_insert(0) += 1;
        state.hosts.get(hostname).cloned().ok_or_else(|| CollectionError::NotFound(hostname.to_string()))
    }

    async fn init_session(&self, aid: &AgentId) -> Result<Session, CollectionError> {
        let session = Session::new(aid.clone());
        self.state.lock().sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn init_batch(&self, aids: &[AgentId]) -> Result<BatchSession, CollectionError> {
        let batch = BatchSession::new(aids.iter().cloned());
        let mut state = self.state.lock();
        for member in &batch.members {
            state.sessions.insert(member.id.clone(), member.clone());
        }
        Ok(batch)
    }

    async fn pulse(&self, session_id: &SessionId) -> Result<(), CollectionError> {
        let mut state = self.state.lock();
        let session = state.sessions.get_mut(session_id).ok_or_else(|| CollectionError::NotFound(session_id.to_string()))?;
        if session.status == SessionStatus::Expired {
            return Err(CollectionError::Offline(format!("{session_id} expired")));
        }
        session.status = SessionStatus::Active;
        Ok(())
    }

    async fn run(&self, _session_id: &SessionId, request: &CommandRequest) -> Result<CloudRequestId, CollectionError> {
        let stdout = {
            let mut state = self.state.lock();
            state.sent_commands.push(request.clone());
            state.scripted_stdout.iter_mut().find(|(pattern, _)| request.command_line.contains(pattern.as_str())).map(|(_, replies)| {
                if replies.len() > 1 {
                    replies.pop_front().unwrap_or_default()
                } else {
                    replies.front().cloned().unwrap_or_default()
                }
            })
        };
        Ok(self.queue_command_result(ScriptedCommand::immediate(CommandResult {
            status: CommandStatus::Complete,
            stdout: stdout.unwrap_or_default(),
            stderr: String::new(),
            exit_code: Some(0),
        })))
    }

    async fn status(&self, cloud_request_id: &CloudRequestId) -> Result<CommandResult, CollectionError> {
        let mut state = self.state.lock();
        let (scripted, polls) = state
            .commands
            .get_mut(cloud_request_id)
            .ok_or_else(|| CollectionError::NotFound(cloud_request_id.to_string()))?;
        *polls += 1;
        if *polls <= scripted.polls_before_complete {
            return Ok(CommandResult { status: CommandStatus::Running, stdout: String::new(), stderr: String::new(), exit_code: None });
        }
        Ok(scripted.result.clone())
    }

    async fn list_files(&self, session_id: &SessionId) -> Result<Vec<RemoteFileDescriptor>, CollectionError> {
        let state = self.state.lock();
        if let Some(files) = state.files.get(session_id) {
            return Ok(files.clone());
        }
        Ok(state.default_files.clone().unwrap_or_default())
    }

    async fn fetch_file(&self, _session_id: &SessionId, sha256: &str) -> Result<BoxStream<'static, FileChunk>, CollectionError> {
        let bytes = self
            .state
            .lock()
            .file_bytes
            .get(sha256)
            .cloned()
            .ok_or_else(|| CollectionError::NotFound(format!("no fixture bytes for sha256 {sha256}")))?;
        let chunk: FileChunk = Ok(bytes::Bytes::from(bytes));
        Ok(Box::pin(futures_util::stream::iter(vec![chunk])))
    }

    async fn close(&self, session_id: &SessionId) -> Result<(), CollectionError> {
        let mut state = self.state.lock();
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.status = SessionStatus::Closed;
        }
        state.closed_sessions.push(session_id.clone());
        Ok(())
    }
}
