// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session manager (§4.2): acquire/release sessions, keep them alive
//! with a background pulse, and serialize commands per session.
//!
//! Modeled on the teacher's per-agent timer bookkeeping
//! (`oj-core::timer`, `Effect::SetTimer`/`CancelTimer`), adapted to a pulse
//! task per session plus a per-session `tokio::sync::Mutex` for the
//! at-most-one-in-flight invariant (§8 property 1).

use fnerd_core::clock::{Clock, SystemClock};
use fnerd_core::command::{CommandRequest, CommandResult, CommandStatus};
use fnerd_core::error::CollectionError;
use fnerd_core::host::AgentId;
use fnerd_core::session::{Session, SessionId};
use fnerd_rtr::RtrClient;
use fnerd_transfer::CommandExecutor;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

struct Handle {
    session: AsyncMutex<Session>,
    pulse_task: tokio::task::JoinHandle<()>,
}

/// Acquires, pulses, serializes commands on, and releases RTR sessions.
pub struct SessionManager<R: RtrClient, C: Clock = SystemClock> {
    rtr: Arc<R>,
    clock: C,
    idle_timeout: Duration,
    command_poll_initial: Duration,
    command_poll_max: Duration,
    handles: SyncMutex<HashMap<SessionId, Arc<Handle>>>,
}

impl<R: RtrClient + 'static, C: Clock> SessionManager<R, C> {
    pub fn new(rtr: Arc<R>, clock: C, idle_timeout: Duration) -> Self {
        Self {
            rtr,
            clock,
            idle_timeout,
            command_poll_initial: Duration::from_secs(2),
            command_poll_max: Duration::from_secs(30),
            handles: SyncMutex::new(HashMap::new()),
        }
    }

    /// Opens a session for `aid` and starts a pulse timer at
    /// `idle_timeout / 2` (§4.2 `acquire`).
    pub async fn acquire(&self, aid: &AgentId) -> Result<SessionId, CollectionError> {
        let session = self.rtr.init_session(aid).await?;
        let session_id = session.id.clone();

        let rtr = self.rtr.clone();
        let pulse_every = self.idle_timeout / 2;
        let pulse_id = session_id.clone();
        let pulse_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(pulse_every).await;
                if rtr.pulse(&pulse_id).await.is_err() {
                    tracing::warn!(session_id = %pulse_id, "pulse failed, session may be expiring");
                }
            }
        });

        self.handles
            .lock()
            .insert(session_id.clone(), Arc::new(Handle { session: AsyncMutex::new(session), pulse_task }));
        Ok(session_id)
    }

    /// Closes `session_id`'s RTR session and stops its pulse task.
    /// Best-effort: errors from the close call are swallowed by the caller
    /// (§4.3 CLEAN never fails the job).
    pub async fn release(&self, session_id: &SessionId) -> Result<(), CollectionError> {
        let handle = self.handles.lock().remove(session_id);
        if let Some(handle) = handle {
            handle.pulse_task.abort();
        }
        self.rtr.close(session_id).await
    }

    /// An explicit out-of-band pulse, for callers (RUN_MONITOR) that want
    /// to extend the idle timeout on their own schedule in addition to the
    /// background pulse task.
    pub async fn pulse_now(&self, session_id: &SessionId) -> Result<(), CollectionError> {
        self.rtr.pulse(session_id).await
    }
}

#[async_trait::async_trait]
impl<R: RtrClient + 'static, C: Clock> CommandExecutor for SessionManager<R, C> {
    /// Submits `request` then polls `status` with an adaptive schedule:
    /// starts at 2s, doubles, caps at 30s, bounded by `timeout` (§4.2
    /// `execute`).
    async fn execute(&self, session_id: &SessionId, request: &CommandRequest, timeout: Duration) -> Result<CommandResult, CollectionError> {
        let handle = {
            let handles = self.handles.lock();
            handles.get(session_id).cloned().ok_or_else(|| CollectionError::NotFound(session_id.to_string()))?
        };
        let _guard = handle.session.lock().await;

        let cloud_request_id = self.rtr.run(session_id, request).await?;
        let deadline = self.clock.now() + timeout;
        let mut poll_interval = self.command_poll_initial;

        loop {
            let result = self.rtr.status(&cloud_request_id).await?;
            if result.status.is_terminal() {
                return Ok(result);
            }
            if self.clock.now() >= deadline {
                return Err(CollectionError::Timeout { elapsed: timeout, detail: format!("command {cloud_request_id} did not complete") });
            }
            tokio::time::sleep(poll_interval.min(self.command_poll_max)).await;
            poll_interval = (poll_interval * 2).min(self.command_poll_max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnerd_core::clock::FakeClock;
    use fnerd_core::command::Privilege;
    use fnerd_rtr::fake::FakeRtrClient;

    #[tokio::test]
    async fn acquire_then_execute_runs_command_to_completion() {
        let rtr = Arc::new(FakeRtrClient::new());
        let manager = SessionManager::new(rtr.clone(), FakeClock::new(), Duration::from_secs(600));
        let session_id = manager.acquire(&AgentId::new("aid-1")).await.unwrap();

        let request = CommandRequest::new(Privilege::Responder, "runscript", "mkdir -p /opt/0x4n6nerd");
        let result = manager.execute(&session_id, &request, Duration::from_secs(10)).await.unwrap();
        assert_eq!(result.status, CommandStatus::Complete);
    }

    #[tokio::test]
    async fn execute_on_unknown_session_is_not_found() {
        let rtr = Arc::new(FakeRtrClient::new());
        let manager = SessionManager::new(rtr, FakeClock::new(), Duration::from_secs(600));
        let request = CommandRequest::new(Privilege::Responder, "runscript", "whoami");
        let err = manager.execute(&SessionId::new(), &request, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind(), fnerd_core::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn release_closes_session_and_stops_pulsing() {
        let rtr = Arc::new(FakeRtrClient::new());
        let manager = SessionManager::new(rtr.clone(), FakeClock::new(), Duration::from_secs(600));
        let session_id = manager.acquire(&AgentId::new("aid-1")).await.unwrap();
        manager.release(&session_id).await.unwrap();
        assert!(rtr.closed_sessions().contains(&session_id));
    }
}
