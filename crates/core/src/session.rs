// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RTR session and batch-session bookkeeping (§3, §4.1).
//!
//! A `Session` is a single-host RTR session; a `BatchSession` groups the
//! per-host sessions RTR opens when a batch `init` call targets more than
//! one host at once. Both require a periodic pulse to stay alive upstream.

use crate::define_id;
use crate::host::AgentId;
use serde::{Deserialize, Serialize};

define_id! {
    /// Identifier for a single-host RTR session.
    pub struct SessionId("ses-");
}

define_id! {
    /// Identifier for a batch RTR session spanning multiple hosts.
    pub struct BatchId("bat-");
}

/// Lifecycle status of an RTR session, independent of the collection job
/// phase driving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Opening,
    Active,
    /// The upstream session has expired (missed pulses) and must be
    /// reopened before any further commands can be issued.
    Expired,
    Closed,
}

/// A single-host RTR session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub aid: AgentId,
    pub status: SessionStatus,
    /// Epoch millis of the last successful pulse; used to decide when the
    /// next pulse is due (§4.1 default interval).
    pub last_pulse_epoch_ms: u64,
}

impl Session {
    pub fn new(aid: AgentId) -> Self {
        Self { id: SessionId::new(), aid, status: SessionStatus::Opening, last_pulse_epoch_ms: 0 }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.status, SessionStatus::Opening | SessionStatus::Active)
    }
}

/// A batch RTR session spanning multiple hosts, plus the per-host session
/// records it fanned out into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSession {
    pub id: BatchId,
    pub members: Vec<Session>,
}

impl BatchSession {
    pub fn new(aids: impl IntoIterator<Item = AgentId>) -> Self {
        Self { id: BatchId::new(), members: aids.into_iter().map(Session::new).collect() }
    }

    pub fn session_for(&self, aid: &AgentId) -> Option<&Session> {
        self.members.iter().find(|s| &s.aid == aid)
    }
}
