// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RTR client façade trait (§4.1) — the narrow surface every higher
//! layer (session manager, state machine, transfer manager) drives the
//! cloud RTR API through.

use async_trait::async_trait;
use fnerd_core::command::{CommandRequest, CommandResult};
use fnerd_core::error::CollectionError;
use fnerd_core::host::{AgentId, Host};
use fnerd_core::remote_artifact::RemoteFileDescriptor;
use fnerd_core::session::{BatchSession, Session, SessionId};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Opaque identifier for a submitted RTR command, returned by `run` and
/// polled via `status`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloudRequestId(pub String);

impl std::fmt::Display for CloudRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chunk of a downloaded file, as streamed by [`RtrClient::fetch_file`].
pub type FileChunk = Result<bytes::Bytes, CollectionError>;

/// Narrow façade over the cloud RTR API (§4.1). Implementations own their
/// own retry policy and host-registry cache; callers never retry RTR calls
/// themselves.
#[async_trait]
pub trait RtrClient: Send + Sync {
    async fn discover_host(&self, hostname: &str, force_refresh: bool) -> Result<Host, CollectionError>;

    async fn init_session(&self, aid: &AgentId) -> Result<Session, CollectionError>;

    async fn init_batch(&self, aids: &[AgentId]) -> Result<BatchSession, CollectionError>;

    async fn pulse(&self, session_id: &SessionId) -> Result<(), CollectionError>;

    /// Submits `request`, routed to the read-only, active-responder, or
    /// admin endpoint by its `privilege`. Returns immediately with the
    /// cloud's tracking id; does not wait for completion.
    async fn run(&self, session_id: &SessionId, request: &CommandRequest) -> Result<CloudRequestId, CollectionError>;

    async fn status(&self, cloud_request_id: &CloudRequestId) -> Result<CommandResult, CollectionError>;

    async fn list_files(&self, session_id: &SessionId) -> Result<Vec<RemoteFileDescriptor>, CollectionError>;

    /// Streams the staged file's bytes. The remote server typically wraps
    /// the payload in a password-protected archive; unwrapping is the
    /// transfer manager's responsibility, not this façade's.
    async fn fetch_file(&self, session_id: &SessionId, sha256: &str) -> Result<BoxStream<'static, FileChunk>, CollectionError>;

    async fn close(&self, session_id: &SessionId) -> Result<(), CollectionError>;
}
