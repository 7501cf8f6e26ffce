// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The file/transfer manager (§4.5): remote stat sampling, staged-file
//! listing, download-with-verification, and remote SHA-256.

use crate::archive::ArchiveUnwrapper;
use async_trait::async_trait;
use fnerd_core::command::{CommandRequest, CommandResult};
use fnerd_core::error::CollectionError;
use fnerd_core::host::Platform;
use fnerd_core::remote_artifact::{RemoteArtifact, RemoteFileDescriptor};
use fnerd_core::session::SessionId;
use fnerd_rtr::RtrClient;
use futures_util::TryStreamExt;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Runs a command to completion inside a session, owned by the session
/// manager (§4.2) so both the collection state machine and the transfer
/// manager share one polling implementation instead of each reimplementing
/// RTR's submit-then-poll dance.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, session_id: &SessionId, request: &CommandRequest, timeout: Duration) -> Result<CommandResult, CollectionError>;
}

/// Result of a completed download (§4.5 `download_session_file`).
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub local_path: std::path::PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
}

/// How many times `download_session_file` restarts the *outer* stream on a
/// transient error; an inner (partial) stream always restarts from zero
/// rather than resuming (§4.3 FETCH).
const FETCH_RETRY_ATTEMPTS: u32 = 2;

pub struct TransferManager<E, R> {
    executor: Arc<E>,
    rtr: Arc<R>,
    unwrapper: Arc<dyn ArchiveUnwrapper>,
}

impl<E, R> Clone for TransferManager<E, R> {
    fn clone(&self) -> Self {
        Self { executor: self.executor.clone(), rtr: self.rtr.clone(), unwrapper: self.unwrapper.clone() }
    }
}

impl<E: CommandExecutor, R: RtrClient> TransferManager<E, R> {
    pub fn new(executor: Arc<E>, rtr: Arc<R>, unwrapper: Arc<dyn ArchiveUnwrapper>) -> Self {
        Self { executor, rtr, unwrapper }
    }

    /// Samples `path`'s size/mtime on the host (§4.3 FILE_WAIT/STABILIZE
    /// sampling primitive).
    pub async fn remote_stat(
        &self,
        session_id: &SessionId,
        platform: Platform,
        path: &str,
        command_timeout: Duration,
    ) -> Result<Option<RemoteArtifact>, CollectionError> {
        let adapter = fnerd_platform::for_platform(platform);
        let request = adapter.stat(path);
        let result = self.executor.execute(session_id, &request, command_timeout).await?;
        Ok(adapter.parse_stat(path, &result.stdout))
    }

    /// Lists files the session has staged for retrieval (§4.1, passthrough
    /// to the façade — no platform-specific parsing needed).
    pub async fn list_session_files(&self, session_id: &SessionId) -> Result<Vec<RemoteFileDescriptor>, CollectionError> {
        self.rtr.list_files(session_id).await
    }

    /// Downloads the file identified by `sha256` to `local_path`, unwraps
    /// any outer archive, and verifies the result's own digest. Retries the
    /// whole transfer up to [`FETCH_RETRY_ATTEMPTS`] times on
    /// [`CollectionError::is_retryable`]; the inner stream is never resumed
    /// mid-way, only restarted.
    pub async fn download_session_file(
        &self,
        session_id: &SessionId,
        sha256: &str,
        local_path: &std::path::Path,
    ) -> Result<DownloadedFile, CollectionError> {
        let mut attempt = 0;
        loop {
            match self.download_once(session_id, sha256, local_path).await {
                Ok(file) => return Ok(file),
                Err(err) if err.is_retryable() && attempt < FETCH_RETRY_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "retrying fetch from the start");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn download_once(
        &self,
        session_id: &SessionId,
        sha256: &str,
        local_path: &std::path::Path,
    ) -> Result<DownloadedFile, CollectionError> {
        let mut stream = self.rtr.fetch_file(session_id, sha256).await?;
        let mut buf = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        let unwrapped = self.unwrapper.unwrap_bytes(buf)?;
        let size_bytes = unwrapped.len() as u64;
        let digest = format!("{:x}", Sha256::digest(&unwrapped));

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| CollectionError::Transient(e.to_string()))?;
        }
        tokio::fs::write(local_path, &unwrapped).await.map_err(|e| CollectionError::Transient(e.to_string()))?;

        Ok(DownloadedFile { local_path: local_path.to_path_buf(), size_bytes, sha256: digest })
    }

    /// Computes `path`'s SHA-256 on the host, for tools that don't already
    /// emit one (§4.5 `remote_sha256`).
    pub async fn remote_sha256(
        &self,
        session_id: &SessionId,
        platform: Platform,
        path: &str,
        command_timeout: Duration,
    ) -> Result<Option<String>, CollectionError> {
        let adapter = fnerd_platform::for_platform(platform);
        let request = adapter.sha256(path);
        let result = self.executor.execute(session_id, &request, command_timeout).await?;
        Ok(adapter.parse_sha256(&result.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::PassthroughUnwrapper;
    use fnerd_core::command::{CommandStatus, Privilege};
    use fnerd_core::host::AgentId;
    use fnerd_rtr::fake::FakeRtrClient;

    struct StubExecutor {
        stdout: String,
    }

    #[async_trait]
    impl CommandExecutor for StubExecutor {
        async fn execute(&self, _session_id: &SessionId, _request: &CommandRequest, _timeout: Duration) -> Result<CommandResult, CollectionError> {
            Ok(CommandResult { status: CommandStatus::Complete, stdout: self.stdout.clone(), stderr: String::new(), exit_code: Some(0) })
        }
    }

    fn manager(stdout: &str) -> TransferManager<StubExecutor, FakeRtrClient> {
        TransferManager::new(
            Arc::new(StubExecutor { stdout: stdout.to_string() }),
            Arc::new(FakeRtrClient::new()),
            Arc::new(PassthroughUnwrapper),
        )
    }

    #[tokio::test]
    async fn remote_stat_parses_unix_stdout() {
        let manager = manager("2048 1700000000\n");
        let session = SessionId::new();
        let artifact = manager.remote_stat(&session, Platform::Linux, "/opt/0x4n6nerd/out.7z", Duration::from_secs(5)).await.unwrap();
        let artifact = artifact.unwrap();
        assert_eq!(artifact.size_bytes, 2048);
    }

    #[tokio::test]
    async fn remote_sha256_parses_unix_stdout() {
        let digest = "c".repeat(64);
        let manager = manager(&format!("{digest}  out.7z\n"));
        let session = SessionId::new();
        let parsed = manager.remote_sha256(&session, Platform::Linux, "/opt/0x4n6nerd/out.7z", Duration::from_secs(5)).await.unwrap();
        assert_eq!(parsed, Some(digest));
    }

    #[tokio::test]
    async fn download_session_file_writes_and_hashes() {
        let fake_rtr = FakeRtrClient::new();
        fake_rtr.seed_file_bytes("abc123", b"forensic bytes".to_vec());
        let executor = Arc::new(StubExecutor { stdout: String::new() });
        let manager = TransferManager::new(executor, Arc::new(fake_rtr.clone()), Arc::new(PassthroughUnwrapper));
        let session = fake_rtr.init_session(&AgentId::new("aid-1")).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.7z");

        let downloaded = manager.download_session_file(&session.id, "abc123", &dest).await.unwrap();
        assert_eq!(downloaded.size_bytes, 15);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"forensic bytes");
    }

    #[tokio::test]
    async fn download_session_file_propagates_not_found_without_retry_exhaustion() {
        let fake_rtr = FakeRtrClient::new();
        let executor = Arc::new(StubExecutor { stdout: String::new() });
        let manager = TransferManager::new(executor, Arc::new(fake_rtr), Arc::new(PassthroughUnwrapper));
        let session = SessionId::new();
        let dir = tempfile::tempdir().unwrap();
        let err = manager.download_session_file(&session, "missing-sha", &dir.path().join("out.7z")).await.unwrap_err();
        assert_eq!(err.kind(), fnerd_core::error::ErrorKind::NotFound);
    }
}
