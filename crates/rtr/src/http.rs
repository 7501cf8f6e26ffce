// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `reqwest`-based implementation of [`RtrClient`] against a CrowdStrike-style
//! RTR HTTPS API, modeled on the teacher's `RemoteCoopClient`
//! (`Clone`-able struct wrapping an `Arc<Mutex<...>>` registry plus an async
//! HTTP client, one method per remote operation). Unlike the teacher's
//! hand-rolled raw-socket HTTP (suited to a local sidecar), the RTR endpoint
//! is a public cloud API, so this talks `rustls`-backed HTTPS.

use crate::client::{CloudRequestId, FileChunk, RtrClient};
use async_trait::async_trait;
use fnerd_core::clock::{Clock, SystemClock};
use fnerd_core::command::{CommandRequest, CommandResult, CommandStatus, Privilege};
use fnerd_core::error::CollectionError;
use fnerd_core::host::{AgentId, Host, HostRegistry, Platform, TenantId};
use fnerd_core::remote_artifact::RemoteFileDescriptor;
use fnerd_core::retry::RetryPolicy;
use fnerd_core::session::{BatchSession, Session, SessionId, SessionStatus};
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Client id/secret and endpoint for a single tenant's RTR API.
#[derive(Debug, Clone)]
pub struct RtrCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
}

struct TokenState {
    access_token: String,
    expires_at: Instant,
}

/// `reqwest`-backed [`RtrClient`]. Cheap to clone: the HTTP client, token
/// cache, and host registry are all behind `Arc`.
#[derive(Clone)]
pub struct HttpRtrClient<C: Clock = SystemClock> {
    http: reqwest::Client,
    credentials: RtrCredentials,
    token: Arc<Mutex<Option<TokenState>>>,
    registry: Arc<HostRegistry<C>>,
    /// Which queue each still-in-flight `cloud_request_id` was submitted
    /// to, so `status` polls the same queue `run` posted the command to
    /// rather than assuming active-responder for everything.
    pending_queue: Arc<Mutex<std::collections::HashMap<String, Privilege>>>,
    retry: RetryPolicy,
    clock: C,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct DiscoverResponse {
    aid: String,
    cid: String,
    hostname: String,
    platform_name: String,
    last_seen: u64,
    online: bool,
}

#[derive(Deserialize)]
struct InitSessionResponse {
    session_id: String,
}

#[derive(Deserialize)]
struct RunResponse {
    cloud_request_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    complete: bool,
    stdout: String,
    stderr: String,
    return_code: Option<i32>,
}

#[derive(Deserialize)]
struct FileListEntry {
    name: String,
    size: u64,
    sha256: Option<String>,
}

impl HttpRtrClient<SystemClock> {
    pub fn new(credentials: RtrCredentials) -> Self {
        Self::with_clock(credentials, SystemClock)
    }
}

impl<C: Clock> HttpRtrClient<C> {
    pub fn with_clock(credentials: RtrCredentials, clock: C) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            credentials,
            token: Arc::new(Mutex::new(None)),
            registry: Arc::new(HostRegistry::new(clock.clone())),
            pending_queue: Arc::new(Mutex::new(std::collections::HashMap::new())),
            retry: RetryPolicy::default(),
            clock,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn bearer_token(&self) -> Result<String, CollectionError> {
        {
            let guard = self.token.lock();
            if let Some(state) = guard.as_ref() {
                if self.clock.now() < state.expires_at {
                    return Ok(state.access_token.clone());
                }
            }
        }
        let url = format!("{}/oauth2/token", self.credentials.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[("client_id", &self.credentials.client_id), ("client_secret", &self.credentials.client_secret)])
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let parsed: TokenResponse = response.json().await.map_err(|e| CollectionError::Transient(e.to_string()))?;
        let expires_at = self.clock.now() + Duration::from_secs(parsed.expires_in.saturating_sub(30));
        let token = parsed.access_token.clone();
        *self.token.lock() = Some(TokenState { access_token: parsed.access_token, expires_at });
        Ok(token)
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, CollectionError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CollectionError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && !self.retry.attempts_exhausted(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(attempt, ?delay, error = %err, "retrying transient RTR failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        builder.bearer_auth(token)
    }
}

fn transport_error(err: reqwest::Error) -> CollectionError {
    if err.is_timeout() {
        CollectionError::Timeout { elapsed: Duration::from_secs(0), detail: err.to_string() }
    } else {
        CollectionError::Transient(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CollectionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(CollectionError::Authentication(body)),
        404 => Err(CollectionError::NotFound(body)),
        429 | 500..=599 => Err(CollectionError::Transient(body)),
        _ => Err(CollectionError::Transient(format!("unexpected status {status}: {body}"))),
    }
}

fn parse_platform(name: &str) -> Platform {
    match name.to_ascii_lowercase().as_str() {
        "windows" => Platform::Windows,
        "mac" | "macos" | "darwin" => Platform::Mac,
        "linux" => Platform::Linux,
        _ => Platform::UnixOther,
    }
}

#[async_trait]
impl<C: Clock> RtrClient for HttpRtrClient<C> {
    async fn discover_host(&self, hostname: &str, force_refresh: bool) -> Result<Host, CollectionError> {
        let fetch = || async {
            self.with_retry(|| async {
                let token = self.bearer_token().await?;
                let url = format!("{}/devices/queries/devices-scroll/v1", self.credentials.base_url);
                let response =
                    self.authed(self.http.get(&url).query(&[("filter", format!("hostname:'{hostname}'"))]), &token)
                        .send()
                        .await
                        .map_err(transport_error)?;
                let response = check_status(response).await?;
                let parsed: DiscoverResponse = response.json().await.map_err(|e| CollectionError::Transient(e.to_string()))?;
                Ok(Host {
                    aid: AgentId::new(parsed.aid),
                    cid: TenantId::new(parsed.cid),
                    hostname: parsed.hostname,
                    platform: parse_platform(&parsed.platform_name),
                    last_seen_epoch_ms: parsed.last_seen,
                    online: parsed.online,
                })
            })
            .await
        };
        if force_refresh {
            let host = fetch().await?;
            self.registry.upsert(host.clone());
            return Ok(host);
        }
        self.registry.get_or_fetch(hostname, fetch).await
    }

    async fn init_session(&self, aid: &AgentId) -> Result<Session, CollectionError> {
        let response: InitSessionResponse = self
            .with_retry(|| async {
                let token = self.bearer_token().await?;
                let url = format!("{}/real-time-response/entities/sessions/v1", self.credentials.base_url);
                let response = self
                    .authed(self.http.post(&url).json(&serde_json::json!({ "device_id": aid.as_str() })), &token)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let response = check_status(response).await?;
                response.json().await.map_err(|e| CollectionError::Transient(e.to_string()))
            })
            .await?;
        Ok(Session {
            id: SessionId::from_string(response.session_id),
            aid: aid.clone(),
            status: SessionStatus::Active,
            last_pulse_epoch_ms: self.clock.epoch_ms(),
        })
    }

    async fn init_batch(&self, aids: &[AgentId]) -> Result<BatchSession, CollectionError> {
        let mut members = Vec::with_capacity(aids.len());
        for aid in aids {
            members.push(self.init_session(aid).await?);
        }
        Ok(BatchSession { id: fnerd_core::session::BatchId::new(), members })
    }

    async fn pulse(&self, session_id: &SessionId) -> Result<(), CollectionError> {
        self.with_retry(|| async {
            let token = self.bearer_token().await?;
            let url = format!("{}/real-time-response/entities/refresh-session/v1", self.credentials.base_url);
            let response = self
                .authed(self.http.post(&url).json(&serde_json::json!({ "device_id": session_id.as_str() })), &token)
                .send()
                .await
                .map_err(transport_error)?;
            check_status(response).await?;
            Ok(())
        })
        .await
    }

    async fn run(&self, session_id: &SessionId, request: &CommandRequest) -> Result<CloudRequestId, CollectionError> {
        let endpoint = match request.privilege {
            Privilege::Read => "real-time-response/entities/command/v1",
            Privilege::Responder => "real-time-response/entities/active-responder-command/v1",
            Privilege::Admin => "real-time-response/entities/admin-command/v1",
        };
        let response: RunResponse = self
            .with_retry(|| async {
                let token = self.bearer_token().await?;
                let url = format!("{}/{endpoint}", self.credentials.base_url);
                let body = serde_json::json!({
                    "session_id": session_id.as_str(),
                    "base_command": request.base_command,
                    "command_string": request.command_line,
                });
                let response = self.authed(self.http.post(&url).json(&body), &token).send().await.map_err(transport_error)?;
                let response = check_status(response).await?;
                response.json().await.map_err(|e| CollectionError::Transient(e.to_string()))
            })
            .await?;
        let cloud_request_id = CloudRequestId(response.cloud_request_id);
        self.pending_queue.lock().insert(cloud_request_id.0.clone(), request.privilege);
        Ok(cloud_request_id)
    }

    async fn status(&self, cloud_request_id: &CloudRequestId) -> Result<CommandResult, CollectionError> {
        // `status` must poll the same queue `run` submitted to — RTR keeps
        // read/active-responder/admin commands in separate queues, and
        // polling the wrong one 404s even for a request id that exists.
        let privilege = self.pending_queue.lock().get(&cloud_request_id.0).copied().unwrap_or(Privilege::Responder);
        let endpoint = match privilege {
            Privilege::Read => "real-time-response/entities/command/v1",
            Privilege::Responder => "real-time-response/entities/active-responder-command/v1",
            Privilege::Admin => "real-time-response/entities/admin-command/v1",
        };
        let response: StatusResponse = self
            .with_retry(|| async {
                let token = self.bearer_token().await?;
                let url = format!("{}/{endpoint}", self.credentials.base_url);
                let response = self
                    .authed(self.http.get(&url).query(&[("cloud_request_id", cloud_request_id.0.as_str())]), &token)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let response = check_status(response).await?;
                response.json().await.map_err(|e| CollectionError::Transient(e.to_string()))
            })
            .await?;
        let status = if !response.complete {
            CommandStatus::Running
        } else if response.return_code.unwrap_or(1) == 0 {
            CommandStatus::Complete
        } else {
            CommandStatus::Failed
        };
        if status.is_terminal() {
            self.pending_queue.lock().remove(&cloud_request_id.0);
        }
        Ok(CommandResult { status, stdout: response.stdout, stderr: response.stderr, exit_code: response.return_code })
    }

    async fn list_files(&self, session_id: &SessionId) -> Result<Vec<RemoteFileDescriptor>, CollectionError> {
        let entries: Vec<FileListEntry> = self
            .with_retry(|| async {
                let token = self.bearer_token().await?;
                let url = format!("{}/real-time-response/entities/file/v2", self.credentials.base_url);
                let response = self
                    .authed(self.http.get(&url).query(&[("session_id", session_id.as_str())]), &token)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let response = check_status(response).await?;
                response.json().await.map_err(|e| CollectionError::Transient(e.to_string()))
            })
            .await?;
        Ok(entries
            .into_iter()
            .map(|e| RemoteFileDescriptor { path: e.name, size_bytes: e.size, sha256: e.sha256 })
            .collect())
    }

    async fn fetch_file(&self, session_id: &SessionId, sha256: &str) -> Result<BoxStream<'static, FileChunk>, CollectionError> {
        let token = self.bearer_token().await?;
        let url = format!("{}/real-time-response/entities/extracted-file-contents/v1", self.credentials.base_url);
        let response = self
            .authed(self.http.get(&url).query(&[("session_id", session_id.as_str()), ("sha256", sha256)]), &token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let stream = response.bytes_stream().map_err(transport_error);
        Ok(Box::pin(stream))
    }

    async fn close(&self, session_id: &SessionId) -> Result<(), CollectionError> {
        self.with_retry(|| async {
            let token = self.bearer_token().await?;
            let url = format!("{}/real-time-response/entities/sessions/v1", self.credentials.base_url);
            let response = self
                .authed(self.http.delete(&url).query(&[("session_id", session_id.as_str())]), &token)
                .send()
                .await
                .map_err(transport_error)?;
            check_status(response).await?;
            Ok(())
        })
        .await
    }
}
