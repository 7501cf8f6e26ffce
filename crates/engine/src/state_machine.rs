// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The collection state machine (§4.3) — the core of the system.
//! `PRECHECK → DEPLOY → LAUNCH → RUN_MONITOR → FILE_WAIT → STABILIZE →
//! FETCH → UPLOAD → VERIFY`, with `CLEAN` always attempted best-effort on
//! both the success and failure paths.
//!
//! Modeled on the teacher's `engine::runtime` phase-handler shape (one
//! function per transition, returning a typed outcome) with the
//! Effect/Event plumbing replaced by the `async-trait` façades in
//! `fnerd-rtr`, `fnerd-transfer`, and `fnerd-objectstore`.

use crate::session_manager::SessionManager;
use async_trait::async_trait;
use fnerd_core::clock::{Clock, SystemClock};
use fnerd_core::command::{CommandRequest, CommandResult, Privilege};
use fnerd_core::error::{CollectionError, ErrorKind};
use fnerd_core::host::{Host, Platform};
use fnerd_core::job::{CollectionJob, FailureDetail, JobPhase, Outcome, Tool};
use fnerd_core::objectstore_record::ObjectStoreRecord;
use fnerd_core::progress::ProgressEvent;
use fnerd_core::remote_artifact::RemoteArtifact;
use fnerd_core::session::SessionId;
use fnerd_objectstore::ObjectStoreUploader;
use fnerd_rtr::RtrClient;
use fnerd_transfer::{ArchiveUnwrapper, CommandExecutor, DownloadedFile, TransferManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn payload_archive_name(tool: Tool) -> &'static str {
    match tool {
        Tool::Kape => "kape.zip",
        Tool::Uac => "uac.zip",
        Tool::BrowserHistory => "browser_history.zip",
    }
}

fn expected_entry_for(tool: Tool) -> &'static str {
    match tool {
        Tool::Kape => "kape.exe",
        Tool::Uac => "uac",
        Tool::BrowserHistory => "browser_history_collector",
    }
}

fn invocation_for(tool: Tool, workspace: &str) -> String {
    match tool {
        Tool::Kape => format!("kape.exe --tsource C: --tdest {workspace}\\out --target !BasicCollection --vhdx out --zip out"),
        Tool::Uac => format!("./uac -p ir_triage -o {workspace} {workspace}"),
        Tool::BrowserHistory => format!("./browser_history_collector --out {workspace}"),
    }
}

fn primary_glob(tool: Tool) -> &'static str {
    match tool {
        Tool::Kape => "*.vhdx",
        Tool::Uac => "*.tar.gz",
        Tool::BrowserHistory => "*.zip",
    }
}

const SECONDARY_GLOB: &str = "*.7z";

fn join_path(workspace: &str, name: &str, platform: Platform) -> String {
    if platform == Platform::Windows {
        format!("{workspace}\\{name}")
    } else {
        format!("{workspace}/{name}")
    }
}

fn tool_name(tool: Tool) -> &'static str {
    match tool {
        Tool::Kape => "kape",
        Tool::Uac => "uac",
        Tool::BrowserHistory => "browser_history",
    }
}

/// Deterministic object-store key: `{tool}/{hostname}/{epoch_ms}_{hostname}_out.{ext}`
/// (§4.3 UPLOAD).
fn object_key(tool: Tool, hostname: &str, epoch_ms: u64, downloaded: &DownloadedFile) -> String {
    let suffix = downloaded.local_path.extension().and_then(|e| e.to_str()).unwrap_or("bin");
    format!("{}/{hostname}/{epoch_ms}_{hostname}_out.{suffix}", tool_name(tool))
}

#[derive(Default)]
struct JobContext {
    session_id: Option<SessionId>,
    workspace: String,
}

/// Drives one [`CollectionJob`] through every phase, given the façades
/// built over an [`RtrClient`] and an [`ObjectStoreUploader`].
pub struct CollectionEngine<R, O, C = SystemClock>
where
    R: RtrClient + 'static,
    O: ObjectStoreUploader,
    C: Clock,
{
    sessions: Arc<SessionManager<R, C>>,
    transfer: Arc<TransferManager<SessionManager<R, C>, R>>,
    objectstore: Arc<O>,
    config: fnerd_core::config::Config,
    clock: C,
    bucket: String,
}

impl<R, O, C> CollectionEngine<R, O, C>
where
    R: RtrClient + 'static,
    O: ObjectStoreUploader,
    C: Clock,
{
    pub fn new(
        rtr: Arc<R>,
        objectstore: Arc<O>,
        config: fnerd_core::config::Config,
        clock: C,
        bucket: impl Into<String>,
        unwrapper: Arc<dyn ArchiveUnwrapper>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(rtr.clone(), clock.clone(), config.timeouts.session_idle));
        let transfer = Arc::new(TransferManager::new(sessions.clone(), rtr, unwrapper));
        Self { sessions, transfer, objectstore, config, clock, bucket: bucket.into() }
    }

    /// Runs `job` against `host` to completion (success or failure), always
    /// attempting CLEAN before returning. Progress events are sent
    /// non-blocking via `try_send`; a slow or absent consumer never stalls
    /// the job (§5).
    pub async fn run_job(&self, mut job: CollectionJob, host: Host, cancel: CancellationToken, progress_tx: mpsc::Sender<ProgressEvent>) -> (CollectionJob, Outcome) {
        let mut ctx = JobContext::default();
        let result = self.drive(&mut job, &host, &mut ctx, &cancel, &progress_tx).await;
        self.clean(&job, &host, &ctx).await;

        let outcome = match result {
            Ok(record) => {
                job.phase = JobPhase::Done;
                job.object_store_record = Some(record.clone());
                Outcome::Succeeded { record }
            }
            Err(detail) => {
                job.phase = JobPhase::Fail(detail.clone());
                Outcome::Failed(detail)
            }
        };
        (job, outcome)
    }

    async fn drive(
        &self,
        job: &mut CollectionJob,
        host: &Host,
        ctx: &mut JobContext,
        cancel: &CancellationToken,
        progress_tx: &mpsc::Sender<ProgressEvent>,
    ) -> Result<ObjectStoreRecord, FailureDetail> {
        self.precheck(job, host)?;
        self.emit(progress_tx, job);

        let session_id = self.sessions.acquire(&host.aid).await.map_err(|e| Self::fail("deploy", e))?;
        ctx.session_id = Some(session_id.clone());

        self.deploy(job, host, &session_id, ctx).await?;
        self.emit(progress_tx, job);

        self.launch(job, host, &session_id, ctx).await?;
        self.emit(progress_tx, job);

        self.run_monitor(job, host, &session_id, ctx, cancel).await?;
        self.emit(progress_tx, job);

        let remote_path = self.file_wait_stabilize(job, host, &session_id, ctx, cancel).await?;
        self.emit(progress_tx, job);

        let downloaded = self.fetch(job, host, &session_id, &remote_path).await?;
        self.emit(progress_tx, job);

        self.apply_host_entries(job, host, &session_id).await?;
        self.emit(progress_tx, job);

        let provisional = self.upload(job, host, &downloaded).await;
        self.emit(progress_tx, job);

        let record = self.verify(job, &provisional, &downloaded).await?;
        self.emit(progress_tx, job);

        Ok(record)
    }

    fn precheck(&self, job: &mut CollectionJob, host: &Host) -> Result<(), FailureDetail> {
        job.phase = JobPhase::Precheck;
        if !host.online {
            return Err(FailureDetail::new("precheck", ErrorKind::Offline, format!("{} is not checked in", host.hostname)));
        }
        if !job.tool.supports(host.platform) {
            return Err(FailureDetail::new(
                "precheck",
                ErrorKind::PlatformMismatch,
                format!("{:?} does not support {}", job.tool, host.platform),
            ));
        }
        Ok(())
    }

    async fn deploy(&self, job: &mut CollectionJob, host: &Host, session_id: &SessionId, ctx: &mut JobContext) -> Result<(), FailureDetail> {
        job.phase = JobPhase::Deploy;
        let adapter = fnerd_platform::for_platform(host.platform);
        let workspace = self.config.workspace_dir(host.platform).to_string();
        ctx.workspace = workspace.clone();

        self.exec(session_id, adapter.mkdir_p(&workspace), self.config.timeouts.command, "deploy").await?;

        let payload_name = payload_archive_name(job.tool);
        let put_request = CommandRequest::new(Privilege::Responder, "put", payload_name);
        let put_result = self.exec(session_id, put_request, self.config.timeouts.command, "deploy").await?;
        if !put_result.succeeded() {
            return Err(FailureDetail::new("deploy", ErrorKind::Transient, "put_denied"));
        }

        let archive_path = join_path(&workspace, payload_name, host.platform);
        let expected_entry = expected_entry_for(job.tool);
        let expand_result = self.exec(session_id, adapter.expand_archive(&archive_path, &workspace, expected_entry), self.config.timeouts.command, "deploy").await?;
        if !expand_result.succeeded() {
            return Err(FailureDetail::new("deploy", ErrorKind::Integrity, "extract_failed"));
        }
        Ok(())
    }

    async fn launch(&self, job: &mut CollectionJob, host: &Host, session_id: &SessionId, ctx: &JobContext) -> Result<(), FailureDetail> {
        job.phase = JobPhase::Launch;
        let adapter = fnerd_platform::for_platform(host.platform);
        let invocation = invocation_for(job.tool, &ctx.workspace);
        let result = self.exec(session_id, adapter.launch_background(&ctx.workspace, &invocation), self.config.timeouts.command, "launch").await?;
        if !result.succeeded() {
            return Err(FailureDetail::new("launch", ErrorKind::Transient, "launch command did not acknowledge"));
        }
        Ok(())
    }

    async fn run_monitor(
        &self,
        job: &mut CollectionJob,
        host: &Host,
        session_id: &SessionId,
        ctx: &JobContext,
        cancel: &CancellationToken,
    ) -> Result<(), FailureDetail> {
        job.phase = JobPhase::RunMonitor;
        let adapter = fnerd_platform::for_platform(host.platform);
        let deadline = self.clock.now() + self.config.timeouts.run;

        loop {
            if cancel.is_cancelled() {
                return Err(FailureDetail::new("run_monitor", ErrorKind::Cancelled, "cancelled"));
            }
            let _ = self.sessions.pulse_now(session_id).await;

            let sentinel = self.exec(session_id, adapter.read_exit_sentinel(&ctx.workspace), self.config.timeouts.command, "run_monitor").await?;
            if let Some(code) = adapter.parse_exit_sentinel(&sentinel.stdout) {
                if code == 0 {
                    return Ok(());
                }
                return Err(FailureDetail::new("run_monitor", ErrorKind::Transient, format!("tool exited with code {code}")));
            }

            if self.clock.now() >= deadline {
                return Err(FailureDetail::new("run_monitor", ErrorKind::Timeout, "exceeded maximum run duration"));
            }
            tokio::time::sleep(self.config.timeouts.progress_poll).await;
        }
    }

    /// Covers both FILE_WAIT (wait for the primary output to appear) and
    /// STABILIZE (sample until two consecutive identical non-zero
    /// size/mtime readings), and repeats the pair for Kape's secondary
    /// archive (§3 two-phase stabilization protocol).
    async fn file_wait_stabilize(
        &self,
        job: &mut CollectionJob,
        host: &Host,
        session_id: &SessionId,
        ctx: &JobContext,
        cancel: &CancellationToken,
    ) -> Result<String, FailureDetail> {
        let primary_path = self
            .await_and_stabilize(job, host, session_id, ctx, primary_glob(job.tool), self.config.timeouts.primary, "primary_unstable", cancel)
            .await?;

        if !job.tool.has_two_phase_output() {
            return Ok(primary_path);
        }

        self.await_and_stabilize(job, host, session_id, ctx, SECONDARY_GLOB, self.config.timeouts.secondary, "secondary_unstable", cancel).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn await_and_stabilize(
        &self,
        job: &mut CollectionJob,
        host: &Host,
        session_id: &SessionId,
        ctx: &JobContext,
        glob: &str,
        stability_timeout: Duration,
        timeout_tag: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FailureDetail> {
        job.phase = JobPhase::FileWait;
        let adapter = fnerd_platform::for_platform(host.platform);
        let appearance_deadline = self.clock.now() + stability_timeout;

        let path = loop {
            if cancel.is_cancelled() {
                return Err(FailureDetail::new("file_wait", ErrorKind::Cancelled, "cancelled"));
            }
            let listing = self.exec(session_id, adapter.list_glob(&ctx.workspace, glob), self.config.timeouts.command, "file_wait").await?;
            if let Some(first) = listing.stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                break first.to_string();
            }
            if self.clock.now() >= appearance_deadline {
                return Err(FailureDetail::new("file_wait", ErrorKind::Timeout, format!("no file matching {glob} appeared")));
            }
            tokio::time::sleep(self.config.timeouts.stability).await;
        };

        job.phase = JobPhase::Stabilize;
        let stability_deadline = self.clock.now() + stability_timeout;
        let mut previous: Option<RemoteArtifact> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(FailureDetail::new("stabilize", ErrorKind::Cancelled, "cancelled"));
            }
            let sample = self
                .transfer
                .remote_stat(session_id, host.platform, &path, self.config.timeouts.command)
                .await
                .map_err(|e| Self::fail("stabilize", e))?;

            match (&sample, &previous) {
                (Some(current), Some(prev)) if current.is_stable_against(prev) => return Ok(path),
                _ => previous = sample,
            }

            if self.clock.now() >= stability_deadline {
                return Err(FailureDetail::new("stabilize", ErrorKind::Timeout, timeout_tag.to_string()));
            }
            tokio::time::sleep(self.config.timeouts.stability).await;
        }
    }

    async fn fetch(&self, job: &mut CollectionJob, host: &Host, session_id: &SessionId, remote_path: &str) -> Result<DownloadedFile, FailureDetail> {
        job.phase = JobPhase::Fetch;

        let get_request = CommandRequest::new(Privilege::Responder, "get", remote_path);
        let get_result = self.exec(session_id, get_request, self.config.timeouts.fetch, "fetch").await?;
        if !get_result.succeeded() {
            return Err(FailureDetail::new("fetch", ErrorKind::Transient, "fetch_failed: get command rejected"));
        }

        let descriptor = self
            .transfer
            .list_session_files(session_id)
            .await
            .map_err(|e| Self::fail("fetch", e))?
            .into_iter()
            .find(|f| remote_path.ends_with(f.path.as_str()) || f.path.ends_with(remote_path))
            .ok_or_else(|| FailureDetail::new("fetch", ErrorKind::NotFound, "fetch_failed: file not staged after get"))?;

        let sha256 = match descriptor.sha256 {
            Some(sha) => sha,
            None => self
                .transfer
                .remote_sha256(session_id, host.platform, remote_path, self.config.timeouts.command)
                .await
                .map_err(|e| Self::fail("fetch", e))?
                .ok_or_else(|| FailureDetail::new("fetch", ErrorKind::Integrity, "fetch_failed: unable to establish remote sha256"))?,
        };

        let file_name = remote_path.rsplit(['/', '\\']).next().unwrap_or("artifact.bin");
        let local_path = std::env::temp_dir().join("fnerd").join(job.id.as_str()).join(file_name);

        self.transfer.download_session_file(session_id, &sha256, &local_path).await.map_err(|e| Self::fail("fetch", e))
    }

    /// Appends any configured `host_entries` (§6) to the host's local
    /// name-resolution file, to support split-horizon object-store
    /// endpoints. A no-op when the config carries none.
    async fn apply_host_entries(&self, job: &mut CollectionJob, host: &Host, session_id: &SessionId) -> Result<(), FailureDetail> {
        let adapter = fnerd_platform::for_platform(host.platform);
        let Some(request) = adapter.append_host_entries(&self.config.host_entries) else {
            return Ok(());
        };
        job.phase = JobPhase::Upload;
        let result = self.exec(session_id, request, self.config.timeouts.command, "upload").await?;
        if !result.succeeded() {
            return Err(FailureDetail::new("upload", ErrorKind::Transient, "host_entries_append_failed"));
        }
        Ok(())
    }

    /// Uploads the fetched artifact. The call's own `Ok`/`Err` is advisory
    /// only — `verify` is the sole trusted success signal (§4.3 VERIFY
    /// regression guard) — so a failed upload here does not short-circuit
    /// the pipeline; it is simply logged and verification is attempted
    /// anyway in case the bytes landed despite a misreported error.
    async fn upload(&self, job: &mut CollectionJob, host: &Host, downloaded: &DownloadedFile) -> ObjectStoreRecord {
        job.phase = JobPhase::Upload;
        let key = object_key(job.tool, &host.hostname, self.clock.epoch_ms(), downloaded);
        if let Err(err) = self.objectstore.upload(&self.bucket, &key, &downloaded.local_path).await {
            tracing::warn!(hostname = %host.hostname, error = %err, "upload call reported failure, deferring to head() for the authoritative result");
        }
        ObjectStoreRecord::new(self.bucket.clone(), key, downloaded.size_bytes, String::new())
    }

    async fn verify(&self, job: &mut CollectionJob, provisional: &ObjectStoreRecord, downloaded: &DownloadedFile) -> Result<ObjectStoreRecord, FailureDetail> {
        job.phase = JobPhase::Verify;
        let record = self
            .objectstore
            .head(&provisional.bucket, &provisional.key)
            .await
            .map_err(|e| FailureDetail::new("verify", ErrorKind::Integrity, format!("upload_unverified: {}", e.detail())))?;
        if record.size_bytes != downloaded.size_bytes {
            return Err(FailureDetail::new("verify", ErrorKind::Integrity, "upload_unverified: size mismatch"));
        }
        Ok(record)
    }

    /// Best-effort cleanup: remove the host workspace and close the
    /// session. Failures here are logged but never turn a successful job
    /// into a failed one, or vice versa (§4.3 CLEAN).
    async fn clean(&self, job: &CollectionJob, host: &Host, ctx: &JobContext) {
        if let Some(session_id) = &ctx.session_id {
            if !ctx.workspace.is_empty() {
                let adapter = fnerd_platform::for_platform(host.platform);
                let request = adapter.rmrf(&ctx.workspace);
                if let Err(err) = self.sessions.execute(session_id, &request, self.config.timeouts.command).await {
                    tracing::warn!(job_id = %job.id, error = %err, "clean: rmrf failed, continuing");
                }
            }
            if let Err(err) = self.sessions.release(session_id).await {
                tracing::warn!(job_id = %job.id, error = %err, "clean: session close failed, continuing");
            }
        }
    }

    fn fail(phase: &str, err: CollectionError) -> FailureDetail {
        FailureDetail::new(phase, err.kind(), err.detail())
    }

    async fn exec(&self, session_id: &SessionId, request: CommandRequest, timeout: Duration, phase: &str) -> Result<CommandResult, FailureDetail> {
        self.sessions.execute(session_id, &request, timeout).await.map_err(|e| Self::fail(phase, e))
    }

    fn emit(&self, progress_tx: &mpsc::Sender<ProgressEvent>, job: &CollectionJob) {
        let _ = progress_tx.try_send(ProgressEvent::new(job.hostname.clone(), job.phase.clone(), self.clock.epoch_ms()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnerd_core::clock::FakeClock;
    use fnerd_core::host::{AgentId, TenantId};
    use fnerd_objectstore::fake::FakeObjectStore;
    use fnerd_rtr::fake::FakeRtrClient;
    use fnerd_transfer::PassthroughUnwrapper;

    fn host(hostname: &str, platform: Platform, online: bool) -> Host {
        Host { aid: AgentId::new("aid-1"), cid: TenantId::new("cid-1"), hostname: hostname.to_string(), platform, last_seen_epoch_ms: 0, online }
    }

    fn engine(objectstore: FakeObjectStore, rtr: FakeRtrClient) -> CollectionEngine<FakeRtrClient, FakeObjectStore, FakeClock> {
        engine_with_config(objectstore, rtr, fnerd_core::config::Config::default())
    }

    fn engine_with_config(objectstore: FakeObjectStore, rtr: FakeRtrClient, config: fnerd_core::config::Config) -> CollectionEngine<FakeRtrClient, FakeObjectStore, FakeClock> {
        CollectionEngine::new(Arc::new(rtr), Arc::new(objectstore), config, FakeClock::new(), "forensics", Arc::new(PassthroughUnwrapper))
    }

    #[tokio::test]
    async fn precheck_fails_fast_for_offline_host() {
        let engine = engine(FakeObjectStore::new(), FakeRtrClient::new());
        let job = CollectionJob::new(AgentId::new("aid-1"), "WIN-1", Tool::Kape);
        let host = host("WIN-1", Platform::Windows, false);
        let (job, outcome) = engine.run_job(job, host, CancellationToken::new(), mpsc::channel(8).0).await;
        match outcome {
            Outcome::Failed(detail) => {
                assert_eq!(detail.phase, "precheck");
                assert_eq!(detail.kind, ErrorKind::Offline);
            }
            Outcome::Succeeded { .. } => panic!("expected failure"),
        }
        assert!(matches!(job.phase, JobPhase::Fail(_)));
    }

    #[tokio::test]
    async fn precheck_fails_fast_for_platform_mismatch() {
        let engine = engine(FakeObjectStore::new(), FakeRtrClient::new());
        let job = CollectionJob::new(AgentId::new("aid-1"), "LNX-1", Tool::Kape);
        let host = host("LNX-1", Platform::Linux, true);
        let (_, outcome) = engine.run_job(job, host, CancellationToken::new(), mpsc::channel(8).0).await;
        match outcome {
            Outcome::Failed(detail) => assert_eq!(detail.kind, ErrorKind::PlatformMismatch),
            Outcome::Succeeded { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn deploy_and_launch_succeed_then_run_monitor_times_out_without_a_sentinel() {
        // The fake RTR client completes every command immediately with empty
        // stdout, so `parse_exit_sentinel` never finds a sentinel to parse.
        // With a zero run budget, RUN_MONITOR must time out on its first
        // iteration rather than loop forever — this exercises
        // PRECHECK/DEPLOY/LAUNCH succeeding before the expected RUN_MONITOR
        // failure.
        let mut config = fnerd_core::config::Config::default();
        config.timeouts.run = Duration::from_millis(0);
        let engine = engine_with_config(FakeObjectStore::new(), FakeRtrClient::new(), config);

        let job = CollectionJob::new(AgentId::new("aid-1"), "LNX-1", Tool::BrowserHistory);
        let host = host("LNX-1", Platform::Linux, true);

        let (job, outcome) = engine.run_job(job, host, CancellationToken::new(), mpsc::channel(8).0).await;
        match outcome {
            Outcome::Failed(detail) => {
                assert_eq!(detail.phase, "run_monitor");
                assert_eq!(detail.kind, ErrorKind::Timeout);
            }
            Outcome::Succeeded { .. } => panic!("fake never emits an exit sentinel, run_monitor should time out"),
        }
        assert!(matches!(job.phase, JobPhase::Fail(_)));
    }

    #[tokio::test]
    async fn cancellation_during_run_monitor_is_reported_as_cancelled() {
        let mut config = fnerd_core::config::Config::default();
        config.timeouts.progress_poll = Duration::from_millis(10);
        let engine = engine_with_config(FakeObjectStore::new(), FakeRtrClient::new(), config);

        let job = CollectionJob::new(AgentId::new("aid-1"), "LNX-1", Tool::Uac);
        let host = host("LNX-1", Platform::Linux, true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (_, outcome) = engine.run_job(job, host, cancel, mpsc::channel(8).0).await;
        match outcome {
            Outcome::Failed(detail) => assert_eq!(detail.kind, ErrorKind::Cancelled),
            Outcome::Succeeded { .. } => panic!("expected cancellation"),
        }
    }
}
