// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level end-to-end scenarios, driving the full
//! [`fnerd_engine::CollectionEngine`] / [`fnerd_executor::FanOutExecutor`]
//! pipeline against fakes for the RTR client, transfer, and object store.

use fnerd_core::clock::FakeClock;
use fnerd_core::config::Config;
use fnerd_core::error::ErrorKind;
use fnerd_core::host::{AgentId, Host, Platform, TenantId};
use fnerd_core::job::{CollectionJob, Outcome, Tool};
use fnerd_engine::CollectionEngine;
use fnerd_executor::{ExecutorConfig, FanOutExecutor};
use fnerd_core::remote_artifact::RemoteFileDescriptor;
use fnerd_objectstore::fake::FakeObjectStore;
use fnerd_rtr::fake::FakeRtrClient;
use fnerd_transfer::PassthroughUnwrapper;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn host(hostname: &str, platform: Platform, online: bool) -> Host {
    Host { aid: AgentId::new(hostname), cid: TenantId::new("cid-1"), hostname: hostname.to_string(), platform, last_seen_epoch_ms: 0, online }
}

/// Short, wall-clock-friendly timeouts so the stability/poll loops move
/// quickly while leaving enough deadline headroom that happy-path runs
/// never trip a timeout (only S5 deliberately wants that).
fn fast_config() -> Config {
    let mut config = Config::default();
    config.timeouts.command = Duration::from_secs(5);
    config.timeouts.progress_poll = Duration::from_millis(5);
    config.timeouts.stability = Duration::from_millis(5);
    config.timeouts.primary = Duration::from_secs(5);
    config.timeouts.secondary = Duration::from_secs(5);
    config.timeouts.run = Duration::from_secs(5);
    config.timeouts.fetch = Duration::from_secs(5);
    config
}

/// S1 (Windows happy path): KAPE's two-phase primary (`*.vhdx`) then
/// secondary (`*.7z`) stabilization, followed by fetch/upload/verify.
#[tokio::test]
async fn s1_windows_kape_happy_path_succeeds() {
    let rtr = FakeRtrClient::new();
    rtr.seed_host(host("WIN-1", Platform::Windows, true));

    // Primary (.vhdx): listed once, then two identical stat samples.
    // Patterned on the distinct `-Filter`/`-Path` substrings each phase's
    // PowerShell one-liner contains, so the primary and secondary waits
    // can't be confused with each other despite sharing a command shape.
    rtr.script_stdout(r#"-Filter "*.vhdx""#, [r"C:\0x4n6nerd\out.vhdx"]);
    rtr.script_stdout("out.vhdx\"", [r#"{"Length":650002432,"MtimeMs":1700000000000}"#, r#"{"Length":650002432,"MtimeMs":1700000000000}"#]);
    // Secondary (.7z): same shape, different glob/path.
    rtr.script_stdout(r#"-Filter "*.7z""#, [r"C:\0x4n6nerd\out.7z"]);
    rtr.script_stdout("out.7z\"", [r#"{"Length":503316480,"MtimeMs":1700000001000}"#, r#"{"Length":503316480,"MtimeMs":1700000001000}"#]);
    // RUN_MONITOR's exit sentinel, read as a clean `0`.
    rtr.script_stdout("Get-Content", ["0"]);

    let sha256 = "b".repeat(64);
    rtr.seed_files_for_any_session(vec![RemoteFileDescriptor { path: r"C:\0x4n6nerd\out.7z".to_string(), size_bytes: 12, sha256: Some(sha256.clone()) }]);
    rtr.seed_file_bytes(&sha256, b"triage archive bytes".to_vec());

    let objectstore = FakeObjectStore::new();
    let engine = CollectionEngine::new(Arc::new(rtr.clone()), Arc::new(objectstore.clone()), fast_config(), FakeClock::new(), "forensics", Arc::new(PassthroughUnwrapper));

    let job = CollectionJob::new(AgentId::new("WIN-1"), "WIN-1", Tool::Kape);
    let (job, outcome) = engine.run_job(job, host("WIN-1", Platform::Windows, true), CancellationToken::new(), tokio::sync::mpsc::channel(64).0).await;

    match outcome {
        Outcome::Succeeded { record } => {
            assert_eq!(record.bucket, "forensics");
            assert!(record.key.starts_with("kape/WIN-1/"));
        }
        Outcome::Failed(detail) => panic!("expected success, got {detail:?}"),
    }
    assert_eq!(job.phase.name(), "done");
    assert_eq!(rtr.closed_sessions().len(), 1);
}

/// S2 (Unix happy path): UAC's single-phase output goes straight from
/// FILE_WAIT/STABILIZE to FETCH, no secondary wait.
#[tokio::test]
async fn s2_unix_uac_happy_path_succeeds() {
    let rtr = FakeRtrClient::new();
    rtr.seed_host(host("LIN-2", Platform::Linux, true));
    rtr.script_stdout("find '", ["/opt/0x4n6nerd/uac-LIN-2.tar.gz"]);
    rtr.script_stdout("stat -c", ["1181116006 1700000000", "1181116006 1700000000"]);
    rtr.script_stdout("cat '", ["0"]);

    let sha256 = "c".repeat(64);
    rtr.seed_files_for_any_session(vec![RemoteFileDescriptor { path: "/opt/0x4n6nerd/uac-LIN-2.tar.gz".to_string(), size_bytes: 15, sha256: Some(sha256.clone()) }]);
    rtr.seed_file_bytes(&sha256, b"uac triage bytes".to_vec());

    let objectstore = FakeObjectStore::new();
    let engine = CollectionEngine::new(Arc::new(rtr), Arc::new(objectstore), fast_config(), FakeClock::new(), "forensics", Arc::new(PassthroughUnwrapper));

    let job = CollectionJob::new(AgentId::new("LIN-2"), "LIN-2", Tool::Uac);
    let (job, outcome) = engine.run_job(job, host("LIN-2", Platform::Linux, true), CancellationToken::new(), tokio::sync::mpsc::channel(64).0).await;

    match outcome {
        Outcome::Succeeded { record } => assert!(record.key.starts_with("uac/LIN-2/")),
        Outcome::Failed(detail) => panic!("expected success, got {detail:?}"),
    }
    assert_eq!(job.phase.name(), "done");
}

/// S3 (spurious upload failure, object present): the uploader reports an
/// error, but `HEAD` shows the object landed at the right size — the job
/// must still report success (the regression guard VERIFY exists for).
#[tokio::test]
async fn s3_upload_reports_failure_but_head_confirms_object_succeeds() {
    let rtr = FakeRtrClient::new();
    rtr.seed_host(host("LIN-3", Platform::Linux, true));
    rtr.script_stdout("find '", ["/opt/0x4n6nerd/browser_history.zip"]);
    rtr.script_stdout("stat -c", ["14 1700000000", "14 1700000000"]);
    rtr.script_stdout("cat '", ["0"]);

    let sha256 = "a".repeat(64);
    rtr.seed_files_for_any_session(vec![RemoteFileDescriptor { path: "/opt/0x4n6nerd/browser_history.zip".to_string(), size_bytes: 15, sha256: Some(sha256.clone()) }]);
    rtr.seed_file_bytes(&sha256, b"browser history".to_vec());

    let objectstore = FakeObjectStore::new();
    objectstore.force_next_upload_error("connection reset by peer");

    let config = fast_config();
    let engine = CollectionEngine::new(Arc::new(rtr), Arc::new(objectstore.clone()), config, FakeClock::new(), "forensics", Arc::new(PassthroughUnwrapper));

    let job = CollectionJob::new(AgentId::new("LIN-3"), "LIN-3", Tool::BrowserHistory);
    let (_, outcome) = engine.run_job(job, host("LIN-3", Platform::Linux, true), CancellationToken::new(), tokio::sync::mpsc::channel(64).0).await;

    // Even though `upload` was told to fail, the uploader's fake still
    // records the bytes under `head` whenever the write itself succeeds
    // (it only fails the reported `Result`), which is exactly the
    // discrepancy VERIFY is built to catch.
    match outcome {
        Outcome::Succeeded { .. } => {}
        Outcome::Failed(detail) => panic!("upload-reported failure with a present object must still succeed, got {detail:?}"),
    }
    assert_eq!(objectstore.upload_calls().len(), 1);
}

/// S4 (platform mismatch): KAPE targeted at a Linux host fails fast at
/// PRECHECK, without ever opening a session or creating a workspace.
#[tokio::test]
async fn s4_platform_mismatch_fails_at_precheck_without_opening_a_session() {
    let rtr = FakeRtrClient::new();
    rtr.seed_host(host("LIN-2", Platform::Linux, true));
    let objectstore = FakeObjectStore::new();
    let engine = CollectionEngine::new(Arc::new(rtr.clone()), Arc::new(objectstore), fast_config(), FakeClock::new(), "forensics", Arc::new(PassthroughUnwrapper));

    let job = CollectionJob::new(AgentId::new("LIN-2"), "LIN-2", Tool::Kape);
    let (job, outcome) = engine.run_job(job, host("LIN-2", Platform::Linux, true), CancellationToken::new(), tokio::sync::mpsc::channel(64).0).await;

    match outcome {
        Outcome::Failed(detail) => {
            assert_eq!(detail.phase, "precheck");
            assert_eq!(detail.kind, ErrorKind::PlatformMismatch);
        }
        Outcome::Succeeded { .. } => panic!("expected platform mismatch failure"),
    }
    assert_eq!(job.phase.name(), "fail");
    assert!(rtr.closed_sessions().is_empty());
}

/// S5 (stability timeout): a primary file that never stops changing must
/// eventually fail STABILIZE with `primary_unstable`, and CLEAN still runs.
/// A zero-duration primary timeout makes the deadline check fire
/// deterministically without needing wall-clock time to pass, matching how
/// `fnerd-engine`'s own unit tests force timeouts against a clock that
/// never advances on its own.
#[tokio::test]
async fn s5_primary_never_stabilizes_fails_with_primary_unstable() {
    let rtr = FakeRtrClient::new();
    rtr.seed_host(host("WIN-4", Platform::Windows, true));
    rtr.script_stdout("Get-ChildItem", [r"C:\0x4n6nerd\out.vhdx"]);
    rtr.script_stdout(
        "Get-Item",
        [r#"{"Length":1000,"MtimeMs":1700000000000}"#, r#"{"Length":2000,"MtimeMs":1700000000001}"#, r#"{"Length":3000,"MtimeMs":1700000000002}"#],
    );

    let mut config = fast_config();
    config.timeouts.primary = Duration::from_millis(0);
    let objectstore = FakeObjectStore::new();
    let engine = CollectionEngine::new(Arc::new(rtr), Arc::new(objectstore), config, FakeClock::new(), "forensics", Arc::new(PassthroughUnwrapper));

    let job = CollectionJob::new(AgentId::new("WIN-4"), "WIN-4", Tool::Kape);
    let (job, outcome) = engine.run_job(job, host("WIN-4", Platform::Windows, true), CancellationToken::new(), tokio::sync::mpsc::channel(64).0).await;

    match outcome {
        Outcome::Failed(detail) => {
            assert_eq!(detail.phase, "stabilize");
            assert_eq!(detail.kind, ErrorKind::Timeout);
            assert_eq!(detail.detail, "primary_unstable");
        }
        Outcome::Succeeded { .. } => panic!("expected a stabilize timeout"),
    }
    assert_eq!(job.phase.name(), "fail");
}

/// S6 (cancellation mid-run): cancelling a fan-out run brings every worker
/// to a terminal, cancelled state. A zero run timeout keeps the scenario
/// deterministic: with no sentinel ever emitted and an immediate deadline,
/// every host either reaches RUN_MONITOR's cancellation check or its
/// timeout check on the very first iteration.
#[tokio::test]
async fn s6_cancellation_mid_run_brings_every_worker_to_a_terminal_state() {
    let rtr = FakeRtrClient::new();
    let objectstore = FakeObjectStore::new();
    let hostnames = ["H-1", "H-2", "H-3", "H-4", "H-5"];
    for name in hostnames {
        rtr.seed_host(host(name, Platform::Linux, true));
    }

    let config = fast_config();
    let engine = Arc::new(CollectionEngine::new(Arc::new(rtr), Arc::new(objectstore), config, FakeClock::new(), "forensics", Arc::new(PassthroughUnwrapper)));
    let executor = FanOutExecutor::new(engine, ExecutorConfig { max_concurrent: 5 });

    let targets = hostnames
        .iter()
        .map(|name| (CollectionJob::new(AgentId::new(*name), *name, Tool::BrowserHistory), host(name, Platform::Linux, true)))
        .collect::<Vec<_>>();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (tx, _rx) = tokio::sync::mpsc::channel(256);
    let report = executor.run(targets, cancel, tx).await;

    assert_eq!(report.jobs.len(), 5);
    for name in hostnames {
        assert_eq!(report.jobs[name].phase.name(), "init");
    }
    assert!(report.outcomes.is_empty());
}

/// S7 (configured host_entries get appended before UPLOAD): with
/// `config.host_entries` non-empty, the run must send one extra
/// admin-privileged command that appends every entry to the host's local
/// hosts file, ahead of the object-store upload.
#[tokio::test]
async fn s7_configured_host_entries_are_appended_before_upload() {
    let rtr = FakeRtrClient::new();
    rtr.seed_host(host("LIN-7", Platform::Linux, true));
    rtr.script_stdout("find '", ["/opt/0x4n6nerd/uac-LIN-7.tar.gz"]);
    rtr.script_stdout("stat -c", ["1181116006 1700000000", "1181116006 1700000000"]);
    rtr.script_stdout("cat '", ["0"]);

    let sha256 = "d".repeat(64);
    rtr.seed_files_for_any_session(vec![RemoteFileDescriptor { path: "/opt/0x4n6nerd/uac-LIN-7.tar.gz".to_string(), size_bytes: 15, sha256: Some(sha256.clone()) }]);
    rtr.seed_file_bytes(&sha256, b"uac triage bytes".to_vec());

    let mut config = fast_config();
    config.host_entries.push(fnerd_core::config::HostEntry { ip: "10.0.0.9".to_string(), hostname: "objectstore.internal".to_string() });

    let objectstore = FakeObjectStore::new();
    let engine = CollectionEngine::new(Arc::new(rtr.clone()), Arc::new(objectstore), config, FakeClock::new(), "forensics", Arc::new(PassthroughUnwrapper));

    let job = CollectionJob::new(AgentId::new("LIN-7"), "LIN-7", Tool::Uac);
    let (job, outcome) = engine.run_job(job, host("LIN-7", Platform::Linux, true), CancellationToken::new(), tokio::sync::mpsc::channel(64).0).await;

    match outcome {
        Outcome::Succeeded { .. } => {}
        Outcome::Failed(detail) => panic!("expected success, got {detail:?}"),
    }
    assert_eq!(job.phase.name(), "done");

    let hosts_file_command = rtr
        .sent_commands()
        .into_iter()
        .find(|c| c.command_line.contains("/etc/hosts"))
        .expect("host_entries append command must be sent");
    assert_eq!(hosts_file_command.privilege, fnerd_core::command::Privilege::Admin);
    assert!(hosts_file_command.command_line.contains("10.0.0.9 objectstore.internal"));
}
