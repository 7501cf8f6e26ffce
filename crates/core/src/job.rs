// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The collection job state machine's data model (§4.3 — the core of the
//! system).

use crate::define_id;
use crate::error::ErrorKind;
use crate::host::AgentId;
use crate::objectstore_record::ObjectStoreRecord;
use serde::{Deserialize, Serialize};

define_id! {
    /// Identifier for a single-host collection job.
    pub struct JobId("job-");
}

/// The forensic collection tool to run on the host (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// KAPE (Windows-only): produces a primary `.vhdx` container that is
    /// then compressed into a secondary `.7z` archive.
    Kape,
    /// UAC (Unix-family): produces a single compressed archive directly,
    /// so the two-phase stabilization collapses onto the same file.
    Uac,
    /// Browser history extraction, available on every platform.
    BrowserHistory,
}

impl Tool {
    /// Whether this tool is valid to run on `platform` (§4.3 PRECHECK).
    pub fn supports(self, platform: crate::host::Platform) -> bool {
        match self {
            Tool::Kape => matches!(platform, crate::host::Platform::Windows),
            Tool::Uac => platform.is_unix_family(),
            Tool::BrowserHistory => true,
        }
    }

    /// Whether this tool's output requires the primary-then-secondary
    /// two-phase stabilization protocol, or collapses onto a single file.
    pub fn has_two_phase_output(self) -> bool {
        matches!(self, Tool::Kape)
    }
}

/// The collection job state machine's phases (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum JobPhase {
    Init,
    Precheck,
    Deploy,
    Launch,
    RunMonitor,
    FileWait,
    Stabilize,
    Fetch,
    Upload,
    Verify,
    Clean,
    Done,
    Fail(FailureDetail),
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Fail(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobPhase::Init => "init",
            JobPhase::Precheck => "precheck",
            JobPhase::Deploy => "deploy",
            JobPhase::Launch => "launch",
            JobPhase::RunMonitor => "run_monitor",
            JobPhase::FileWait => "file_wait",
            JobPhase::Stabilize => "stabilize",
            JobPhase::Fetch => "fetch",
            JobPhase::Upload => "upload",
            JobPhase::Verify => "verify",
            JobPhase::Clean => "clean",
            JobPhase::Done => "done",
            JobPhase::Fail(_) => "fail",
        }
    }
}

/// Detail attached to a `Fail` phase: which phase it failed in, the error
/// classification, and a human-readable detail string (§7:
/// `FAIL{phase, kind, detail}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub phase: String,
    pub kind: ErrorKind,
    pub detail: String,
}

impl FailureDetail {
    pub fn new(phase: impl Into<String>, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { phase: phase.into(), kind, detail: detail.into() }
    }
}

/// A single-host collection job: the unit of work the fan-out executor
/// tracks and the state machine advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionJob {
    pub id: JobId,
    pub aid: AgentId,
    pub hostname: String,
    pub tool: Tool,
    pub phase: JobPhase,
    /// Set once UPLOAD has produced a verified object-store record.
    pub object_store_record: Option<ObjectStoreRecord>,
}

impl CollectionJob {
    pub fn new(aid: AgentId, hostname: impl Into<String>, tool: Tool) -> Self {
        Self { id: JobId::new(), aid, hostname: hostname.into(), tool, phase: JobPhase::Init, object_store_record: None }
    }
}

/// Terminal result of a single host's collection job, as returned to the
/// caller of the fan-out executor (§5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Succeeded { record: ObjectStoreRecord },
    Failed(FailureDetail),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }
}
