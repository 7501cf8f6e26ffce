// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fnerd-platform: pure, per-OS command-string synthesis (§4.7).
//!
//! Every function here returns a [`CommandRequest`] ready to hand to the
//! RTR façade — none of them perform I/O, and all are exhaustively
//! unit-tested since they encode the only OS-specific knowledge in the
//! workspace.

mod unix;
mod windows;

use fnerd_core::command::CommandRequest;
use fnerd_core::config::HostEntry;
use fnerd_core::host::Platform;
use fnerd_core::remote_artifact::RemoteArtifact;

/// Synthesizes the platform-specific commands the collection state machine
/// needs, and parses their stdout back into domain types.
pub trait PlatformAdapter: Send + Sync {
    /// Create the workspace directory; idempotent (§4.3 DEPLOY step 1).
    fn mkdir_p(&self, path: &str) -> CommandRequest;

    /// Expand an archive already present at `archive_path` into `dest`,
    /// verifying `expected_entry` exists (§4.3 DEPLOY step 3).
    fn expand_archive(&self, archive_path: &str, dest: &str, expected_entry: &str) -> CommandRequest;

    /// Launch `invocation` in the workspace without blocking the RTR
    /// command (§4.3 LAUNCH).
    fn launch_background(&self, workspace: &str, invocation: &str) -> CommandRequest;

    /// List files in `dir` matching `glob`, one path per stdout line.
    fn list_glob(&self, dir: &str, glob: &str) -> CommandRequest;

    /// Report `path`'s size in bytes and last-modified time, in a format
    /// this adapter's [`PlatformAdapter::parse_stat`] understands.
    fn stat(&self, path: &str) -> CommandRequest;

    /// Parse the stdout of a prior [`PlatformAdapter::stat`] command.
    fn parse_stat(&self, path: &str, stdout: &str) -> Option<RemoteArtifact>;

    /// Read the exit-code sentinel written by `launch_background`, if any.
    fn read_exit_sentinel(&self, workspace: &str) -> CommandRequest;

    /// Parse the stdout of [`PlatformAdapter::read_exit_sentinel`] into an
    /// exit code, if the sentinel file exists and is non-empty.
    fn parse_exit_sentinel(&self, stdout: &str) -> Option<i32>;

    /// Tail the last `bytes` of the tool's log file for progress telemetry.
    fn tail(&self, path: &str, bytes: u64) -> CommandRequest;

    /// Recursively delete the workspace directory, best-effort (§4.3
    /// CLEAN).
    fn rmrf(&self, path: &str) -> CommandRequest;

    /// Compute `path`'s SHA-256 on the host, when the remote tool didn't
    /// already emit one (§4.5 `remote_sha256`).
    fn sha256(&self, path: &str) -> CommandRequest;

    /// Parse the stdout of a prior [`PlatformAdapter::sha256`] command.
    fn parse_sha256(&self, stdout: &str) -> Option<String>;

    /// Append `entries` to the host's local name-resolution file, run
    /// before UPLOAD to support split-horizon object-store endpoints (§6).
    /// `None` when `entries` is empty — there is nothing to run.
    fn append_host_entries(&self, entries: &[HostEntry]) -> Option<CommandRequest>;
}

/// Returns the adapter appropriate for `platform`.
pub fn for_platform(platform: Platform) -> &'static dyn PlatformAdapter {
    match platform {
        Platform::Windows => &windows::WindowsAdapter,
        Platform::Mac | Platform::Linux | Platform::UnixOther => &unix::UnixAdapter,
    }
}
