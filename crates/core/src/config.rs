// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The injected configuration surface (§6). `fnerd-core` only defines the
//! type and its defaults; nothing in this workspace reads environment
//! variables or config files on its own — loading happens at the CLI
//! boundary (`fnerd-cli`), via plain `serde` + `toml`.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Host-side workspace directories, per platform family (§4.3 DEPLOY step
/// 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub windows: String,
    pub unix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { windows: r"C:\0x4n6nerd".to_string(), unix: "/opt/0x4n6nerd".to_string() }
    }
}

/// Every timeout/interval tunable named in §4.3's table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub session_idle: Duration,
    pub pulse: Duration,
    pub command: Duration,
    pub progress_poll: Duration,
    pub stability: Duration,
    pub primary: Duration,
    pub secondary: Duration,
    /// Profile-dependent in §6 (1200-21600s); the `Config::default` picks
    /// the lower bound and callers override per collection profile.
    pub run: Duration,
    pub fetch: Duration,
    pub upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            session_idle: secs(600),
            pulse: secs(300),
            command: secs(120),
            progress_poll: secs(30),
            stability: secs(15),
            primary: secs(300),
            secondary: secs(600),
            run: secs(1200),
            fetch: secs(18_000),
            upload: secs(3_600),
        }
    }
}

/// Upload tuning (§4.3 UPLOAD, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub multipart_threshold_bytes: u64,
    pub chunk_size_bytes: u64,
    pub max_concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { multipart_threshold_bytes: 100 * 1024 * 1024, chunk_size_bytes: 10 * 1024 * 1024, max_concurrency: 4 }
    }
}

/// Optional HTTP forward proxy for the object-store uploader (§6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: Option<String>,
    pub enabled: bool,
}

/// A `key: value` entry appended to the host's local name-resolution file
/// before upload, to support split-horizon object-store endpoints (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub ip: String,
    pub hostname: String,
}

/// The single configuration object the core is driven by (§6). Constructed
/// by the caller (CLI or tests); never read from the environment by any
/// crate below `fnerd-cli`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub max_concurrent: usize,
    pub timeouts: Timeouts,
    pub retry: RetryPolicy,
    pub upload: UploadConfig,
    pub proxy: ProxyConfig,
    pub host_entries: Vec<HostEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: WorkspaceConfig::default(),
            max_concurrent: 20,
            timeouts: Timeouts::default(),
            retry: RetryPolicy::default(),
            upload: UploadConfig::default(),
            proxy: ProxyConfig::default(),
            host_entries: Vec::new(),
        }
    }
}

impl Config {
    pub fn workspace_dir(&self, platform: crate::host::Platform) -> &str {
        match platform {
            crate::host::Platform::Windows => &self.workspace.windows,
            _ => &self.workspace.unix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Platform;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.max_concurrent, 20);
        assert_eq!(config.timeouts.session_idle, secs(600));
        assert_eq!(config.timeouts.pulse, secs(300));
        assert_eq!(config.timeouts.command, secs(120));
        assert_eq!(config.timeouts.progress_poll, secs(30));
        assert_eq!(config.timeouts.stability, secs(15));
        assert_eq!(config.timeouts.primary, secs(300));
        assert_eq!(config.timeouts.secondary, secs(600));
        assert_eq!(config.timeouts.fetch, secs(18_000));
        assert_eq!(config.upload.multipart_threshold_bytes, 100 * 1024 * 1024);
        assert_eq!(config.upload.chunk_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn workspace_dir_selects_by_platform() {
        let config = Config::default();
        assert_eq!(config.workspace_dir(Platform::Windows), r"C:\0x4n6nerd");
        assert_eq!(config.workspace_dir(Platform::Linux), "/opt/0x4n6nerd");
        assert_eq!(config.workspace_dir(Platform::Mac), "/opt/0x4n6nerd");
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(config, parsed);
    }
}
