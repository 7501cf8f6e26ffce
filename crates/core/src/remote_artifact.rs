// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A file on the target host, tracked through the two-phase stabilization
//! protocol (§3, §4.3 FILE_WAIT/STABILIZE).

use serde::{Deserialize, Serialize};

/// Where a [`RemoteArtifact`] sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityState {
    Growing,
    Stable,
    Fetched,
    Deleted,
}

/// A remote file identified by its absolute path on the host, as observed
/// by successive `stat`-style samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteArtifact {
    pub path: String,
    pub size_bytes: u64,
    /// Epoch millis of last modification, as reported by the host.
    pub last_modified_epoch_ms: u64,
    pub sha256: Option<String>,
    pub stability_state: StabilityState,
}

impl RemoteArtifact {
    pub fn new(path: impl Into<String>, size_bytes: u64, last_modified_epoch_ms: u64) -> Self {
        Self { path: path.into(), size_bytes, last_modified_epoch_ms, sha256: None, stability_state: StabilityState::Growing }
    }

    /// A sample is retrievable only once two consecutive samples (this one
    /// and `previous`) report the same size and mtime with a positive size
    /// (§3 Remote artifact invariant).
    pub fn is_stable_against(&self, previous: &RemoteArtifact) -> bool {
        self.size_bytes > 0 && self.size_bytes == previous.size_bytes && self.last_modified_epoch_ms == previous.last_modified_epoch_ms
    }
}

/// A file the RTR session has staged for retrieval, as returned by
/// `list_files` (§4.1) before it's been through any stability sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFileDescriptor {
    pub path: String,
    pub size_bytes: u64,
    pub sha256: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_nonzero_samples_are_stable() {
        let a = RemoteArtifact::new("/opt/0x4n6nerd/out.vhdx", 1024, 1_700_000_000_000);
        let b = RemoteArtifact::new("/opt/0x4n6nerd/out.vhdx", 1024, 1_700_000_000_000);
        assert!(b.is_stable_against(&a));
    }

    #[test]
    fn differing_size_is_not_stable() {
        let a = RemoteArtifact::new("/opt/0x4n6nerd/out.vhdx", 1024, 1_700_000_000_000);
        let b = RemoteArtifact::new("/opt/0x4n6nerd/out.vhdx", 2048, 1_700_000_000_000);
        assert!(!b.is_stable_against(&a));
    }

    #[test]
    fn zero_size_never_stable() {
        let a = RemoteArtifact::new("/opt/0x4n6nerd/out.vhdx", 0, 1_700_000_000_000);
        let b = RemoteArtifact::new("/opt/0x4n6nerd/out.vhdx", 0, 1_700_000_000_000);
        assert!(!b.is_stable_against(&a));
    }
}
