// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host identity and the host registry cache (§3, §4.1).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Opaque per-host identifier assigned by the endpoint-security platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Opaque customer/organization identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Target platform of a host, used to validate tool/platform compatibility
/// at `PRECHECK` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
    UnixOther,
}

impl Platform {
    /// True for every platform that is not Windows — the `unix`-family
    /// workspace/adapters in §4.7 apply uniformly to these.
    pub fn is_unix_family(self) -> bool {
        !matches!(self, Platform::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Linux => "linux",
            Platform::UnixOther => "unix-other",
        };
        f.write_str(s)
    }
}

/// A discovered host, as resolved by the RTR façade's `discover_host` (§4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub aid: AgentId,
    pub cid: TenantId,
    pub hostname: String,
    pub platform: Platform,
    pub last_seen_epoch_ms: u64,
    pub online: bool,
}

/// Default TTL for cached host records (§3: "bounded TTL (default 5
/// minutes)").
pub const HOST_REGISTRY_TTL: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// A TTL-bounded, hostname-keyed cache of [`Host`] records.
///
/// Concurrency policy (§5): cache reads are lock-free snapshot reads.
/// Populating a miss is single-flight per hostname — [`HostRegistry::get_or_fetch`]
/// holds a per-hostname async lock across the upstream discovery call, so
/// concurrent misses for the same hostname coalesce onto one upstream call
/// instead of each issuing their own (testable property #10).
pub struct HostRegistry<C: crate::clock::Clock> {
    clock: C,
    ttl: std::time::Duration,
    entries: parking_lot::Mutex<HashMap<String, CacheEntry>>,
    inflight: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct CacheEntry {
    host: Host,
    inserted_at: Instant,
}

impl<C: crate::clock::Clock> HostRegistry<C> {
    pub fn new(clock: C) -> Self {
        Self::with_ttl(clock, HOST_REGISTRY_TTL)
    }

    pub fn with_ttl(clock: C, ttl: std::time::Duration) -> Self {
        Self { clock, ttl, entries: parking_lot::Mutex::new(HashMap::new()), inflight: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Returns the cached host for `hostname` if present and not expired.
    pub fn get(&self, hostname: &str) -> Option<Host> {
        let entries = self.entries.lock();
        let entry = entries.get(hostname)?;
        if self.clock.now().duration_since(entry.inserted_at) >= self.ttl {
            return None;
        }
        Some(entry.host.clone())
    }

    /// Returns the cached host for `hostname`, or runs `fetch` to populate
    /// it. Concurrent calls for the same hostname that miss the cache share
    /// one in-flight `fetch`: the first holds a per-hostname lock across the
    /// call, and the rest wait on that lock and then re-check the cache
    /// (now populated by the first) rather than each calling `fetch`
    /// themselves.
    pub async fn get_or_fetch<F, Fut>(&self, hostname: &str, fetch: F) -> Result<Host, crate::error::CollectionError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Host, crate::error::CollectionError>>,
    {
        if let Some(host) = self.get(hostname) {
            return Ok(host);
        }
        let lock = {
            let mut inflight = self.inflight.lock();
            inflight.entry(hostname.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
        };
        let _guard = lock.lock().await;
        if let Some(host) = self.get(hostname) {
            return Ok(host);
        }
        let host = fetch().await?;
        self.upsert(host.clone());
        Ok(host)
    }

    /// Idempotent upsert-by-hostname (§3 Ownership: "only idempotent, atomic
    /// upsert-by-hostname semantics").
    pub fn upsert(&self, host: Host) {
        let mut entries = self.entries.lock();
        entries.insert(host.hostname.clone(), CacheEntry { host, inserted_at: self.clock.now() });
    }

    /// Remove expired entries. Not required for correctness (reads already
    /// treat expired entries as absent) but bounds memory over long runs.
    pub fn evict_expired(&self) {
        let mut entries = self.entries.lock();
        let now = self.clock.now();
        let ttl = self.ttl;
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
