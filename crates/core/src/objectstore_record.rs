// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The record produced by a verified object-store upload (§4.6, §4.3
//! VERIFY).

use serde::{Deserialize, Serialize};

/// Identifies and describes an uploaded artifact after VERIFY has confirmed
/// it via an authoritative HEAD request. This is the sole evidence of a
/// successful collection — the upload call's own reported success/failure
/// is not trusted (§4.6 regression guard).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreRecord {
    pub bucket: String,
    pub key: String,
    pub size_bytes: u64,
    /// Entity tag returned by the object store, used to detect stale
    /// reads/key collisions on verify.
    pub etag: String,
}

impl ObjectStoreRecord {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, size_bytes: u64, etag: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), key: key.into(), size_bytes, etag: etag.into() }
    }

    /// `s3://bucket/key`-style locator used in logs and progress events.
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
