// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The object-store uploader trait (§4.6) — single/multipart upload plus
//! the authoritative `HEAD` verification primitive.

use async_trait::async_trait;
use fnerd_core::error::CollectionError;
use fnerd_core::objectstore_record::ObjectStoreRecord;
use std::path::Path;

/// Narrow façade over an S3-compatible object store.
#[async_trait]
pub trait ObjectStoreUploader: Send + Sync {
    /// Streams `local_path` to `{bucket}/{key}`. Whether this call returns
    /// `Ok` is advisory only — VERIFY's `head` call is the sole trusted
    /// success signal (§4.3 VERIFY).
    async fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), CollectionError>;

    /// Issues a `HEAD` for `{bucket}/{key}`, returning its size and ETag.
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectStoreRecord, CollectionError>;
}
