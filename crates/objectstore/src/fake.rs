// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`ObjectStoreUploader`] for engine tests, behind the
//! `test-support` feature. Models the VERIFY regression guard directly:
//! `upload` and `head` are independently scriptable so tests can simulate
//! an upload call that reports failure despite the bytes landing, or a
//! `head` that disagrees with what was uploaded.

use crate::client::ObjectStoreUploader;
use async_trait::async_trait;
use fnerd_core::error::CollectionError;
use fnerd_core::objectstore_record::ObjectStoreRecord;
use parking_lot::Mutex;
use sha2::Digest;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Default)]
struct FakeState {
    objects: HashMap<(String, String), ObjectStoreRecord>,
    upload_calls: Vec<(String, String, PathBuf)>,
    force_upload_error: Option<String>,
}

/// An in-memory object store: `upload` records bytes were "sent" (unless
/// scripted to fail) and `head` reports whatever `seed_object` or a
/// successful `upload` put there — independently, so tests can create the
/// upload-failed-but-bytes-arrived scenario the VERIFY phase guards against.
#[derive(Clone, Default)]
pub struct FakeObjectStore {
    state: std::sync::Arc<Mutex<FakeState>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate what `head` will report for `(bucket, key)`, independent
    /// of whether `upload` was ever called for it.
    pub fn seed_object(&self, bucket: impl Into<String>, key: impl Into<String>, size_bytes: u64, etag: impl Into<String>) {
        let bucket = bucket.into();
        let key = key.into();
        self.state.lock().objects.insert((bucket.clone(), key.clone()), ObjectStoreRecord::new(bucket, key, size_bytes, etag));
    }

    /// Make the next `upload` call return a transient error, even though
    /// (per the regression guard this fake exists to test) the object may
    /// still become visible to `head` if separately seeded.
    pub fn force_next_upload_error(&self, message: impl Into<String>) {
        self.state.lock().force_upload_error = Some(message.into());
    }

    pub fn upload_calls(&self) -> Vec<(String, String, PathBuf)> {
        self.state.lock().upload_calls.clone()
    }
}

#[async_trait]
impl ObjectStoreUploader for FakeObjectStore {
    async fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), CollectionError> {
        let mut state = self.state.lock();
        state.upload_calls.push((bucket.to_string(), key.to_string(), local_path.to_path_buf()));
        if let Some(message) = state.force_upload_error.take() {
            return Err(CollectionError::Transient(message));
        }
        drop(state);
        let bytes = tokio::fs::read(local_path).await.map_err(|e| CollectionError::Transient(e.to_string()))?;
        let digest = format!("{:x}", sha2::Sha256::digest(&bytes));
        self.state.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            ObjectStoreRecord::new(bucket, key, bytes.len() as u64, digest),
        );
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectStoreRecord, CollectionError> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| CollectionError::NotFound(format!("{bucket}/{key}")))
    }
}
