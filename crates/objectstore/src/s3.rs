// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `reqwest`-based S3-compatible uploader, grounded in `fnerd-rtr`'s HTTP
//! client shape and `unicity-astrid-astrid`'s `reqwest` multipart usage for
//! talking to a real external HTTP API.
//!
//! Full AWS SigV4 request signing is out of this workspace's grounding
//! corpus (no example repo depends on an AWS SDK or signing crate), so
//! authentication here is a simplified bearer scheme suited to
//! S3-compatible appliances that accept static tokens. A deployment against
//! real AWS S3 would swap this for `aws-sigv4` request signing without
//! changing the [`ObjectStoreUploader`] trait — see `DESIGN.md`.

use crate::client::ObjectStoreUploader;
use async_trait::async_trait;
use fnerd_core::config::{ProxyConfig, UploadConfig};
use fnerd_core::error::CollectionError;
use fnerd_core::objectstore_record::ObjectStoreRecord;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;

/// Access credentials and endpoint for the target object store.
#[derive(Debug, Clone)]
pub struct ObjectStoreCredentials {
    pub access_key: String,
    pub secret_key: String,
    /// Custom endpoint for non-AWS S3-compatible stores (§6); `None` means
    /// `https://s3.amazonaws.com`.
    pub endpoint: Option<String>,
}

impl ObjectStoreCredentials {
    fn base_url(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| "https://s3.amazonaws.com".to_string())
    }

    fn bearer(&self) -> String {
        format!("{}:{}", self.access_key, self.secret_key)
    }
}

/// S3-compatible uploader supporting single-shot `PUT` and chunked
/// multipart upload (§4.3 UPLOAD, §6 `upload.*`).
#[derive(Clone)]
pub struct S3Uploader {
    http: reqwest::Client,
    credentials: ObjectStoreCredentials,
    config: UploadConfig,
}

impl S3Uploader {
    pub fn new(credentials: ObjectStoreCredentials, config: UploadConfig, proxy: ProxyConfig) -> Self {
        let mut builder = reqwest::Client::builder().timeout(std::time::Duration::from_secs(3600));
        if proxy.enabled {
            if let Some(host) = &proxy.host {
                if let Ok(proxy) = reqwest::Proxy::http(host) {
                    builder = builder.proxy(proxy);
                }
            }
        }
        let http = builder.build().unwrap_or_else(|_| reqwest::Client::new());
        Self { http, credentials, config }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.credentials.base_url(), bucket, key)
    }

    async fn upload_single(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), CollectionError> {
        let body = tokio::fs::read(local_path).await.map_err(|e| CollectionError::Transient(e.to_string()))?;
        let response = self
            .http
            .put(self.object_url(bucket, key))
            .bearer_auth(self.credentials.bearer())
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await.map(|_| ())
    }

    async fn upload_multipart(&self, bucket: &str, key: &str, local_path: &Path, size_bytes: u64) -> Result<(), CollectionError> {
        let upload_id = self.init_multipart(bucket, key).await?;
        let chunk_size = self.config.chunk_size_bytes.max(1);
        let part_count = size_bytes.div_ceil(chunk_size);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut tasks = Vec::with_capacity(part_count as usize);
        for part_number in 1..=part_count {
            let offset = (part_number - 1) * chunk_size;
            let len = chunk_size.min(size_bytes - offset);
            let uploader = self.clone();
            let upload_id = upload_id.clone();
            let bucket = bucket.to_string();
            let key = key.to_string();
            let local_path = local_path.to_path_buf();
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                return Err(CollectionError::Transient("multipart upload semaphore closed".to_string()));
            };
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                uploader.upload_part(&bucket, &key, &upload_id, part_number, offset, len, &local_path).await
            }));
        }

        let mut etags = Vec::with_capacity(tasks.len());
        for task in tasks {
            let etag = task.await.map_err(|e| CollectionError::Transient(e.to_string()))??;
            etags.push(etag);
        }

        self.complete_multipart(bucket, key, &upload_id, &etags).await
    }

    async fn init_multipart(&self, bucket: &str, key: &str) -> Result<String, CollectionError> {
        let response = self
            .http
            .post(format!("{}?uploads", self.object_url(bucket, key)))
            .bearer_auth(self.credentials.bearer())
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body = response.text().await.map_err(|e| CollectionError::Transient(e.to_string()))?;
        Ok(body.trim().to_string())
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u64,
        offset: u64,
        len: u64,
        local_path: &Path,
    ) -> Result<String, CollectionError> {
        let mut file = tokio::fs::File::open(local_path).await.map_err(|e| CollectionError::Transient(e.to_string()))?;
        file.seek(std::io::SeekFrom::Start(offset)).await.map_err(|e| CollectionError::Transient(e.to_string()))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await.map_err(|e| CollectionError::Transient(e.to_string()))?;

        let response = self
            .http
            .put(format!("{}?partNumber={part_number}&uploadId={upload_id}", self.object_url(bucket, key)))
            .bearer_auth(self.credentials.bearer())
            .body(buf)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        Ok(response.headers().get("etag").and_then(|v| v.to_str().ok()).unwrap_or_default().to_string())
    }

    async fn complete_multipart(&self, bucket: &str, key: &str, upload_id: &str, etags: &[String]) -> Result<(), CollectionError> {
        let body = etags.iter().enumerate().map(|(i, tag)| format!("{}:{tag}", i + 1)).collect::<Vec<_>>().join(",");
        let response = self
            .http
            .post(format!("{}?uploadId={upload_id}", self.object_url(bucket, key)))
            .bearer_auth(self.credentials.bearer())
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await.map(|_| ())
    }
}

fn transport_error(err: reqwest::Error) -> CollectionError {
    if err.is_timeout() {
        CollectionError::Timeout { elapsed: std::time::Duration::from_secs(0), detail: err.to_string() }
    } else {
        CollectionError::Transient(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CollectionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(CollectionError::Authentication(body)),
        404 => Err(CollectionError::NotFound(body)),
        429 | 500..=599 => Err(CollectionError::Transient(body)),
        _ => Err(CollectionError::Transient(format!("unexpected status {status}: {body}"))),
    }
}

#[async_trait]
impl ObjectStoreUploader for S3Uploader {
    async fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), CollectionError> {
        let metadata = tokio::fs::metadata(local_path).await.map_err(|e| CollectionError::Transient(e.to_string()))?;
        let size_bytes = metadata.len();
        if size_bytes >= self.config.multipart_threshold_bytes {
            self.upload_multipart(bucket, key, local_path, size_bytes).await
        } else {
            self.upload_single(bucket, key, local_path).await
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectStoreRecord, CollectionError> {
        let response = self
            .http
            .head(self.object_url(bucket, key))
            .bearer_auth(self.credentials.bearer())
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let size_bytes = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| CollectionError::Integrity("HEAD response missing Content-Length".to_string()))?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        Ok(ObjectStoreRecord::new(bucket, key, size_bytes, etag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploader() -> S3Uploader {
        let credentials = ObjectStoreCredentials { access_key: "ak".into(), secret_key: "sk".into(), endpoint: Some("https://store.internal".into()) };
        S3Uploader::new(credentials, UploadConfig::default(), ProxyConfig::default())
    }

    #[test]
    fn object_url_joins_endpoint_bucket_and_key() {
        let uploader = uploader();
        assert_eq!(uploader.object_url("forensics", "kape/WIN-1/out.7z"), "https://store.internal/forensics/kape/WIN-1/out.7z");
    }

    #[test]
    fn default_endpoint_is_aws_s3() {
        let credentials = ObjectStoreCredentials { access_key: "ak".into(), secret_key: "sk".into(), endpoint: None };
        assert_eq!(credentials.base_url(), "https://s3.amazonaws.com");
    }
}
