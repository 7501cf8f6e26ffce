// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fnerd-objectstore: the object-store uploader (§4.6) — single/multipart
//! upload and the authoritative `HEAD` verification primitive VERIFY relies
//! on.
//!
//! New to this domain; grounded in `fnerd-rtr`'s HTTP client shape and
//! `unicity-astrid-astrid`'s `reqwest` usage for talking to a real external
//! HTTP API.

mod client;
mod s3;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use client::ObjectStoreUploader;
pub use s3::{ObjectStoreCredentials, S3Uploader};
