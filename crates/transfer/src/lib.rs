// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fnerd-transfer: the file/transfer manager (§4.5) — remote stat sampling
//! for the stabilization protocol, staged-file listing, download-to-disk
//! with integrity verification, and remote SHA-256.
//!
//! New to this domain (the teacher has no direct analogue); grounded in
//! the same async-trait-plus-façade shape `fnerd-rtr`'s `RtrClient` uses.

mod archive;
mod manager;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use archive::{ArchiveUnwrapper, PassthroughUnwrapper};
pub use manager::{CommandExecutor, DownloadedFile, TransferManager};
