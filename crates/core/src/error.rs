// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy (§7). Every fallible operation in the lower-layer crates
//! (`fnerd-rtr`, `fnerd-transfer`, `fnerd-objectstore`) returns a
//! [`CollectionError`]; the engine tags it with the phase it occurred in to
//! build a `FAIL{phase, kind, detail}` outcome.

use std::time::Duration;
use thiserror::Error;

/// The stable classification of a failure, independent of which phase it
/// surfaced in. Callers use this to decide whether a retry is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport hiccup, upstream 5xx, connection reset — retryable.
    Transient,
    /// Credentials rejected or insufficient scope — not retryable without
    /// operator intervention.
    Authentication,
    /// The host, session, or remote file does not exist (any more).
    NotFound,
    /// The host is not currently reachable over RTR.
    Offline,
    /// The requested tool/operation is not valid for the host's platform.
    PlatformMismatch,
    /// Upstream returned a resource/quota-exhaustion signal (e.g. too many
    /// concurrent RTR sessions for the tenant).
    ResourceExhausted,
    /// Data integrity could not be established (checksum mismatch, size
    /// mismatch on verify).
    Integrity,
    /// A phase exceeded its allotted deadline.
    Timeout,
    /// Cancelled cooperatively, not a failure of the remote system.
    Cancelled,
}

impl ErrorKind {
    /// Whether the façade's retry wrapper should attempt this error again
    /// (§7, §4.3 RetryPolicy). `Cancelled` is deliberately excluded even
    /// though it isn't the remote system's fault — retrying a cancelled
    /// operation would defeat cancellation.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::ResourceExhausted)
    }
}

/// The error type returned by every façade in the workspace.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("authentication/authorization failed: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("host offline: {0}")]
    Offline(String),

    #[error("platform mismatch: {0}")]
    PlatformMismatch(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("timed out after {elapsed:?}: {detail}")]
    Timeout { elapsed: Duration, detail: String },

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl CollectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollectionError::Transient(_) => ErrorKind::Transient,
            CollectionError::Authentication(_) => ErrorKind::Authentication,
            CollectionError::NotFound(_) => ErrorKind::NotFound,
            CollectionError::Offline(_) => ErrorKind::Offline,
            CollectionError::PlatformMismatch(_) => ErrorKind::PlatformMismatch,
            CollectionError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            CollectionError::Integrity(_) => ErrorKind::Integrity,
            CollectionError::Timeout { .. } => ErrorKind::Timeout,
            CollectionError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Human-readable detail, stripped of the kind prefix — used to fill
    /// `FailureDetail::detail` without duplicating the kind.
    pub fn detail(&self) -> String {
        match self {
            CollectionError::Transient(s)
            | CollectionError::Authentication(s)
            | CollectionError::NotFound(s)
            | CollectionError::Offline(s)
            | CollectionError::PlatformMismatch(s)
            | CollectionError::ResourceExhausted(s)
            | CollectionError::Integrity(s)
            | CollectionError::Cancelled(s) => s.clone(),
            CollectionError::Timeout { detail, .. } => detail.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_resource_exhausted_are_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::ResourceExhausted.is_retryable());
    }

    #[test]
    fn auth_not_found_offline_platform_integrity_timeout_cancelled_are_not_retryable() {
        for kind in [
            ErrorKind::Authentication,
            ErrorKind::NotFound,
            ErrorKind::Offline,
            ErrorKind::PlatformMismatch,
            ErrorKind::Integrity,
            ErrorKind::Timeout,
            ErrorKind::Cancelled,
        ] {
            assert!(!kind.is_retryable(), "{kind:?} should not be retryable");
        }
    }

    #[test]
    fn kind_matches_variant() {
        let err = CollectionError::Offline("WIN-1 not checked in".into());
        assert_eq!(err.kind(), ErrorKind::Offline);
        assert_eq!(err.detail(), "WIN-1 not checked in");
    }
}
