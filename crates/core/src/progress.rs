// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress events emitted by the fan-out executor over a non-blocking,
//! droppable channel (§5).

use crate::job::JobPhase;
use serde::{Deserialize, Serialize};

/// A single progress notification for one host's job. The executor sends
/// these via `try_send` on a bounded channel: if the consumer is slow, the
/// event is dropped rather than stalling collection (§5 "droppable under
/// backpressure").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub hostname: String,
    pub phase: JobPhase,
    pub at_epoch_ms: u64,
}

impl ProgressEvent {
    pub fn new(hostname: impl Into<String>, phase: JobPhase, at_epoch_ms: u64) -> Self {
        Self { hostname: hostname.into(), phase, at_epoch_ms }
    }
}
