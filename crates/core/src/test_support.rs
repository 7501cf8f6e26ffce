// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test builders, exposed to downstream crates behind the
//! `test-support` feature so `fnerd-rtr`, `fnerd-engine`, etc. don't each
//! reinvent fixture construction.

use crate::host::{AgentId, Host, Platform, TenantId};
use crate::job::{CollectionJob, Tool};

/// Builds a [`Host`] fixture with sensible defaults, overridable per field.
pub struct HostBuilder {
    host: Host,
}

impl HostBuilder {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            host: Host {
                aid: AgentId::new(format!("aid-{}", nanoid::nanoid!(8))),
                cid: TenantId::new("cid-test"),
                hostname: hostname.into(),
                platform: Platform::Windows,
                last_seen_epoch_ms: 0,
                online: true,
            },
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.host.platform = platform;
        self
    }

    pub fn offline(mut self) -> Self {
        self.host.online = false;
        self
    }

    pub fn aid(mut self, aid: impl Into<String>) -> Self {
        self.host.aid = AgentId::new(aid.into());
        self
    }

    pub fn build(self) -> Host {
        self.host
    }
}

/// Builds a [`CollectionJob`] fixture targeting a given [`Host`].
pub fn job_for_host(host: &Host, tool: Tool) -> CollectionJob {
    CollectionJob::new(host.aid.clone(), host.hostname.clone(), tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_builder_applies_overrides() {
        let host = HostBuilder::new("WIN-1").platform(Platform::Mac).offline().build();
        assert_eq!(host.hostname, "WIN-1");
        assert_eq!(host.platform, Platform::Mac);
        assert!(!host.online);
    }

    #[test]
    fn job_for_host_copies_aid_and_hostname() {
        let host = HostBuilder::new("WIN-2").build();
        let job = job_for_host(&host, Tool::Kape);
        assert_eq!(job.aid, host.aid);
        assert_eq!(job.hostname, host.hostname);
    }
}
