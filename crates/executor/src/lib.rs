// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fnerd-executor: the fan-out executor (§4.4, §5) that drives many
//! [`CollectionEngine`] jobs concurrently across a fleet, bounded by a
//! semaphore, FIFO per host, with cooperative cancellation and a
//! droppable progress channel.

use fnerd_core::clock::{Clock, SystemClock};
use fnerd_core::host::Host;
use fnerd_core::job::{CollectionJob, Outcome};
use fnerd_core::progress::ProgressEvent;
use fnerd_engine::CollectionEngine;
use fnerd_objectstore::ObjectStoreUploader;
use fnerd_rtr::RtrClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// Tunables for the fan-out executor (§5).
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Upper bound on jobs in flight across the whole run, regardless of
    /// how many distinct hosts are targeted (§5 default 20).
    pub max_concurrent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_concurrent: 20 }
    }
}

impl ExecutorConfig {
    pub fn from_config(config: &fnerd_core::config::Config) -> Self {
        Self { max_concurrent: config.max_concurrent }
    }
}

/// Aggregated result of one fan-out run: every targeted host's final job
/// state and terminal outcome, keyed by hostname (§5).
#[derive(Debug, Default)]
pub struct RunReport {
    pub jobs: HashMap<String, CollectionJob>,
    pub outcomes: HashMap<String, Outcome>,
}

impl RunReport {
    pub fn succeeded_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.values().filter(|o| !o.is_success()).count()
    }

    pub fn is_partial_failure(&self) -> bool {
        self.failed_count() > 0 && self.succeeded_count() > 0
    }
}

/// Fans a batch of `(job, host)` targets out across [`CollectionEngine`]
/// runs, capping total in-flight work with a semaphore and serializing
/// jobs that target the same host (§5 "FIFO per host").
pub struct FanOutExecutor<R, O, C = SystemClock>
where
    R: RtrClient + 'static,
    O: ObjectStoreUploader + 'static,
    C: Clock,
{
    engine: Arc<CollectionEngine<R, O, C>>,
    config: ExecutorConfig,
}

impl<R, O, C> FanOutExecutor<R, O, C>
where
    R: RtrClient + 'static,
    O: ObjectStoreUploader + 'static,
    C: Clock,
{
    pub fn new(engine: Arc<CollectionEngine<R, O, C>>, config: ExecutorConfig) -> Self {
        Self { engine, config }
    }

    /// Runs every target, grouped by hostname so jobs for the same host
    /// never overlap, with a semaphore bounding total concurrency across
    /// groups. `cancel` is the run-wide token; each job gets a child token
    /// so cancelling the run propagates to every in-flight job without
    /// needing a second mechanism.
    pub async fn run(&self, targets: Vec<(CollectionJob, Host)>, cancel: CancellationToken, progress_tx: mpsc::Sender<ProgressEvent>) -> RunReport {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut by_host: HashMap<String, Vec<(CollectionJob, Host)>> = HashMap::new();
        for (job, host) in targets {
            by_host.entry(host.hostname.clone()).or_default().push((job, host));
        }

        let mut tasks = Vec::with_capacity(by_host.len());
        for (_, host_jobs) in by_host {
            let engine = self.engine.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let progress_tx = progress_tx.clone();
            tasks.push(tokio::spawn(async move {
                let mut results = Vec::with_capacity(host_jobs.len());
                for (job, host) in host_jobs {
                    if cancel.is_cancelled() {
                        results.push((job, None));
                        continue;
                    }
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        results.push((job, None));
                        continue;
                    };
                    let job_cancel = cancel.child_token();
                    let (job, outcome) = engine.run_job(job, host, job_cancel, progress_tx.clone()).await;
                    drop(permit);
                    results.push((job, Some(outcome)));
                }
                results
            }));
        }

        let mut report = RunReport::default();
        for task in tasks {
            let results = match task.await {
                Ok(results) => results,
                Err(_) => continue,
            };
            for (job, outcome) in results {
                if let Some(outcome) = outcome {
                    report.outcomes.insert(job.hostname.clone(), outcome);
                }
                report.jobs.insert(job.hostname.clone(), job);
            }
        }
        report
    }
}
