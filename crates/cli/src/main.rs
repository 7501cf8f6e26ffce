// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin CLI driver: load configuration, resolve targets, and hand
//! everything to [`fnerd_executor::FanOutExecutor`]. Deliberately minimal —
//! the orchestration logic lives in `fnerd-engine`/`fnerd-executor`, not
//! here.

use anyhow::{Context, Result};
use clap::Parser;
use fnerd_core::config::Config;
use fnerd_core::host::AgentId;
use fnerd_core::job::{CollectionJob, Tool};
use fnerd_engine::CollectionEngine;
use fnerd_executor::{ExecutorConfig, FanOutExecutor};
use fnerd_objectstore::{ObjectStoreCredentials, S3Uploader};
use fnerd_rtr::{HttpRtrClient, RtrClient, RtrCredentials};
use fnerd_transfer::PassthroughUnwrapper;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "fnerd", about = "Remote forensic collection orchestrator")]
struct Args {
    /// Path to the TOML configuration file (workspace dirs, timeouts, retry, upload, proxy).
    #[arg(long)]
    config: PathBuf,

    /// Path to a JSON file listing collection targets.
    #[arg(long)]
    targets: PathBuf,

    #[arg(long, env = "FNERD_RTR_CLIENT_ID")]
    rtr_client_id: String,
    #[arg(long, env = "FNERD_RTR_CLIENT_SECRET")]
    rtr_client_secret: String,
    #[arg(long, env = "FNERD_RTR_BASE_URL")]
    rtr_base_url: String,

    #[arg(long, env = "FNERD_S3_ACCESS_KEY")]
    s3_access_key: String,
    #[arg(long, env = "FNERD_S3_SECRET_KEY")]
    s3_secret_key: String,
    #[arg(long)]
    s3_endpoint: Option<String>,
    #[arg(long)]
    bucket: String,
}

/// One line of the targets file: a hostname plus the tool to run there.
#[derive(Debug, Deserialize)]
struct TargetSpec {
    hostname: String,
    tool: Tool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config: Config = toml::from_str(&std::fs::read_to_string(&args.config).context("reading config file")?).context("parsing config file")?;
    let target_specs: Vec<TargetSpec> = serde_json::from_str(&std::fs::read_to_string(&args.targets).context("reading targets file")?).context("parsing targets file")?;

    let rtr = Arc::new(HttpRtrClient::new(RtrCredentials {
        client_id: args.rtr_client_id,
        client_secret: args.rtr_client_secret,
        base_url: args.rtr_base_url,
    }));
    let objectstore = Arc::new(S3Uploader::new(
        ObjectStoreCredentials { access_key: args.s3_access_key, secret_key: args.s3_secret_key, endpoint: args.s3_endpoint },
        config.upload,
        config.proxy.clone(),
    ));

    let mut targets = Vec::with_capacity(target_specs.len());
    for spec in target_specs {
        match rtr.discover_host(&spec.hostname, false).await {
            Ok(host) => {
                let job = CollectionJob::new(AgentId::new(host.aid.as_str()), spec.hostname, spec.tool);
                targets.push((job, host));
            }
            Err(err) => {
                tracing::warn!(hostname = %spec.hostname, error = %err, "skipping target: discover_host failed");
            }
        }
    }

    let engine = Arc::new(CollectionEngine::new(rtr, objectstore, config.clone(), fnerd_core::clock::SystemClock, args.bucket, Arc::new(PassthroughUnwrapper)));
    let executor = FanOutExecutor::new(engine, ExecutorConfig::from_config(&config));

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(256);
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            tracing::info!(hostname = %event.hostname, phase = event.phase.name(), at_epoch_ms = event.at_epoch_ms, "progress");
        }
    });

    let report = executor.run(targets, CancellationToken::new(), progress_tx).await;
    drop(progress_task);

    for (hostname, outcome) in &report.outcomes {
        match outcome {
            fnerd_core::job::Outcome::Succeeded { record } => println!("{hostname}: succeeded -> {}", record.uri()),
            fnerd_core::job::Outcome::Failed(detail) => println!("{hostname}: failed at {} ({:?}): {}", detail.phase, detail.kind, detail.detail),
        }
    }
    println!("{} succeeded, {} failed", report.succeeded_count(), report.failed_count());

    if report.failed_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
