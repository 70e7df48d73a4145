// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stepline Worker binary.
//!
//! A dedicated per-tenant worker process: connects to PostgreSQL, runs the
//! schema bootstrap, then ticks the claim loop until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use stepline_core::config::Config;
use stepline_core::{db, schema};
use stepline_worker::worker::{Worker, WorkerDeps};

/// Dedicated per-tenant step worker.
#[derive(Parser, Debug)]
#[command(name = "stepline-worker", version)]
struct Args {
    /// Tenant UUID this worker is dedicated to.
    #[arg(long)]
    tenant_id: Uuid,

    /// Poll interval between claim attempts, in milliseconds.
    #[arg(long, default_value_t = 250, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,

    /// Max execution attempts per step.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(i32).range(1..))]
    max_attempts: i32,

    /// Reclaim RUNNING steps claimed longer ago than this, in seconds.
    /// Must be strictly larger than the step timeout.
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    reclaim_after_secs: u64,

    /// Base delay for exponential retry backoff, in milliseconds.
    #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    retry_base_delay_ms: u64,

    /// Timeout for steps with NULL timeout_seconds, in seconds.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    default_step_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = Config::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;

    let default_level = if config.env == "dev" { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("stepline={}", default_level).parse().unwrap()),
        )
        .init();

    info!("Starting Stepline Worker");

    let pool = db::connect(&config.database_url).await?;
    info!("Database connection established");

    if config.auto_migrate {
        schema::ensure_schema(&pool).await?;
    } else {
        info!(env_var = "STEPLINE_AUTO_MIGRATE", "auto schema bootstrap disabled");
        schema::schema_ready(&pool).await?;
    }

    let poll_interval = Duration::from_millis(args.poll_interval_ms);
    let worker = Arc::new(Worker::new(WorkerDeps {
        pool: pool.clone(),
        tenant_id: args.tenant_id,
        reclaim_after: Duration::from_secs(args.reclaim_after_secs),
        max_attempts: args.max_attempts,
        retry_base_delay: Duration::from_millis(args.retry_base_delay_ms),
        default_step_timeout: Duration::from_secs(args.default_step_timeout_secs),
    }));

    info!(
        tenant_id = %args.tenant_id,
        poll_interval_ms = args.poll_interval_ms,
        max_attempts = args.max_attempts,
        reclaim_after_secs = args.reclaim_after_secs,
        retry_base_delay_ms = args.retry_base_delay_ms,
        default_step_timeout_secs = args.default_step_timeout_secs,
        "worker started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(worker.run(poll_interval, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    if let Err(e) = loop_handle.await {
        error!(error = %e, "worker loop join failed");
    }

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
