// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NGINX Agent - Host-resident Instance Management
//!
//! Runs the agent plugins on an in-process bus:
//! - Config apply with rollback
//! - Config upload verification
//! - Instance discovery and status reporting
//! - Detection of configuration edited outside the agent

use tracing::{info, warn};

use nginx_agent::config::Config;
use nginx_agent::runtime::AgentRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nginx_agent=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        instance_id = %config.instance_id,
        nginx_conf = %config.nginx_conf.display(),
        lib_dir = %config.lib_dir.display(),
        allowed_directories = ?config.allowed_directories,
        "Starting NGINX Agent"
    );

    // Start the runtime
    let runtime = AgentRuntime::builder().config(config).build()?.start().await?;

    info!("NGINX Agent ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    runtime.shutdown().await?;

    info!("NGINX Agent shut down");

    Ok(())
}
