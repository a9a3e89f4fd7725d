// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Periodic configuration re-parse.
//!
//! Detects configuration edited outside the agent by parsing every known
//! instance on an interval and handing the result to the [`WatcherPlugin`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::WatcherPlugin;
use crate::nginx::{ConfigParser, InstanceService};

/// Configuration for the config monitor.
#[derive(Debug, Clone)]
pub struct ConfigMonitorConfig {
    /// How often to re-parse instances.
    pub poll_interval: Duration,
}

impl Default for ConfigMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Re-parses instance configuration and reports changes.
pub struct ConfigMonitor {
    config: ConfigMonitorConfig,
    watcher: Arc<WatcherPlugin>,
    parser: Arc<dyn ConfigParser>,
    instances: Arc<dyn InstanceService>,
}

impl ConfigMonitor {
    /// Create a monitor.
    pub fn new(
        config: ConfigMonitorConfig,
        watcher: Arc<WatcherPlugin>,
        parser: Arc<dyn ConfigParser>,
        instances: Arc<dyn InstanceService>,
    ) -> Self {
        Self {
            config,
            watcher,
            parser,
            instances,
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Config monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Config monitor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.check_instances().await;
                }
            }
        }

        info!("Config monitor stopped");
    }

    /// Parse every instance once. Returns the number of reported changes.
    pub async fn check_instances(&self) -> usize {
        let mut reported = 0;

        for instance in self.instances.instances().await {
            if self.watcher.is_apply_in_progress(instance.id()).await {
                debug!(instance_id = %instance.id(), "Skipping instance with apply in progress");
                continue;
            }

            match self.parser.parse(&instance).await {
                Ok(context) => {
                    if self.watcher.report_config_context(context).await {
                        reported += 1;
                    }
                }
                Err(e) => {
                    warn!(instance_id = %instance.id(), error = %e, "Failed to parse NGINX config");
                }
            }
        }

        reported
    }
}
