// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Watcher module - tracks which configuration is authoritative.
//!
//! While a config apply is running for an instance, changes observed on disk
//! are the agent's own writes and must not be reported. [`WatcherPlugin`]
//! pauses reporting between `ConfigApplyRequest` and `EnableWatchers`;
//! [`ConfigMonitor`] re-parses instances periodically and reports changes
//! through it.

mod monitor;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::bus::{self, Message, MessagePipeInterface, Payload, PipeHandle, Plugin, PluginInfo, Topic};
use crate::model::NginxConfigContext;

pub use monitor::{ConfigMonitor, ConfigMonitorConfig};

const NAME: &str = "watcher";

/// Plugin that gates configuration change reports on apply progress.
#[derive(Default)]
pub struct WatcherPlugin {
    pipe: PipeHandle,
    applies_in_progress: Mutex<HashSet<String>>,
    contexts: Mutex<HashMap<String, NginxConfigContext>>,
}

impl WatcherPlugin {
    /// Create the plugin.
    pub fn new() -> Self {
        Self::default()
    }

    /// True between a config apply request and its `EnableWatchers`.
    pub async fn is_apply_in_progress(&self, instance_id: &str) -> bool {
        self.applies_in_progress.lock().await.contains(instance_id)
    }

    /// Last authoritative context for an instance.
    pub async fn config_context(&self, instance_id: &str) -> Option<NginxConfigContext> {
        self.contexts.lock().await.get(instance_id).cloned()
    }

    /// Report a freshly parsed context.
    ///
    /// Publishes `NginxConfigUpdate` if the context differs from the last
    /// known one and no apply is running for the instance. Returns whether
    /// an update was published.
    pub async fn report_config_context(&self, context: NginxConfigContext) -> bool {
        let instance_id = context.instance_id.clone();
        if self.is_apply_in_progress(&instance_id).await {
            debug!(instance_id = %instance_id, "Config apply in progress, skipping update");
            return false;
        }

        {
            let mut contexts = self.contexts.lock().await;
            if contexts.get(&instance_id) == Some(&context) {
                return false;
            }
            contexts.insert(instance_id.clone(), context.clone());
        }

        info!(instance_id = %instance_id, "NGINX config changed");
        self.pipe
            .publish(
                NAME,
                vec![Message::new(
                    Topic::NginxConfigUpdate,
                    Payload::ConfigContext(context),
                )],
            )
            .await;
        true
    }
}

#[async_trait]
impl Plugin for WatcherPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(NAME)
    }

    async fn init(&self, pipe: Arc<dyn MessagePipeInterface>) -> bus::Result<()> {
        debug!("Starting watcher plugin");
        self.pipe.set(pipe);
        Ok(())
    }

    async fn close(&self) -> bus::Result<()> {
        info!("Closing watcher plugin");
        Ok(())
    }

    async fn process(&self, message: &Message) {
        match message.topic {
            Topic::ConfigApplyRequest => match message.payload.as_management_plane_request() {
                Some(request) => {
                    let instance_id = request.instance_id().to_string();
                    debug!(instance_id = %instance_id, "Pausing watchers for config apply");
                    self.applies_in_progress.lock().await.insert(instance_id);
                }
                None => error!(
                    payload = message.payload.kind(),
                    "Unable to cast message payload to ManagementPlaneRequest"
                ),
            },
            Topic::EnableWatchers => match message.payload.as_enable_watchers() {
                Some(enable) => {
                    debug!(instance_id = %enable.instance_id, "Enabling watchers");
                    self.applies_in_progress
                        .lock()
                        .await
                        .remove(&enable.instance_id);
                    if let Some(context) = &enable.config_context {
                        self.contexts
                            .lock()
                            .await
                            .insert(enable.instance_id.clone(), context.clone());
                    }
                }
                None => error!(
                    payload = message.payload.kind(),
                    "Unable to cast message payload to EnableWatchers"
                ),
            },
            other => debug!(topic = %other, "Unknown topic"),
        }
    }

    fn subscriptions(&self) -> Vec<Topic> {
        vec![Topic::ConfigApplyRequest, Topic::EnableWatchers]
    }
}
