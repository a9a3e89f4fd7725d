// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plugin contract.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{error, warn};

use super::{Message, Result, Topic};

/// Static information about a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    /// Unique plugin name, used for registration and deregistration.
    pub name: String,
}

impl PluginInfo {
    /// Create plugin info.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Publishing side of the bus, handed to plugins at `init`.
#[async_trait]
pub trait MessagePipeInterface: Send + Sync {
    /// Enqueue messages for dispatch. Never dispatches on the caller's task.
    async fn process(&self, messages: Vec<Message>) -> Result<()>;

    /// Enqueue a single message.
    async fn publish(&self, message: Message) -> Result<()> {
        self.process(vec![message]).await
    }
}

/// A capability module on the bus.
///
/// `process` runs on the dispatch loop and is awaited before the next
/// subscriber sees the message, so long-running work delays every plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name.
    fn info(&self) -> PluginInfo;

    /// Called once before the plugin receives messages.
    async fn init(&self, pipe: Arc<dyn MessagePipeInterface>) -> Result<()>;

    /// Called once when the plugin is deregistered or the bus stops.
    async fn close(&self) -> Result<()>;

    /// Handle one message on a subscribed topic.
    async fn process(&self, message: &Message);

    /// Topics the plugin wants delivered.
    fn subscriptions(&self) -> Vec<Topic>;
}

/// Holds the pipe a plugin publishes to once it has been initialised.
#[derive(Default)]
pub struct PipeHandle {
    pipe: OnceLock<Arc<dyn MessagePipeInterface>>,
}

impl PipeHandle {
    /// Empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `pipe`. Later calls keep the first pipe.
    pub fn set(&self, pipe: Arc<dyn MessagePipeInterface>) {
        let _ = self.pipe.set(pipe);
    }

    /// Publishes `messages`, logging instead of failing.
    pub async fn publish(&self, plugin: &str, messages: Vec<Message>) {
        let Some(pipe) = self.pipe.get() else {
            warn!(plugin, count = messages.len(), "Plugin not initialised, dropping messages");
            return;
        };
        if let Err(e) = pipe.process(messages).await {
            error!(plugin, error = %e, "Failed to publish messages");
        }
    }
}
