// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The message pipe: plugin registry plus a single dispatch loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BusError, Message, MessagePipeInterface, Plugin, Result, Topic};

/// A registered plugin and its lifecycle flags.
struct Registration {
    name: String,
    plugin: Arc<dyn Plugin>,
    topics: Vec<Topic>,
    initialised: AtomicBool,
    closed: AtomicBool,
}

impl Registration {
    fn new(plugin: Arc<dyn Plugin>) -> Self {
        let mut topics = Vec::new();
        for topic in plugin.subscriptions() {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        Self {
            name: plugin.info().name,
            plugin,
            topics,
            initialised: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    async fn init(&self, pipe: Arc<dyn MessagePipeInterface>) {
        if self.initialised.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.plugin.init(pipe).await {
            error!(plugin = %self.name, error = %e, "Failed to initialise plugin");
        } else {
            debug!(plugin = %self.name, "Plugin initialised");
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.plugin.close().await {
            warn!(plugin = %self.name, error = %e, "Failed to close plugin");
        } else {
            debug!(plugin = %self.name, "Plugin closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Registry {
    plugins: Vec<Arc<Registration>>,
    subscribers: HashMap<Topic, Vec<Arc<Registration>>>,
}

impl Registry {
    fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|r| r.name == name)
    }
}

/// Sending half handed to plugins.
///
/// Holds no reference to the registry so plugins do not keep the pipe alive.
struct Publisher {
    sender: mpsc::Sender<Message>,
    shutdown: CancellationToken,
}

async fn enqueue(
    sender: &mpsc::Sender<Message>,
    shutdown: &CancellationToken,
    messages: Vec<Message>,
) -> Result<()> {
    for message in messages {
        if shutdown.is_cancelled() {
            return Err(BusError::Closed);
        }
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => return Err(BusError::Closed),

            sent = sender.send(message) => sent.map_err(|_| BusError::Closed)?,
        }
    }
    Ok(())
}

#[async_trait]
impl MessagePipeInterface for Publisher {
    async fn process(&self, messages: Vec<Message>) -> Result<()> {
        enqueue(&self.sender, &self.shutdown, messages).await
    }
}

/// In-process publish/subscribe bus.
///
/// Messages are delivered in the order they were enqueued. For each message,
/// subscribers run one after another in registration order, and a message
/// published from inside a handler is dispatched only after the current
/// message has reached every subscriber.
///
/// Handlers that publish more messages than the channel capacity while being
/// dispatched will block the loop, so size the queue for the largest burst.
pub struct MessagePipe {
    sender: mpsc::Sender<Message>,
    receiver: Mutex<Option<mpsc::Receiver<Message>>>,
    registry: RwLock<Registry>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl MessagePipe {
    /// Create a pipe whose channel holds up to `queue_size` messages.
    pub fn new(queue_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            registry: RwLock::new(Registry::default()),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Handle plugins use to publish onto this pipe.
    pub fn publisher(&self) -> Arc<dyn MessagePipeInterface> {
        Arc::new(Publisher {
            sender: self.sender.clone(),
            shutdown: self.shutdown.clone(),
        })
    }

    /// Register plugins and subscribe them to their topics.
    ///
    /// The whole batch is rejected if any name is already registered or
    /// repeated within the batch. Plugins registered while the pipe is
    /// running are initialised immediately.
    pub async fn register(&self, capacity: usize, plugins: Vec<Arc<dyn Plugin>>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(BusError::Closed);
        }

        let added = {
            let mut registry = self.registry.write().await;

            let mut batch = HashSet::new();
            for plugin in &plugins {
                let name = plugin.info().name;
                if registry.contains(&name) || !batch.insert(name.clone()) {
                    return Err(BusError::DuplicatePlugin(name));
                }
            }

            registry.plugins.reserve(capacity.max(plugins.len()));

            let mut added = Vec::with_capacity(plugins.len());
            for plugin in plugins {
                let registration = Arc::new(Registration::new(plugin));
                for topic in &registration.topics {
                    registry
                        .subscribers
                        .entry(*topic)
                        .or_default()
                        .push(registration.clone());
                }
                info!(
                    plugin = %registration.name,
                    topics = ?registration.topics.iter().map(Topic::as_str).collect::<Vec<_>>(),
                    "Plugin registered"
                );
                registry.plugins.push(registration.clone());
                added.push(registration);
            }
            added
        };

        if self.running.load(Ordering::SeqCst) {
            for registration in added {
                registration.init(self.publisher()).await;
            }
        }

        Ok(())
    }

    /// Remove plugins by name, unsubscribe them and close them.
    ///
    /// Unknown names are ignored.
    pub async fn deregister(&self, names: &[&str]) {
        let removed = {
            let mut registry = self.registry.write().await;

            let (removed, kept): (Vec<_>, Vec<_>) = registry
                .plugins
                .drain(..)
                .partition(|r| names.contains(&r.name.as_str()));
            registry.plugins = kept;

            for subscribers in registry.subscribers.values_mut() {
                subscribers.retain(|r| !names.contains(&r.name.as_str()));
            }
            registry.subscribers.retain(|_, subscribers| !subscribers.is_empty());

            removed
        };

        for registration in removed {
            info!(plugin = %registration.name, "Plugin deregistered");
            registration.close().await;
        }
    }

    /// Enqueue messages for dispatch.
    ///
    /// Waits while the channel is full. Fails with [`BusError::Closed`] once
    /// the pipe has stopped.
    pub async fn process(&self, messages: Vec<Message>) -> Result<()> {
        enqueue(&self.sender, &self.shutdown, messages).await
    }

    /// True if a plugin with `name` is registered.
    pub async fn is_registered(&self, name: &str) -> bool {
        self.registry.read().await.contains(name)
    }

    /// Names of registered plugins in registration order.
    pub async fn plugins(&self) -> Vec<String> {
        self.registry
            .read()
            .await
            .plugins
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    /// Names of plugins subscribed to `topic` in delivery order.
    pub async fn subscribers(&self, topic: Topic) -> Vec<String> {
        self.registry
            .read()
            .await
            .subscribers
            .get(&topic)
            .map(|subs| subs.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }

    /// True once `run` has stopped; no more messages are accepted.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run the dispatch loop until `cancel` fires.
    ///
    /// Initialises every registered plugin first. On exit, stops accepting
    /// messages, drops anything still queued and closes every registered
    /// plugin.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(BusError::AlreadyRunning)?;

        self.running.store(true, Ordering::SeqCst);

        let plugins = self.registry.read().await.plugins.clone();
        for registration in &plugins {
            registration.init(self.publisher()).await;
        }

        info!(plugins = plugins.len(), "Message pipe running");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Message pipe received shutdown signal");
                    break;
                }

                message = receiver.recv() => {
                    match message {
                        Some(message) => self.dispatch(&message).await,
                        None => break,
                    }
                }
            }
        }

        self.shutdown.cancel();
        receiver.close();
        self.running.store(false, Ordering::SeqCst);

        let plugins = self.registry.read().await.plugins.clone();
        for registration in plugins {
            registration.close().await;
        }

        info!("Message pipe stopped");
        Ok(())
    }

    async fn dispatch(&self, message: &Message) {
        let subscribers = {
            let registry = self.registry.read().await;
            registry
                .subscribers
                .get(&message.topic)
                .cloned()
                .unwrap_or_default()
        };

        if subscribers.is_empty() {
            debug!(topic = %message.topic, "No subscribers for message");
            return;
        }

        debug!(
            topic = %message.topic,
            payload = message.payload.kind(),
            subscribers = subscribers.len(),
            "Dispatching message"
        );

        for registration in subscribers {
            if registration.is_closed() {
                continue;
            }
            registration.plugin.process(message).await;
        }
    }
}

#[async_trait]
impl MessagePipeInterface for MessagePipe {
    async fn process(&self, messages: Vec<Message>) -> Result<()> {
        MessagePipe::process(self, messages).await
    }
}
