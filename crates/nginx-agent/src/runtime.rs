// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for nginx-agent.
//!
//! [`AgentRuntime`] wires the plugins onto a [`MessagePipe`], runs the
//! dispatch loop and the config monitor, and announces the configured
//! instance.
//!
//! ```rust,ignore
//! use nginx_agent::config::Config;
//! use nginx_agent::runtime::AgentRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AgentRuntime::builder()
//!         .config(Config::from_env()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... hand management plane requests to runtime.handle_request() ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bus::{self, Message, MessagePipe, Payload, Plugin, Topic};
use crate::command::{CommandPlugin, CommandService, LoggingCommandService};
use crate::config::Config;
use crate::file::{FileManagerService, LocalFileManager};
use crate::model::{Instance, InstanceMeta, InstanceRuntime, InstanceType, ManagementPlaneRequest};
use crate::nginx::{InstanceService, NginxConfigParser, NginxInstanceOperator, NginxPlugin, NginxService};
use crate::resource::ResourcePlugin;
use crate::watcher::{ConfigMonitor, ConfigMonitorConfig, WatcherPlugin};

/// Builder for creating an [`AgentRuntime`].
pub struct AgentRuntimeBuilder {
    config: Option<Config>,
    file_manager: Option<Arc<dyn FileManagerService>>,
    instance_service: Option<Arc<dyn InstanceService>>,
    command_service: Option<Arc<dyn CommandService>>,
    instances: Option<Vec<Instance>>,
    monitor_interval: Duration,
}

impl Default for AgentRuntimeBuilder {
    fn default() -> Self {
        Self {
            config: None,
            file_manager: None,
            instance_service: None,
            command_service: None,
            instances: None,
            monitor_interval: ConfigMonitorConfig::default().poll_interval,
        }
    }
}

impl AgentRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent configuration (required).
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the file manager.
    ///
    /// Default: [`LocalFileManager`] over the configured directories.
    pub fn file_manager(mut self, file_manager: Arc<dyn FileManagerService>) -> Self {
        self.file_manager = Some(file_manager);
        self
    }

    /// Set the instance service.
    ///
    /// Default: [`NginxService`] using the configured NGINX binary and PID file.
    pub fn instance_service(mut self, instance_service: Arc<dyn InstanceService>) -> Self {
        self.instance_service = Some(instance_service);
        self
    }

    /// Set the management plane transport.
    ///
    /// Default: [`LoggingCommandService`]
    pub fn command_service(mut self, command_service: Arc<dyn CommandService>) -> Self {
        self.command_service = Some(command_service);
        self
    }

    /// Set the instances announced at startup.
    ///
    /// Default: the single instance described by the configuration.
    pub fn instances(mut self, instances: Vec<Instance>) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Set how often instance configuration is re-parsed.
    ///
    /// Default: 5 seconds
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<AgentRuntimeConfig> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("config is required"))?;

        Ok(AgentRuntimeConfig {
            config,
            file_manager: self.file_manager,
            instance_service: self.instance_service,
            command_service: self.command_service,
            instances: self.instances,
            monitor_interval: self.monitor_interval,
        })
    }
}

/// Configuration for an [`AgentRuntime`].
pub struct AgentRuntimeConfig {
    config: Config,
    file_manager: Option<Arc<dyn FileManagerService>>,
    instance_service: Option<Arc<dyn InstanceService>>,
    command_service: Option<Arc<dyn CommandService>>,
    instances: Option<Vec<Instance>>,
    monitor_interval: Duration,
}

impl AgentRuntimeConfig {
    /// Start the runtime, spawning the dispatch loop and the config monitor.
    pub async fn start(self) -> Result<AgentRuntime> {
        let config = Arc::new(self.config);
        let parser = Arc::new(NginxConfigParser::new());

        let file_manager = self
            .file_manager
            .unwrap_or_else(|| Arc::new(LocalFileManager::new(config.as_ref().clone())));
        let instance_service = self.instance_service.unwrap_or_else(|| {
            let operator =
                NginxInstanceOperator::new(&config.nginx_binary, &config.nginx_pid_file);
            Arc::new(NginxService::new(parser.clone(), Arc::new(operator)))
        });
        let command_service = self
            .command_service
            .unwrap_or_else(|| Arc::new(LoggingCommandService));

        let command = Arc::new(CommandPlugin::new(config.clone(), command_service));
        let nginx = Arc::new(NginxPlugin::new(file_manager, instance_service.clone()));
        let watcher = Arc::new(WatcherPlugin::new());
        let resource = Arc::new(ResourcePlugin::new(resource_id()));

        // Watcher sees ConfigApplyRequest before nginx so the instance is
        // paused while its files are written.
        let plugins: Vec<Arc<dyn Plugin>> = vec![
            command.clone(),
            watcher.clone(),
            nginx,
            resource,
        ];

        let pipe = Arc::new(MessagePipe::new(config.queue_size));
        pipe.register(plugins.len(), plugins).await?;

        let cancel = CancellationToken::new();

        let pipe_handle = {
            let pipe = pipe.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pipe.run(cancel).await })
        };

        let monitor = ConfigMonitor::new(
            ConfigMonitorConfig {
                poll_interval: self.monitor_interval,
            },
            watcher.clone(),
            parser,
            instance_service,
        );
        let monitor_handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.run(cancel).await })
        };

        let instances = match self.instances {
            Some(instances) => instances,
            None => vec![configured_instance(&config).await],
        };
        debug!(instances = instances.len(), "Announcing instances");
        pipe.process(vec![Message::new(
            Topic::InstancesUpdated,
            Payload::Instances(instances),
        )])
        .await?;

        info!(
            queue_size = config.queue_size,
            instance_id = %config.instance_id,
            features = ?config.features.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
            "AgentRuntime started"
        );

        Ok(AgentRuntime {
            pipe,
            command,
            watcher,
            cancel,
            pipe_handle,
            monitor_handle,
        })
    }
}

/// A running agent that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct AgentRuntime {
    pipe: Arc<MessagePipe>,
    command: Arc<CommandPlugin>,
    watcher: Arc<WatcherPlugin>,
    cancel: CancellationToken,
    pipe_handle: JoinHandle<bus::Result<()>>,
    monitor_handle: JoinHandle<()>,
}

impl AgentRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new()
    }

    /// Hand a management plane request to the agent.
    pub async fn handle_request(&self, request: ManagementPlaneRequest) {
        self.command.handle_management_plane_request(request).await;
    }

    /// The bus the plugins are registered on.
    pub fn pipe(&self) -> &Arc<MessagePipe> {
        &self.pipe
    }

    /// The plugin tracking which instances have an apply in flight.
    pub fn watcher(&self) -> &Arc<WatcherPlugin> {
        &self.watcher
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.pipe_handle.is_finished() && !self.monitor_handle.is_finished()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops the config monitor and the dispatch loop, which closes every
    /// plugin, then waits for both.
    pub async fn shutdown(self) -> Result<()> {
        info!("AgentRuntime shutting down...");
        self.cancel.cancel();

        if let Err(e) = self.monitor_handle.await {
            error!("Config monitor task panicked: {}", e);
        }

        match self.pipe_handle.await {
            Ok(Ok(())) => {
                info!("AgentRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Message pipe error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("Message pipe task panicked: {}", e);
                Err(anyhow::anyhow!("message pipe task panicked: {}", e))
            }
        }
    }
}

/// The instance described by `config`, with the master PID if known.
async fn configured_instance(config: &Config) -> Instance {
    let process_id = tokio::fs::read_to_string(&config.nginx_pid_file)
        .await
        .ok()
        .and_then(|pid| pid.trim().parse().ok());

    Instance {
        meta: InstanceMeta {
            instance_id: config.instance_id.clone(),
            instance_type: if config.nginx_plus {
                InstanceType::NginxPlus
            } else {
                InstanceType::Nginx
            },
            version: String::new(),
        },
        runtime: InstanceRuntime {
            process_id,
            binary_path: config.nginx_binary.to_string_lossy().into_owned(),
            config_path: config.nginx_conf.to_string_lossy().into_owned(),
            ..Default::default()
        },
    }
}

fn resource_id() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
