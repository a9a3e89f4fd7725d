// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for nginx-agent integration tests.
//!
//! [`TestEnv`] owns a temp directory laid out like an agent host.
//! [`TestAgent`] is a running AgentRuntime on top of it whose management
//! plane is a channel and whose instance service is a mock.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use nginx_agent::bus::{self, Message, MessagePipeInterface, Plugin, PluginInfo, Topic};
use nginx_agent::command::ChannelCommandService;
use nginx_agent::config::{Config, Feature};
use nginx_agent::file::{FileManagerService, LocalFileManager};
use nginx_agent::model::{
    ConfigApplyRequest, ConfigVersion, DataPlaneResponse, File, FileOverview, Instance,
    InstanceMeta, InstanceRuntime, InstanceType, ManagementPlaneRequest, Request,
};
use nginx_agent::nginx::MockInstanceService;
use nginx_agent::runtime::AgentRuntime;

pub const INSTANCE_ID: &str = "instance-1";

/// Temp directory with an allowed config directory and a lib directory.
pub struct TestEnv {
    pub config: Config,
    temp_dir: tempfile::TempDir,
}

impl TestEnv {
    /// Environment with every feature enabled.
    pub fn new() -> Self {
        Self::with_features(vec![Feature::Configuration, Feature::ApiAction])
    }

    /// Environment with only `features` enabled.
    pub fn with_features(features: Vec<Feature>) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("nginx"))
            .expect("Failed to create config dir");

        let config = Config {
            lib_dir: temp_dir.path().join("lib"),
            allowed_directories: vec![temp_dir.path().join("nginx")],
            features,
            queue_size: 64,
            instance_id: INSTANCE_ID.to_string(),
            ..Default::default()
        };

        Self { config, temp_dir }
    }

    /// The allowed configuration directory.
    pub fn config_dir(&self) -> PathBuf {
        self.temp_dir.path().join("nginx")
    }

    /// Absolute path of `name` inside the config directory.
    pub fn config_file(&self, name: &str) -> String {
        self.config_dir().join(name).to_string_lossy().into_owned()
    }

    /// A file manager over this environment's directories.
    pub fn local_file_manager(&self) -> Arc<LocalFileManager> {
        Arc::new(LocalFileManager::new(self.config.clone()))
    }

    /// Start an agent on this environment.
    pub async fn start(self, file_manager: Arc<dyn FileManagerService>) -> TestAgent {
        let (command, responses) = ChannelCommandService::new();
        let command = Arc::new(command);
        let service = Arc::new(MockInstanceService::new());
        let recorder = Arc::new(RecordingPlugin::new(
            "recorder",
            vec![Topic::EnableWatchers, Topic::ConnectionCreated],
        ));

        let runtime = AgentRuntime::builder()
            .config(self.config.clone())
            .file_manager(file_manager)
            .instance_service(service.clone())
            .command_service(command.clone())
            .instances(vec![test_instance(INSTANCE_ID)])
            .monitor_interval(Duration::from_secs(3600))
            .build()
            .expect("Failed to build runtime")
            .start()
            .await
            .expect("Failed to start runtime");

        let plugins: Vec<Arc<dyn Plugin>> = vec![recorder.clone()];
        runtime
            .pipe()
            .register(1, plugins)
            .await
            .expect("Failed to register recorder");

        TestAgent {
            runtime,
            responses,
            command,
            service,
            recorder,
            env: self,
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A running agent plus handles to its collaborators.
pub struct TestAgent {
    pub runtime: AgentRuntime,
    pub responses: mpsc::UnboundedReceiver<DataPlaneResponse>,
    pub command: Arc<ChannelCommandService>,
    pub service: Arc<MockInstanceService>,
    pub recorder: Arc<RecordingPlugin>,
    pub env: TestEnv,
}

impl TestAgent {
    /// Next response sent to the management plane.
    pub async fn next_response(&mut self) -> DataPlaneResponse {
        tokio::time::timeout(Duration::from_secs(5), self.responses.recv())
            .await
            .expect("Timed out waiting for response")
            .expect("Response channel closed")
    }

    /// Asserts that no further response arrives shortly.
    pub async fn assert_no_response(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.responses.recv()).await;
        assert!(next.is_err(), "Unexpected response: {:?}", next);
    }

    /// Wait until the recorder has seen a message on `topic` `count` times.
    pub async fn wait_for_topic(&self, topic: Topic, count: usize) {
        let recorder = self.recorder.clone();
        wait_for(move || recorder.count(topic) >= count).await;
    }
}

/// Plugin that records every message it receives.
pub struct RecordingPlugin {
    name: String,
    topics: Vec<Topic>,
    received: Mutex<Vec<Message>>,
    closed: Mutex<bool>,
}

impl RecordingPlugin {
    pub fn new(name: &str, topics: Vec<Topic>) -> Self {
        Self {
            name: name.to_string(),
            topics,
            received: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    pub fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }

    pub fn count(&self, topic: Topic) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(&self.name)
    }

    async fn init(&self, _pipe: Arc<dyn MessagePipeInterface>) -> bus::Result<()> {
        Ok(())
    }

    async fn close(&self) -> bus::Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }

    async fn process(&self, message: &Message) {
        self.received.lock().unwrap().push(message.clone());
    }

    fn subscriptions(&self) -> Vec<Topic> {
        self.topics.clone()
    }
}

/// An open source NGINX instance.
pub fn test_instance(instance_id: &str) -> Instance {
    Instance {
        meta: InstanceMeta {
            instance_id: instance_id.to_string(),
            instance_type: InstanceType::Nginx,
            version: "1.27.0".to_string(),
        },
        runtime: InstanceRuntime::default(),
    }
}

/// Config apply request writing `files` for `instance_id`.
pub fn apply_request(instance_id: &str, files: Vec<File>) -> ManagementPlaneRequest {
    ManagementPlaneRequest::new(Request::ConfigApply(ConfigApplyRequest {
        overview: FileOverview {
            config_version: ConfigVersion {
                instance_id: instance_id.to_string(),
                version: uuid::Uuid::new_v4().to_string(),
            },
            files,
        },
    }))
}

/// Read a file as a string.
pub fn read(path: impl AsRef<Path>) -> String {
    std::fs::read_to_string(path).expect("Failed to read file")
}

/// Poll `condition` until it holds, failing after five seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for condition");
}
