// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command plugin - turns management plane requests into bus messages and
//! sends the resulting responses back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::CommandService;
use crate::bus::{self, Message, MessagePipeInterface, Payload, PipeHandle, Plugin, PluginInfo, Topic};
use crate::config::{Config, Feature};
use crate::model::{CommandStatus, DataPlaneResponse, ManagementPlaneRequest, Request};

const NAME: &str = "command";

/// Bridges the management plane and the bus.
///
/// Requests enter through [`handle_management_plane_request`]; responses
/// published on [`Topic::DataPlaneResponse`] leave through the
/// [`CommandService`].
///
/// [`handle_management_plane_request`]: CommandPlugin::handle_management_plane_request
pub struct CommandPlugin {
    config: Arc<Config>,
    service: Arc<dyn CommandService>,
    pipe: PipeHandle,
    connected: AtomicBool,
}

impl CommandPlugin {
    /// Create the plugin.
    pub fn new(config: Arc<Config>, service: Arc<dyn CommandService>) -> Self {
        Self {
            config,
            service,
            pipe: PipeHandle::new(),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether a resource update has been delivered since the last reset.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Route a request from the management plane.
    ///
    /// Requests for disabled features are answered with `FAILURE` directly.
    pub async fn handle_management_plane_request(&self, request: ManagementPlaneRequest) {
        debug!(
            correlation_id = %request.correlation_id(),
            request_type = ?request.request.request_type(),
            "Received management plane request"
        );

        let (topic, feature, failure) = match &request.request {
            Request::ConfigApply(_) => (
                Topic::ConfigApplyRequest,
                Feature::Configuration,
                ("Config apply failed", "Configuration feature is disabled"),
            ),
            Request::ConfigUpload(_) => (
                Topic::ConfigUploadRequest,
                Feature::Configuration,
                ("Config upload failed", "Configuration feature is disabled"),
            ),
            Request::Action(_) => (
                Topic::ApiActionRequest,
                Feature::ApiAction,
                ("API action failed", "API action feature is disabled"),
            ),
            Request::Health => {
                let response = DataPlaneResponse::new(
                    request.correlation_id(),
                    CommandStatus::Ok,
                    "Instances healthy",
                    "",
                    request.request.request_type(),
                );
                self.send(&response).await;
                return;
            }
        };

        if !self.config.is_feature_enabled(feature) {
            warn!(
                correlation_id = %request.correlation_id(),
                feature = feature.as_str(),
                "Feature disabled, rejecting request"
            );
            let (message, error) = failure;
            let response = DataPlaneResponse::new(
                request.correlation_id(),
                CommandStatus::Failure,
                message,
                request.instance_id(),
                request.request.request_type(),
            )
            .with_error(error);
            self.send(&response).await;
            return;
        }

        self.pipe
            .publish(
                NAME,
                vec![Message::new(topic, Payload::ManagementPlaneRequest(request))],
            )
            .await;
    }

    async fn send(&self, response: &DataPlaneResponse) {
        if let Err(e) = self.service.send_data_plane_response(response).await {
            error!(
                correlation_id = %response.correlation_id(),
                error = %e,
                "Unable to send data plane response"
            );
        }
    }

    async fn handle_resource_update(&self, message: &Message) {
        let Some(resource) = message.payload.as_resource() else {
            error!(
                payload = message.payload.kind(),
                "Unable to cast message payload to Resource"
            );
            return;
        };

        if let Err(e) = self.service.update_data_plane_status(resource).await {
            error!(error = %e, "Unable to update data plane status");
            return;
        }

        if !self.connected.swap(true, Ordering::SeqCst) {
            info!(resource_id = %resource.resource_id, "Connection created");
            self.pipe
                .publish(NAME, vec![Message::empty(Topic::ConnectionCreated)])
                .await;
        }
    }
}

#[async_trait]
impl Plugin for CommandPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(NAME)
    }

    async fn init(&self, pipe: Arc<dyn MessagePipeInterface>) -> bus::Result<()> {
        debug!("Starting command plugin");
        self.pipe.set(pipe);
        Ok(())
    }

    async fn close(&self) -> bus::Result<()> {
        info!("Closing command plugin");
        Ok(())
    }

    async fn process(&self, message: &Message) {
        match message.topic {
            Topic::DataPlaneResponse => match message.payload.as_data_plane_response() {
                Some(response) => self.send(response).await,
                None => error!(
                    payload = message.payload.kind(),
                    "Unable to cast message payload to DataPlaneResponse"
                ),
            },
            Topic::ResourceUpdate => self.handle_resource_update(message).await,
            Topic::ConnectionReset => {
                info!("Connection reset");
                self.connected.store(false, Ordering::SeqCst);
            }
            other => debug!(topic = %other, "Unknown topic"),
        }
    }

    fn subscriptions(&self) -> Vec<Topic> {
        vec![
            Topic::DataPlaneResponse,
            Topic::ResourceUpdate,
            Topic::ConnectionReset,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FakeMessagePipe;
    use crate::command::ChannelCommandService;
    use crate::model::{
        ApiActionRequest, ConfigApplyRequest, ConfigUploadRequest, FileOverview, RequestType,
        Resource,
    };
    use tokio::sync::mpsc;

    async fn plugin(
        features: Vec<Feature>,
    ) -> (
        CommandPlugin,
        Arc<FakeMessagePipe>,
        Arc<ChannelCommandService>,
        mpsc::UnboundedReceiver<DataPlaneResponse>,
    ) {
        let config = Config {
            features,
            ..Default::default()
        };
        let (service, rx) = ChannelCommandService::new();
        let service = Arc::new(service);
        let pipe = Arc::new(FakeMessagePipe::new());
        let plugin = CommandPlugin::new(Arc::new(config), service.clone());
        plugin.init(pipe.clone()).await.unwrap();
        (plugin, pipe, service, rx)
    }

    fn all_requests() -> Vec<(ManagementPlaneRequest, Topic)> {
        vec![
            (
                ManagementPlaneRequest::new(Request::ConfigApply(ConfigApplyRequest {
                    overview: FileOverview::default(),
                })),
                Topic::ConfigApplyRequest,
            ),
            (
                ManagementPlaneRequest::new(Request::ConfigUpload(ConfigUploadRequest {
                    overview: FileOverview::default(),
                })),
                Topic::ConfigUploadRequest,
            ),
            (
                ManagementPlaneRequest::new(Request::Action(ApiActionRequest {
                    instance_id: "instance-1".to_string(),
                    action: "get_upstreams".to_string(),
                })),
                Topic::ApiActionRequest,
            ),
        ]
    }

    #[tokio::test]
    async fn test_routes_requests_to_topics() {
        let (plugin, pipe, _service, mut rx) =
            plugin(vec![Feature::Configuration, Feature::ApiAction]).await;

        for (request, topic) in all_requests() {
            pipe.clear();
            plugin.handle_management_plane_request(request.clone()).await;

            let messages = pipe.messages();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].topic, topic);
            assert_eq!(
                messages[0].payload.as_management_plane_request(),
                Some(&request)
            );
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disabled_features_are_rejected() {
        let (plugin, pipe, _service, mut rx) = plugin(Vec::new()).await;

        for (request, _) in all_requests() {
            plugin.handle_management_plane_request(request.clone()).await;

            let response = rx.recv().await.unwrap();
            assert_eq!(response.status(), CommandStatus::Failure);
            assert_eq!(response.correlation_id(), request.correlation_id());
            let expected = match request.request {
                Request::Action(_) => "API action feature is disabled",
                _ => "Configuration feature is disabled",
            };
            assert_eq!(response.command_response.error, expected);
        }
        assert!(pipe.messages().is_empty());
    }

    #[tokio::test]
    async fn test_health_request_answered_directly() {
        let (plugin, pipe, _service, mut rx) = plugin(Vec::new()).await;

        plugin
            .handle_management_plane_request(ManagementPlaneRequest::new(Request::Health))
            .await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.status(), CommandStatus::Ok);
        assert_eq!(response.command_response.message, "Instances healthy");
        assert_eq!(response.request_type, RequestType::Health);
        assert!(pipe.messages().is_empty());
    }

    #[tokio::test]
    async fn test_forwards_data_plane_responses() {
        let (plugin, _pipe, _service, mut rx) = plugin(Vec::new()).await;
        let response = DataPlaneResponse::new(
            "corr-1",
            CommandStatus::Ok,
            "Config apply successful",
            "instance-1",
            RequestType::ConfigApply,
        );

        plugin
            .process(&Message::new(
                Topic::DataPlaneResponse,
                Payload::DataPlaneResponse(response.clone()),
            ))
            .await;
        plugin
            .process(&Message::empty(Topic::DataPlaneResponse))
            .await;

        assert_eq!(rx.recv().await.unwrap(), response);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_first_resource_update_creates_connection() {
        let (plugin, pipe, service, _rx) = plugin(Vec::new()).await;
        let update = Message::new(Topic::ResourceUpdate, Payload::Resource(Resource::default()));

        plugin.process(&update).await;
        plugin.process(&update).await;

        let topics: Vec<Topic> = pipe.messages().iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec![Topic::ConnectionCreated]);
        assert!(plugin.is_connected());
        assert_eq!(service.status_updates().await.len(), 2);

        plugin.process(&Message::empty(Topic::ConnectionReset)).await;
        assert!(!plugin.is_connected());

        plugin.process(&update).await;
        assert_eq!(pipe.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_status_update_does_not_connect() {
        let (plugin, pipe, service, _rx) = plugin(Vec::new()).await;
        service.set_failing_status(true);

        plugin
            .process(&Message::new(
                Topic::ResourceUpdate,
                Payload::Resource(Resource::default()),
            ))
            .await;

        assert!(pipe.messages().is_empty());
        assert!(!plugin.is_connected());
    }
}
