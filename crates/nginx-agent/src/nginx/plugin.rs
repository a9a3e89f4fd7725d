// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Config apply orchestration.
//!
//! [`NginxPlugin`] stages files through the [`FileManagerService`], applies
//! them through the [`InstanceService`] and rolls back when either step
//! fails. Every request ends with an `EnableWatchers` message so log and
//! health watchers pick up whatever configuration is now active.
//!
//! ```text
//! ConfigApplyRequest
//!        │
//!        ▼
//!  config_apply ──NoChange──────────────▶ OK ─────────────┐
//!        │      ──Error─────────────────▶ FAILURE ────────┤
//!        │      ──RollbackRequired──▶ ERROR ─▶ rollback ─▶ FAILURE ─┤
//!        │ Ok                                                       │
//!        ▼                                                          │
//!  apply_config ──ok──────────────────────▶ OK ───────────────────┤
//!        │ err                                                      │
//!        ▼                                                          ▼
//!      ERROR ─▶ rollback + re-apply ─▶ FAILURE ─────────▶ clear cache, EnableWatchers
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{ConfigApplyError, InstanceService};
use crate::bus::{self, Message, MessagePipeInterface, Payload, PipeHandle, Plugin, PluginInfo, Topic};
use crate::file::{FileManagerService, WriteStatus};
use crate::model::{
    CommandStatus, DataPlaneResponse, EnableWatchers, ManagementPlaneRequest, NginxConfigContext,
    Request, RequestType,
};

const NAME: &str = "nginx";

/// Plugin that applies configuration to NGINX instances.
pub struct NginxPlugin {
    file_manager: Arc<dyn FileManagerService>,
    instance_service: Arc<dyn InstanceService>,
    pipe: PipeHandle,
}

impl NginxPlugin {
    /// Create the plugin.
    pub fn new(
        file_manager: Arc<dyn FileManagerService>,
        instance_service: Arc<dyn InstanceService>,
    ) -> Self {
        Self {
            file_manager,
            instance_service,
            pipe: PipeHandle::new(),
        }
    }

    async fn respond(&self, response: DataPlaneResponse) {
        self.pipe
            .publish(
                NAME,
                vec![Message::new(
                    Topic::DataPlaneResponse,
                    Payload::DataPlaneResponse(response),
                )],
            )
            .await;
    }

    /// Ends a config apply: response, cache clear, then watchers.
    async fn complete(
        &self,
        response: DataPlaneResponse,
        context: Option<NginxConfigContext>,
    ) {
        let instance_id = response.instance_id.clone();
        self.respond(response).await;
        self.file_manager.clear_cache().await;

        let watchers = EnableWatchers {
            instance_id,
            config_context: context,
        };
        self.pipe
            .publish(
                NAME,
                vec![Message::new(
                    Topic::EnableWatchers,
                    Payload::EnableWatchers(watchers),
                )],
            )
            .await;
    }

    async fn handle_config_apply_request(&self, message: &Message) {
        let Some(request) = message.payload.as_management_plane_request() else {
            error!(
                payload = message.payload.kind(),
                "Unable to cast message payload to ManagementPlaneRequest"
            );
            return;
        };
        let Request::ConfigApply(apply) = &request.request else {
            error!(
                correlation_id = %request.correlation_id(),
                "Management plane request is not a config apply request"
            );
            return;
        };

        let instance_id = request.instance_id();
        info!(
            correlation_id = %request.correlation_id(),
            instance_id,
            version = %apply.overview.config_version.version,
            "Applying config"
        );

        match self.file_manager.config_apply(apply).await {
            WriteStatus::NoChange => {
                info!(instance_id, "No files to change");
                let response = config_apply_response(
                    request,
                    CommandStatus::Ok,
                    "Config apply successful, no files to change",
                );
                self.complete(response, None).await;
            }
            WriteStatus::Error(e) => {
                warn!(instance_id, error = %e, "Config apply failed");
                let response =
                    config_apply_response(request, CommandStatus::Failure, "Config apply failed")
                        .with_error(&e);
                self.complete(response, None).await;
            }
            WriteStatus::RollbackRequired(e) => {
                warn!(instance_id, error = %e, "Config apply failed, rolling back");
                self.respond(
                    config_apply_response(
                        request,
                        CommandStatus::Error,
                        "Config apply failed, rolling back config",
                    )
                    .with_error(&e),
                )
                .await;

                let response = match self.file_manager.rollback(instance_id).await {
                    Ok(()) => rollback_succeeded(request, &e),
                    Err(rollback) => rollback_failed(request, &e, &rollback),
                };
                self.complete(response, None).await;
            }
            WriteStatus::Ok => self.apply_written_config(request).await,
        }
    }

    /// Files are on disk; parse, validate and reload the instance.
    async fn apply_written_config(&self, request: &ManagementPlaneRequest) {
        let instance_id = request.instance_id();

        let apply_error = match self.instance_service.apply_config(instance_id).await {
            Ok(context) => {
                if !context.files.is_empty()
                    && let Err(e) = self
                        .file_manager
                        .update_current_files_on_disk(&context.files, true)
                        .await
                {
                    error!(instance_id, error = %e, "Unable to update current files on disk");
                }

                info!(instance_id, "Config apply successful");
                let response =
                    config_apply_response(request, CommandStatus::Ok, "Config apply successful");
                self.complete(response, Some(context)).await;
                return;
            }
            Err(e) => e,
        };

        if instance_id.is_empty() {
            error!(error = %apply_error, "Config apply failed for request without an instance");
            let response =
                config_apply_response(request, CommandStatus::Failure, "Config apply failed")
                    .with_error(&apply_error);
            self.complete(response, None).await;
            return;
        }

        warn!(instance_id, error = %apply_error, "Config apply failed, rolling back");
        self.respond(
            config_apply_response(
                request,
                CommandStatus::Error,
                "Config apply failed, rolling back config",
            )
            .with_error(&apply_error),
        )
        .await;

        match self.rollback_and_reapply(instance_id).await {
            Ok(context) => {
                info!(instance_id, "Rollback successful");
                self.complete(rollback_succeeded(request, &apply_error), Some(context))
                    .await;
            }
            Err(rollback) => {
                error!(instance_id, error = %rollback, "Rollback failed");
                self.complete(rollback_failed(request, &apply_error, &rollback), None)
                    .await;
            }
        }
    }

    async fn rollback_and_reapply(
        &self,
        instance_id: &str,
    ) -> Result<NginxConfigContext, String> {
        self.file_manager
            .rollback(instance_id)
            .await
            .map_err(|e| e.to_string())?;

        self.instance_service
            .apply_config(instance_id)
            .await
            .map_err(|e| e.to_string())
    }

    async fn handle_config_upload_request(&self, message: &Message) {
        let Some(request) = message.payload.as_management_plane_request() else {
            error!(
                payload = message.payload.kind(),
                "Unable to cast message payload to ManagementPlaneRequest"
            );
            return;
        };
        let Request::ConfigUpload(upload) = &request.request else {
            error!(
                correlation_id = %request.correlation_id(),
                "Management plane request is not a config upload request"
            );
            return;
        };

        let response = match self.file_manager.config_upload(upload).await {
            Ok(()) => DataPlaneResponse::new(
                request.correlation_id(),
                CommandStatus::Ok,
                "Successfully updated all files",
                request.instance_id(),
                RequestType::ConfigUpload,
            ),
            Err(e) => {
                warn!(instance_id = %request.instance_id(), error = %e, "Config upload failed");
                DataPlaneResponse::new(
                    request.correlation_id(),
                    CommandStatus::Failure,
                    "Failed to update all files",
                    request.instance_id(),
                    RequestType::ConfigUpload,
                )
                .with_error(&e)
            }
        };
        self.respond(response).await;
    }

    async fn handle_api_action_request(&self, message: &Message) {
        let Some(request) = message.payload.as_management_plane_request() else {
            error!(
                payload = message.payload.kind(),
                "Unable to cast message payload to ManagementPlaneRequest"
            );
            return;
        };
        let Request::Action(action) = &request.request else {
            error!(
                correlation_id = %request.correlation_id(),
                "Management plane request is not an API action request"
            );
            return;
        };

        let error_text = match self.instance_service.instance(&action.instance_id).await {
            None => format!(
                "failed to perform API action, could not find instance with ID: {}",
                action.instance_id
            ),
            Some(instance) if !instance.is_plus() => {
                "failed to perform API action, instance is not NGINX Plus".to_string()
            }
            Some(_) => format!("API action {} is not supported", action.action),
        };

        warn!(
            instance_id = %action.instance_id,
            action = %action.action,
            error = %error_text,
            "API action failed"
        );
        let response = DataPlaneResponse::new(
            request.correlation_id(),
            CommandStatus::Failure,
            "",
            &action.instance_id,
            RequestType::ApiAction,
        )
        .with_error(error_text);
        self.respond(response).await;
    }
}

fn config_apply_response(
    request: &ManagementPlaneRequest,
    status: CommandStatus,
    message: &str,
) -> DataPlaneResponse {
    DataPlaneResponse::new(
        request.correlation_id(),
        status,
        message,
        request.instance_id(),
        RequestType::ConfigApply,
    )
}

fn rollback_succeeded(request: &ManagementPlaneRequest, apply: &impl ToString) -> DataPlaneResponse {
    config_apply_response(
        request,
        CommandStatus::Failure,
        "Config apply failed, rollback successful",
    )
    .with_error(apply.to_string())
}

fn rollback_failed(
    request: &ManagementPlaneRequest,
    apply: &impl ToString,
    rollback: &impl ToString,
) -> DataPlaneResponse {
    config_apply_response(
        request,
        CommandStatus::Failure,
        "Config apply failed, rollback failed",
    )
    .with_error(ConfigApplyError::combined(apply.to_string(), rollback.to_string()))
}

#[async_trait]
impl Plugin for NginxPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(NAME)
    }

    async fn init(&self, pipe: Arc<dyn MessagePipeInterface>) -> bus::Result<()> {
        debug!("Starting nginx plugin");
        self.pipe.set(pipe);
        Ok(())
    }

    async fn close(&self) -> bus::Result<()> {
        info!("Closing nginx plugin");
        Ok(())
    }

    async fn process(&self, message: &Message) {
        match message.topic {
            Topic::ConfigApplyRequest => self.handle_config_apply_request(message).await,
            Topic::ConfigUploadRequest => self.handle_config_upload_request(message).await,
            Topic::ApiActionRequest => self.handle_api_action_request(message).await,
            Topic::ResourceUpdate => match message.payload.as_resource() {
                Some(resource) => {
                    debug!(resource_id = %resource.resource_id, "Nginx plugin received resource update");
                    self.instance_service.update_resource(resource.clone()).await;
                }
                None => error!(
                    payload = message.payload.kind(),
                    "Unable to cast message payload to Resource"
                ),
            },
            Topic::NginxConfigUpdate => match message.payload.as_config_context() {
                Some(context) => self.file_manager.config_update(context).await,
                None => error!(
                    payload = message.payload.kind(),
                    "Unable to cast message payload to NginxConfigContext"
                ),
            },
            Topic::ConnectionCreated => self.file_manager.set_is_connected(true).await,
            Topic::ConnectionReset => self.file_manager.set_is_connected(false).await,
            other => debug!(topic = %other, "Unknown topic"),
        }
    }

    fn subscriptions(&self) -> Vec<Topic> {
        vec![
            Topic::ConfigApplyRequest,
            Topic::ConfigUploadRequest,
            Topic::ConnectionCreated,
            Topic::ConnectionReset,
            Topic::ResourceUpdate,
            Topic::ApiActionRequest,
            Topic::NginxConfigUpdate,
        ]
    }
}
