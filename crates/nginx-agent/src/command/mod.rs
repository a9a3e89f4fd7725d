// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command module - the management plane boundary.
//!
//! [`CommandService`] is the transport seam; [`CommandPlugin`] turns
//! management plane requests into bus messages and forwards responses back.

mod channel;
mod plugin;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::model::{DataPlaneResponse, Resource};

pub use channel::ChannelCommandService;
pub use plugin::CommandPlugin;

/// Errors from talking to the management plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// A response could not be delivered.
    #[error("failed to send data plane response: {0}")]
    Send(String),

    /// The resource status could not be reported.
    #[error("failed to update data plane status: {0}")]
    Status(String),

    /// No connection to the management plane.
    #[error("not connected to management plane")]
    NotConnected,
}

/// Transport to the management plane.
#[async_trait]
pub trait CommandService: Send + Sync {
    /// Deliver a response for a management plane request.
    async fn send_data_plane_response(
        &self,
        response: &DataPlaneResponse,
    ) -> Result<(), CommandError>;

    /// Report the current resource and its instances.
    async fn update_data_plane_status(&self, resource: &Resource) -> Result<(), CommandError>;
}

/// Command service that only logs. Used when no transport is configured.
#[derive(Debug, Default)]
pub struct LoggingCommandService;

#[async_trait]
impl CommandService for LoggingCommandService {
    async fn send_data_plane_response(
        &self,
        response: &DataPlaneResponse,
    ) -> Result<(), CommandError> {
        info!(
            correlation_id = %response.correlation_id(),
            instance_id = %response.instance_id,
            status = ?response.status(),
            message = %response.command_response.message,
            error = %response.command_response.error,
            "Data plane response"
        );
        Ok(())
    }

    async fn update_data_plane_status(&self, resource: &Resource) -> Result<(), CommandError> {
        info!(
            resource_id = %resource.resource_id,
            instances = resource.instances.len(),
            "Data plane status"
        );
        Ok(())
    }
}
