// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Channel backed command service, for embedding and tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::{CommandError, CommandService};
use crate::model::{DataPlaneResponse, Resource};

/// Forwards responses to an mpsc channel and records status updates.
pub struct ChannelCommandService {
    responses: mpsc::UnboundedSender<DataPlaneResponse>,
    statuses: Mutex<Vec<Resource>>,
    fail_status: AtomicBool,
}

impl ChannelCommandService {
    /// Service plus the receiving end of its response channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DataPlaneResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            responses: tx,
            statuses: Mutex::new(Vec::new()),
            fail_status: AtomicBool::new(false),
        };
        (service, rx)
    }

    /// Make status updates fail until called again with `false`.
    pub fn set_failing_status(&self, failing: bool) {
        self.fail_status.store(failing, Ordering::SeqCst);
    }

    /// Resources reported so far, oldest first.
    pub async fn status_updates(&self) -> Vec<Resource> {
        self.statuses.lock().await.clone()
    }
}

#[async_trait]
impl CommandService for ChannelCommandService {
    async fn send_data_plane_response(
        &self,
        response: &DataPlaneResponse,
    ) -> Result<(), CommandError> {
        self.responses
            .send(response.clone())
            .map_err(|_| CommandError::Send("response channel closed".to_string()))
    }

    async fn update_data_plane_status(&self, resource: &Resource) -> Result<(), CommandError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(CommandError::NotConnected);
        }
        self.statuses.lock().await.push(resource.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommandStatus, RequestType};

    #[tokio::test]
    async fn test_forwards_responses() {
        let (service, mut rx) = ChannelCommandService::new();
        let response = DataPlaneResponse::new(
            "corr-1",
            CommandStatus::Ok,
            "Instances healthy",
            "",
            RequestType::Health,
        );

        service.send_data_plane_response(&response).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), response);

        drop(rx);
        let err = service.send_data_plane_response(&response).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to send data plane response: response channel closed"
        );
    }

    #[tokio::test]
    async fn test_status_updates() {
        let (service, _rx) = ChannelCommandService::new();
        service
            .update_data_plane_status(&Resource::default())
            .await
            .unwrap();

        service.set_failing_status(true);
        assert_eq!(
            service
                .update_data_plane_status(&Resource::default())
                .await
                .unwrap_err(),
            CommandError::NotConnected
        );
        assert_eq!(service.status_updates().await.len(), 1);
    }
}
