// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Responses sent back to the management plane.

use serde::{Deserialize, Serialize};

use super::{MessageMeta, RequestType};

/// Outcome reported for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// Request succeeded
    Ok,
    /// Request failed; no further responses follow
    Failure,
    /// Request failed and recovery is in progress
    Error,
    /// Request is still running
    InProgress,
}

/// Status part of a [`DataPlaneResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Outcome
    pub status: CommandStatus,
    /// Human readable summary
    pub message: String,
    /// Underlying error text, empty on success
    #[serde(default)]
    pub error: String,
}

/// Status record emitted for a management plane request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPlaneResponse {
    /// Identifiers; `correlation_id` is copied from the request
    pub message_meta: MessageMeta,
    /// Outcome
    pub command_response: CommandResponse,
    /// Instance the response concerns
    pub instance_id: String,
    /// Request kind the response answers
    pub request_type: RequestType,
}

impl DataPlaneResponse {
    /// Response without an error text.
    pub fn new(
        correlation_id: impl Into<String>,
        status: CommandStatus,
        message: impl Into<String>,
        instance_id: impl Into<String>,
        request_type: RequestType,
    ) -> Self {
        Self {
            message_meta: MessageMeta::new(correlation_id),
            command_response: CommandResponse {
                status,
                message: message.into(),
                error: String::new(),
            },
            instance_id: instance_id.into(),
            request_type,
        }
    }

    /// Sets the error text.
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.command_response.error = error.to_string();
        self
    }

    /// Correlation id.
    pub fn correlation_id(&self) -> &str {
        &self.message_meta.correlation_id
    }

    /// Status.
    pub fn status(&self) -> CommandStatus {
        self.command_response.status
    }
}
