// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Requests issued by the management plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FileOverview;

/// Identifiers shared by requests and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMeta {
    /// Unique id of this message
    pub message_id: String,
    /// Id shared by every message produced for one originating request
    pub correlation_id: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl MessageMeta {
    /// New metadata with a fresh message id.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: correlation_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Apply the files in `overview` to an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigApplyRequest {
    /// Desired file set
    pub overview: FileOverview,
}

/// Verify the instance's files against `overview` and report them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUploadRequest {
    /// Files expected on disk
    pub overview: FileOverview,
}

/// Perform an NGINX Plus API action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiActionRequest {
    /// Target instance
    pub instance_id: String,
    /// Action name, e.g. `get_http_upstream_servers`
    pub action: String,
}

/// The request carried by a [`ManagementPlaneRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Write and apply configuration
    ConfigApply(ConfigApplyRequest),
    /// Upload current configuration
    ConfigUpload(ConfigUploadRequest),
    /// NGINX Plus API action
    Action(ApiActionRequest),
    /// Health check
    Health,
}

/// Kind of request a response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Answer to a config apply
    ConfigApply,
    /// Answer to a config upload
    ConfigUpload,
    /// Answer to an API action
    ApiAction,
    /// Answer to a health check
    Health,
}

impl Request {
    /// Response kind for this request.
    pub fn request_type(&self) -> RequestType {
        match self {
            Request::ConfigApply(_) => RequestType::ConfigApply,
            Request::ConfigUpload(_) => RequestType::ConfigUpload,
            Request::Action(_) => RequestType::ApiAction,
            Request::Health => RequestType::Health,
        }
    }
}

/// A request from the management plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementPlaneRequest {
    /// Identifiers
    pub message_meta: MessageMeta,
    /// Request body
    pub request: Request,
}

impl ManagementPlaneRequest {
    /// New request with a fresh correlation id.
    pub fn new(request: Request) -> Self {
        Self {
            message_meta: MessageMeta::new(uuid::Uuid::new_v4().to_string()),
            request,
        }
    }

    /// Correlation id of the request.
    pub fn correlation_id(&self) -> &str {
        &self.message_meta.correlation_id
    }

    /// Id of the instance the request targets, empty for health checks.
    pub fn instance_id(&self) -> &str {
        match &self.request {
            Request::ConfigApply(r) => &r.overview.config_version.instance_id,
            Request::ConfigUpload(r) => &r.overview.config_version.instance_id,
            Request::Action(r) => &r.instance_id,
            Request::Health => "",
        }
    }
}
