// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

/// Message topics known to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Management plane asks to apply configuration files.
    ConfigApplyRequest,
    /// Status of a management plane request, sent back to it.
    DataPlaneResponse,
    /// Management plane asks for the current configuration files.
    ConfigUploadRequest,
    /// Configuration for an instance is authoritative again.
    EnableWatchers,
    /// Connection to the management plane is established.
    ConnectionCreated,
    /// Connection to the management plane was lost or recreated.
    ConnectionReset,
    /// The resource and its instances changed.
    ResourceUpdate,
    /// Management plane asks for an NGINX Plus API action.
    ApiActionRequest,
    /// Instance discovery found a new instance list.
    InstancesUpdated,
    /// A watcher observed configuration changes made outside the agent.
    NginxConfigUpdate,
}

impl Topic {
    /// Every topic.
    pub const ALL: [Topic; 10] = [
        Topic::ConfigApplyRequest,
        Topic::DataPlaneResponse,
        Topic::ConfigUploadRequest,
        Topic::EnableWatchers,
        Topic::ConnectionCreated,
        Topic::ConnectionReset,
        Topic::ResourceUpdate,
        Topic::ApiActionRequest,
        Topic::InstancesUpdated,
        Topic::NginxConfigUpdate,
    ];

    /// Stable string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ConfigApplyRequest => "config-apply-request",
            Topic::DataPlaneResponse => "data-plane-response",
            Topic::ConfigUploadRequest => "config-upload-request",
            Topic::EnableWatchers => "enable-watchers",
            Topic::ConnectionCreated => "connection-created",
            Topic::ConnectionReset => "connection-reset",
            Topic::ResourceUpdate => "resource-update",
            Topic::ApiActionRequest => "api-action-request",
            Topic::InstancesUpdated => "instances-updated",
            Topic::NginxConfigUpdate => "nginx-config-update",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
