// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::Topic;
use crate::model::{
    DataPlaneResponse, EnableWatchers, Instance, ManagementPlaneRequest, NginxConfigContext,
    Resource,
};

/// Payload of a [`Message`].
///
/// Each topic has a conventional variant. Subscribers use the `as_*`
/// accessors and drop the message when the variant is not the expected one.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A request from the management plane.
    ManagementPlaneRequest(ManagementPlaneRequest),
    /// A status record for the management plane.
    DataPlaneResponse(DataPlaneResponse),
    /// Watchers may resume for an instance.
    EnableWatchers(EnableWatchers),
    /// The resource and its instances.
    Resource(Resource),
    /// A discovered instance list.
    Instances(Vec<Instance>),
    /// A parsed configuration.
    ConfigContext(NginxConfigContext),
    /// No payload.
    Empty,
}

impl Payload {
    /// Variant name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::ManagementPlaneRequest(_) => "ManagementPlaneRequest",
            Payload::DataPlaneResponse(_) => "DataPlaneResponse",
            Payload::EnableWatchers(_) => "EnableWatchers",
            Payload::Resource(_) => "Resource",
            Payload::Instances(_) => "Instances",
            Payload::ConfigContext(_) => "ConfigContext",
            Payload::Empty => "Empty",
        }
    }

    /// The management plane request, if this is one.
    pub fn as_management_plane_request(&self) -> Option<&ManagementPlaneRequest> {
        match self {
            Payload::ManagementPlaneRequest(r) => Some(r),
            _ => None,
        }
    }

    /// The data plane response, if this is one.
    pub fn as_data_plane_response(&self) -> Option<&DataPlaneResponse> {
        match self {
            Payload::DataPlaneResponse(r) => Some(r),
            _ => None,
        }
    }

    /// The watcher notification, if this is one.
    pub fn as_enable_watchers(&self) -> Option<&EnableWatchers> {
        match self {
            Payload::EnableWatchers(w) => Some(w),
            _ => None,
        }
    }

    /// The resource, if this is one.
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Payload::Resource(r) => Some(r),
            _ => None,
        }
    }

    /// The instance list, if this is one.
    pub fn as_instances(&self) -> Option<&[Instance]> {
        match self {
            Payload::Instances(i) => Some(i),
            _ => None,
        }
    }

    /// The config context, if this is one.
    pub fn as_config_context(&self) -> Option<&NginxConfigContext> {
        match self {
            Payload::ConfigContext(c) => Some(c),
            _ => None,
        }
    }
}

/// A topic and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Routing key.
    pub topic: Topic,
    /// Data.
    pub payload: Payload,
}

impl Message {
    /// Create a message.
    pub fn new(topic: Topic, payload: Payload) -> Self {
        Self { topic, payload }
    }

    /// Message without a payload.
    pub fn empty(topic: Topic) -> Self {
        Self::new(topic, Payload::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_reject_other_variants() {
        let payload = Payload::Resource(Resource::default());
        assert!(payload.as_resource().is_some());
        assert!(payload.as_management_plane_request().is_none());
        assert!(payload.as_enable_watchers().is_none());
        assert!(payload.as_instances().is_none());
        assert_eq!(payload.kind(), "Resource");
    }

    #[test]
    fn test_empty_message() {
        let message = Message::empty(Topic::ConnectionCreated);
        assert_eq!(message.topic, Topic::ConnectionCreated);
        assert_eq!(message.payload, Payload::Empty);
    }
}
