// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource plugin - the host and the instances discovered on it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::bus::{self, Message, MessagePipeInterface, Payload, PipeHandle, Plugin, PluginInfo, Topic};
use crate::model::Resource;

const NAME: &str = "resource";

/// Merges discovered instances into the resource and announces it.
pub struct ResourcePlugin {
    resource: Mutex<Resource>,
    pipe: PipeHandle,
}

impl ResourcePlugin {
    /// Plugin for the host identified by `resource_id`.
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource: Mutex::new(Resource {
                resource_id: resource_id.into(),
                instances: Vec::new(),
            }),
            pipe: PipeHandle::new(),
        }
    }

    /// Current resource.
    pub async fn resource(&self) -> Resource {
        self.resource.lock().await.clone()
    }
}

#[async_trait]
impl Plugin for ResourcePlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(NAME)
    }

    async fn init(&self, pipe: Arc<dyn MessagePipeInterface>) -> bus::Result<()> {
        debug!("Starting resource plugin");
        self.pipe.set(pipe);
        Ok(())
    }

    async fn close(&self) -> bus::Result<()> {
        info!("Closing resource plugin");
        Ok(())
    }

    async fn process(&self, message: &Message) {
        if message.topic != Topic::InstancesUpdated {
            debug!(topic = %message.topic, "Unknown topic");
            return;
        }

        let Some(instances) = message.payload.as_instances() else {
            error!(
                payload = message.payload.kind(),
                "Unable to cast message payload to instance list"
            );
            return;
        };

        let resource = {
            let mut resource = self.resource.lock().await;
            for instance in instances {
                resource.upsert_instance(instance.clone());
            }
            resource.clone()
        };

        info!(
            resource_id = %resource.resource_id,
            instances = resource.instances.len(),
            "Resource updated"
        );
        self.pipe
            .publish(
                NAME,
                vec![Message::new(Topic::ResourceUpdate, Payload::Resource(resource))],
            )
            .await;
    }

    fn subscriptions(&self) -> Vec<Topic> {
        vec![Topic::InstancesUpdated]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FakeMessagePipe;
    use crate::model::{Instance, InstanceMeta, InstanceRuntime, InstanceType};

    fn instance(id: &str, version: &str) -> Instance {
        Instance {
            meta: InstanceMeta {
                instance_id: id.to_string(),
                instance_type: InstanceType::Nginx,
                version: version.to_string(),
            },
            runtime: InstanceRuntime::default(),
        }
    }

    #[tokio::test]
    async fn test_instances_are_merged_and_announced() {
        let pipe = Arc::new(FakeMessagePipe::new());
        let plugin = ResourcePlugin::new("host-1");
        plugin.init(pipe.clone()).await.unwrap();

        plugin
            .process(&Message::new(
                Topic::InstancesUpdated,
                Payload::Instances(vec![instance("a", "1.25.0"), instance("b", "1.25.0")]),
            ))
            .await;
        plugin
            .process(&Message::new(
                Topic::InstancesUpdated,
                Payload::Instances(vec![instance("a", "1.27.0")]),
            ))
            .await;

        let resource = plugin.resource().await;
        assert_eq!(resource.resource_id, "host-1");
        assert_eq!(resource.instances.len(), 2);
        assert_eq!(resource.instance("a").unwrap().meta.version, "1.27.0");

        let messages = pipe.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].topic, Topic::ResourceUpdate);
        assert_eq!(messages[1].payload.as_resource(), Some(&resource));
    }

    #[tokio::test]
    async fn test_wrong_payload_is_dropped() {
        let pipe = Arc::new(FakeMessagePipe::new());
        let plugin = ResourcePlugin::new("host-1");
        plugin.init(pipe.clone()).await.unwrap();

        plugin
            .process(&Message::empty(Topic::InstancesUpdated))
            .await;

        assert!(pipe.messages().is_empty());
        assert!(plugin.resource().await.instances.is_empty());
    }
}
