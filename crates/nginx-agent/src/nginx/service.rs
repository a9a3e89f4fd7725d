// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance service - the resource model plus parse, validate and reload.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ConfigApplyError, ConfigParser, InstanceOperator};
use crate::model::{Instance, NginxConfigContext, Resource};

/// Owns the known instances and applies configuration to them.
#[async_trait]
pub trait InstanceService: Send + Sync {
    /// Replace the resource model.
    async fn update_resource(&self, resource: Resource);

    /// Current resource model.
    async fn resource(&self) -> Resource;

    /// Look up an instance by id.
    async fn instance(&self, instance_id: &str) -> Option<Instance>;

    /// All known instances.
    async fn instances(&self) -> Vec<Instance>;

    /// Parse, validate and reload the instance's configuration.
    ///
    /// Returns the parsed configuration context on success.
    async fn apply_config(&self, instance_id: &str) -> Result<NginxConfigContext, ConfigApplyError>;
}

/// [`InstanceService`] backed by a [`ConfigParser`] and an [`InstanceOperator`].
pub struct NginxService {
    resource: RwLock<Resource>,
    parser: Arc<dyn ConfigParser>,
    operator: Arc<dyn InstanceOperator>,
}

impl NginxService {
    /// Service with an empty resource.
    pub fn new(parser: Arc<dyn ConfigParser>, operator: Arc<dyn InstanceOperator>) -> Self {
        Self {
            resource: RwLock::new(Resource::default()),
            parser,
            operator,
        }
    }

    /// Seed the resource model.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = RwLock::new(resource);
        self
    }

    /// Copy `context` onto the stored instance and return the updated copy.
    async fn refresh_runtime(
        &self,
        instance_id: &str,
        context: &NginxConfigContext,
    ) -> Result<Instance, ConfigApplyError> {
        let mut resource = self.resource.write().await;
        let instance = resource
            .instance_mut(instance_id)
            .ok_or_else(|| ConfigApplyError::InstanceNotFound(instance_id.to_string()))?;

        if instance.update_runtime(context) {
            debug!(instance_id, runtime = ?instance.runtime, "Updated instance runtime");
        }
        Ok(instance.clone())
    }
}

#[async_trait]
impl InstanceService for NginxService {
    async fn update_resource(&self, resource: Resource) {
        debug!(
            resource_id = %resource.resource_id,
            instances = resource.instances.len(),
            "Updating resource"
        );
        *self.resource.write().await = resource;
    }

    async fn resource(&self) -> Resource {
        self.resource.read().await.clone()
    }

    async fn instance(&self, instance_id: &str) -> Option<Instance> {
        self.resource.read().await.instance(instance_id).cloned()
    }

    async fn instances(&self) -> Vec<Instance> {
        self.resource.read().await.instances.clone()
    }

    async fn apply_config(&self, instance_id: &str) -> Result<NginxConfigContext, ConfigApplyError> {
        let instance = self
            .instance(instance_id)
            .await
            .ok_or_else(|| ConfigApplyError::InstanceNotFound(instance_id.to_string()))?;

        // Parse first so newly added logs and APIs are known before reload
        let context = self
            .parser
            .parse(&instance)
            .await
            .map_err(|e| ConfigApplyError::Parse(e.to_string()))?;

        let instance = self.refresh_runtime(instance_id, &context).await?;

        self.operator
            .validate(&instance)
            .await
            .map_err(|e| ConfigApplyError::Validation(e.to_string()))?;

        self.operator
            .reload(&instance)
            .await
            .map_err(|e| ConfigApplyError::Reload(e.to_string()))?;

        self.refresh_runtime(instance_id, &context).await?;
        info!(instance_id, "Config applied");

        Ok(context)
    }
}
