// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock instance service for testing.
//!
//! `apply_config` results are scripted in order; once the script runs out
//! every call succeeds with an empty context for the requested instance.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ConfigApplyError, InstanceService};
use crate::model::{Instance, NginxConfigContext, Resource};

/// Mock instance service for testing.
pub struct MockInstanceService {
    resource: Mutex<Resource>,
    results: Mutex<VecDeque<Result<NginxConfigContext, ConfigApplyError>>>,
    apply_calls: Mutex<Vec<String>>,
    updates: Mutex<Vec<Resource>>,
}

impl Default for MockInstanceService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInstanceService {
    /// Mock with no instances whose applies succeed.
    pub fn new() -> Self {
        Self {
            resource: Mutex::new(Resource::default()),
            results: Mutex::new(VecDeque::new()),
            apply_calls: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        }
    }

    /// Mock that knows `instances`.
    pub fn with_instances(instances: Vec<Instance>) -> Self {
        Self {
            resource: Mutex::new(Resource {
                resource_id: "mock-resource".to_string(),
                instances,
            }),
            ..Self::new()
        }
    }

    /// Queue the result of the next `apply_config` call.
    pub async fn push_result(&self, result: Result<NginxConfigContext, ConfigApplyError>) {
        self.results.lock().await.push_back(result);
    }

    /// Queue a failing `apply_config` result.
    pub async fn fail_next_apply(&self, error: ConfigApplyError) {
        self.push_result(Err(error)).await;
    }

    /// Instance ids passed to `apply_config`, in call order.
    pub async fn apply_calls(&self) -> Vec<String> {
        self.apply_calls.lock().await.clone()
    }

    /// Resources passed to `update_resource`, in call order.
    pub async fn updates(&self) -> Vec<Resource> {
        self.updates.lock().await.clone()
    }
}

#[async_trait]
impl InstanceService for MockInstanceService {
    async fn update_resource(&self, resource: Resource) {
        self.updates.lock().await.push(resource.clone());
        *self.resource.lock().await = resource;
    }

    async fn resource(&self) -> Resource {
        self.resource.lock().await.clone()
    }

    async fn instance(&self, instance_id: &str) -> Option<Instance> {
        self.resource.lock().await.instance(instance_id).cloned()
    }

    async fn instances(&self) -> Vec<Instance> {
        self.resource.lock().await.instances.clone()
    }

    async fn apply_config(&self, instance_id: &str) -> Result<NginxConfigContext, ConfigApplyError> {
        self.apply_calls.lock().await.push(instance_id.to_string());

        match self.results.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(NginxConfigContext {
                instance_id: instance_id.to_string(),
                ..Default::default()
            }),
        }
    }
}
