// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instances and the resource (host) that owns them.

use serde::{Deserialize, Serialize};

use super::{ApiDetails, NginxConfigContext};

/// Kind of managed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceType {
    /// Open source NGINX
    Nginx,
    /// NGINX Plus
    NginxPlus,
}

/// Identity of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMeta {
    /// Stable instance id
    pub instance_id: String,
    /// Instance kind
    pub instance_type: InstanceType,
    /// Reported version
    #[serde(default)]
    pub version: String,
}

/// Runtime details of an instance, refreshed from its parsed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRuntime {
    /// PID of the master process, if known
    pub process_id: Option<i32>,
    /// Path of the NGINX binary
    pub binary_path: String,
    /// Main configuration file
    pub config_path: String,
    /// `access_log` paths
    pub access_logs: Vec<String>,
    /// `error_log` paths
    pub error_logs: Vec<String>,
    /// `stub_status` endpoint
    pub stub_status: Option<ApiDetails>,
    /// NGINX Plus API endpoint
    pub plus_api: Option<ApiDetails>,
}

/// A managed NGINX instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Identity
    pub meta: InstanceMeta,
    /// Runtime details
    pub runtime: InstanceRuntime,
}

impl Instance {
    /// Instance id.
    pub fn id(&self) -> &str {
        &self.meta.instance_id
    }

    /// True for NGINX Plus instances.
    pub fn is_plus(&self) -> bool {
        self.meta.instance_type == InstanceType::NginxPlus
    }

    /// Copies the parsed configuration details onto the runtime record.
    ///
    /// Returns true if anything changed.
    pub fn update_runtime(&mut self, context: &NginxConfigContext) -> bool {
        let runtime = &mut self.runtime;
        let before = runtime.clone();

        runtime.access_logs = context.access_logs.clone();
        runtime.error_logs = context.error_logs.clone();
        runtime.stub_status = context.stub_status.clone();
        runtime.plus_api = context.plus_api.clone();
        if !context.config_path.is_empty() {
            runtime.config_path = context.config_path.clone();
        }

        *runtime != before
    }
}

/// The host the agent runs on and the instances found there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Host id
    pub resource_id: String,
    /// Known instances
    pub instances: Vec<Instance>,
}

impl Resource {
    /// Looks up an instance by id.
    pub fn instance(&self, instance_id: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.id() == instance_id)
    }

    /// Mutable lookup by id.
    pub fn instance_mut(&mut self, instance_id: &str) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| i.id() == instance_id)
    }

    /// Replaces the instance with the same id, or appends it.
    pub fn upsert_instance(&mut self, instance: Instance) {
        match self.instance_mut(instance.id()) {
            Some(existing) => *existing = instance,
            None => self.instances.push(instance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str) -> Instance {
        Instance {
            meta: InstanceMeta {
                instance_id: id.to_string(),
                instance_type: InstanceType::Nginx,
                version: "1.27.0".to_string(),
            },
            runtime: InstanceRuntime::default(),
        }
    }

    #[test]
    fn test_update_runtime_reports_change() {
        let mut inst = instance("a");
        let context = NginxConfigContext {
            instance_id: "a".to_string(),
            config_path: "/etc/nginx/nginx.conf".to_string(),
            access_logs: vec!["/var/log/nginx/access.log".to_string()],
            ..Default::default()
        };

        assert!(inst.update_runtime(&context));
        assert_eq!(inst.runtime.access_logs, context.access_logs);
        assert_eq!(inst.runtime.config_path, "/etc/nginx/nginx.conf");
        assert!(!inst.update_runtime(&context));
    }

    #[test]
    fn test_upsert_instance() {
        let mut resource = Resource::default();
        resource.upsert_instance(instance("a"));
        resource.upsert_instance(instance("b"));

        let mut updated = instance("a");
        updated.meta.version = "1.27.1".to_string();
        resource.upsert_instance(updated);

        assert_eq!(resource.instances.len(), 2);
        assert_eq!(resource.instance("a").unwrap().meta.version, "1.27.1");
        assert!(resource.instance("c").is_none());
    }

    #[test]
    fn test_is_plus() {
        let mut inst = instance("a");
        assert!(!inst.is_plus());
        inst.meta.instance_type = InstanceType::NginxPlus;
        assert!(inst.is_plus());
    }
}
