// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};

use super::FileMeta;

/// Location of an NGINX status or management API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDetails {
    /// Full URL, e.g. `http://127.0.0.1:8080/api`
    pub url: String,
    /// `listen` value of the enclosing server block
    pub listen: String,
    /// Location path
    pub location: String,
}

/// What parsing an instance's configuration yields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NginxConfigContext {
    /// Instance the configuration belongs to
    pub instance_id: String,
    /// Main configuration file
    pub config_path: String,
    /// Every file reached from the main configuration, in discovery order
    pub files: Vec<FileMeta>,
    /// `access_log` paths
    pub access_logs: Vec<String>,
    /// `error_log` paths
    pub error_logs: Vec<String>,
    /// `stub_status` endpoint, if configured
    pub stub_status: Option<ApiDetails>,
    /// NGINX Plus `api` endpoint, if configured
    pub plus_api: Option<ApiDetails>,
}
