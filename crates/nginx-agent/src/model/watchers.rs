// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};

use super::NginxConfigContext;

/// Tells watchers which configuration is authoritative for an instance.
///
/// `config_context` is `None` when the apply attempt did not produce a new
/// context; watchers keep using what they had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableWatchers {
    /// Instance whose watchers may resume
    pub instance_id: String,
    /// Configuration now in effect
    pub config_context: Option<NginxConfigContext>,
}
