// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NGINX module - parsing, validation, reload and the config apply plugin.
//!
//! - [`ConfigParser`] turns an instance's configuration into an
//!   [`NginxConfigContext`](crate::model::NginxConfigContext)
//! - [`InstanceOperator`] validates and reloads an instance
//! - [`InstanceService`] owns the resource model and runs parse, validate
//!   and reload in order
//! - [`NginxPlugin`] drives config apply and rollback from bus messages

pub mod mock;
mod operator;
mod parser;
mod plugin;
mod service;

use thiserror::Error;

pub use mock::MockInstanceService;
pub use operator::{InstanceOperator, NginxInstanceOperator, OperatorError};
pub use parser::{ConfigParser, NginxConfigParser, ParseError};
pub use plugin::NginxPlugin;
pub use service::{InstanceService, NginxService};

/// Errors from applying configuration to an instance.
///
/// The messages are reported to the management plane verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigApplyError {
    /// No instance with this id is known.
    #[error("instance {0} not found")]
    InstanceNotFound(String),

    /// The configuration could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// `nginx -t` rejected the configuration.
    #[error("failed validating config: {0}")]
    Validation(String),

    /// Signalling the master process failed.
    #[error("failed to reload NGINX: {0}")]
    Reload(String),

    /// The apply failed and so did the rollback.
    #[error("config apply error: {apply}\nrollback error: {rollback}")]
    Combined {
        /// Error that caused the rollback.
        apply: String,
        /// Error from the rollback.
        rollback: String,
    },
}

impl ConfigApplyError {
    /// Joins an apply error and the rollback error that followed it.
    pub fn combined(apply: impl ToString, rollback: impl ToString) -> Self {
        ConfigApplyError::Combined {
            apply: apply.to_string(),
            rollback: rollback.to_string(),
        }
    }
}
