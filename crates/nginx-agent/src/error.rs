// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for nginx-agent.

use thiserror::Error;

/// Agent errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Bus registration or dispatch failed.
    #[error("Bus error: {0}")]
    Bus(#[from] crate::bus::BusError),

    /// File staging, manifest or rollback failed.
    #[error("File error: {0}")]
    File(#[from] crate::file::FileError),

    /// Applying configuration to an instance failed.
    #[error("Config apply error: {0}")]
    ConfigApply(#[from] crate::nginx::ConfigApplyError),

    /// Talking to the management plane failed.
    #[error("Command error: {0}")]
    Command(#[from] crate::command::CommandError),
}

/// Result type using agent Error.
pub type Result<T> = std::result::Result<T, Error>;
