// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! File module - staging configuration files on disk.
//!
//! [`FileManagerService`] is the seam the config apply plugin talks to.
//! [`LocalFileManager`] implements it against the local filesystem and a JSON
//! manifest; [`MockFileManager`] scripts its results for tests.

mod manager;
mod manifest;
pub mod mock;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ConfigApplyRequest, ConfigUploadRequest, FileMeta, NginxConfigContext};

pub use manager::LocalFileManager;
pub use manifest::{Manifest, ManifestFile};
pub use mock::{MockFileManager, MockWriteStatus};

/// Errors from file operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FileError {
    /// The file is outside every allowed directory.
    #[error("file not in allowed directories {0}")]
    NotAllowed(String),

    /// A file to be written carries no contents.
    #[error("file contents missing for {0}")]
    MissingContents(String),

    /// Contents do not hash to the expected value.
    #[error("file hash mismatch for {name}: expected {expected}, got {actual}")]
    HashMismatch {
        /// File name.
        name: String,
        /// Hash from the request.
        expected: String,
        /// Hash of the contents.
        actual: String,
    },

    /// Permission string is not a 4 digit octal number.
    #[error("invalid permissions {permissions} for {name}")]
    InvalidPermissions {
        /// File name.
        name: String,
        /// Permission string from the request.
        permissions: String,
    },

    /// A directory exists where a file should be written.
    #[error("unable to create file {0} since a directory with the same name already exists")]
    IsDirectory(String),

    /// Filesystem operation failed.
    #[error("{action} {path}: {source}")]
    Io {
        /// What was attempted.
        action: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the manifest failed.
    #[error("failed to update manifest file: {0}")]
    Manifest(String),

    /// Rollback was requested for an instance with no recorded apply.
    #[error("no config apply to roll back for instance {0}")]
    NothingToRollback(String),

    /// Other error, displayed verbatim.
    #[error("{0}")]
    Other(String),
}

impl FileError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FileError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Coarse outcome of staging a config apply request.
///
/// The error travels with the statuses that need one.
#[derive(Debug)]
pub enum WriteStatus {
    /// Files on disk already match the request.
    NoChange,
    /// Files were written and the manifest updated.
    Ok,
    /// Nothing was changed on disk.
    Error(FileError),
    /// Files may have changed; the caller must roll back.
    RollbackRequired(FileError),
}

impl WriteStatus {
    /// Short name, for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStatus::NoChange => "no_change",
            WriteStatus::Ok => "ok",
            WriteStatus::Error(_) => "error",
            WriteStatus::RollbackRequired(_) => "rollback_required",
        }
    }
}

/// File staging used by the config apply plugin.
#[async_trait]
pub trait FileManagerService: Send + Sync {
    /// Stage the files in `request` and report what happened.
    async fn config_apply(&self, request: &ConfigApplyRequest) -> WriteStatus;

    /// Restore the files changed by the last apply for `instance_id`.
    async fn rollback(&self, instance_id: &str) -> Result<(), FileError>;

    /// Forget the last apply's actions and backups.
    async fn clear_cache(&self);

    /// Replace the set of files known to be on disk and rewrite the manifest.
    ///
    /// `referenced` marks files that the NGINX configuration references.
    async fn update_current_files_on_disk(
        &self,
        files: &[FileMeta],
        referenced: bool,
    ) -> Result<(), FileError>;

    /// Check the files in `request` against what is on disk.
    async fn config_upload(&self, request: &ConfigUploadRequest) -> Result<(), FileError>;

    /// Record files discovered by parsing an instance's configuration.
    ///
    /// While disconnected only the latest context is kept; it is recorded
    /// once the connection comes up.
    async fn config_update(&self, context: &NginxConfigContext);

    /// Record whether the management plane connection is up.
    async fn set_is_connected(&self, connected: bool);

    /// Whether the management plane connection is up.
    fn is_connected(&self) -> bool;
}
