// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! File metadata and overviews.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn default_permissions() -> String {
    "0644".to_string()
}

/// Metadata describing one configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Absolute path of the file
    pub name: String,
    /// Hex encoded SHA-256 of the contents
    pub hash: String,
    /// Size in bytes
    pub size: u64,
    /// Octal permission string, e.g. `0644`
    #[serde(default = "default_permissions")]
    pub permissions: String,
}

impl FileMeta {
    /// Build metadata for `contents` stored at `name`.
    pub fn from_contents(name: impl Into<String>, contents: &[u8]) -> Self {
        Self {
            name: name.into(),
            hash: file_hash(contents),
            size: contents.len() as u64,
            permissions: default_permissions(),
        }
    }
}

/// A file in a config apply or upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// File metadata; `hash` is the desired content hash
    pub meta: FileMeta,
    /// New contents, required when the file is added or changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    /// Unmanaged files are never written or deleted by the agent
    #[serde(default)]
    pub unmanaged: bool,
}

impl File {
    /// A managed file with inline contents.
    pub fn with_contents(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let contents = contents.into();
        Self {
            meta: FileMeta::from_contents(name, contents.as_bytes()),
            contents: Some(contents),
            unmanaged: false,
        }
    }
}

/// Version of a set of configuration files for an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVersion {
    /// Instance the files belong to
    pub instance_id: String,
    /// Opaque version identifier chosen by the management plane
    pub version: String,
}

/// The complete desired file set of an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOverview {
    /// Instance and version the overview describes
    pub config_version: ConfigVersion,
    /// Files in the set
    pub files: Vec<File>,
}

/// Hex encoded SHA-256 of `contents`.
pub fn file_hash(contents: &[u8]) -> String {
    let digest = Sha256::digest(contents);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
