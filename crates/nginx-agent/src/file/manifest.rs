// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The manifest: files the agent believes are on disk.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::FileError;
use crate::model::FileMeta;

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Absolute file name
    pub name: String,
    /// Hex SHA-256 of the contents
    pub hash: String,
    /// Size in bytes
    pub size: u64,
    /// True if the NGINX configuration references the file
    #[serde(default)]
    pub referenced: bool,
    /// Unmanaged files are never deleted
    #[serde(default)]
    pub unmanaged: bool,
}

impl ManifestFile {
    /// Entry for `meta`.
    pub fn from_meta(meta: &FileMeta, referenced: bool) -> Self {
        Self {
            name: meta.name.clone(),
            hash: meta.hash.clone(),
            size: meta.size,
            referenced,
            unmanaged: false,
        }
    }
}

/// Files keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Entries
    pub files: BTreeMap<String, ManifestFile>,
}

impl Manifest {
    /// Manifest listing `files`.
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a FileMeta>, referenced: bool) -> Self {
        let files = files
            .into_iter()
            .map(|meta| (meta.name.clone(), ManifestFile::from_meta(meta, referenced)))
            .collect();
        Self { files }
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Entry for `name`.
    pub fn get(&self, name: &str) -> Option<&ManifestFile> {
        self.files.get(name)
    }

    /// Read the manifest at `path`. A missing file is an empty manifest.
    pub async fn load(path: &Path) -> Result<Self, FileError> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Self::default()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| FileError::Manifest(format!("unable to parse {}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(FileError::io("unable to read manifest", path, e)),
        }
    }

    /// Write the manifest to `path` via a temporary file and rename.
    pub async fn write(&self, path: &Path) -> Result<(), FileError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FileError::io("unable to create directory", parent, e))?;
        }

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| FileError::Manifest(format!("unable to serialize: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| FileError::io("unable to write manifest", &tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| FileError::io("unable to replace manifest", path, e))?;

        Ok(())
    }
}
