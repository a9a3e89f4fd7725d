// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock file manager for testing.
//!
//! Returns scripted results without touching the filesystem and counts the
//! calls it receives.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{FileError, FileManagerService, WriteStatus};
use crate::model::{ConfigApplyRequest, ConfigUploadRequest, FileMeta, NginxConfigContext};

/// Scripted result of `config_apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockWriteStatus {
    /// Return [`WriteStatus::NoChange`].
    NoChange,
    /// Return [`WriteStatus::Ok`].
    Ok,
    /// Return [`WriteStatus::Error`] with this text.
    Error(String),
    /// Return [`WriteStatus::RollbackRequired`] with this text.
    RollbackRequired(String),
}

impl MockWriteStatus {
    fn to_status(&self) -> WriteStatus {
        match self {
            MockWriteStatus::NoChange => WriteStatus::NoChange,
            MockWriteStatus::Ok => WriteStatus::Ok,
            MockWriteStatus::Error(e) => WriteStatus::Error(FileError::Other(e.clone())),
            MockWriteStatus::RollbackRequired(e) => {
                WriteStatus::RollbackRequired(FileError::Other(e.clone()))
            }
        }
    }
}

/// Mock file manager for testing.
pub struct MockFileManager {
    apply_status: MockWriteStatus,
    rollback_error: Option<String>,
    upload_error: Option<String>,
    current_files: Mutex<Vec<FileMeta>>,
    rolled_back: Mutex<Vec<String>>,
    connected: AtomicBool,
    apply_calls: AtomicUsize,
    clear_cache_calls: AtomicUsize,
    update_files_calls: AtomicUsize,
    config_update_calls: AtomicUsize,
}

impl Default for MockFileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileManager {
    /// Mock whose applies succeed with [`WriteStatus::Ok`].
    pub fn new() -> Self {
        Self::with_status(MockWriteStatus::Ok)
    }

    /// Mock whose applies return `status`.
    pub fn with_status(status: MockWriteStatus) -> Self {
        Self {
            apply_status: status,
            rollback_error: None,
            upload_error: None,
            current_files: Mutex::new(Vec::new()),
            rolled_back: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            apply_calls: AtomicUsize::new(0),
            clear_cache_calls: AtomicUsize::new(0),
            update_files_calls: AtomicUsize::new(0),
            config_update_calls: AtomicUsize::new(0),
        }
    }

    /// Make `rollback` fail with `error`.
    pub fn failing_rollback(mut self, error: impl Into<String>) -> Self {
        self.rollback_error = Some(error.into());
        self
    }

    /// Make `config_upload` fail with `error`.
    pub fn failing_upload(mut self, error: impl Into<String>) -> Self {
        self.upload_error = Some(error.into());
        self
    }

    /// Number of `config_apply` calls.
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Number of `clear_cache` calls.
    pub fn clear_cache_calls(&self) -> usize {
        self.clear_cache_calls.load(Ordering::SeqCst)
    }

    /// Number of `update_current_files_on_disk` calls.
    pub fn update_files_calls(&self) -> usize {
        self.update_files_calls.load(Ordering::SeqCst)
    }

    /// Number of `config_update` calls.
    pub fn config_update_calls(&self) -> usize {
        self.config_update_calls.load(Ordering::SeqCst)
    }

    /// Instance ids passed to `rollback`, in call order.
    pub async fn rolled_back(&self) -> Vec<String> {
        self.rolled_back.lock().await.clone()
    }

    /// Files last recorded as current.
    pub async fn current_files(&self) -> Vec<FileMeta> {
        self.current_files.lock().await.clone()
    }
}

#[async_trait]
impl FileManagerService for MockFileManager {
    async fn config_apply(&self, _request: &ConfigApplyRequest) -> WriteStatus {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_status.to_status()
    }

    async fn rollback(&self, instance_id: &str) -> Result<(), FileError> {
        self.rolled_back.lock().await.push(instance_id.to_string());
        match &self.rollback_error {
            Some(e) => Err(FileError::Other(e.clone())),
            None => Ok(()),
        }
    }

    async fn clear_cache(&self) {
        self.clear_cache_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn update_current_files_on_disk(
        &self,
        files: &[FileMeta],
        _referenced: bool,
    ) -> Result<(), FileError> {
        self.update_files_calls.fetch_add(1, Ordering::SeqCst);
        *self.current_files.lock().await = files.to_vec();
        Ok(())
    }

    async fn config_upload(&self, _request: &ConfigUploadRequest) -> Result<(), FileError> {
        match &self.upload_error {
            Some(e) => Err(FileError::Other(e.clone())),
            None => Ok(()),
        }
    }

    async fn config_update(&self, context: &NginxConfigContext) {
        self.config_update_calls.fetch_add(1, Ordering::SeqCst);
        *self.current_files.lock().await = context.files.clone();
    }

    async fn set_is_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
