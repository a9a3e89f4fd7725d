// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local filesystem implementation of [`FileManagerService`].
//!
//! A config apply is staged in four steps:
//! 1. every requested file must lie in an allowed directory
//! 2. the request is diffed against the manifest and the files on disk
//! 3. files about to change are backed up in memory
//! 4. files are written or deleted and the manifest is rewritten
//!
//! Failures in steps 1-3 leave the disk untouched and report
//! [`WriteStatus::Error`]. Failures in step 4 report
//! [`WriteStatus::RollbackRequired`]; [`LocalFileManager::rollback`] then
//! restores the backups and the previous manifest.

use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{FileError, FileManagerService, Manifest, ManifestFile, WriteStatus};
use crate::config::Config;
use crate::model::{
    ConfigApplyRequest, ConfigUploadRequest, File, FileMeta, NginxConfigContext, file_hash,
};

const EXECUTE_BITS: u32 = 0o111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
struct Backup {
    contents: Vec<u8>,
    mode: u32,
}

#[derive(Debug, Clone)]
struct FileAction {
    name: String,
    action: Action,
    contents: Vec<u8>,
    mode: u32,
    backup: Option<Backup>,
}

/// What the last config apply changed.
#[derive(Debug, Default)]
struct ApplyCache {
    instance_id: String,
    actions: Vec<FileAction>,
    previous_manifest: Option<Manifest>,
}

impl ApplyCache {
    fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.previous_manifest.is_none()
    }
}

/// Stages configuration files on the local filesystem.
pub struct LocalFileManager {
    config: Config,
    manifest_path: PathBuf,
    cache: Mutex<ApplyCache>,
    connected: AtomicBool,
    pending_update: Mutex<Option<NginxConfigContext>>,
}

impl LocalFileManager {
    /// Create a file manager using the allowed directories and manifest
    /// location from `config`.
    pub fn new(config: Config) -> Self {
        let manifest_path = config.manifest_path();
        Self {
            config,
            manifest_path,
            cache: Mutex::new(ApplyCache::default()),
            connected: AtomicBool::new(false),
            pending_update: Mutex::new(None),
        }
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Current manifest contents.
    pub async fn manifest(&self) -> Result<Manifest, FileError> {
        Manifest::load(&self.manifest_path).await
    }

    fn check_allowed_directories(&self, files: &[File]) -> Result<(), FileError> {
        for file in files {
            if !self.config.is_directory_allowed(Path::new(&file.meta.name)) {
                return Err(FileError::NotAllowed(file.meta.name.clone()));
            }
        }
        Ok(())
    }

    async fn determine_file_actions(
        &self,
        manifest: &Manifest,
        files: &[File],
    ) -> Result<Vec<FileAction>, FileError> {
        let requested: HashSet<&str> = files.iter().map(|f| f.meta.name.as_str()).collect();
        let mut actions = Vec::new();

        // Tracked files missing from the request are deleted.
        for (name, entry) in &manifest.files {
            if requested.contains(name.as_str()) {
                continue;
            }
            if !self.config.is_directory_allowed(Path::new(name)) {
                return Err(FileError::NotAllowed(name.clone()));
            }
            if entry.unmanaged {
                debug!(file = %name, "Skipping unmanaged file deletion");
                continue;
            }
            match tokio::fs::metadata(name).await {
                Ok(_) => actions.push(FileAction {
                    name: name.clone(),
                    action: Action::Delete,
                    contents: Vec::new(),
                    mode: 0,
                    backup: None,
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(file = %name, "File already deleted, skipping");
                }
                Err(e) => return Err(FileError::io("unable to stat file", name, e)),
            }
        }

        for file in files {
            if file.unmanaged {
                debug!(file = %file.meta.name, "Skipping unmanaged file updates");
                continue;
            }

            let name = &file.meta.name;
            let tracked_hash = manifest.get(name).map(|entry| entry.hash.as_str());
            let action = match tokio::fs::metadata(name).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Some(Action::Add),
                Err(e) => return Err(FileError::io("unable to stat file", name, e)),
                Ok(meta) if meta.is_dir() => return Err(FileError::IsDirectory(name.clone())),
                Ok(_) if tracked_hash.is_some_and(|hash| hash != file.meta.hash) => {
                    Some(Action::Update)
                }
                Ok(_) => {
                    let on_disk = tokio::fs::read(name)
                        .await
                        .map_err(|e| FileError::io("unable to read file", name, e))?;
                    (file_hash(&on_disk) != file.meta.hash).then_some(Action::Update)
                }
            };

            if let Some(action) = action {
                actions.push(FileAction {
                    name: name.clone(),
                    action,
                    contents: checked_contents(file)?,
                    mode: file_mode(&file.meta)?,
                    backup: None,
                });
            }
        }

        Ok(actions)
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<(), FileError> {
        manifest.write(&self.manifest_path).await?;
        debug!(
            path = %self.manifest_path.display(),
            files = manifest.files.len(),
            "Manifest written"
        );
        Ok(())
    }

    async fn record_config_update(&self, context: &NginxConfigContext) {
        if let Err(e) = self.update_current_files_on_disk(&context.files, true).await {
            error!(
                instance_id = %context.instance_id,
                error = %e,
                "Unable to update current files on disk"
            );
        }
    }
}

/// Contents of `file`, checked against its declared hash.
fn checked_contents(file: &File) -> Result<Vec<u8>, FileError> {
    let contents = file
        .contents
        .as_ref()
        .ok_or_else(|| FileError::MissingContents(file.meta.name.clone()))?;
    let actual = file_hash(contents.as_bytes());
    if actual != file.meta.hash {
        return Err(FileError::HashMismatch {
            name: file.meta.name.clone(),
            expected: file.meta.hash.clone(),
            actual,
        });
    }
    Ok(contents.as_bytes().to_vec())
}

/// Octal mode for `meta` with execute bits removed.
fn file_mode(meta: &FileMeta) -> Result<u32, FileError> {
    let invalid = || FileError::InvalidPermissions {
        name: meta.name.clone(),
        permissions: meta.permissions.clone(),
    };
    if meta.permissions.len() != 4 {
        return Err(invalid());
    }
    let mode = u32::from_str_radix(&meta.permissions, 8).map_err(|_| invalid())?;
    if mode & EXECUTE_BITS != 0 {
        debug!(file = %meta.name, permissions = %meta.permissions, "Removing execute permissions");
    }
    Ok(mode & !EXECUTE_BITS)
}

async fn backup_files(actions: &mut [FileAction]) -> Result<(), FileError> {
    for action in actions.iter_mut() {
        if action.action == Action::Add {
            continue;
        }
        let contents = tokio::fs::read(&action.name)
            .await
            .map_err(|e| FileError::io("unable to back up file", &action.name, e))?;
        let mode = tokio::fs::metadata(&action.name)
            .await
            .map_err(|e| FileError::io("unable to back up file", &action.name, e))?
            .permissions()
            .mode()
            & 0o7777;
        action.backup = Some(Backup { contents, mode });
    }
    Ok(())
}

async fn write_file(name: &str, contents: &[u8], mode: u32) -> Result<(), FileError> {
    let path = Path::new(name);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FileError::io("unable to create directory", parent, e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| FileError::io("unable to write file", path, e))?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| FileError::io("unable to set permissions", path, e))?;
    Ok(())
}

async fn remove_file(name: &str) -> Result<(), FileError> {
    match tokio::fs::remove_file(name).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FileError::io("error deleting file", name, e)),
    }
}

async fn execute_file_actions(actions: &[FileAction]) -> Result<(), FileError> {
    for action in actions {
        match action.action {
            Action::Add | Action::Update => {
                write_file(&action.name, &action.contents, action.mode).await?;
            }
            Action::Delete => remove_file(&action.name).await?,
        }
        debug!(file = %action.name, action = ?action.action, "File action executed");
    }
    Ok(())
}

#[async_trait]
impl FileManagerService for LocalFileManager {
    async fn config_apply(&self, request: &ConfigApplyRequest) -> WriteStatus {
        let overview = &request.overview;

        if let Err(e) = self.check_allowed_directories(&overview.files) {
            return WriteStatus::Error(e);
        }

        let mut cache = self.cache.lock().await;

        let manifest = match Manifest::load(&self.manifest_path).await {
            Ok(manifest) => manifest,
            Err(e) => return WriteStatus::Error(e),
        };

        let mut actions = match self.determine_file_actions(&manifest, &overview.files).await {
            Ok(actions) => actions,
            Err(e) => return WriteStatus::Error(e),
        };

        if actions.is_empty() {
            debug!(instance_id = %overview.config_version.instance_id, "No file changes required");
            return WriteStatus::NoChange;
        }

        if let Err(e) = backup_files(&mut actions).await {
            return WriteStatus::Error(e);
        }

        debug!(
            instance_id = %overview.config_version.instance_id,
            actions = actions.len(),
            "Executing config apply file actions"
        );

        *cache = ApplyCache {
            instance_id: overview.config_version.instance_id.clone(),
            actions,
            previous_manifest: None,
        };

        if let Err(e) = execute_file_actions(&cache.actions).await {
            return WriteStatus::RollbackRequired(e);
        }

        let updated = Manifest {
            files: overview
                .files
                .iter()
                .map(|file| {
                    let mut entry = ManifestFile::from_meta(&file.meta, false);
                    entry.unmanaged = file.unmanaged;
                    (file.meta.name.clone(), entry)
                })
                .collect(),
        };
        cache.previous_manifest = Some(manifest);

        if let Err(e) = self.write_manifest(&updated).await {
            return WriteStatus::RollbackRequired(e);
        }

        WriteStatus::Ok
    }

    async fn rollback(&self, instance_id: &str) -> Result<(), FileError> {
        info!(instance_id, "Rolling back config for instance");

        let cache = self.cache.lock().await;
        if cache.is_empty() {
            debug!(instance_id, "No file actions to roll back");
            return Ok(());
        }
        if cache.instance_id != instance_id {
            return Err(FileError::NothingToRollback(instance_id.to_string()));
        }

        for action in cache.actions.iter().rev() {
            match (&action.action, &action.backup) {
                (Action::Add, _) => remove_file(&action.name).await?,
                (_, Some(backup)) => write_file(&action.name, &backup.contents, backup.mode).await?,
                (_, None) => warn!(file = %action.name, "No backup recorded, skipping restore"),
            }
        }

        if let Some(previous) = &cache.previous_manifest {
            self.write_manifest(previous).await?;
        }

        Ok(())
    }

    async fn clear_cache(&self) {
        debug!("Clearing config apply cache");
        *self.cache.lock().await = ApplyCache::default();
    }

    async fn update_current_files_on_disk(
        &self,
        files: &[FileMeta],
        referenced: bool,
    ) -> Result<(), FileError> {
        let current = Manifest::load(&self.manifest_path).await?;
        let mut updated = Manifest::from_files(files, referenced);

        for (name, entry) in updated.files.iter_mut() {
            if let Some(existing) = current.get(name) {
                entry.unmanaged = existing.unmanaged;
            }
        }

        // Files written by an apply but no longer referenced stay tracked.
        if referenced {
            for (name, entry) in current.files {
                if !entry.referenced && !updated.files.contains_key(&name) {
                    updated.files.insert(name, entry);
                }
            }
        }

        self.write_manifest(&updated).await
    }

    async fn config_upload(&self, request: &ConfigUploadRequest) -> Result<(), FileError> {
        let files = &request.overview.files;
        self.check_allowed_directories(files)?;

        for file in files {
            let contents = tokio::fs::read(&file.meta.name)
                .await
                .map_err(|e| FileError::io("unable to read file", &file.meta.name, e))?;
            let actual = file_hash(&contents);
            if actual != file.meta.hash {
                return Err(FileError::HashMismatch {
                    name: file.meta.name.clone(),
                    expected: file.meta.hash.clone(),
                    actual,
                });
            }
        }

        info!(
            instance_id = %request.overview.config_version.instance_id,
            files = files.len(),
            "Config upload verified"
        );
        Ok(())
    }

    async fn config_update(&self, context: &NginxConfigContext) {
        {
            // Held across the check so a concurrent connect cannot miss it.
            let mut pending = self.pending_update.lock().await;
            if !self.is_connected() {
                debug!(
                    instance_id = %context.instance_id,
                    "Not connected, deferring config update"
                );
                *pending = Some(context.clone());
                return;
            }
        }

        self.record_config_update(context).await;
    }

    async fn set_is_connected(&self, connected: bool) {
        let pending = {
            let mut pending = self.pending_update.lock().await;
            let was_connected = self.connected.swap(connected, Ordering::SeqCst);
            if !connected || was_connected {
                return;
            }
            pending.take()
        };

        if let Some(context) = pending {
            info!(instance_id = %context.instance_id, "Applying deferred config update");
            self.record_config_update(&context).await;
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfigVersion, FileOverview};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        manager: LocalFileManager,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nginx");
        std::fs::create_dir_all(&root).unwrap();
        let config = Config {
            lib_dir: dir.path().join("lib"),
            allowed_directories: vec![root.clone()],
            ..Config::default()
        };
        Fixture {
            manager: LocalFileManager::new(config),
            root,
            _dir: dir,
        }
    }

    impl Fixture {
        fn path(&self, name: &str) -> String {
            self.root.join(name).to_string_lossy().into_owned()
        }

        fn request(&self, files: Vec<File>) -> ConfigApplyRequest {
            ConfigApplyRequest {
                overview: FileOverview {
                    config_version: ConfigVersion {
                        instance_id: "nginx-1".to_string(),
                        version: "v1".to_string(),
                    },
                    files,
                },
            }
        }
    }

    #[tokio::test]
    async fn test_disallowed_directory_is_error() {
        let fx = fixture();
        let request = fx.request(vec![File::with_contents("/tmp/outside.conf", "x")]);

        let status = fx.manager.config_apply(&request).await;
        match status {
            WriteStatus::Error(FileError::NotAllowed(name)) => assert_eq!(name, "/tmp/outside.conf"),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_add_then_no_change() {
        let fx = fixture();
        let name = fx.path("nginx.conf");
        let request = fx.request(vec![File::with_contents(&name, "events {}")]);

        assert!(matches!(fx.manager.config_apply(&request).await, WriteStatus::Ok));
        assert_eq!(std::fs::read_to_string(&name).unwrap(), "events {}");
        assert!(fx.manager.manifest().await.unwrap().get(&name).is_some());

        fx.manager.clear_cache().await;
        assert!(matches!(fx.manager.config_apply(&request).await, WriteStatus::NoChange));
    }

    #[tokio::test]
    async fn test_update_delete_and_rollback() {
        let fx = fixture();
        let main = fx.path("nginx.conf");
        let extra = fx.path("conf.d/extra.conf");

        let first = fx.request(vec![
            File::with_contents(&main, "events {}"),
            File::with_contents(&extra, "# extra"),
        ]);
        assert!(matches!(fx.manager.config_apply(&first).await, WriteStatus::Ok));
        fx.manager.clear_cache().await;
        let manifest_before = fx.manager.manifest().await.unwrap();

        let added = fx.path("conf.d/new.conf");
        let second = fx.request(vec![
            File::with_contents(&main, "events { worker_connections 512; }"),
            File::with_contents(&added, "# new"),
        ]);
        assert!(matches!(fx.manager.config_apply(&second).await, WriteStatus::Ok));
        assert!(!Path::new(&extra).exists());
        assert!(Path::new(&added).exists());

        fx.manager.rollback("nginx-1").await.unwrap();

        assert_eq!(std::fs::read_to_string(&main).unwrap(), "events {}");
        assert_eq!(std::fs::read_to_string(&extra).unwrap(), "# extra");
        assert!(!Path::new(&added).exists());
        assert_eq!(fx.manager.manifest().await.unwrap(), manifest_before);
    }

    #[tokio::test]
    async fn test_rollback_other_instance_fails() {
        let fx = fixture();
        let request = fx.request(vec![File::with_contents(fx.path("a.conf"), "a")]);
        assert!(matches!(fx.manager.config_apply(&request).await, WriteStatus::Ok));

        let err = fx.manager.rollback("nginx-2").await.unwrap_err();
        assert!(matches!(err, FileError::NothingToRollback(_)));
    }

    #[tokio::test]
    async fn test_rollback_without_apply_is_noop() {
        let fx = fixture();
        fx.manager.rollback("nginx-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_contents_is_error() {
        let fx = fixture();
        let mut file = File::with_contents(fx.path("a.conf"), "a");
        file.contents = None;

        let status = fx.manager.config_apply(&fx.request(vec![file])).await;
        assert!(matches!(status, WriteStatus::Error(FileError::MissingContents(_))));
    }

    #[tokio::test]
    async fn test_hash_mismatch_is_error() {
        let fx = fixture();
        let mut file = File::with_contents(fx.path("a.conf"), "a");
        file.contents = Some("b".to_string());

        let status = fx.manager.config_apply(&fx.request(vec![file])).await;
        assert!(matches!(status, WriteStatus::Error(FileError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_execute_bits_removed() {
        let fx = fixture();
        let name = fx.path("script.conf");
        let mut file = File::with_contents(&name, "x");
        file.meta.permissions = "0755".to_string();

        assert!(matches!(
            fx.manager.config_apply(&fx.request(vec![file])).await,
            WriteStatus::Ok
        ));
        let mode = std::fs::metadata(&name).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[tokio::test]
    async fn test_invalid_permissions_is_error() {
        let fx = fixture();
        let mut file = File::with_contents(fx.path("a.conf"), "a");
        file.meta.permissions = "rw-r--r--".to_string();

        let status = fx.manager.config_apply(&fx.request(vec![file])).await;
        assert!(matches!(status, WriteStatus::Error(FileError::InvalidPermissions { .. })));
    }

    #[tokio::test]
    async fn test_unmanaged_files_untouched() {
        let fx = fixture();
        let name = fx.path("mime.types");
        std::fs::write(&name, "types {}").unwrap();

        let mut file = File::with_contents(&name, "different");
        file.unmanaged = true;

        let status = fx.manager.config_apply(&fx.request(vec![file])).await;
        assert!(matches!(status, WriteStatus::NoChange));
        assert_eq!(std::fs::read_to_string(&name).unwrap(), "types {}");
    }

    #[tokio::test]
    async fn test_directory_in_the_way_is_error() {
        let fx = fixture();
        let name = fx.path("conf.d");
        std::fs::create_dir_all(&name).unwrap();

        let status = fx
            .manager
            .config_apply(&fx.request(vec![File::with_contents(&name, "x")]))
            .await;
        assert!(matches!(status, WriteStatus::Error(FileError::IsDirectory(_))));
    }

    #[tokio::test]
    async fn test_update_current_files_keeps_unreferenced() {
        let fx = fixture();
        let written = fx.path("written.conf");
        let request = fx.request(vec![File::with_contents(&written, "w")]);
        assert!(matches!(fx.manager.config_apply(&request).await, WriteStatus::Ok));

        let parsed = FileMeta::from_contents(fx.path("nginx.conf"), b"events {}");
        fx.manager
            .update_current_files_on_disk(std::slice::from_ref(&parsed), true)
            .await
            .unwrap();

        let manifest = fx.manager.manifest().await.unwrap();
        assert!(manifest.get(&parsed.name).unwrap().referenced);
        assert!(!manifest.get(&written).unwrap().referenced);
    }

    #[tokio::test]
    async fn test_config_upload_verifies_hashes() {
        let fx = fixture();
        let name = fx.path("nginx.conf");
        std::fs::write(&name, "events {}").unwrap();

        let ok = ConfigUploadRequest {
            overview: FileOverview {
                config_version: ConfigVersion::default(),
                files: vec![File::with_contents(&name, "events {}")],
            },
        };
        fx.manager.config_upload(&ok).await.unwrap();

        let stale = ConfigUploadRequest {
            overview: FileOverview {
                config_version: ConfigVersion::default(),
                files: vec![File::with_contents(&name, "events { }")],
            },
        };
        let err = fx.manager.config_upload(&stale).await.unwrap_err();
        assert!(matches!(err, FileError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_connected_flag() {
        let fx = fixture();
        assert!(!fx.manager.is_connected());
        fx.manager.set_is_connected(true).await;
        assert!(fx.manager.is_connected());
        fx.manager.set_is_connected(false).await;
        assert!(!fx.manager.is_connected());
    }

    #[tokio::test]
    async fn test_config_update_deferred_until_connected() {
        let fx = fixture();
        let first = FileMeta::from_contents(fx.path("nginx.conf"), b"events {}");
        let latest = FileMeta::from_contents(fx.path("nginx.conf"), b"events { }");
        let context = |file: &FileMeta| NginxConfigContext {
            instance_id: "nginx-1".to_string(),
            files: vec![file.clone()],
            ..Default::default()
        };

        fx.manager.config_update(&context(&first)).await;
        fx.manager.config_update(&context(&latest)).await;
        assert!(fx.manager.manifest().await.unwrap().get(&first.name).is_none());

        fx.manager.set_is_connected(true).await;
        let manifest = fx.manager.manifest().await.unwrap();
        assert_eq!(manifest.get(&latest.name).unwrap().hash, latest.hash);

        // Nothing left to replay on a later reconnect.
        fx.manager.set_is_connected(false).await;
        fx.manager.set_is_connected(true).await;
        assert!(fx.manager.pending_update.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_config_update_when_connected() {
        let fx = fixture();
        fx.manager.set_is_connected(true).await;
        let parsed = FileMeta::from_contents(fx.path("nginx.conf"), b"events {}");

        fx.manager
            .config_update(&NginxConfigContext {
                instance_id: "nginx-1".to_string(),
                files: vec![parsed.clone()],
                ..Default::default()
            })
            .await;

        assert!(fx.manager.manifest().await.unwrap().get(&parsed.name).unwrap().referenced);
    }
}
