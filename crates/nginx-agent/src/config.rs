// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for nginx-agent.

use std::path::{Component, Path, PathBuf};

/// Features the management plane may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Config apply and config upload requests.
    Configuration,
    /// NGINX Plus API action requests.
    ApiAction,
}

impl Feature {
    /// Name used in `NGINX_AGENT_FEATURES`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Configuration => "configuration",
            Feature::ApiAction => "api-action",
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "configuration" => Ok(Feature::Configuration),
            "api-action" => Ok(Feature::ApiAction),
            other => Err(ConfigError::UnknownFeature(other.to_string())),
        }
    }
}

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for agent state (the files manifest lives here)
    pub lib_dir: PathBuf,
    /// Directories the agent may write configuration files to
    pub allowed_directories: Vec<PathBuf>,
    /// Enabled features
    pub features: Vec<Feature>,
    /// Capacity of the bus message channel
    pub queue_size: usize,
    /// NGINX binary used for `-t` validation
    pub nginx_binary: PathBuf,
    /// Main configuration file of the managed instance
    pub nginx_conf: PathBuf,
    /// PID file of the NGINX master process
    pub nginx_pid_file: PathBuf,
    /// Instance id reported to the management plane
    pub instance_id: String,
    /// Whether the managed instance is NGINX Plus
    pub nginx_plus: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lib_dir: PathBuf::from("/var/lib/nginx-agent"),
            allowed_directories: vec![PathBuf::from("/etc/nginx")],
            features: vec![Feature::Configuration, Feature::ApiAction],
            queue_size: 100,
            nginx_binary: PathBuf::from("nginx"),
            nginx_conf: PathBuf::from("/etc/nginx/nginx.conf"),
            nginx_pid_file: PathBuf::from("/var/run/nginx.pid"),
            instance_id: uuid::Uuid::new_v4().to_string(),
            nginx_plus: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let lib_dir = lookup("NGINX_AGENT_LIB_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.lib_dir);

        let allowed_directories = match lookup("NGINX_AGENT_ALLOWED_DIRECTORIES") {
            Some(value) => {
                let dirs = split_list(&value)
                    .map(|dir| {
                        let path = PathBuf::from(dir);
                        if path.is_absolute() {
                            Ok(path)
                        } else {
                            Err(ConfigError::RelativeDirectory(dir.to_string()))
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if dirs.is_empty() {
                    return Err(ConfigError::NoAllowedDirectories);
                }
                dirs
            }
            None => defaults.allowed_directories,
        };

        let features = match lookup("NGINX_AGENT_FEATURES") {
            Some(value) => {
                let mut features = Vec::new();
                for name in split_list(&value) {
                    let feature = Feature::parse(name)?;
                    if !features.contains(&feature) {
                        features.push(feature);
                    }
                }
                features
            }
            None => defaults.features,
        };

        let queue_size = match lookup("NGINX_AGENT_QUEUE_SIZE") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidQueueSize(value)),
            },
            None => defaults.queue_size,
        };

        let nginx_binary = lookup("NGINX_AGENT_NGINX_BINARY")
            .map(PathBuf::from)
            .unwrap_or(defaults.nginx_binary);

        let nginx_conf = lookup("NGINX_AGENT_NGINX_CONF")
            .map(PathBuf::from)
            .unwrap_or(defaults.nginx_conf);

        let nginx_pid_file = lookup("NGINX_AGENT_NGINX_PID_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.nginx_pid_file);

        let instance_id = lookup("NGINX_AGENT_INSTANCE_ID")
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(defaults.instance_id);

        let nginx_plus = lookup("NGINX_AGENT_NGINX_PLUS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            lib_dir,
            allowed_directories,
            features,
            queue_size,
            nginx_binary,
            nginx_conf,
            nginx_pid_file,
            instance_id,
            nginx_plus,
        })
    }

    /// Returns true if `path` lies under one of the allowed directories.
    ///
    /// Relative paths and paths containing `..` are never allowed.
    pub fn is_directory_allowed(&self, path: &Path) -> bool {
        if !path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            return false;
        }
        self.allowed_directories
            .iter()
            .any(|allowed| path.starts_with(allowed))
    }

    /// Returns true if `feature` is enabled.
    pub fn is_feature_enabled(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Path of the current files manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.lib_dir.join("manifest.json")
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An allowed directory is not an absolute path.
    #[error("Allowed directory must be absolute: {0}")]
    RelativeDirectory(String),
    /// The allowed directory list is empty.
    #[error("At least one allowed directory is required")]
    NoAllowedDirectories,
    /// A feature name is not recognised.
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),
    /// The queue size is not a positive integer.
    #[error("Invalid queue size: {0}")]
    InvalidQueueSize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.lib_dir, PathBuf::from("/var/lib/nginx-agent"));
        assert_eq!(config.allowed_directories, vec![PathBuf::from("/etc/nginx")]);
        assert_eq!(config.queue_size, 100);
        assert!(config.is_feature_enabled(Feature::Configuration));
        assert!(config.is_feature_enabled(Feature::ApiAction));
        assert!(!config.nginx_plus);
        assert!(!config.instance_id.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("NGINX_AGENT_LIB_DIR", "/tmp/agent"),
            ("NGINX_AGENT_ALLOWED_DIRECTORIES", "/etc/nginx, /usr/share/nginx"),
            ("NGINX_AGENT_FEATURES", "configuration"),
            ("NGINX_AGENT_QUEUE_SIZE", "8"),
            ("NGINX_AGENT_INSTANCE_ID", "instance-1"),
            ("NGINX_AGENT_NGINX_PLUS", "true"),
        ]))
        .unwrap();

        assert_eq!(config.lib_dir, PathBuf::from("/tmp/agent"));
        assert_eq!(config.allowed_directories.len(), 2);
        assert_eq!(config.features, vec![Feature::Configuration]);
        assert!(!config.is_feature_enabled(Feature::ApiAction));
        assert_eq!(config.queue_size, 8);
        assert_eq!(config.instance_id, "instance-1");
        assert!(config.nginx_plus);
        assert_eq!(config.manifest_path(), PathBuf::from("/tmp/agent/manifest.json"));
    }

    #[test]
    fn test_invalid_queue_size() {
        let err = Config::from_lookup(lookup(&[("NGINX_AGENT_QUEUE_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQueueSize(_)));

        let err = Config::from_lookup(lookup(&[("NGINX_AGENT_QUEUE_SIZE", "lots")])).unwrap_err();
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn test_unknown_feature() {
        let err = Config::from_lookup(lookup(&[("NGINX_AGENT_FEATURES", "metrics")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFeature(ref f) if f == "metrics"));
    }

    #[test]
    fn test_relative_allowed_directory() {
        let err = Config::from_lookup(lookup(&[("NGINX_AGENT_ALLOWED_DIRECTORIES", "etc/nginx")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::RelativeDirectory(_)));

        let err =
            Config::from_lookup(lookup(&[("NGINX_AGENT_ALLOWED_DIRECTORIES", " , ")])).unwrap_err();
        assert!(matches!(err, ConfigError::NoAllowedDirectories));
    }

    #[test]
    fn test_is_directory_allowed() {
        let config = Config::default();
        assert!(config.is_directory_allowed(Path::new("/etc/nginx/nginx.conf")));
        assert!(config.is_directory_allowed(Path::new("/etc/nginx/conf.d/default.conf")));
        assert!(!config.is_directory_allowed(Path::new("/etc/nginx-other/a.conf")));
        assert!(!config.is_directory_allowed(Path::new("/etc/nginx/../passwd")));
        assert!(!config.is_directory_allowed(Path::new("nginx.conf")));
    }
}
