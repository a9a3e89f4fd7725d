// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validating and reloading NGINX instances.

use std::path::PathBuf;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::model::Instance;

/// Errors from validating or reloading an instance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OperatorError {
    /// The NGINX binary could not be started.
    #[error("failed to run {binary}: {source}")]
    Exec {
        /// Binary that was run.
        binary: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// `nginx -t` exited with a failure status.
    #[error("NGINX config test failed ({status}): {output}")]
    TestFailed {
        /// Exit status.
        status: String,
        /// Combined stdout and stderr.
        output: String,
    },

    /// `nginx -t` succeeded but reported problems.
    #[error("error running nginx -t -c:\n{0}")]
    ConfigCheck(String),

    /// No master process id is known for the instance.
    #[error("no master process id for instance {0}")]
    NoProcess(String),

    /// Sending the reload signal failed.
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        /// Master process id.
        pid: i32,
        /// Underlying error.
        #[source]
        source: nix::errno::Errno,
    },
}

/// Validates and reloads an instance.
#[async_trait]
pub trait InstanceOperator: Send + Sync {
    /// Test the instance's configuration.
    async fn validate(&self, instance: &Instance) -> Result<(), OperatorError>;

    /// Ask the master process to reload its configuration.
    async fn reload(&self, instance: &Instance) -> Result<(), OperatorError>;
}

/// Operator that shells out to the NGINX binary and signals the master.
#[derive(Debug, Clone)]
pub struct NginxInstanceOperator {
    binary: PathBuf,
    pid_file: PathBuf,
    treat_warnings_as_errors: bool,
}

impl NginxInstanceOperator {
    /// Operator using `binary` when an instance has no binary path, and
    /// `pid_file` to find the master process.
    pub fn new(binary: impl Into<PathBuf>, pid_file: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            pid_file: pid_file.into(),
            treat_warnings_as_errors: false,
        }
    }

    /// Fail validation on `[warn]` output as well.
    pub fn treat_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.treat_warnings_as_errors = enabled;
        self
    }

    fn binary_for(&self, instance: &Instance) -> String {
        if instance.runtime.binary_path.is_empty() {
            self.binary.to_string_lossy().into_owned()
        } else {
            instance.runtime.binary_path.clone()
        }
    }

    fn check_output(&self, output: &str) -> Result<(), OperatorError> {
        let severe = ["[emerg]", "[alert]", "[crit]"]
            .iter()
            .any(|level| output.contains(level));
        let warned = self.treat_warnings_as_errors && output.contains("[warn]");

        if severe || warned {
            return Err(OperatorError::ConfigCheck(output.to_string()));
        }
        Ok(())
    }

    async fn master_pid(&self, instance: &Instance) -> Result<i32, OperatorError> {
        if let Ok(contents) = tokio::fs::read_to_string(&self.pid_file).await
            && let Ok(pid) = contents.trim().parse::<i32>()
        {
            return Ok(pid);
        }

        instance
            .runtime
            .process_id
            .ok_or_else(|| OperatorError::NoProcess(instance.id().to_string()))
    }
}

#[async_trait]
impl InstanceOperator for NginxInstanceOperator {
    async fn validate(&self, instance: &Instance) -> Result<(), OperatorError> {
        let binary = self.binary_for(instance);
        debug!(instance_id = %instance.id(), binary = %binary, "Validating NGINX config");

        let mut command = Command::new(&binary);
        command.arg("-t");
        if !instance.runtime.config_path.is_empty() {
            command.arg("-c").arg(&instance.runtime.config_path);
        }

        let output = command
            .output()
            .await
            .map_err(|source| OperatorError::Exec {
                binary: binary.clone(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(OperatorError::TestFailed {
                status: output.status.to_string(),
                output: text,
            });
        }

        self.check_output(&text)?;

        info!(instance_id = %instance.id(), output = %text.trim(), "NGINX config tested");
        Ok(())
    }

    async fn reload(&self, instance: &Instance) -> Result<(), OperatorError> {
        let pid = self.master_pid(instance).await?;
        info!(instance_id = %instance.id(), pid = pid, "Reloading NGINX");

        signal::kill(Pid::from_raw(pid), Signal::SIGHUP)
            .map_err(|source| OperatorError::Signal { pid, source })?;

        info!(instance_id = %instance.id(), pid = pid, "NGINX reloaded");
        Ok(())
    }
}
