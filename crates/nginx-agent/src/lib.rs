// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NGINX Agent - Host-resident Instance Management
//!
//! This crate keeps NGINX instances on a host in sync with configuration issued
//! by a management plane and reports the outcome of every change back to it.
//! Independent capability modules (plugins) talk to each other only through an
//! in-process publish/subscribe bus.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Management Plane                                 │
//! │                 (transport behind CommandService)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                 │ requests                         ▲ responses
//!                 ▼                                  │
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     MessagePipe (this crate)                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │  Command    │  │   NGINX     │  │  Watcher    │  │  Resource   │     │
//! │  │  Plugin     │  │   Plugin    │  │  Plugin     │  │  Plugin     │     │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                             │                   │
//!                             ▼                   ▼
//!                 ┌───────────────────┐  ┌─────────────────────────┐
//!                 │ LocalFileManager  │  │     NginxService        │
//!                 │ (files, manifest) │  │ (parse, validate, HUP)  │
//!                 └───────────────────┘  └─────────────────────────┘
//! ```
//!
//! # Config Apply Outcomes
//!
//! | File write status | Responses emitted | Then |
//! |-------------------|-------------------|------|
//! | `NoChange` | `OK` | EnableWatchers |
//! | `Error` | `FAILURE` | EnableWatchers |
//! | `RollbackRequired` | `ERROR`, `FAILURE` | EnableWatchers |
//! | `Ok`, reload succeeds | `OK` | EnableWatchers (new context) |
//! | `Ok`, reload fails | `ERROR`, `FAILURE` | EnableWatchers |
//!
//! All responses for one request carry the request's correlation id.
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NGINX_AGENT_LIB_DIR` | `/var/lib/nginx-agent` | Directory holding the files manifest |
//! | `NGINX_AGENT_ALLOWED_DIRECTORIES` | `/etc/nginx` | Comma-separated directories files may be written to |
//! | `NGINX_AGENT_FEATURES` | `configuration,api-action` | Enabled features |
//! | `NGINX_AGENT_QUEUE_SIZE` | `100` | Bus channel capacity |
//! | `NGINX_AGENT_NGINX_BINARY` | `nginx` | Binary used to validate configuration |
//! | `NGINX_AGENT_NGINX_CONF` | `/etc/nginx/nginx.conf` | Main configuration file |
//! | `NGINX_AGENT_NGINX_PID_FILE` | `/var/run/nginx.pid` | PID file of the NGINX master process |
//! | `NGINX_AGENT_INSTANCE_ID` | random UUID | Instance id reported to the management plane |
//! | `NGINX_AGENT_NGINX_PLUS` | `false` | Whether the instance is NGINX Plus |

#![warn(missing_docs)]

/// In-process publish/subscribe bus and the plugin contract.
pub mod bus;

/// Management plane ingress/egress plugin.
pub mod command;

/// Agent configuration from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// Configuration file staging, manifest and rollback.
pub mod file;

/// Data types exchanged between plugins.
pub mod model;

/// NGINX instance handling: parsing, validation, reload and the config apply plugin.
pub mod nginx;

/// Resource bookkeeping plugin.
pub mod resource;

/// Embeddable runtime that wires plugins onto a bus.
pub mod runtime;

/// Watcher bookkeeping plugin.
pub mod watcher;

pub use error::{Error, Result};
