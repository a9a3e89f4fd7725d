// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bus module - in-process publish/subscribe between plugins.
//!
//! Plugins never call each other. They publish [`Message`]s on a [`Topic`]
//! and the [`MessagePipe`] delivers each message to every plugin subscribed
//! to that topic, one message at a time, in the order messages were
//! published.

pub mod fake;
mod message;
mod message_pipe;
mod plugin;
mod topic;

use thiserror::Error;

pub use fake::FakeMessagePipe;
pub use message::*;
pub use message_pipe::MessagePipe;
pub use plugin::*;
pub use topic::Topic;

/// Errors from bus operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusError {
    /// A plugin with the same name is already registered.
    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    /// The pipe has shut down and accepts no more messages or plugins.
    #[error("Message pipe is closed")]
    Closed,

    /// `run` was called on a pipe that is already running.
    #[error("Message pipe is already running")]
    AlreadyRunning,
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
