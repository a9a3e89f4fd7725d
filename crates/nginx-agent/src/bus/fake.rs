// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fake message pipe for testing.
//!
//! Records published messages instead of dispatching them, so a plugin's
//! output can be asserted on directly.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{BusError, Message, MessagePipeInterface, Result};

/// Message pipe that only records.
#[derive(Default)]
pub struct FakeMessagePipe {
    messages: Mutex<Vec<Message>>,
    closed: Mutex<bool>,
}

impl FakeMessagePipe {
    /// Create an empty fake pipe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published so far, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Forget recorded messages.
    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }

    /// Make further `process` calls fail with [`BusError::Closed`].
    pub fn close(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
    }
}

#[async_trait]
impl MessagePipeInterface for FakeMessagePipe {
    async fn process(&self, messages: Vec<Message>) -> Result<()> {
        if self.closed.lock().map(|c| *c).unwrap_or(false) {
            return Err(BusError::Closed);
        }
        if let Ok(mut recorded) = self.messages.lock() {
            recorded.extend(messages);
        }
        Ok(())
    }
}
