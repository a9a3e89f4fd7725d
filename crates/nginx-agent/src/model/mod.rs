// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Data types carried on the bus.
//!
//! These mirror the management plane protocol closely enough to be translated
//! by a transport, but carry no transport concerns themselves.

mod config_context;
mod file;
mod instance;
mod request;
mod response;
mod watchers;

pub use config_context::*;
pub use file::*;
pub use instance::*;
pub use request::*;
pub use response::*;
pub use watchers::*;
