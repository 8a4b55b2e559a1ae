// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON-RPC channel to external tool servers.
//!
//! Messages travel as `Content-Length` framed JSON over a pair of byte
//! streams, typically a child process's stdio. An [`RpcChannel`] correlates
//! responses to requests by numeric id, applies per-request timeouts, and
//! forwards server notifications to whoever takes the receiver.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::rpc::{spawn_stdio, RpcChannel, RpcConfig};
//! use tokio::process::Command;
//!
//! let mut child = spawn_stdio(Command::new("my-tool-server"))?;
//! let channel = RpcChannel::from_child(&mut child, RpcConfig::new("tools"))?;
//! let tools = channel.request("tools/list", None, None).await?;
//! ```

mod channel;
pub mod codec;
mod error;
mod transport;
mod types;

pub use channel::RpcChannel;
pub use codec::{encode_frame, ContentLengthCodec};
pub use error::{error_codes, RpcError};
pub use transport::{spawn_stdio, take_stdio, RpcRead, RpcWrite};
pub use types::{Notification, RpcConfig, DEFAULT_REQUEST_TIMEOUT_MS};
