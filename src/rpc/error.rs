// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for RPC operations.

use thiserror::Error;

/// Errors that can settle a pending RPC request.
///
/// Every variant is scoped to a single request; one failing request never
/// affects its siblings. Malformed frames are recovered inside the reader
/// and never surface here.
#[derive(Error, Debug)]
pub enum RpcError {
    /// The far side answered with an error object.
    #[error("Remote error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// No matching response arrived in time.
    #[error("Request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The transport closed while the request was outstanding.
    #[error("Tool server process exited")]
    ProcessExited,

    /// The channel was destroyed before a response arrived.
    #[error("RPC channel destroyed")]
    Destroyed,

    /// The transport could not be set up.
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// Create a remote error from a response's error object.
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The remote error code, if this is a remote error.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this error is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the request may succeed if sent again on the same channel.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
            || matches!(self, Self::Remote { code, .. } if *code == error_codes::SERVER_BUSY)
    }

    /// Check if the channel is unusable and must be replaced.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ProcessExited | Self::Destroyed | Self::Transport(_))
    }
}

/// Standard JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received by the server.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameter(s).
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Implementation-defined: server is overloaded.
    pub const SERVER_BUSY: i64 = -32000;
}
