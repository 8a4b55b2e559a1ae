// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the conductor core.
//!
//! Each primitive gets its own strongly-typed error, defined with `thiserror`.
//! Extension code (hook handlers, execution units) reports failures through
//! `anyhow`, which the primitives contain and log rather than propagate.

use thiserror::Error;

pub use crate::rpc::RpcError;

/// Errors that can occur while waiting on a concurrency gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The gate was destroyed before a permit could be granted.
    #[error("Concurrency gate destroyed")]
    Destroyed,
}

/// Errors returned by the task supervisor.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Task supervisor destroyed")]
    Destroyed,

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
