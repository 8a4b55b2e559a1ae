// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`ConductorConfig`] is the on-disk shape: every field optional so files
//! at different levels can be layered. [`ResolvedConfig`] is the merged
//! result with defaults filled in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::gate::GateConfig;
use crate::hooks::HooksConfig;
use crate::rpc::RpcConfig;
use crate::supervisor::{GateKeying, SupervisorConfig};

/// Conductor configuration as written in a config file.
///
/// Can be defined in `.conductor.json`, `.conductor/config.json` or
/// `conductor.config.yaml` in the workspace root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateConfigPartial>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<SupervisorConfigPartial>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc: Option<RpcConfigPartial>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<HooksConfigPartial>,

    /// Tool server launched by `conductor call` when no command is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_server: Option<ToolServerConfig>,
}

/// Gate limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<usize>,

    /// Per-key limits. Merged key by key across files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<HashMap<String, usize>>,
}

/// Supervisor settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// `bucket` or `provider`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keying: Option<GateKeying>,

    /// Per-provider limits. Merged key by key across files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_limits: Option<HashMap<String, usize>>,
}

/// RPC channel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,
}

/// Hook settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksConfigPartial {
    /// Hook names to start disabled. Accumulated across files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<Vec<String>>,
}

/// Command line for a stdio tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolServerConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub gate: GateConfig,
    pub supervisor: SupervisorConfig,
    pub rpc: RpcConfig,
    pub hooks: HooksConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_server: Option<ToolServerConfig>,
}
