// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Gate configuration and status types.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Limit applied to any key without an explicit override.
pub const DEFAULT_GATE_LIMIT: usize = 5;

fn default_limit() -> usize {
    DEFAULT_GATE_LIMIT
}

/// Limits for a [`ConcurrencyGate`](super::ConcurrencyGate).
///
/// Keys are opaque strings chosen by the caller (typically provider names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    /// Limit for keys that have no override.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Per-key overrides.
    #[serde(default)]
    pub limits: HashMap<String, usize>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_LIMIT)
    }
}

impl GateConfig {
    /// Create a config with the given default limit and no overrides.
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit,
            limits: HashMap::new(),
        }
    }

    /// Override the limit for a single key.
    pub fn with_limit(mut self, key: impl Into<String>, limit: usize) -> Self {
        self.limits.insert(key.into(), limit);
        self
    }

    /// Effective limit for `key`.
    pub fn limit_for(&self, key: &str) -> usize {
        self.limits.get(key).copied().unwrap_or(self.default_limit)
    }
}

/// Point-in-time snapshot of gate occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    /// Permits currently held, per key. Keys with no holders are omitted.
    pub active: BTreeMap<String, usize>,
    /// Sum of `active`.
    pub total_active: usize,
    /// Waiters queued, per key. Keys with empty queues are omitted.
    pub queued_by_key: BTreeMap<String, usize>,
    /// Sum of `queued_by_key`.
    pub queued: usize,
}

impl GateStatus {
    /// Permits held for `key`.
    pub fn active_for(&self, key: &str) -> usize {
        self.active.get(key).copied().unwrap_or(0)
    }

    /// Waiters queued for `key`.
    pub fn queued_for(&self, key: &str) -> usize {
        self.queued_by_key.get(key).copied().unwrap_or(0)
    }
}
