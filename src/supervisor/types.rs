// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task records, execution unit contract and supervisor configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::gate::GateConfig;

/// Default number of tasks allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Default gate bucket shared by all tasks.
pub const DEFAULT_BUCKET: &str = "background";

/// Unique task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(format!("task_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a task.
///
/// `Pending -> Running -> {Completed | Error | Cancelled}`, plus
/// `Pending -> Cancelled` for tasks cancelled before they were admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Error)
                | (Self::Running, Self::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an agent loop finished when it didn't fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopOutcome {
    Completed,
    Aborted,
    MaxSteps,
}

/// A unit of work driven by the supervisor, usually one agent loop.
///
/// `abort` is a request: the supervisor keeps awaiting `run` after calling
/// it and expects the loop to wind down on its own.
#[async_trait]
pub trait ExecutionUnit: Send + Sync {
    /// Run to completion.
    async fn run(&self) -> anyhow::Result<LoopOutcome>;

    /// Text produced so far.
    fn accumulated_text(&self) -> String;

    /// Ask the loop to stop.
    fn abort(&self);
}

/// Correlation data threaded through nested runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub run_id: String,
    pub parent_run_id: Option<String>,
    pub depth: u32,
}

impl RunContext {
    /// A top-level run.
    pub fn root() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            parent_run_id: None,
            depth: 0,
        }
    }

    /// A run nested under this one.
    pub fn child(&self) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            parent_run_id: Some(self.run_id.clone()),
            depth: self.depth + 1,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::root()
    }
}

/// Parameters for [`TaskSupervisor::spawn_agent`](super::TaskSupervisor::spawn_agent).
pub struct SpawnParams {
    pub agent: String,
    pub prompt: String,
    pub description: String,
    pub parent: Option<RunContext>,
    /// Cancelling this token cancels the task.
    pub parent_cancel: Option<CancellationToken>,
    /// Gate key when the supervisor keys by provider.
    pub provider: Option<String>,
    pub unit: Arc<dyn ExecutionUnit>,
    /// Return as soon as the task is registered instead of when it settles.
    pub background: bool,
}

impl SpawnParams {
    pub fn new(
        agent: impl Into<String>,
        prompt: impl Into<String>,
        unit: Arc<dyn ExecutionUnit>,
    ) -> Self {
        Self {
            agent: agent.into(),
            prompt: prompt.into(),
            description: String::new(),
            parent: None,
            parent_cancel: None,
            provider: None,
            unit,
            background: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parent(mut self, parent: RunContext) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn parent_cancel(mut self, token: CancellationToken) -> Self {
        self.parent_cancel = Some(token);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Wait for the task to settle before returning.
    pub fn foreground(mut self) -> Self {
        self.background = false;
        self
    }
}

impl fmt::Debug for SpawnParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnParams")
            .field("agent", &self.agent)
            .field("description", &self.description)
            .field("provider", &self.provider)
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a tracked task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: TaskId,
    pub agent: String,
    pub description: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub gate_key: String,
    pub background: bool,
    pub run_context: RunContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<LoopOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub output: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Which gate key a task is admitted under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKeying {
    /// Every task shares the configured bucket.
    #[default]
    Bucket,
    /// Tasks are keyed by their provider, falling back to the bucket.
    Provider,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

/// Supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Limit for any gate key without an explicit entry.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default)]
    pub keying: GateKeying,

    /// Per-key limits, e.g. per provider.
    #[serde(default)]
    pub gate_limits: HashMap<String, usize>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            bucket: default_bucket(),
            keying: GateKeying::default(),
            gate_limits: HashMap::new(),
        }
    }
}

impl SupervisorConfig {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn keyed_by_provider(mut self) -> Self {
        self.keying = GateKeying::Provider;
        self
    }

    pub fn with_gate_limit(mut self, key: impl Into<String>, limit: usize) -> Self {
        self.gate_limits.insert(key.into(), limit);
        self
    }

    /// Configuration for the supervisor's internal gate.
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            default_limit: self.max_concurrent,
            limits: self.gate_limits.clone(),
        }
    }

    /// Gate key for a task spawned with `provider`.
    pub fn gate_key(&self, provider: Option<&str>) -> String {
        match (self.keying, provider) {
            (GateKeying::Provider, Some(provider)) => provider.to_string(),
            _ => self.bucket.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        use TaskStatus::*;
        let all = [Pending, Running, Completed, Error, Cancelled];
        for from in [Completed, Error, Cancelled] {
            assert!(from.is_terminal());
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Running.can_transition_to(Error));
    }

    #[test]
    fn test_run_context_nesting() {
        let root = RunContext::root();
        let child = root.child();
        assert_eq!(child.parent_run_id.as_deref(), Some(root.run_id.as_str()));
        assert_eq!(child.depth, 1);
        assert_ne!(child.run_id, root.run_id);
    }

    #[test]
    fn test_gate_key_selection() {
        let bucketed = SupervisorConfig::default();
        assert_eq!(bucketed.gate_key(Some("anthropic")), DEFAULT_BUCKET);

        let keyed = SupervisorConfig::default()
            .keyed_by_provider()
            .with_gate_limit("ollama", 1);
        assert_eq!(keyed.gate_key(Some("ollama")), "ollama");
        assert_eq!(keyed.gate_key(None), DEFAULT_BUCKET);
        assert_eq!(keyed.gate_config().limit_for("ollama"), 1);
        assert_eq!(keyed.gate_config().limit_for("other"), DEFAULT_MAX_CONCURRENT);
    }

    #[test]
    fn test_serde_shapes() {
        assert_eq!(serde_json::to_value(TaskStatus::Cancelled).unwrap(), "cancelled");
        assert_eq!(serde_json::to_value(LoopOutcome::MaxSteps).unwrap(), "max-steps");
        let config: SupervisorConfig =
            serde_json::from_str(r#"{"maxConcurrent": 2, "keying": "provider"}"#).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.keying, GateKeying::Provider);
        assert_eq!(config.bucket, DEFAULT_BUCKET);
    }
}
