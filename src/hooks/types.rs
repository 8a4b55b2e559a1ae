// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hook handler trait and registration records.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Priority used when a registration doesn't give one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Identifies the call site of a hook execution.
///
/// Passed through to handlers untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookContext {
    pub session_id: String,
    pub chat_id: String,
    pub agent: String,
    pub directory: String,
    pub run_id: String,
}

impl HookContext {
    pub fn new(session_id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            agent: agent.into(),
            ..Self::default()
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = chat_id.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }
}

/// What a handler asks the dispatcher to do next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookOutcome {
    /// Run the remaining handlers.
    #[default]
    Continue,
    /// Skip the remaining handlers for this execution only.
    Abort,
}

impl HookOutcome {
    pub fn is_abort(self) -> bool {
        matches!(self, Self::Abort)
    }
}

/// An extension invoked at a hook point.
///
/// Handlers for one execution run one at a time and share `output`, so
/// whatever one handler writes is visible to the next.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn call(
        &self,
        input: &Value,
        output: &mut Value,
        context: &HookContext,
    ) -> anyhow::Result<HookOutcome>;
}

#[async_trait]
impl<F> HookHandler for F
where
    F: Fn(&Value, &mut Value, &HookContext) -> anyhow::Result<HookOutcome> + Send + Sync,
{
    async fn call(
        &self,
        input: &Value,
        output: &mut Value,
        context: &HookContext,
    ) -> anyhow::Result<HookOutcome> {
        self(input, output, context)
    }
}

/// A registration at one hook point.
#[derive(Clone)]
pub struct HookEntry {
    pub name: String,
    pub priority: i32,
    pub scope: Option<String>,
    /// Insertion sequence, breaks priority ties.
    pub(crate) seq: u64,
    pub(crate) handler: Arc<dyn HookHandler>,
}

impl HookEntry {
    /// Position in registration order across the dispatcher. Re-registering
    /// a name gives it a fresh, later sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// What happened during one [`execute`](super::HookDispatcher::execute).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReport {
    /// Handlers that were called, in order.
    pub invoked: Vec<String>,
    /// Handlers that returned an error or panicked.
    pub failed: Vec<String>,
    /// The handler that short-circuited the run, if any.
    pub aborted_by: Option<String>,
}

impl HookReport {
    pub fn aborted(&self) -> bool {
        self.aborted_by.is_some()
    }
}
