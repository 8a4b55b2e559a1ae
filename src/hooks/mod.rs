// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lifecycle hooks.
//!
//! Extensions register handlers at named hook points (for example
//! `before_tool` or `after_turn`). The agent loop calls
//! [`HookDispatcher::execute`] at each point, and the registered handlers
//! observe or edit a shared output value, or veto the rest of the pipeline
//! by returning [`HookOutcome::Abort`].

mod dispatcher;
mod types;

use serde::{Deserialize, Serialize};

pub use dispatcher::HookDispatcher;
pub use types::{HookContext, HookEntry, HookHandler, HookOutcome, HookReport, DEFAULT_PRIORITY};

/// Hook settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksConfig {
    /// Hook names that start out disabled.
    #[serde(default)]
    pub disabled: Vec<String>,
}
