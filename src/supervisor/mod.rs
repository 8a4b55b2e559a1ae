// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background agent task supervision.
//!
//! [`TaskSupervisor::spawn_agent`] registers a task, waits for a slot in the
//! supervisor's internal [`ConcurrencyGate`](crate::gate::ConcurrencyGate),
//! and drives the supplied [`ExecutionUnit`] to completion. Status moves
//! `pending -> running -> completed | error | cancelled`, with a direct
//! `pending -> cancelled` for tasks cancelled before admission.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::supervisor::{SpawnParams, SupervisorConfig, TaskSupervisor};
//!
//! let supervisor = TaskSupervisor::new(SupervisorConfig::default());
//! let id = supervisor
//!     .spawn_agent(SpawnParams::new("reviewer", "Review the diff", unit))
//!     .await?;
//! let status = supervisor.wait(&id).await;
//! ```

mod manager;
mod types;

pub use manager::TaskSupervisor;
pub use types::{
    ExecutionUnit, GateKeying, LoopOutcome, RunContext, SpawnParams, SupervisorConfig, TaskId,
    TaskInfo, TaskStatus, DEFAULT_BUCKET, DEFAULT_MAX_CONCURRENT,
};
