// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conductor - the concurrency core of an agent runtime.
//!
//! Decides *when* and *whether* agent work may run, how its lifecycle is
//! observed, how extensions intercept it, and how replies from an external
//! tool server are matched to requests. What an agent actually does is up
//! to the runtime that embeds this crate.
//!
//! # Architecture
//!
//! Four independent primitives, combined by the embedding runtime:
//!
//! - [`gate`] - Per-key admission control with FIFO queueing
//! - [`rpc`] - `Content-Length` framed JSON-RPC client over a byte stream
//! - [`hooks`] - Priority-ordered, fault-isolated lifecycle hooks
//! - [`supervisor`] - Background task lifecycle, admitted through a gate
//!
//! Supporting modules:
//!
//! - [`config`] - Configuration loading and merging
//! - [`error`] - Error types and result aliases
//! - [`telemetry`] - Tracing and metrics infrastructure
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::config::{load_config, CliOptions};
//! use conductor::supervisor::TaskSupervisor;
//! use conductor::hooks::HookDispatcher;
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let supervisor = TaskSupervisor::new(config.supervisor.clone());
//! let hooks = HookDispatcher::with_config(&config.hooks);
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod hooks;
pub mod rpc;
pub mod supervisor;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use error::{ConfigError, GateError, Result, RpcError, SupervisorError};
pub use gate::{ConcurrencyGate, GateConfig, GatePermit, GateStatus};
pub use hooks::{HookContext, HookDispatcher, HookHandler, HookOutcome, HookReport};
pub use rpc::{RpcChannel, RpcConfig};
pub use supervisor::{
    ExecutionUnit, LoopOutcome, RunContext, SpawnParams, SupervisorConfig, TaskId, TaskInfo,
    TaskStatus, TaskSupervisor,
};

/// Conductor version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
