// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry, tracing, and metrics infrastructure.
//!
//! - **Tracing**: Structured logging via `tracing`, configured once per
//!   process with [`init_telemetry`]. Logs go to stderr so the CLI can keep
//!   stdout for results.
//! - **Metrics**: Counters and timings for gate admissions, task outcomes,
//!   hook failures and RPC traffic, collected in [`GLOBAL_METRICS`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use conductor::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{Metrics, MetricsSnapshot, Timing, GLOBAL_METRICS};
