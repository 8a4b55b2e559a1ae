// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-key admission control.
//!
//! A [`ConcurrencyGate`] bounds how many operations may run at once for each
//! resource key (usually a provider name). Callers past the limit are queued
//! and granted strictly in arrival order as slots free up.
//!
//! ```text
//!  acquire("anthropic")          limit = 2
//!  ┌──────────┐   active < limit  ┌──────────────────┐
//!  │  caller  │ ────────────────▶ │ active: 1 -> 2   │ ─▶ GatePermit
//!  └──────────┘                   └──────────────────┘
//!        │ active == limit
//!        ▼
//!  ┌────────────────────────┐   permit dropped   ┌───────────────────┐
//!  │ FIFO queue [w1, w2, …] │ ◀───────────────── │ hand slot to w1   │
//!  └────────────────────────┘                    └───────────────────┘
//! ```
//!
//! A released slot is handed straight to the head waiter inside the same
//! critical section, so no third caller can slip in between the release and
//! the grant.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::gate::{ConcurrencyGate, GateConfig};
//!
//! let gate = ConcurrencyGate::new(GateConfig::new(2).with_limit("ollama", 1));
//! let permit = gate.acquire("ollama").await?;
//! // ... call the provider ...
//! drop(permit);
//! ```

mod admission;
mod types;

pub use admission::{ConcurrencyGate, GatePermit};
pub use types::{GateConfig, GateStatus, DEFAULT_GATE_LIMIT};
