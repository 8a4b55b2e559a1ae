// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Priority-ordered hook registry and executor.

use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::types::{HookContext, HookEntry, HookHandler, HookReport, DEFAULT_PRIORITY};
use super::HooksConfig;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::{names, GLOBAL_METRICS};

#[derive(Default)]
struct Registry {
    /// Entries per point, sorted by (priority, seq).
    points: BTreeMap<String, Vec<HookEntry>>,
    disabled: HashSet<String>,
}

/// Registry of hook handlers keyed by hook point.
///
/// Handlers at a point run sequentially in ascending priority; equal
/// priorities keep registration order. A failing or panicking handler is
/// logged and skipped. Enable/disable is keyed by name alone and applies
/// at every point the name is registered.
#[derive(Default)]
pub struct HookDispatcher {
    registry: RwLock<Registry>,
    next_seq: AtomicU64,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher with the configured names disabled up front.
    pub fn with_config(config: &HooksConfig) -> Self {
        let dispatcher = Self::new();
        for name in &config.disabled {
            dispatcher.disable(name);
        }
        dispatcher
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler` under `name` at `point`.
    ///
    /// An existing registration with the same point and name is replaced
    /// and moves to the back of its priority group.
    pub fn register(
        &self,
        point: impl Into<String>,
        name: impl Into<String>,
        handler: impl HookHandler + 'static,
        priority: Option<i32>,
        scope: Option<String>,
    ) {
        self.register_arc(point, name, Arc::new(handler), priority, scope);
    }

    /// Register a shared handler.
    pub fn register_arc(
        &self,
        point: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn HookHandler>,
        priority: Option<i32>,
        scope: Option<String>,
    ) {
        let point = point.into();
        let entry = HookEntry {
            name: name.into(),
            priority: priority.unwrap_or(DEFAULT_PRIORITY),
            scope,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            handler,
        };
        debug!(%point, name = %entry.name, priority = entry.priority, "Registering hook");

        let mut registry = self.write();
        let entries = registry.points.entry(point).or_default();
        entries.retain(|e| e.name != entry.name);
        entries.push(entry);
        // Stable, and seq is unique, so equal priorities keep insertion order.
        entries.sort_by_key(|e| (e.priority, e.seq));
    }

    /// Remove the registration `name` at `point`. Returns whether one existed.
    pub fn unregister(&self, point: &str, name: &str) -> bool {
        let mut registry = self.write();
        let Some(entries) = registry.points.get_mut(point) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.name != name);
        let removed = entries.len() != before;
        if entries.is_empty() {
            registry.points.remove(point);
        }
        if removed {
            debug!(point, name, "Unregistered hook");
        }
        removed
    }

    /// Remove every registration named `name`, at every point. Returns how
    /// many were removed.
    pub fn unregister_all(&self, name: &str) -> usize {
        let mut registry = self.write();
        let mut removed = 0;
        registry.points.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.name != name);
            removed += before - entries.len();
            !entries.is_empty()
        });
        debug!(name, removed, "Unregistered hook from all points");
        removed
    }

    pub fn enable(&self, name: &str) {
        if self.write().disabled.remove(name) {
            debug!(name, "Hook enabled");
        }
    }

    pub fn disable(&self, name: &str) {
        if self.write().disabled.insert(name.to_string()) {
            debug!(name, "Hook disabled");
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        !self.read().disabled.contains(name)
    }

    /// Run the enabled handlers registered at `point`.
    ///
    /// The set of handlers is snapshotted when the call starts; registry
    /// changes made by a handler apply to later executions. Handler errors
    /// never reach the caller; they are logged and listed in the report.
    pub async fn execute(
        &self,
        point: &str,
        input: &Value,
        output: &mut Value,
        context: &HookContext,
    ) -> HookReport {
        let handlers: Vec<(String, Arc<dyn HookHandler>)> = {
            let registry = self.read();
            registry
                .points
                .get(point)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|e| !registry.disabled.contains(&e.name))
                        .map(|e| (e.name.clone(), Arc::clone(&e.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut report = HookReport::default();
        for (name, handler) in handlers {
            trace!(point, hook = %name, run_id = %context.run_id, "Invoking hook");
            #[cfg(feature = "telemetry")]
            GLOBAL_METRICS.increment(names::HOOK_INVOKED);

            let result = AssertUnwindSafe(handler.call(input, output, context))
                .catch_unwind()
                .await;
            report.invoked.push(name.clone());

            match result {
                Ok(Ok(outcome)) if outcome.is_abort() => {
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.increment(names::HOOK_ABORTED);
                    debug!(point, hook = %name, "Hook aborted remaining handlers");
                    report.aborted_by = Some(name);
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.increment(names::HOOK_FAILED);
                    warn!(point, hook = %name, error = %e, "Hook failed");
                    report.failed.push(name);
                }
                Err(_) => {
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.increment(names::HOOK_FAILED);
                    warn!(point, hook = %name, "Hook panicked");
                    report.failed.push(name);
                }
            }
        }
        report
    }

    /// Names registered at `point`, in execution order: ascending priority,
    /// ties in registration order. This is the order `execute` will use, not
    /// raw insertion order; [`HookEntry::seq`] on [`get_entries`](Self::get_entries)
    /// exposes the latter. Disabled hooks are included.
    pub fn list_for_point(&self, point: &str) -> Vec<String> {
        self.read()
            .points
            .get(point)
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Full registration records at `point`, in execution order.
    pub fn get_entries(&self, point: &str) -> Vec<HookEntry> {
        self.read().points.get(point).cloned().unwrap_or_default()
    }

    /// Points that have at least one registration.
    pub fn points(&self) -> Vec<String> {
        self.read().points.keys().cloned().collect()
    }

    /// Remove every registration and re-enable every name.
    pub fn clear(&self) {
        let mut registry = self.write();
        registry.points.clear();
        registry.disabled.clear();
    }

    /// Total registrations across all points.
    pub fn size(&self) -> usize {
        self.read().points.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.read();
        f.debug_struct("HookDispatcher")
            .field("points", &registry.points)
            .field("disabled", &registry.disabled)
            .finish()
    }
}
