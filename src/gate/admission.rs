// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-key admission control with FIFO wait queues.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::types::{GateConfig, GateStatus};
use crate::error::GateError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::{names, GLOBAL_METRICS};
#[cfg(feature = "telemetry")]
use std::time::Instant;

/// Bounds the number of simultaneous holders per resource key.
///
/// Cloning is cheap; clones share the same counters and queues.
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    config: GateConfig,
    state: Mutex<GateState>,
}

#[derive(Default)]
struct GateState {
    active: HashMap<String, usize>,
    queues: HashMap<String, VecDeque<Waiter>>,
    next_waiter: u64,
    destroyed: bool,
}

struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

impl GateState {
    /// Give the freed slot to the oldest live waiter, keeping `active`
    /// unchanged. Returns false when nobody was waiting.
    fn hand_off(&mut self, key: &str) -> bool {
        let Some(queue) = self.queues.get_mut(key) else {
            return false;
        };

        let mut handed = false;
        while let Some(waiter) = queue.pop_front() {
            // A closed receiver means the waiter gave up; try the next one.
            if waiter.grant.send(()).is_ok() {
                trace!(key, waiter = waiter.id, "Handed gate slot to waiter");
                handed = true;
                break;
            }
        }

        if queue.is_empty() {
            self.queues.remove(key);
        }
        handed
    }

    /// Returns false if there was no slot to release.
    fn release(&mut self, key: &str) -> bool {
        if self.destroyed {
            return true;
        }
        match self.active.get(key).copied() {
            None | Some(0) => return false,
            Some(_) => {}
        }
        if self.hand_off(key) {
            return true;
        }
        match self.active.get_mut(key) {
            Some(count) if *count > 1 => *count -= 1,
            _ => {
                self.active.remove(key);
            }
        }
        true
    }

    fn dequeue(&mut self, key: &str, id: u64) -> bool {
        let Some(queue) = self.queues.get_mut(key) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|w| w.id == id) else {
            return false;
        };
        queue.remove(pos);
        if queue.is_empty() {
            self.queues.remove(key);
        }
        true
    }
}

impl ConcurrencyGate {
    /// Create a gate with the given limits.
    pub fn new(config: GateConfig) -> Self {
        Self {
            inner: Arc::new(GateInner {
                config,
                state: Mutex::new(GateState::default()),
            }),
        }
    }

    /// Create a gate where every key shares the same limit.
    pub fn with_default_limit(limit: usize) -> Self {
        Self::new(GateConfig::new(limit))
    }

    /// The gate's configuration.
    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// Effective limit for `key`.
    pub fn limit_for(&self, key: &str) -> usize {
        self.inner.config.limit_for(key)
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock is still safe to use.
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire a slot for `key`, waiting in FIFO order if the key is at its
    /// limit.
    ///
    /// The returned permit releases the slot when dropped. Dropping the
    /// future while it waits removes the waiter from the queue; if a slot
    /// had already been handed to it, the slot moves on to the next waiter.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Destroyed`] if the gate is destroyed before or
    /// while waiting.
    pub async fn acquire(&self, key: &str) -> Result<GatePermit, GateError> {
        let limit = self.limit_for(key);

        let (id, rx) = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(GateError::Destroyed);
            }

            let active = state.active.get(key).copied().unwrap_or(0);
            if active < limit {
                state.active.insert(key.to_string(), active + 1);
                trace!(key, active = active + 1, limit, "Gate slot granted");
                #[cfg(feature = "telemetry")]
                GLOBAL_METRICS.increment(names::GATE_IMMEDIATE);
                return Ok(GatePermit::new(self.clone(), key));
            }

            if limit == 0 {
                warn!(key, "Gate limit is 0; this acquire can never be granted");
            }

            let id = state.next_waiter;
            state.next_waiter += 1;
            let (tx, rx) = oneshot::channel();
            let queue = state.queues.entry(key.to_string()).or_default();
            queue.push_back(Waiter { id, grant: tx });
            debug!(key, waiter = id, queued = queue.len(), limit, "Gate at capacity, waiting");
            (id, rx)
        };

        #[cfg(feature = "telemetry")]
        let start = Instant::now();
        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.increment(names::GATE_QUEUED);

        let mut waiter = QueuedWaiter {
            gate: self,
            key,
            id,
            rx,
            settled: false,
        };
        let granted = (&mut waiter.rx).await;
        waiter.settled = true;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(names::GATE_WAIT, start.elapsed());

        match granted {
            Ok(()) => Ok(GatePermit::new(self.clone(), key)),
            // The sender only disappears without sending when the gate is
            // torn down.
            Err(_) => Err(GateError::Destroyed),
        }
    }

    /// Release a slot detached with [`GatePermit::detach`].
    ///
    /// If waiters are queued for `key`, the slot passes directly to the
    /// oldest one. A release with no matching acquire is logged and ignored.
    pub fn release(&self, key: &str) {
        if !self.lock().release(key) {
            warn!(key, "Gate release without a matching acquire");
        }
    }

    /// Snapshot of current occupancy.
    pub fn status(&self) -> GateStatus {
        let state = self.lock();
        let active: std::collections::BTreeMap<String, usize> = state
            .active
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let queued_by_key: std::collections::BTreeMap<String, usize> = state
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(k, q)| (k.clone(), q.len()))
            .collect();

        GateStatus {
            total_active: active.values().sum(),
            queued: queued_by_key.values().sum(),
            active,
            queued_by_key,
        }
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    /// Tear the gate down.
    ///
    /// Clears all counters and queues. Every queued waiter is rejected with
    /// [`GateError::Destroyed`], as is every later `acquire`. Permits still
    /// held become inert.
    pub fn destroy(&self) {
        let mut state = self.lock();
        let rejected: usize = state.queues.values().map(VecDeque::len).sum();
        state.destroyed = true;
        state.active.clear();
        // Dropping the senders wakes every waiter with an error.
        state.queues.clear();
        debug!(rejected, "Concurrency gate destroyed");
    }
}

impl std::fmt::Debug for ConcurrencyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyGate")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

/// A queued acquire. Cleans up after itself if the acquire is abandoned.
struct QueuedWaiter<'a> {
    gate: &'a ConcurrencyGate,
    key: &'a str,
    id: u64,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.gate.lock();
        if state.dequeue(self.key, self.id) {
            trace!(key = self.key, waiter = self.id, "Abandoned gate waiter removed");
            return;
        }
        // Already popped: the slot was handed to us, pass it on.
        if self.rx.try_recv().is_ok() {
            state.release(self.key);
        }
    }
}

/// A held gate slot, released on drop.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit {
    gate: ConcurrencyGate,
    key: String,
    released: bool,
}

impl GatePermit {
    fn new(gate: ConcurrencyGate, key: &str) -> Self {
        Self {
            gate,
            key: key.to_string(),
            released: false,
        }
    }

    /// The key this permit occupies.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the slot now.
    pub fn release(mut self) {
        self.release_slot();
    }

    /// Stop tracking the slot without releasing it. The caller becomes
    /// responsible for calling [`ConcurrencyGate::release`] with the
    /// returned key.
    pub fn detach(mut self) -> String {
        self.released = true;
        std::mem::take(&mut self.key)
    }

    fn release_slot(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.gate.lock().release(&self.key);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.release_slot();
    }
}

impl std::fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePermit").field("key", &self.key).finish()
    }
}
