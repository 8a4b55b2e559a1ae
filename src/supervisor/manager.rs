// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background task supervisor.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{
    ExecutionUnit, RunContext, SpawnParams, SupervisorConfig, TaskId, TaskInfo,
    TaskStatus,
};
use crate::error::SupervisorError;
use crate::gate::{ConcurrencyGate, GateStatus};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::{names, GLOBAL_METRICS};
#[cfg(feature = "telemetry")]
use std::time::Instant;

struct TaskRecord {
    info: TaskInfo,
    unit: Arc<dyn ExecutionUnit>,
    cancel: CancellationToken,
    /// Flips to true once the driver has fully finished, permit included.
    settled: watch::Receiver<bool>,
}

struct SupervisorInner {
    config: SupervisorConfig,
    gate: ConcurrencyGate,
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
    destroyed: AtomicBool,
}

/// Spawns and tracks agent runs, admitting them through an internal
/// [`ConcurrencyGate`].
///
/// Task failures never cross the spawn boundary; they are recorded on the
/// task and read back through [`get_task_status`](Self::get_task_status)
/// and [`get_all_tasks`](Self::get_all_tasks). Cancellation is cooperative:
/// the supervisor calls [`ExecutionUnit::abort`] and keeps holding the gate
/// slot until the loop actually returns.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<SupervisorInner>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl TaskSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let gate = ConcurrencyGate::new(config.gate_config());
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                gate,
                tasks: Mutex::new(HashMap::new()),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Register a task and start driving it.
    ///
    /// In background mode this returns as soon as the task is registered.
    /// In foreground mode it returns once the task has settled. Either way
    /// the result is only the id; the outcome is read back via polling.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Destroyed`] after [`destroy`](Self::destroy).
    pub async fn spawn_agent(&self, params: SpawnParams) -> Result<TaskId, SupervisorError> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(SupervisorError::Destroyed);
        }

        let SpawnParams {
            agent,
            prompt,
            description,
            parent,
            parent_cancel,
            provider,
            unit,
            background,
        } = params;

        let id = TaskId::new();
        let gate_key = self.inner.config.gate_key(provider.as_deref());
        let cancel = parent_cancel
            .map(|token| token.child_token())
            .unwrap_or_default();
        let run_context = parent
            .as_ref()
            .map(RunContext::child)
            .unwrap_or_else(RunContext::root);
        let (settled_tx, settled_rx) = watch::channel(false);

        let info = TaskInfo {
            id: id.clone(),
            agent,
            description,
            prompt,
            status: TaskStatus::Pending,
            gate_key: gate_key.clone(),
            background,
            run_context,
            outcome: None,
            error: None,
            output: String::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        info!(task = %id, agent = %info.agent, key = %gate_key, background, "Spawning agent task");

        self.inner.lock().insert(
            id.clone(),
            TaskRecord {
                info,
                unit: Arc::clone(&unit),
                cancel: cancel.clone(),
                settled: settled_rx,
            },
        );
        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.increment(names::TASK_SPAWNED);

        let driver = Arc::clone(&self.inner).drive(id.clone(), gate_key, cancel, unit, settled_tx);
        let handle = tokio::spawn(driver);

        if !background {
            if let Err(e) = handle.await {
                warn!(task = %id, error = %e, "Task driver ended abnormally");
            }
        }
        Ok(id)
    }

    /// Current status, or `None` for an unknown id.
    pub fn get_task_status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.inner.lock().get(id).map(|record| record.info.status)
    }

    /// Text produced by the task: live while it runs, final once it has
    /// settled. `None` for an unknown id.
    pub fn get_task_output(&self, id: &TaskId) -> Option<String> {
        let unit = {
            let tasks = self.inner.lock();
            let record = tasks.get(id)?;
            match record.info.status {
                TaskStatus::Running => Arc::clone(&record.unit),
                _ => return Some(record.info.output.clone()),
            }
        };
        Some(unit.accumulated_text())
    }

    /// Snapshot of one task.
    pub fn get_task(&self, id: &TaskId) -> Option<TaskInfo> {
        self.inner.lock().get(id).map(|record| record.info.clone())
    }

    /// Snapshot of every tracked task, oldest first.
    pub fn get_all_tasks(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .inner
            .lock()
            .values()
            .map(|record| record.info.clone())
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// Cancel a task. Unknown ids and settled tasks are ignored.
    pub fn cancel_task(&self, id: &TaskId) {
        self.inner.cancel(id);
    }

    /// Wait until the task's driver has finished and return its final
    /// status. `None` for an unknown id.
    pub async fn wait(&self, id: &TaskId) -> Option<TaskStatus> {
        let mut settled = self.inner.lock().get(id)?.settled.clone();
        // An error means the driver is gone, which is also settled.
        let _ = settled.wait_for(|done| *done).await;
        self.get_task_status(id)
    }

    /// Occupancy of the internal gate.
    pub fn gate_status(&self) -> GateStatus {
        self.inner.gate.status()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Cancel every task and clear the registry.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<TaskId> = self.inner.lock().keys().cloned().collect();
        for id in &ids {
            self.inner.cancel(id);
        }
        self.inner.lock().clear();
        self.inner.gate.destroy();
        info!(tasks = ids.len(), "Task supervisor destroyed");
    }
}

impl std::fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("config", &self.inner.config)
            .field("tasks", &self.inner.lock().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl SupervisorInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, TaskRecord>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a status change if it is legal. Returns the status it replaced
    /// and the task's unit when the change happened.
    fn transition(
        &self,
        id: &TaskId,
        next: TaskStatus,
        update: impl FnOnce(&mut TaskInfo),
    ) -> Option<(TaskStatus, Arc<dyn ExecutionUnit>)> {
        let mut tasks = self.lock();
        let record = tasks.get_mut(id)?;
        let previous = record.info.status;
        if !previous.can_transition_to(next) {
            debug!(task = %id, from = %previous, to = %next, "Ignoring status change");
            return None;
        }

        record.info.status = next;
        let now = Utc::now();
        if next == TaskStatus::Running {
            record.info.started_at = Some(now);
        } else {
            record.info.finished_at = Some(now);
        }
        update(&mut record.info);
        if next == TaskStatus::Cancelled {
            record.cancel.cancel();
        }
        debug!(task = %id, from = %previous, to = %next, "Task status changed");
        Some((previous, Arc::clone(&record.unit)))
    }

    fn cancel(&self, id: &TaskId) {
        let Some((previous, unit)) = self.transition(id, TaskStatus::Cancelled, |_| {}) else {
            return;
        };
        let was_running = previous == TaskStatus::Running;
        if was_running {
            unit.abort();
        }
        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.increment(names::TASK_CANCELLED);
        info!(task = %id, was_running, "Task cancelled");
    }

    async fn drive(
        self: Arc<Self>,
        id: TaskId,
        key: String,
        cancel: CancellationToken,
        unit: Arc<dyn ExecutionUnit>,
        settled: watch::Sender<bool>,
    ) {
        self.run_task(&id, &key, &cancel, unit).await;
        let _ = settled.send(true);
    }

    async fn run_task(
        &self,
        id: &TaskId,
        key: &str,
        cancel: &CancellationToken,
        unit: Arc<dyn ExecutionUnit>,
    ) {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.cancel(id);
                return;
            }
            permit = self.gate.acquire(key) => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    self.transition(id, TaskStatus::Cancelled, |_| {});
                    debug!(task = %id, error = %e, "Task never admitted");
                    return;
                }
            },
        };

        if self.transition(id, TaskStatus::Running, |_| {}).is_none() {
            // Cancelled between the grant and now.
            return;
        }

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let run = AssertUnwindSafe(unit.run()).catch_unwind();
        tokio::pin!(run);

        let result = tokio::select! {
            biased;
            result = &mut run => Some(result),
            _ = cancel.cancelled() => None,
        };

        let result = match result {
            Some(result) => result,
            None => {
                self.cancel(id);
                // Let the loop wind down before giving up the slot.
                let _ = run.await;
                self.keep_cancelled_output(id, unit.accumulated_text());
                drop(permit);
                return;
            }
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(names::TASK_RUN, start.elapsed());

        let text = unit.accumulated_text();
        drop(permit);

        let settled = match result {
            Ok(Ok(outcome)) => {
                let applied = self.transition(id, TaskStatus::Completed, |info| {
                    info.outcome = Some(outcome);
                    info.output = text.clone();
                });
                if applied.is_some() {
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.increment(names::TASK_COMPLETED);
                    info!(task = %id, ?outcome, "Task completed");
                }
                applied.is_some()
            }
            Ok(Err(e)) => self.fail(id, format!("{:#}", e), &text),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.fail(id, format!("Execution unit panicked: {}", message), &text)
            }
        };

        // `cancel_task` aborted the loop and it returned before the token
        // branch was polled.
        if !settled {
            self.keep_cancelled_output(id, text);
        }
    }

    /// Returns whether the task moved to `error`.
    fn fail(&self, id: &TaskId, error: String, text: &str) -> bool {
        warn!(task = %id, %error, "Task failed");
        let applied = self.transition(id, TaskStatus::Error, |info| {
            info.error = Some(error);
            info.output = text.to_string();
        });
        if applied.is_some() {
            #[cfg(feature = "telemetry")]
            GLOBAL_METRICS.increment(names::TASK_ERROR);
        }
        applied.is_some()
    }

    /// Store the loop's final text on a task that was cancelled while it ran.
    fn keep_cancelled_output(&self, id: &TaskId, text: String) {
        if let Some(record) = self.lock().get_mut(id) {
            if record.info.status == TaskStatus::Cancelled {
                record.info.output = text;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::LoopOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Counters {
        running: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        /// Run until `finish` is notified or the unit is aborted.
        Block,
        Fail,
        Panic,
    }

    struct TestUnit {
        behavior: Behavior,
        counters: Arc<Counters>,
        finish: Notify,
        abort_signal: Notify,
        aborted: AtomicBool,
        text: Mutex<String>,
    }

    impl TestUnit {
        fn new(behavior: Behavior, counters: &Arc<Counters>) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                counters: Arc::clone(counters),
                finish: Notify::new(),
                abort_signal: Notify::new(),
                aborted: AtomicBool::new(false),
                text: Mutex::new(String::new()),
            })
        }

        /// A unit that completes as soon as it runs.
        fn done(counters: &Arc<Counters>) -> Arc<Self> {
            let unit = Self::new(Behavior::Block, counters);
            unit.finish.notify_one();
            unit
        }
    }

    #[async_trait]
    impl ExecutionUnit for TestUnit {
        async fn run(&self) -> anyhow::Result<LoopOutcome> {
            self.counters.started.fetch_add(1, Ordering::SeqCst);
            let now = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.peak.fetch_max(now, Ordering::SeqCst);
            self.text.lock().unwrap().push_str("partial");

            let result = match self.behavior {
                Behavior::Fail => Err(anyhow::anyhow!("model unavailable")),
                Behavior::Panic => panic!("loop bug"),
                Behavior::Block => {
                    tokio::select! {
                        _ = self.finish.notified() => {
                            self.text.lock().unwrap().push_str(" answer");
                            Ok(LoopOutcome::Completed)
                        }
                        _ = self.abort_signal.notified() => Ok(LoopOutcome::Aborted),
                    }
                }
            };
            self.counters.running.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn accumulated_text(&self) -> String {
            self.text.lock().unwrap().clone()
        }

        fn abort(&self) {
            self.aborted.store(true, Ordering::SeqCst);
            self.abort_signal.notify_one();
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn supervisor(max: usize) -> TaskSupervisor {
        TaskSupervisor::new(SupervisorConfig::default().with_max_concurrent(max))
    }

    #[tokio::test]
    async fn test_background_task_completes() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(3);
        let id = sup
            .spawn_agent(SpawnParams::new("coder", "fix it", TestUnit::done(&counters)))
            .await
            .unwrap();

        assert_eq!(sup.wait(&id).await, Some(TaskStatus::Completed));
        assert_eq!(sup.get_task_output(&id).as_deref(), Some("partial answer"));
        let info = sup.get_task(&id).unwrap();
        assert_eq!(info.outcome, Some(LoopOutcome::Completed));
        assert!(info.started_at.is_some() && info.finished_at.is_some());
        assert_eq!(sup.gate_status().total_active, 0);
    }

    #[tokio::test]
    async fn test_foreground_returns_after_settling() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(3);
        let id = sup
            .spawn_agent(SpawnParams::new("coder", "p", TestUnit::done(&counters)).foreground())
            .await
            .unwrap();
        assert_eq!(sup.get_task_status(&id), Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_raised() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(3);
        let id = sup
            .spawn_agent(SpawnParams::new("a", "p", TestUnit::new(Behavior::Fail, &counters)))
            .await
            .unwrap();

        assert_eq!(sup.wait(&id).await, Some(TaskStatus::Error));
        let info = sup.get_task(&id).unwrap();
        assert!(info.error.unwrap().contains("model unavailable"));
        assert_eq!(info.output, "partial");
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_error() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(1);
        let id = sup
            .spawn_agent(SpawnParams::new("a", "p", TestUnit::new(Behavior::Panic, &counters)))
            .await
            .unwrap();

        assert_eq!(sup.wait(&id).await, Some(TaskStatus::Error));
        assert!(sup.get_task(&id).unwrap().error.unwrap().contains("loop bug"));
        // The slot came back despite the panic.
        assert_eq!(sup.gate_status().total_active, 0);
    }

    #[tokio::test]
    async fn test_running_tasks_bounded_by_gate() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(2);
        let mut units = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let unit = TestUnit::new(Behavior::Block, &counters);
            ids.push(
                sup.spawn_agent(SpawnParams::new("a", "p", unit.clone()))
                    .await
                    .unwrap(),
            );
            units.push(unit);
        }

        wait_until(|| {
            counters.started.load(Ordering::SeqCst) == 2 && sup.gate_status().queued == 2
        })
        .await;
        let status = sup.gate_status();
        assert_eq!(status.active_for(DEFAULT_BUCKET_KEY), 2);
        assert_eq!(status.queued, 2);
        assert_eq!(sup.get_task_status(&ids[3]), Some(TaskStatus::Pending));

        for unit in &units {
            unit.finish.notify_one();
        }
        for id in &ids {
            assert_eq!(sup.wait(id).await, Some(TaskStatus::Completed));
        }
        assert_eq!(counters.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_pending_task_never_runs() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(1);
        let blocker = TestUnit::new(Behavior::Block, &counters);
        let first = sup
            .spawn_agent(SpawnParams::new("a", "p", blocker.clone()))
            .await
            .unwrap();
        wait_until(|| counters.started.load(Ordering::SeqCst) == 1).await;

        let queued = TestUnit::done(&counters);
        let second = sup
            .spawn_agent(SpawnParams::new("a", "p", queued.clone()))
            .await
            .unwrap();
        sup.cancel_task(&second);
        assert_eq!(sup.get_task_status(&second), Some(TaskStatus::Cancelled));
        assert_eq!(sup.wait(&second).await, Some(TaskStatus::Cancelled));

        blocker.finish.notify_one();
        assert_eq!(sup.wait(&first).await, Some(TaskStatus::Completed));
        assert_eq!(counters.started.load(Ordering::SeqCst), 1);
        assert!(!queued.aborted.load(Ordering::SeqCst));
        assert_eq!(sup.gate_status().queued, 0);
    }

    #[tokio::test]
    async fn test_cancel_running_task_aborts_unit() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(1);
        let unit = TestUnit::new(Behavior::Block, &counters);
        let id = sup
            .spawn_agent(SpawnParams::new("a", "p", unit.clone()))
            .await
            .unwrap();
        wait_until(|| sup.get_task_status(&id) == Some(TaskStatus::Running)).await;

        sup.cancel_task(&id);
        assert_eq!(sup.get_task_status(&id), Some(TaskStatus::Cancelled));
        assert!(unit.aborted.load(Ordering::SeqCst));

        // The loop returning afterwards doesn't revive the task.
        assert_eq!(sup.wait(&id).await, Some(TaskStatus::Cancelled));
        assert_eq!(sup.get_task(&id).unwrap().outcome, None);
        assert_eq!(sup.gate_status().total_active, 0);
        assert_eq!(sup.get_task_output(&id).as_deref(), Some("partial"));
    }

    #[tokio::test]
    async fn test_parent_cancellation_propagates() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(2);
        let parent = CancellationToken::new();
        let unit = TestUnit::new(Behavior::Block, &counters);
        let id = sup
            .spawn_agent(SpawnParams::new("a", "p", unit.clone()).parent_cancel(parent.clone()))
            .await
            .unwrap();
        wait_until(|| sup.get_task_status(&id) == Some(TaskStatus::Running)).await;

        parent.cancel();
        assert_eq!(sup.wait(&id).await, Some(TaskStatus::Cancelled));
        assert!(unit.aborted.load(Ordering::SeqCst));
        assert_eq!(sup.get_task_output(&id).as_deref(), Some("partial"));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let sup = supervisor(1);
        let unknown = TaskId::from("task_missing");
        sup.cancel_task(&unknown);
        assert_eq!(sup.get_task_status(&unknown), None);
        assert_eq!(sup.get_task_output(&unknown), None);
        assert_eq!(sup.wait(&unknown).await, None);
    }

    #[tokio::test]
    async fn test_run_context_is_nested_under_parent() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(1);
        let parent = RunContext::root();
        let id = sup
            .spawn_agent(SpawnParams::new("a", "p", TestUnit::done(&counters)).parent(parent.clone()))
            .await
            .unwrap();
        let info = sup.get_task(&id).unwrap();
        assert_eq!(info.run_context.parent_run_id, Some(parent.run_id));
        assert_eq!(info.run_context.depth, 1);
    }

    #[tokio::test]
    async fn test_destroy_cancels_everything() {
        let counters = Arc::new(Counters::default());
        let sup = supervisor(1);
        let running = TestUnit::new(Behavior::Block, &counters);
        sup.spawn_agent(SpawnParams::new("a", "p", running.clone()))
            .await
            .unwrap();
        sup.spawn_agent(SpawnParams::new("a", "p", TestUnit::done(&counters)))
            .await
            .unwrap();
        wait_until(|| counters.started.load(Ordering::SeqCst) == 1).await;

        sup.destroy();
        assert!(sup.get_all_tasks().is_empty());
        assert!(running.aborted.load(Ordering::SeqCst));

        let err = sup
            .spawn_agent(SpawnParams::new("a", "p", TestUnit::done(&counters)))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Destroyed));
    }

    const DEFAULT_BUCKET_KEY: &str = crate::supervisor::DEFAULT_BUCKET;
}
