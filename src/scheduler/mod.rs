//! Universal Scheduler: cooperative, single-executor, round-robin fair
//! dispatch across a registry of named [`TypedQueue`] lanes.
//!
//! At most one task is ever in flight across all lanes — the scheduler's
//! own state transitions are synchronous; only the executor body and the
//! single coalesced wait timer suspend.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::queue::TypedQueue;

/// Error returned by a fallible [`Executor::execute`] call.
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// The callback the scheduler fire-and-forgets a task to.
///
/// A well-behaved implementation (the Queue Manager) always resolves its
/// own terminal signal (`mark_task_complete`/`mark_task_failed`) before
/// returning `Ok(())`. Returning `Err` is treated as an implementation bug
/// and triggers the safety-net failure path described in §7.
#[async_trait]
pub trait Executor<T>: Send + Sync {
    /// Run `task`, dispatched from lane `lane`.
    async fn execute(&self, task: T, lane: &str) -> std::result::Result<(), ExecutorError>;
}

/// Errors raised by scheduler bookkeeping operations. Distinct from the
/// crate's domain [`crate::error::Error`] taxonomy: the scheduler itself
/// raises no domain errors, only structural ones.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// `register_queue` was called twice for the same lane name.
    #[error("lane '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Point-in-time counters returned by [`UniversalScheduler::get_stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    /// Number of registered lanes.
    pub lane_count: usize,
    /// Whether an executor call is currently in flight.
    pub executor_busy: bool,
    /// Total tasks queued across all lanes (excluding any in-flight task).
    pub total_queued: usize,
}

struct Inner<T> {
    lanes: Vec<(String, TypedQueue<T>)>,
    lane_index: HashMap<String, usize>,
    executor_busy: bool,
    round_robin_cursor: usize,
    stopped: bool,
}

impl<T> Inner<T> {
    fn new() -> Self {
        Self {
            lanes: Vec::new(),
            lane_index: HashMap::new(),
            executor_busy: false,
            round_robin_cursor: 0,
            stopped: false,
        }
    }
}

/// Optional hook invoked when the scheduler goes idle waiting for the
/// next feasible lane, fired only if the wait strictly exceeds one second.
pub type OnWait = Arc<dyn Fn(&str, u64, DateTime<Utc>) + Send + Sync>;

/// Owns every lane's [`TypedQueue`] and serializes dispatch across them.
///
/// Construct with [`UniversalScheduler::new`], which returns an `Arc` since
/// the scheduler hands copies of itself to spawned completion tasks.
pub struct UniversalScheduler<T> {
    inner: Mutex<Inner<T>>,
    timer: Mutex<Option<CancellationToken>>,
    executor: Arc<dyn Executor<T>>,
    on_wait: Option<OnWait>,
    weak_self: Weak<Self>,
}

impl<T> UniversalScheduler<T>
where
    T: Send + 'static,
{
    /// Build a new scheduler bound to `executor`, with an optional
    /// `on_wait` hook.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor<T>>, on_wait: Option<OnWait>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            inner: Mutex::new(Inner::new()),
            timer: Mutex::new(None),
            executor,
            on_wait,
            weak_self: weak_self.clone(),
        })
    }

    /// Register a new lane with its default cooldown. Fails if `name` is
    /// already registered — this operation is rejected, not idempotent.
    pub async fn register_queue(
        &self,
        name: impl Into<String>,
        default_cooldown: Duration,
    ) -> std::result::Result<(), SchedulerError> {
        let name = name.into();
        let mut inner = self.inner.lock().await;
        if inner.lane_index.contains_key(&name) {
            return Err(SchedulerError::AlreadyRegistered(name));
        }
        let idx = inner.lanes.len();
        inner.lanes.push((name.clone(), TypedQueue::new(default_cooldown)));
        inner.lane_index.insert(name, idx);
        Ok(())
    }

    /// Whether `name` has already been registered.
    pub async fn has_queue(&self, name: &str) -> bool {
        self.inner.lock().await.lane_index.contains_key(name)
    }

    /// Enqueue `task` to the tail of `lane`, then attempt to schedule.
    pub async fn add_task(&self, lane: &str, task: T, delay: Duration) {
        {
            let mut inner = self.inner.lock().await;
            if let Some(&idx) = inner.lane_index.get(lane) {
                inner.lanes[idx].1.add(task, delay);
            }
        }
        self.schedule_next().await;
    }

    /// Enqueue `task` at the head of `lane` (the retry/priority path),
    /// then attempt to schedule.
    pub async fn add_priority_task(&self, lane: &str, task: T, delay: Duration) {
        {
            let mut inner = self.inner.lock().await;
            if let Some(&idx) = inner.lane_index.get(lane) {
                inner.lanes[idx].1.add_first(task, delay);
            }
        }
        self.schedule_next().await;
    }

    /// Report the in-flight task on `lane` as successfully completed.
    /// `cooldown`, if omitted, falls back to the lane's default.
    pub async fn mark_task_complete(&self, lane: &str, cooldown: Option<Duration>) {
        self.mark_terminal(lane, cooldown, true).await;
    }

    /// Report the in-flight task on `lane` as failed.
    /// `cooldown`, if omitted, falls back to the lane's default.
    pub async fn mark_task_failed(&self, lane: &str, cooldown: Option<Duration>) {
        self.mark_terminal(lane, cooldown, false).await;
    }

    async fn mark_terminal(&self, lane: &str, cooldown: Option<Duration>, success: bool) {
        {
            let mut inner = self.inner.lock().await;
            if let Some(&idx) = inner.lane_index.get(lane) {
                let cooldown = cooldown.unwrap_or_else(|| inner.lanes[idx].1.default_cooldown());
                if success {
                    inner.lanes[idx].1.mark_completed(cooldown);
                } else {
                    inner.lanes[idx].1.mark_failed(cooldown);
                }
            }
            inner.executor_busy = false;
        }
        self.schedule_next().await;
    }

    /// Stop dispatching new tasks. Does not interrupt an in-flight
    /// executor call.
    pub async fn stop(&self) {
        self.inner.lock().await.stopped = true;
        self.cancel_timer().await;
    }

    /// Resume dispatching and immediately attempt to schedule.
    pub async fn resume(&self) {
        self.inner.lock().await.stopped = false;
        self.schedule_next().await;
    }

    /// Empty every lane's queue without touching cooldowns.
    pub async fn clear_queues(&self) {
        let mut inner = self.inner.lock().await;
        for (_, queue) in &mut inner.lanes {
            queue.clear();
        }
    }

    /// Empty every lane's queue and clear cooldowns/execution flags, then
    /// attempt to schedule. Used by the "force immediate" operator action.
    pub async fn reset_queues(&self) {
        {
            let mut inner = self.inner.lock().await;
            for (_, queue) in &mut inner.lanes {
                queue.reset();
            }
        }
        self.schedule_next().await;
    }

    /// Whether any lane currently holds a queued task.
    pub async fn has_pending_tasks(&self) -> bool {
        self.inner.lock().await.lanes.iter().any(|(_, q)| !q.is_empty())
    }

    /// Whether an executor call is currently in flight.
    pub async fn is_executor_busy(&self) -> bool {
        self.inner.lock().await.executor_busy
    }

    /// Replace `lane`'s registered default cooldown, e.g. after a
    /// configuration reload. A no-op if `lane` isn't registered.
    pub async fn set_default_cooldown(&self, lane: &str, cooldown: Duration) {
        let mut inner = self.inner.lock().await;
        if let Some(&idx) = inner.lane_index.get(lane) {
            inner.lanes[idx].1.set_default_cooldown(cooldown);
        }
    }

    /// Snapshot counters across all lanes.
    pub async fn get_stats(&self) -> SchedulerStats {
        let inner = self.inner.lock().await;
        SchedulerStats {
            lane_count: inner.lanes.len(),
            executor_busy: inner.executor_busy,
            total_queued: inner.lanes.iter().map(|(_, q)| q.len()).sum(),
        }
    }

    /// Re-entrant scheduling pass. Called after every state change:
    /// construction, `add_task`/`add_priority_task`, `mark_task_*`,
    /// `resume`, `reset_queues`, and the wait timer's own fire.
    pub async fn schedule_next(&self) {
        self.cancel_timer().await;

        let now = Instant::now();
        let dispatch = {
            let mut inner = self.inner.lock().await;
            if inner.stopped || inner.executor_busy {
                return;
            }
            Self::try_schedule(&mut inner, now)
        };

        match dispatch {
            Some((lane, task)) => self.spawn_executor(lane, task),
            None => self.arm_wait_timer().await,
        }
    }

    /// Round-robin scan starting at `round_robin_cursor`: pop and mark
    /// started the first lane whose head task is eligible.
    fn try_schedule(inner: &mut Inner<T>, now: Instant) -> Option<(String, T)> {
        let n = inner.lanes.len();
        if n == 0 {
            return None;
        }
        for offset in 0..n {
            let idx = (inner.round_robin_cursor + offset) % n;
            if inner.lanes[idx].1.can_start(now) {
                let task = inner.lanes[idx].1.get_next()?;
                inner.lanes[idx].1.mark_started();
                inner.round_robin_cursor = (idx + 1) % n;
                inner.executor_busy = true;
                return Some((inner.lanes[idx].0.clone(), task));
            }
        }
        None
    }

    fn spawn_executor(&self, lane: String, task: T) {
        let executor = self.executor.clone();
        let scheduler = self.weak_self.clone();
        tokio::spawn(async move {
            let result = executor.execute(task, &lane).await;
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.on_executor_finished(lane, result).await;
            }
        });
    }

    /// Safety net: if the executor future rejected without the Queue
    /// Manager having already resolved a terminal signal, resolve one now
    /// so `executor_busy` never gets stuck.
    async fn on_executor_finished(
        &self,
        lane: String,
        result: std::result::Result<(), ExecutorError>,
    ) {
        if let Err(err) = result {
            let still_executing = {
                let inner = self.inner.lock().await;
                inner
                    .lane_index
                    .get(&lane)
                    .map(|&idx| inner.lanes[idx].1.is_executing())
                    .unwrap_or(false)
            };
            if still_executing {
                tracing::error!(
                    lane = %lane,
                    error = %err,
                    "executor rejected without a terminal signal; applying safety-net failure"
                );
                self.mark_task_failed(&lane, None).await;
            }
        }
    }

    async fn cancel_timer(&self) {
        if let Some(token) = self.timer.lock().await.take() {
            token.cancel();
        }
    }

    /// Arm a single coalesced timer for the earliest feasible lane across
    /// all non-empty lanes. Fires `on_wait` only when the computed wait
    /// strictly exceeds one second.
    async fn arm_wait_timer(&self) {
        let earliest = {
            let inner = self.inner.lock().await;
            inner
                .lanes
                .iter()
                .filter(|(_, q)| !q.is_empty())
                .map(|(name, q)| (name.clone(), q.next_available_time()))
                .min_by_key(|(_, t)| *t)
        };
        let Some((lane, next_instant)) = earliest else {
            return;
        };

        let now = Instant::now();
        let wait = next_instant.saturating_duration_since(now);

        if wait.as_millis() > 1000 {
            if let Some(on_wait) = &self.on_wait {
                let next_time =
                    Utc::now() + chrono::Duration::from_std(wait).unwrap_or_default();
                on_wait(&lane, wait.as_millis() as u64, next_time);
            }
        }

        let token = CancellationToken::new();
        *self.timer.lock().await = Some(token.clone());
        let scheduler = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(wait) => {
                    if let Some(scheduler) = scheduler.upgrade() {
                        scheduler.schedule_next().await;
                    }
                }
                () = token.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex as TokioMutex;

    struct RecordingExecutor {
        calls: TokioMutex<Vec<(String, u32)>>,
        fail_first_n: AtomicUsize,
    }

    impl RecordingExecutor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: TokioMutex::new(Vec::new()),
                fail_first_n: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Executor<u32> for RecordingExecutor {
        async fn execute(&self, task: u32, lane: &str) -> std::result::Result<(), ExecutorError> {
            self.calls.lock().await.push((lane.to_string(), task));
            if self.fail_first_n.load(Ordering::SeqCst) > 0 {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
                return Err("synthetic failure".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn single_lane_dispatches_and_completes() {
        let exec = RecordingExecutor::new();
        let sched = UniversalScheduler::new(exec.clone(), None);
        sched
            .register_queue("a", Duration::from_millis(0))
            .await
            .unwrap();
        sched.add_task("a", 1, Duration::from_millis(0)).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(exec.calls.lock().await.as_slice(), &[("a".to_string(), 1)]);
    }

    #[tokio::test]
    async fn register_queue_twice_is_rejected() {
        let exec = RecordingExecutor::new();
        let sched = UniversalScheduler::new(exec, None);
        sched
            .register_queue("a", Duration::from_millis(0))
            .await
            .unwrap();
        let err = sched
            .register_queue("a", Duration::from_millis(0))
            .await
            .unwrap_err();
        assert_eq!(err, SchedulerError::AlreadyRegistered("a".to_string()));
    }

    #[tokio::test]
    async fn round_robin_serves_ready_lanes_in_turn() {
        let exec = RecordingExecutor::new();
        let sched = UniversalScheduler::new(exec.clone(), None);
        sched
            .register_queue("a", Duration::from_millis(0))
            .await
            .unwrap();
        sched
            .register_queue("b", Duration::from_millis(0))
            .await
            .unwrap();

        // Executor is fire-and-forget; since it resolves instantly here,
        // we just assert both lanes get served rather than pin exact
        // interleaving (which depends on scheduling latency).
        for i in 0..4 {
            sched.add_task("a", i, Duration::from_millis(0)).await;
            sched.add_task("b", i, Duration::from_millis(0)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = exec.calls.lock().await;
        let a_count = calls.iter().filter(|(l, _)| l == "a").count();
        let b_count = calls.iter().filter(|(l, _)| l == "b").count();
        assert_eq!(a_count, 4);
        assert_eq!(b_count, 4);
    }

    #[tokio::test]
    async fn executor_rejection_triggers_safety_net_failure() {
        let exec = RecordingExecutor::new();
        exec.fail_first_n.store(1, Ordering::SeqCst);
        let sched = UniversalScheduler::new(exec.clone(), None);
        sched
            .register_queue("a", Duration::from_millis(10))
            .await
            .unwrap();
        sched.add_task("a", 1, Duration::from_millis(0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // executor_busy must have been cleared by the safety net, not left
        // stuck, so a second task can still be dispatched.
        sched.add_task("a", 2, Duration::from_millis(0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = exec.calls.lock().await;
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn stop_prevents_new_dispatch_until_resume() {
        let exec = RecordingExecutor::new();
        let sched = UniversalScheduler::new(exec.clone(), None);
        sched
            .register_queue("a", Duration::from_millis(0))
            .await
            .unwrap();
        sched.stop().await;
        sched.add_task("a", 1, Duration::from_millis(0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(exec.calls.lock().await.is_empty());

        sched.resume().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(exec.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn set_default_cooldown_affects_subsequent_mark_complete() {
        let exec = RecordingExecutor::new();
        let sched = UniversalScheduler::new(exec.clone(), None);
        sched
            .register_queue("a", Duration::from_millis(0))
            .await
            .unwrap();
        sched.set_default_cooldown("a", Duration::from_secs(600)).await;
        sched.add_task("a", 1, Duration::from_millis(0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        sched.mark_task_complete("a", None).await;
        sched.add_task("a", 2, Duration::from_millis(0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(exec.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn reset_queues_clears_pending_tasks() {
        let exec = RecordingExecutor::new();
        let sched = UniversalScheduler::new(exec, None);
        sched
            .register_queue("a", Duration::from_secs(600))
            .await
            .unwrap();
        sched.add_task("a", 1, Duration::from_millis(0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        sched.add_task("a", 2, Duration::from_secs(600)).await;

        sched.reset_queues().await;
        assert!(!sched.has_pending_tasks().await);
    }
}
