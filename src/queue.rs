//! Typed queue: a passive, single-lane FIFO with a cooldown floor.
//!
//! A `TypedQueue` does no I/O and starts no timers of its own; the
//! [`crate::scheduler::UniversalScheduler`] polls it with `canStart` and
//! drives its state transitions.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One queued entry: the task plus the earliest instant it may start.
#[derive(Debug, Clone)]
struct Entry<T> {
    task: T,
    earliest_start: Instant,
}

/// A single named lane's FIFO of tasks, cooldown floor, and execution flag.
#[derive(Debug)]
pub struct TypedQueue<T> {
    entries: VecDeque<Entry<T>>,
    is_executing: bool,
    next_available_at: Instant,
    default_cooldown: Duration,
}

impl<T> TypedQueue<T> {
    /// Create an empty queue with the given default cooldown, immediately
    /// available.
    #[must_use]
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            is_executing: false,
            next_available_at: Instant::now(),
            default_cooldown,
        }
    }

    /// Append `task` to the tail, eligible after `delay`.
    pub fn add(&mut self, task: T, delay: Duration) {
        self.entries.push_back(Entry {
            task,
            earliest_start: Instant::now() + delay,
        });
    }

    /// Prepend `task` to the head, eligible after `delay`. Used for retry
    /// successors so they are served before unrelated queued work.
    pub fn add_first(&mut self, task: T, delay: Duration) {
        self.entries.push_front(Entry {
            task,
            earliest_start: Instant::now() + delay,
        });
    }

    /// Look at the head task without removing it.
    pub fn peek_next(&self) -> Option<&T> {
        self.entries.front().map(|e| &e.task)
    }

    /// Pop and return the head task.
    pub fn get_next(&mut self) -> Option<T> {
        self.entries.pop_front().map(|e| e.task)
    }

    /// Whether this lane may start its head task right now.
    #[must_use]
    pub fn can_start(&self, now: Instant) -> bool {
        if self.is_executing || now < self.next_available_at {
            return false;
        }
        match self.entries.front() {
            Some(entry) => now >= entry.earliest_start,
            None => false,
        }
    }

    /// Mark this lane as having dispatched its head task to the executor.
    pub fn mark_started(&mut self) {
        debug_assert!(
            !self.is_executing,
            "mark_started called while already executing"
        );
        self.is_executing = true;
    }

    /// Mark the in-flight task as completed, entering cooldown.
    pub fn mark_completed(&mut self, cooldown: Duration) {
        self.is_executing = false;
        self.next_available_at = Instant::now() + cooldown;
    }

    /// Mark the in-flight task as failed, entering cooldown. Distinct
    /// from `mark_completed` only for caller-side bookkeeping; the queue
    /// itself treats both identically.
    pub fn mark_failed(&mut self, cooldown: Duration) {
        self.is_executing = false;
        self.next_available_at = Instant::now() + cooldown;
    }

    /// Drop all queued tasks. Does not touch the execution flag or
    /// cooldown.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop all queued tasks and clear the cooldown and execution flag,
    /// making the lane immediately available. Used by the operator's
    /// "force immediate" action.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.is_executing = false;
        self.next_available_at = Instant::now();
    }

    /// The instant this lane becomes available, accounting for both the
    /// cooldown floor and the head task's own delay.
    #[must_use]
    pub fn next_available_time(&self) -> Instant {
        match self.entries.front() {
            Some(entry) => self.next_available_at.max(entry.earliest_start),
            None => self.next_available_at,
        }
    }

    /// Whether this lane is currently driving an executor call.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.is_executing
    }

    /// Number of tasks currently queued (not counting an in-flight one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cooldown applied when no explicit value is given to
    /// `mark_completed`/`mark_failed` by the caller.
    #[must_use]
    pub fn default_cooldown(&self) -> Duration {
        self.default_cooldown
    }

    /// Replace the default cooldown, e.g. after a configuration reload.
    /// Does not touch `next_available_at`; an in-flight or already
    /// scheduled cooldown keeps running under the value it was set with.
    pub fn set_default_cooldown(&mut self, cooldown: Duration) {
        self.default_cooldown = cooldown;
    }
}
