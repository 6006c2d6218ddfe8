#![forbid(unsafe_code)]

//! Cooperative delayed-task queue for the control thread.
//!
//! Tasks are plain values; the loop that owns the runner pops them when due
//! and hands them to [`ControlThread::run_task`](crate::ControlThread::run_task).
//! There is no cancellation. A task that is no longer wanted is still run
//! and must notice for itself that its precondition no longer holds.
//!
//! The runner keeps its own notion of "now". The real loop refreshes it
//! from the wall clock before each step; the simulator moves it by hand,
//! which makes every timing decision reproducible.
//!
//! # Invariants
//!
//! - Tasks fire in `(due, post order)` order.
//! - `now` never moves backwards.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Deferred work posted by the control thread to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Idle-reclamation timer for one arm generation.
    IdleHandler { generation: u64 },
    /// Debounced cache usage report.
    InformHostOfCacheStats,
    /// Flush queued DNS prefetch names.
    SubmitDnsPrefetch,
}

impl Task {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::IdleHandler { .. } => "IdleHandler",
            Self::InformHostOfCacheStats => "InformHostOfCacheStats",
            Self::SubmitDnsPrefetch => "SubmitDnsPrefetch",
        }
    }
}

#[derive(Debug)]
struct PendingTask {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for PendingTask {}

impl PartialOrd for PendingTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug)]
struct RunnerState {
    now: Instant,
    next_seq: u64,
    queue: BinaryHeap<Reverse<PendingTask>>,
}

/// Shared handle to the control thread's task queue.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    inner: Rc<RefCell<RunnerState>>,
}

impl TaskRunner {
    /// Create a runner whose clock starts at `now`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RunnerState {
                now,
                next_seq: 0,
                queue: BinaryHeap::new(),
            })),
        }
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.borrow().now
    }

    /// Move the clock forward. Earlier instants are ignored.
    pub fn set_now(&self, now: Instant) {
        let mut inner = self.inner.borrow_mut();
        if now > inner.now {
            inner.now = now;
        }
    }

    /// Run `task` once `delay` has elapsed.
    pub fn post_delayed(&self, task: Task, delay: Duration) {
        let mut inner = self.inner.borrow_mut();
        let due = inner.now + delay;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        tracing::trace!(task = task.name(), delay_ms = delay.as_millis() as u64, "task posted");
        inner.queue.push(Reverse(PendingTask { due, seq, task }));
    }

    /// Run `task` on the next loop turn.
    pub fn post(&self, task: Task) {
        self.post_delayed(task, Duration::ZERO);
    }

    /// When the earliest queued task is due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.borrow().queue.peek().map(|Reverse(p)| p.due)
    }

    /// Remove and return the earliest task if it is due.
    pub fn pop_due(&self) -> Option<Task> {
        let mut inner = self.inner.borrow_mut();
        let now = inner.now;
        match inner.queue.peek() {
            Some(Reverse(p)) if p.due <= now => inner.queue.pop().map(|Reverse(p)| p.task),
            _ => None,
        }
    }

    /// Number of queued tasks, due or not.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Queued tasks with the time left until each is due, earliest first.
    #[must_use]
    pub fn pending_tasks(&self) -> Vec<(Duration, Task)> {
        let inner = self.inner.borrow();
        let mut tasks: Vec<&PendingTask> = inner.queue.iter().map(|Reverse(p)| p).collect();
        tasks.sort();
        tasks
            .into_iter()
            .map(|p| (p.due.saturating_duration_since(inner.now), p.task))
            .collect()
    }

    /// Number of queued tasks matching `pred`.
    pub fn count_pending(&self, pred: impl Fn(&Task) -> bool) -> usize {
        self.inner
            .borrow()
            .queue
            .iter()
            .filter(|Reverse(p)| pred(&p.task))
            .count()
    }
}
