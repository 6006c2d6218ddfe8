#![forbid(unsafe_code)]

//! Idle-resource reclamation.
//!
//! While every widget in the process is hidden nobody is looking at the
//! renderer, so the engine is periodically asked to give memory back. The
//! first notification goes out `floor(initial_delay)` seconds after the last
//! widget is hidden. Each "not finished" reply grows the delay with
//!
//! ```text
//! d' = d + 1 / (d + 2)
//! ```
//!
//! which damps the rate of notifications without ever stopping them. From
//! 1.0 the sequence runs 1.3333, 1.6333, 1.9086, 2.1644, ... and the whole
//! second delays are 1, 1, 1, 2, ...
//!
//! # State machine
//!
//! ```text
//!   Active ──(all hidden)──▶ ArmedIdle ──(fire)──▶ Notifying
//!     ▲                        ▲                     │
//!     │                        └──(not finished)─────┤
//!     │                                              ▼
//!     └──────────(restore / create)────────────── Quiescent
//! ```
//!
//! Restoring a widget never cancels a posted timer. Instead each arm edge
//! bumps a generation counter and the timer carries the generation it was
//! armed with; a timer that fires for an old generation, or while some
//! widget is visible, does nothing and posts nothing.
//!
//! # Invariants
//!
//! - `hidden_widget_count <= widget_count`, checked on every transition.
//! - At most one timer chain is live: the one for the current generation.

use std::time::Duration;

use rctl_core::Engine;

use crate::task_runner::{Task, TaskRunner};

/// Logical scheduler state. Informational; decisions use the counters and
/// the generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// Some widget is visible (or there are none).
    Active,
    /// All widgets hidden, a notification is scheduled.
    ArmedIdle,
    /// Inside an engine idle notification.
    Notifying,
    /// The engine reported nothing left to free.
    Quiescent,
}

/// Next idle delay after a "not finished" reply.
#[inline]
#[must_use]
pub fn next_delay(delay_s: f64) -> f64 {
    delay_s + 1.0 / (delay_s + 2.0)
}

/// Timer length for a fractional delay: whole seconds, rounded down.
#[inline]
#[must_use]
pub fn timer_for(delay_s: f64) -> Duration {
    Duration::from_secs(delay_s.floor().max(0.0) as u64)
}

#[derive(Debug, Clone)]
pub struct IdleScheduler {
    widget_count: u32,
    hidden_widget_count: u32,
    initial_delay_s: f64,
    idle_delay_s: f64,
    state: IdleState,
    generation: u64,
}

impl IdleScheduler {
    #[must_use]
    pub fn new(initial_delay_s: f64) -> Self {
        Self {
            widget_count: 0,
            hidden_widget_count: 0,
            initial_delay_s,
            idle_delay_s: initial_delay_s,
            state: IdleState::Active,
            generation: 0,
        }
    }

    #[must_use]
    pub fn widget_count(&self) -> u32 {
        self.widget_count
    }

    #[must_use]
    pub fn hidden_widget_count(&self) -> u32 {
        self.hidden_widget_count
    }

    /// Current idle delay in seconds.
    #[must_use]
    pub fn idle_delay(&self) -> f64 {
        self.idle_delay_s
    }

    #[must_use]
    pub fn state(&self) -> IdleState {
        self.state
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// At least one widget exists and none is visible.
    #[must_use]
    pub fn is_fully_hidden(&self) -> bool {
        self.widget_count > 0 && self.hidden_widget_count == self.widget_count
    }

    pub fn widget_created(&mut self) {
        self.widget_count += 1;
        self.state = IdleState::Active;
        self.check();
    }

    /// A widget went away. `was_hidden` says whether it was counted as
    /// hidden at the time.
    pub fn widget_destroyed(&mut self, was_hidden: bool) {
        assert!(self.widget_count > 0, "widget destroyed with none alive");
        if was_hidden {
            assert!(
                self.hidden_widget_count > 0,
                "hidden widget destroyed with none hidden"
            );
            self.hidden_widget_count -= 1;
        }
        self.widget_count -= 1;
        if !self.is_fully_hidden() {
            self.state = IdleState::Active;
        }
        self.check();
    }

    /// A widget was hidden. On the edge where every widget is hidden the
    /// delay is reset and the first notification is scheduled.
    pub fn widget_hidden(&mut self, runner: &TaskRunner) {
        assert!(
            self.hidden_widget_count < self.widget_count,
            "more widgets hidden ({}) than exist ({})",
            self.hidden_widget_count + 1,
            self.widget_count
        );
        self.hidden_widget_count += 1;
        self.check();
        if self.hidden_widget_count == self.widget_count {
            self.arm(runner);
        }
    }

    /// A hidden widget became visible again. Any scheduled notification
    /// stays queued and turns into a no-op when it fires.
    pub fn widget_restored(&mut self) {
        assert!(self.hidden_widget_count > 0, "widget restored with none hidden");
        self.hidden_widget_count -= 1;
        self.state = IdleState::Active;
        self.check();
    }

    /// Whether a timer armed with `generation` should still act.
    #[must_use]
    pub fn should_notify(&self, generation: u64) -> bool {
        generation == self.generation && self.is_fully_hidden()
    }

    /// Handle a timer for `generation` against an initialized engine.
    ///
    /// Returns `true` if the engine was notified.
    pub fn notify(&mut self, generation: u64, engine: &mut dyn Engine, runner: &TaskRunner) -> bool {
        if !self.should_notify(generation) {
            tracing::trace!(generation, current = self.generation, "stale idle timer");
            return false;
        }
        if engine.is_dead() {
            tracing::debug!("engine already torn down; skipping idle notification");
            return false;
        }

        self.state = IdleState::Notifying;
        let finished = engine.idle_notification();
        if finished {
            self.state = IdleState::Quiescent;
            tracing::debug!(delay_s = self.idle_delay_s, "engine idle work finished");
        } else {
            self.idle_delay_s = next_delay(self.idle_delay_s);
            self.state = IdleState::ArmedIdle;
            runner.post_delayed(Task::IdleHandler { generation }, timer_for(self.idle_delay_s));
            tracing::trace!(delay_s = self.idle_delay_s, "idle notification rescheduled");
        }
        true
    }

    fn arm(&mut self, runner: &TaskRunner) {
        self.idle_delay_s = self.initial_delay_s;
        self.generation += 1;
        self.state = IdleState::ArmedIdle;
        runner.post_delayed(
            Task::IdleHandler {
                generation: self.generation,
            },
            timer_for(self.idle_delay_s),
        );
        tracing::debug!(
            generation = self.generation,
            widgets = self.widget_count,
            "all widgets hidden; idle timer armed"
        );
    }

    fn check(&self) {
        assert!(
            self.hidden_widget_count <= self.widget_count,
            "hidden widget count {} exceeds widget count {}",
            self.hidden_widget_count,
            self.widget_count
        );
    }
}
