#![forbid(unsafe_code)]

//! Debounced cache usage reports.
//!
//! Any number of report requests inside one window collapse into a single
//! [`HostMsg::UpdatedCacheStats`], sent when the window closes with the
//! statistics as they are *then*. The window opens on the first request
//! after the previous report went out.

use std::time::Duration;

use rctl_core::{Engine, HostMsg};

use crate::channel::ControlChannel;
use crate::task_runner::{Task, TaskRunner};

#[derive(Debug, Clone)]
pub struct CacheStatsReporter {
    pending: bool,
    delay: Duration,
}

impl CacheStatsReporter {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: false,
            delay,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Ask for a report. Returns `true` if this request opened a new window.
    pub fn request_report_soon(&mut self, runner: &TaskRunner) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        runner.post_delayed(Task::InformHostOfCacheStats, self.delay);
        true
    }

    /// Close the window: read usage from `engine` and send it upstream.
    pub fn perform_report(&mut self, engine: &dyn Engine, channel: &ControlChannel) {
        let stats = engine.usage_stats();
        tracing::debug!(
            capacity = stats.capacity,
            live = stats.live_size,
            dead = stats.dead_size,
            "reporting cache usage"
        );
        channel.send(HostMsg::UpdatedCacheStats(stats));
        self.pending = false;
    }
}
