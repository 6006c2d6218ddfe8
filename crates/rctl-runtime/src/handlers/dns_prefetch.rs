#![forbid(unsafe_code)]

//! Host-name prefetch batching.
//!
//! Pages mention host names long before they navigate to them. Names are
//! collected here, briefly debounced, and handed to the parent in batches
//! so it can resolve them ahead of time.
//!
//! # Failure Modes
//!
//! | Input | Behavior |
//! |-------|----------|
//! | Empty or malformed host name | Ignored |
//! | IP literal | Ignored, nothing to resolve |
//! | Name already queued or sent | Ignored until the memory fills up |

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::time::Duration;

use rctl_core::HostMsg;

use crate::channel::ControlChannel;
use crate::task_runner::{Task, TaskRunner};

/// Names remembered for de-duplication before the memory is reset.
const MAX_REMEMBERED: usize = 2048;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug)]
pub struct DnsPrefetcher {
    queue: VecDeque<String>,
    seen: HashSet<String>,
    submit_scheduled: bool,
    delay: Duration,
    batch_limit: usize,
}

impl DnsPrefetcher {
    #[must_use]
    pub fn new(delay: Duration, batch_limit: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            submit_scheduled: false,
            delay,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Names waiting for the next submission.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queue `name` for prefetch. Returns `true` if it was accepted.
    pub fn resolve(&mut self, name: &str, runner: &TaskRunner) -> bool {
        let Some(host) = normalize(name) else {
            tracing::trace!(host = name, "not a resolvable host name");
            return false;
        };
        if self.seen.contains(&host) {
            return false;
        }
        if self.seen.len() >= MAX_REMEMBERED {
            self.seen.clear();
        }
        self.seen.insert(host.clone());
        self.queue.push_back(host);
        if !self.submit_scheduled {
            self.submit_scheduled = true;
            runner.post_delayed(Task::SubmitDnsPrefetch, self.delay);
        }
        true
    }

    /// Send one batch. Anything left over is scheduled for another round.
    pub fn submit(&mut self, channel: &ControlChannel, runner: &TaskRunner) {
        self.submit_scheduled = false;
        if self.queue.is_empty() {
            return;
        }
        let take = self.queue.len().min(self.batch_limit);
        let batch: Vec<String> = self.queue.drain(..take).collect();
        tracing::debug!(names = batch.len(), left = self.queue.len(), "dns prefetch batch");
        channel.send(HostMsg::DnsPrefetch(batch));
        if !self.queue.is_empty() {
            self.submit_scheduled = true;
            runner.post_delayed(Task::SubmitDnsPrefetch, self.delay);
        }
    }
}

/// Lower-case, trim a trailing dot, and reject anything that is not a
/// plausible DNS name.
fn normalize(name: &str) -> Option<String> {
    let host = name.trim().trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() || host.len() > MAX_NAME_LEN {
        return None;
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return None;
    }
    let labels_ok = host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    });
    labels_ok.then_some(host)
}
