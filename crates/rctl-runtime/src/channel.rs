#![forbid(unsafe_code)]

//! The renderer's end of the control channel.
//!
//! Outbound traffic goes through an `mpsc` sender to the parent process.
//! Inbound traffic is offered to an ordered list of [`MessageFilter`]s before
//! the control thread dispatches it. A filter that returns `true` consumes
//! the message and later filters never see it.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Parent hung up | `send` logs at `warn` and drops the message |
//! | Send after `close` | Same as above |
//! | Removing an unknown filter | Returns `false`, nothing else happens |

use std::sync::mpsc;

use rctl_core::{ControlMsg, HostMsg};

/// Interceptor that sees inbound messages before generic dispatch.
pub trait MessageFilter {
    /// Stable name used for removal and logs.
    fn name(&self) -> &'static str;

    /// Called once when the filter joins the channel.
    fn on_filter_added(&mut self) {}

    /// Called once when the filter leaves the channel.
    fn on_filter_removed(&mut self) {}

    /// Return `true` to consume `msg`.
    fn on_message_received(&mut self, msg: &ControlMsg) -> bool;

    /// The channel to the parent process broke.
    fn on_channel_error(&mut self) {}
}

/// Outbound sender plus the inbound filter chain.
pub struct ControlChannel {
    sender: Option<mpsc::Sender<HostMsg>>,
    filters: Vec<Box<dyn MessageFilter>>,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("open", &self.sender.is_some())
            .field("filters", &self.filter_names())
            .finish()
    }
}

impl ControlChannel {
    #[must_use]
    pub fn new(sender: mpsc::Sender<HostMsg>) -> Self {
        Self {
            sender: Some(sender),
            filters: Vec::new(),
        }
    }

    /// Send `msg` to the parent process.
    pub fn send(&self, msg: HostMsg) {
        let kind = msg.type_name();
        match &self.sender {
            Some(sender) => {
                if sender.send(msg).is_err() {
                    tracing::warn!(msg = kind, "parent hung up; dropping outbound message");
                } else {
                    tracing::trace!(msg = kind, "sent");
                }
            }
            None => tracing::warn!(msg = kind, "channel closed; dropping outbound message"),
        }
    }

    /// Append a filter to the end of the chain.
    pub fn add_filter(&mut self, mut filter: Box<dyn MessageFilter>) {
        filter.on_filter_added();
        tracing::debug!(filter = filter.name(), "filter added");
        self.filters.push(filter);
    }

    /// Remove the first filter called `name`.
    pub fn remove_filter(&mut self, name: &str) -> bool {
        let Some(idx) = self.filters.iter().position(|f| f.name() == name) else {
            return false;
        };
        let mut filter = self.filters.remove(idx);
        filter.on_filter_removed();
        tracing::debug!(filter = name, "filter removed");
        true
    }

    /// Offer `msg` to each filter in order. Returns `true` if one consumed it.
    pub fn filter_incoming(&mut self, msg: &ControlMsg) -> bool {
        for filter in &mut self.filters {
            if filter.on_message_received(msg) {
                tracing::trace!(filter = filter.name(), msg = msg.kind().name(), "consumed by filter");
                return true;
            }
        }
        false
    }

    /// Tell every filter, in order, that the channel broke.
    pub fn notify_channel_error(&mut self) {
        for filter in &mut self.filters {
            filter.on_channel_error();
        }
    }

    /// Drop the outbound sender. Later sends are logged and discarded.
    pub fn close(&mut self) {
        self.sender = None;
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.sender.is_some()
    }

    #[must_use]
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Probe {
        name: &'static str,
        consume: bool,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl MessageFilter for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_filter_removed(&mut self) {
            self.log.borrow_mut().push(format!("{}:removed", self.name));
        }

        fn on_message_received(&mut self, _msg: &ControlMsg) -> bool {
            self.log.borrow_mut().push(format!("{}:seen", self.name));
            self.consume
        }

        fn on_channel_error(&mut self) {
            self.log.borrow_mut().push(format!("{}:error", self.name));
        }
    }

    fn channel_with(filters: &[(&'static str, bool)]) -> (ControlChannel, Rc<RefCell<Vec<String>>>) {
        let (tx, _rx) = mpsc::channel();
        let mut channel = ControlChannel::new(tx);
        let log = Rc::new(RefCell::new(Vec::new()));
        for &(name, consume) in filters {
            channel.add_filter(Box::new(Probe {
                name,
                consume,
                log: Rc::clone(&log),
            }));
        }
        (channel, log)
    }

    #[test]
    fn first_consumer_wins() {
        let (mut channel, log) = channel_with(&[("a", false), ("b", true), ("c", true)]);
        assert!(channel.filter_incoming(&ControlMsg::VisitedLinkReset));
        assert_eq!(*log.borrow(), vec!["a:seen", "b:seen"]);
    }

    #[test]
    fn unconsumed_message_passes_through() {
        let (mut channel, _log) = channel_with(&[("a", false)]);
        assert!(!channel.filter_incoming(&ControlMsg::VisitedLinkReset));
    }

    #[test]
    fn channel_error_reaches_every_filter() {
        let (mut channel, log) = channel_with(&[("a", true), ("b", false)]);
        channel.notify_channel_error();
        assert_eq!(*log.borrow(), vec!["a:error", "b:error"]);
    }

    #[test]
    fn remove_filter_by_name() {
        let (mut channel, log) = channel_with(&[("a", false), ("b", false)]);
        assert!(channel.remove_filter("a"));
        assert!(!channel.remove_filter("a"));
        assert_eq!(channel.filter_names(), vec!["b"]);
        assert_eq!(*log.borrow(), vec!["a:removed"]);
    }

    #[test]
    fn send_after_close_is_dropped() {
        let (tx, rx) = mpsc::channel();
        let mut channel = ControlChannel::new(tx);
        channel.send(HostMsg::CloseIdleConnections);
        channel.close();
        channel.send(HostMsg::SetCacheMode(true));
        assert!(!channel.is_open());
        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received, vec![HostMsg::CloseIdleConnections]);
    }
}
