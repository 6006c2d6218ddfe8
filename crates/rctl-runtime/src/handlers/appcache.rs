#![forbid(unsafe_code)]

//! Application-cache host bookkeeping.
//!
//! The dispatcher gets first refusal on every inbound message. It consumes
//! application-cache traffic and lets everything else through untouched.

use std::collections::{BTreeMap, BTreeSet};

use rctl_core::{AppCacheEvent, AppCacheMsg, ControlMsg, HostMsg};

use crate::channel::ControlChannel;

#[derive(Debug, Default)]
pub struct AppCacheDispatcher {
    hosts: BTreeSet<i32>,
    cache_ids: BTreeMap<i32, i64>,
    last_events: BTreeMap<i32, AppCacheEvent>,
}

impl AppCacheDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `msg` if it belongs to the application cache.
    pub fn on_message_received(&mut self, msg: &ControlMsg) -> bool {
        let ControlMsg::AppCache(msg) = msg else {
            return false;
        };
        match msg {
            AppCacheMsg::SetCacheId { host_id, cache_id } => {
                tracing::trace!(host_id, cache_id, "appcache id set");
                self.cache_ids.insert(*host_id, *cache_id);
            }
            AppCacheMsg::EventRaised { host_ids, event } => {
                tracing::trace!(hosts = host_ids.len(), ?event, "appcache event");
                for host_id in host_ids {
                    self.last_events.insert(*host_id, *event);
                }
            }
        }
        true
    }

    /// A document started using the application cache.
    pub fn register_host(&mut self, host_id: i32, channel: &ControlChannel) -> bool {
        if !self.hosts.insert(host_id) {
            return false;
        }
        channel.send(HostMsg::AppCacheRegisterHost(host_id));
        true
    }

    /// A document went away.
    pub fn unregister_host(&mut self, host_id: i32, channel: &ControlChannel) -> bool {
        if !self.hosts.remove(&host_id) {
            return false;
        }
        self.cache_ids.remove(&host_id);
        self.last_events.remove(&host_id);
        channel.send(HostMsg::AppCacheUnregisterHost(host_id));
        true
    }

    #[must_use]
    pub fn cache_id(&self, host_id: i32) -> Option<i64> {
        self.cache_ids.get(&host_id).copied()
    }

    #[must_use]
    pub fn last_event(&self, host_id: i32) -> Option<AppCacheEvent> {
        self.last_events.get(&host_id).copied()
    }

    #[must_use]
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn consumes_only_appcache_traffic() {
        let mut appcache = AppCacheDispatcher::new();
        assert!(appcache.on_message_received(&ControlMsg::AppCache(AppCacheMsg::SetCacheId {
            host_id: 4,
            cache_id: 99,
        })));
        assert!(appcache.on_message_received(&ControlMsg::AppCache(AppCacheMsg::EventRaised {
            host_ids: vec![4, 5],
            event: AppCacheEvent::Downloading,
        })));
        assert!(!appcache.on_message_received(&ControlMsg::PurgePluginListCache));
        assert_eq!(appcache.cache_id(4), Some(99));
        assert_eq!(appcache.last_event(5), Some(AppCacheEvent::Downloading));
    }

    #[test]
    fn host_lifecycle_is_reported_once() {
        let (tx, rx) = mpsc::channel();
        let channel = ControlChannel::new(tx);
        let mut appcache = AppCacheDispatcher::new();
        assert!(appcache.register_host(7, &channel));
        assert!(!appcache.register_host(7, &channel));
        assert!(appcache.unregister_host(7, &channel));
        assert!(!appcache.unregister_host(7, &channel));
        let sent: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            sent,
            vec![HostMsg::AppCacheRegisterHost(7), HostMsg::AppCacheUnregisterHost(7)]
        );
    }
}
