#![forbid(unsafe_code)]

//! Channel filters installed by the control thread.
//!
//! Filters are installed in this order and removed in the reverse one:
//!
//! 1. [`DevToolsAgentFilter`] pulls remote-debugger traffic off the dispatch
//!    path into a bounded inbox. The control thread drains it into the
//!    engine once the engine is up.
//! 2. [`DbMessageFilter`] records storage size updates per database.
//! 3. [`SuicideOnChannelError`] ends the process when the parent goes away.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use rctl_core::ControlMsg;

use crate::channel::MessageFilter;

pub const DEVTOOLS_FILTER: &str = "devtools_agent";
pub const DB_FILTER: &str = "db_message";
pub const SUICIDE_FILTER: &str = "suicide_on_channel_error";

/// Most devtools messages held while the engine is down. Past this the
/// oldest are dropped.
pub const DEVTOOLS_INBOX_CAPACITY: usize = 256;

/// Messages waiting for the engine's devtools agent, oldest first.
pub type DevToolsInbox = Rc<RefCell<VecDeque<String>>>;

/// Latest `(size, space_available)` per `(origin, database name)`.
pub type DatabaseSizes = Rc<RefCell<BTreeMap<(String, String), (i64, i64)>>>;

/// How the suicide filter ends the process.
pub type Terminator = Box<dyn Fn()>;

/// Default terminator: `std::process::exit(0)`.
///
/// Destructors of values still alive on any thread's stack do not run.
/// The C runtime's `atexit` handlers do, so stdio buffers are flushed.
#[must_use]
pub fn exit_process() -> Terminator {
    Box::new(|| std::process::exit(0))
}

#[derive(Debug)]
pub struct DevToolsAgentFilter {
    inbox: DevToolsInbox,
}

impl DevToolsAgentFilter {
    #[must_use]
    pub fn new(inbox: DevToolsInbox) -> Self {
        Self { inbox }
    }
}

impl MessageFilter for DevToolsAgentFilter {
    fn name(&self) -> &'static str {
        DEVTOOLS_FILTER
    }

    fn on_message_received(&mut self, msg: &ControlMsg) -> bool {
        let ControlMsg::DevToolsRpc(payload) = msg else {
            return false;
        };
        let mut inbox = self.inbox.borrow_mut();
        if inbox.len() >= DEVTOOLS_INBOX_CAPACITY {
            inbox.pop_front();
            tracing::warn!(
                capacity = DEVTOOLS_INBOX_CAPACITY,
                "devtools inbox full; oldest message dropped"
            );
        }
        inbox.push_back(payload.clone());
        true
    }
}

#[derive(Debug)]
pub struct DbMessageFilter {
    sizes: DatabaseSizes,
}

impl DbMessageFilter {
    #[must_use]
    pub fn new(sizes: DatabaseSizes) -> Self {
        Self { sizes }
    }
}

impl MessageFilter for DbMessageFilter {
    fn name(&self) -> &'static str {
        DB_FILTER
    }

    fn on_message_received(&mut self, msg: &ControlMsg) -> bool {
        let ControlMsg::DatabaseUpdateSize {
            origin,
            name,
            size,
            space_available,
        } = msg
        else {
            return false;
        };
        tracing::trace!(origin = %origin, database = %name, size = *size, "database size update");
        self.sizes
            .borrow_mut()
            .insert((origin.clone(), name.clone()), (*size, *space_available));
        true
    }
}

/// Terminates the process when the channel to the parent breaks.
///
/// A renderer with no parent can never be told to quit, so it quits on its
/// own. Exit status is 0. Pending Rust destructors are skipped, but
/// `atexit` handlers still run and stdio is flushed.
pub struct SuicideOnChannelError {
    terminate: Terminator,
}

impl std::fmt::Debug for SuicideOnChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuicideOnChannelError").finish_non_exhaustive()
    }
}

impl SuicideOnChannelError {
    #[must_use]
    pub fn new(terminate: Terminator) -> Self {
        Self { terminate }
    }
}

impl MessageFilter for SuicideOnChannelError {
    fn name(&self) -> &'static str {
        SUICIDE_FILTER
    }

    fn on_message_received(&mut self, _msg: &ControlMsg) -> bool {
        false
    }

    fn on_channel_error(&mut self) {
        tracing::info!("control channel broke; terminating renderer");
        (self.terminate)();
    }
}
