#![forbid(unsafe_code)]

//! The renderer control thread.
//!
//! One [`ControlThread`] exists per OS thread that owns a control channel.
//! It receives every control message from the parent process, brings the
//! engine up on first use, owns the subsystem handlers, tracks widget
//! visibility for idle reclamation, and rate-limits cache reports.
//!
//! Everything runs on one thread. Delayed work goes through the
//! [`TaskRunner`] and comes back in via [`ControlThread::run_task`].
//!
//! # Inbound path
//!
//! ```text
//! on_channel_message
//!   ├─ channel filters (devtools, database, suicide)   first consumer wins
//!   └─ dispatch
//!        ├─ application-cache dispatcher               first refusal
//!        └─ dispatch table                             exactly one handler
//! ```
//!
//! # Invariants
//!
//! - At most one live instance per thread; [`ControlThread::current`] finds it.
//! - `hidden_widget_count <= widget_count`.
//! - The engine is brought up at most once and only by the init gate.
//! - Teardown releases resources in exactly the reverse order they were
//!   acquired, and runs once.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Second instance on one thread | Panic at construction |
//! | Invalid shared-memory handle | Panic in the handler |
//! | Malformed shared table | `warn!`, table left empty |
//! | Message with no binding | `trace!`, ignored |
//! | Channel error | Filters notified; the suicide filter exits the process |
//! | Message or handler call after teardown | `debug!`, dropped; the engine stays down |
//! | Page id counter at `i32::MAX` | `warn!`, counter restarts at 1 |
//! | Idle timer before the engine is up | `trace!`, nothing to reclaim |

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::mpsc;

use rctl_core::{
    CacheCapacities, ColorMapping, ControlMsg, Engine, EngineHooks, Fingerprint, HistogramRegistry,
    HostMsg, NewViewParams, PlatformSupport, SharedMemoryHandle, StatsTable,
};

use crate::cache_stats::CacheStatsReporter;
use crate::channel::ControlChannel;
use crate::config::ControlConfig;
use crate::dispatch::DispatchTable;
use crate::engine_gate::{EngineInitGate, InitContext};
use crate::filters::{
    DatabaseSizes, DbMessageFilter, DevToolsAgentFilter, DevToolsInbox, SuicideOnChannelError,
    Terminator, DB_FILTER, DEVTOOLS_FILTER, SUICIDE_FILTER, exit_process,
};
use crate::handlers::{
    AppCacheDispatcher, DnsPrefetcher, ExtensionBindings, HistogramSnapshots, UserScriptTable,
    VisitedLinkTable,
};
use crate::idle::{IdleScheduler, IdleState};
use crate::task_runner::{Task, TaskRunner};

/// Shared handle to the control thread. Never leaves its thread.
pub type SharedControlThread = Rc<RefCell<ControlThread>>;

thread_local! {
    static CURRENT: RefCell<Weak<RefCell<ControlThread>>> = const { RefCell::new(Weak::new()) };
}

/// A resource held by the control thread, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The outbound sender.
    Channel,
    /// This thread's [`ControlThread::current`] registration.
    ThreadSlot,
    /// A channel filter, by name.
    Filter(&'static str),
    /// The running engine.
    Engine,
}

/// Options for [`ControlThread`] construction.
pub struct ControlThreadBuilder {
    config: ControlConfig,
    engine: Box<dyn Engine>,
    sender: mpsc::Sender<HostMsg>,
    runner: TaskRunner,
    table: Option<DispatchTable>,
    terminator: Option<Terminator>,
}

impl ControlThreadBuilder {
    /// Route messages through `table` instead of the standard bindings.
    #[must_use]
    pub fn dispatch_table(mut self, table: DispatchTable) -> Self {
        self.table = Some(table);
        self
    }

    /// How the suicide filter ends the process. Defaults to exiting with
    /// status 0.
    #[must_use]
    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Build the control thread and register it for this thread.
    ///
    /// # Panics
    ///
    /// If a control thread is already live on the calling thread.
    pub fn build(self) -> SharedControlThread {
        CURRENT.with(|slot| {
            assert!(
                slot.borrow().upgrade().is_none(),
                "a control thread is already running on this thread"
            );
        });

        let Self {
            config,
            engine,
            sender,
            runner,
            table,
            terminator,
        } = self;

        let mut acquired = Vec::new();
        let channel = ControlChannel::new(sender);
        acquired.push(Resource::Channel);

        let histograms = HistogramRegistry::new();
        let plugin_refresh_allowed = Rc::new(Cell::new(true));
        let init = InitContext {
            hooks: EngineHooks::new(StatsTable::new(), histograms.clone()),
            platform: PlatformSupport::new(Rc::clone(&plugin_refresh_allowed)),
            switches: config.switches,
            media_library_initialized: config.media_library_initialized,
        };

        let thread = ControlThread {
            channel,
            runner,
            engine,
            gate: EngineInitGate::new(),
            init,
            table: table.unwrap_or_else(DispatchTable::standard),
            idle: IdleScheduler::new(config.initial_idle_delay_s),
            cache_stats: CacheStatsReporter::new(config.cache_stats_delay),
            visited_links: VisitedLinkTable::new(),
            user_scripts: UserScriptTable::new(),
            dns: DnsPrefetcher::new(config.dns_submit_delay, config.dns_batch_limit),
            histograms: HistogramSnapshots::new(histograms),
            appcache: AppCacheDispatcher::new(),
            extensions: ExtensionBindings::new(),
            devtools_inbox: DevToolsInbox::default(),
            database_sizes: DatabaseSizes::default(),
            next_page_id: 1,
            plugin_refresh_allowed,
            acquired,
            torn_down: false,
            config,
        };
        let shared = Rc::new(RefCell::new(thread));

        CURRENT.with(|slot| *slot.borrow_mut() = Rc::downgrade(&shared));
        {
            let mut thread = shared.borrow_mut();
            thread.acquired.push(Resource::ThreadSlot);
            thread.install_filters(terminator);
        }
        tracing::info!(
            filters = ?shared.borrow().channel.filter_names(),
            "control thread started"
        );
        shared
    }
}

pub struct ControlThread {
    config: ControlConfig,
    channel: ControlChannel,
    runner: TaskRunner,
    engine: Box<dyn Engine>,
    gate: EngineInitGate,
    init: InitContext,
    table: DispatchTable,
    idle: IdleScheduler,
    cache_stats: CacheStatsReporter,
    visited_links: VisitedLinkTable,
    user_scripts: UserScriptTable,
    dns: DnsPrefetcher,
    histograms: HistogramSnapshots,
    appcache: AppCacheDispatcher,
    extensions: ExtensionBindings,
    devtools_inbox: DevToolsInbox,
    database_sizes: DatabaseSizes,
    next_page_id: i32,
    plugin_refresh_allowed: Rc<Cell<bool>>,
    acquired: Vec<Resource>,
    torn_down: bool,
}

impl std::fmt::Debug for ControlThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlThread")
            .field("channel", &self.channel)
            .field("gate", &self.gate.state())
            .field("idle", &self.idle)
            .field("next_page_id", &self.next_page_id)
            .field("acquired", &self.acquired)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl ControlThread {
    /// Start building a control thread.
    pub fn builder(
        config: ControlConfig,
        engine: impl Engine + 'static,
        sender: mpsc::Sender<HostMsg>,
        runner: TaskRunner,
    ) -> ControlThreadBuilder {
        ControlThreadBuilder {
            config,
            engine: Box::new(engine),
            sender,
            runner,
            table: None,
            terminator: None,
        }
    }

    /// Build a control thread with the standard bindings.
    ///
    /// # Panics
    ///
    /// If a control thread is already live on the calling thread.
    pub fn new(
        config: ControlConfig,
        engine: impl Engine + 'static,
        sender: mpsc::Sender<HostMsg>,
        runner: TaskRunner,
    ) -> SharedControlThread {
        Self::builder(config, engine, sender, runner).build()
    }

    /// The control thread registered on the calling thread, if any.
    #[must_use]
    pub fn current() -> Option<SharedControlThread> {
        CURRENT
            .try_with(|slot| slot.borrow().upgrade())
            .ok()
            .flatten()
    }

    /// Run `f` against the current control thread. Returns `None` if there
    /// is none or it is already borrowed further up the stack.
    pub fn with_current<R>(f: impl FnOnce(&mut ControlThread) -> R) -> Option<R> {
        let shared = Self::current()?;
        let mut thread = shared.try_borrow_mut().ok()?;
        Some(f(&mut thread))
    }

    fn install_filters(&mut self, terminator: Option<Terminator>) {
        self.channel
            .add_filter(Box::new(DevToolsAgentFilter::new(Rc::clone(&self.devtools_inbox))));
        self.acquired.push(Resource::Filter(DEVTOOLS_FILTER));

        self.channel
            .add_filter(Box::new(DbMessageFilter::new(Rc::clone(&self.database_sizes))));
        self.acquired.push(Resource::Filter(DB_FILTER));

        if self.config.exit_on_channel_error {
            let terminate = terminator.unwrap_or_else(exit_process);
            self.channel
                .add_filter(Box::new(SuicideOnChannelError::new(terminate)));
            self.acquired.push(Resource::Filter(SUICIDE_FILTER));
        }
    }

    /// Bring the engine up if this is the first use. Returns `false` once
    /// the thread is torn down; callers must then leave the engine alone.
    fn ensure_engine(&mut self) -> bool {
        if self.torn_down {
            tracing::debug!("engine use after teardown refused");
            return false;
        }
        if self.gate.ensure_initialized(self.engine.as_mut(), &self.init) {
            self.acquired.push(Resource::Engine);
            self.forward_devtools_messages();
        }
        true
    }

    /// Drain the devtools inbox into the engine. Messages wait while the
    /// engine is down.
    fn forward_devtools_messages(&mut self) {
        if self.torn_down || !self.gate.is_initialized() {
            return;
        }
        loop {
            let Some(payload) = self.devtools_inbox.borrow_mut().pop_front() else {
                break;
            };
            self.engine.dispatch_devtools_message(&payload);
        }
    }

    // Inbound

    /// Entry point for every message read from the channel.
    pub fn on_channel_message(&mut self, msg: ControlMsg) {
        if self.torn_down {
            tracing::debug!(kind = msg.kind().name(), "message after teardown dropped");
            return;
        }
        if self.channel.filter_incoming(&msg) {
            self.forward_devtools_messages();
            return;
        }
        self.dispatch(msg);
    }

    /// Route a message that no filter consumed. Dropped after teardown.
    pub fn dispatch(&mut self, msg: ControlMsg) {
        let kind = msg.kind();
        if self.torn_down {
            tracing::debug!(kind = kind.name(), "dispatch after teardown dropped");
            return;
        }
        let _span = tracing::debug_span!("dispatch", kind = kind.name()).entered();
        if self.appcache.on_message_received(&msg) {
            return;
        }
        match self.table.handler_for(kind) {
            Some(handler) => handler(self, msg),
            None => tracing::trace!("no handler bound; ignored"),
        }
    }

    /// The channel to the parent broke.
    pub fn on_channel_error(&mut self) {
        tracing::warn!("control channel error");
        self.channel.notify_channel_error();
    }

    // Widgets

    /// A view was created. New widgets count as visible.
    pub fn widget_created(&mut self) {
        self.idle.widget_created();
    }

    /// A view went away; `was_hidden` says which count it leaves.
    pub fn widget_destroyed(&mut self, was_hidden: bool) {
        self.idle.widget_destroyed(was_hidden);
    }

    /// A view was hidden. Arms the idle timer once every view is.
    pub fn widget_hidden(&mut self) {
        self.idle.widget_hidden(&self.runner);
    }

    /// A hidden view came back. Cancels any armed idle timer.
    pub fn widget_restored(&mut self) {
        self.idle.widget_restored();
    }

    // Delayed work

    /// Run a task the loop found due.
    pub fn run_task(&mut self, task: Task) {
        if self.torn_down {
            return;
        }
        match task {
            Task::IdleHandler { generation } => {
                if !self.idle.should_notify(generation) {
                    tracing::trace!(generation, "idle timer no longer wanted");
                    return;
                }
                if !self.gate.is_initialized() {
                    tracing::trace!(generation, "engine not running; idle notification skipped");
                    return;
                }
                self.idle
                    .notify(generation, self.engine.as_mut(), &self.runner);
            }
            Task::InformHostOfCacheStats => {
                if !self.ensure_engine() {
                    return;
                }
                self.cache_stats
                    .perform_report(self.engine.as_ref(), &self.channel);
            }
            Task::SubmitDnsPrefetch => self.dns.submit(&self.channel, &self.runner),
        }
    }

    // Outbound

    pub fn close_idle_connections(&self) {
        self.channel.send(HostMsg::CloseIdleConnections);
    }

    pub fn set_cache_mode(&self, enabled: bool) {
        self.channel.send(HostMsg::SetCacheMode(enabled));
    }

    /// Schedule a cache usage report unless one is already scheduled.
    pub fn inform_host_of_cache_stats_later(&mut self) {
        self.cache_stats.request_report_soon(&self.runner);
    }

    /// Queue `name` for DNS prefetch.
    pub fn resolve(&mut self, name: &str) -> bool {
        self.dns.resolve(name, &self.runner)
    }

    /// Send the histogram samples recorded since the last call.
    pub fn send_histograms(&self, sequence: i32) {
        self.histograms.send_histograms(sequence, &self.channel);
    }

    /// Returns `false` if `host_id` was already registered.
    pub fn register_appcache_host(&mut self, host_id: i32) -> bool {
        self.appcache.register_host(host_id, &self.channel)
    }

    pub fn unregister_appcache_host(&mut self, host_id: i32) -> bool {
        self.appcache.unregister_host(host_id, &self.channel)
    }

    // Handlers

    /// Replace the visited-link table. A malformed table empties it.
    pub fn on_update_visited_links(&mut self, table: SharedMemoryHandle) {
        match self.visited_links.init(&table) {
            Ok(slots) => tracing::debug!(slots, "visited link table replaced"),
            Err(err) => tracing::warn!(error = %err, "visited link table rejected"),
        }
    }

    pub fn on_add_visited_links(&mut self, fingerprints: Vec<Fingerprint>) {
        self.visited_links.add(&fingerprints);
        if !self.ensure_engine() {
            return;
        }
        for fingerprint in fingerprints {
            self.engine.update_visited_link_state(fingerprint);
        }
    }

    pub fn on_reset_visited_links(&mut self) {
        self.visited_links.reset();
        if self.ensure_engine() {
            self.engine.reset_visited_link_state();
        }
    }

    /// The id the next created view receives.
    pub fn on_set_next_page_id(&mut self, next_page_id: i32) {
        self.next_page_id = next_page_id;
    }

    pub fn on_set_css_colors(&mut self, colors: Vec<ColorMapping>) {
        if self.ensure_engine() {
            self.engine.set_named_colors(&colors);
        }
    }

    /// Create a view under the next page id and count it as a visible
    /// widget.
    pub fn on_create_new_view(&mut self, params: NewViewParams) {
        if !self.ensure_engine() {
            return;
        }
        let page_id = self.next_page_id;
        self.next_page_id = page_id.checked_add(1).unwrap_or_else(|| {
            tracing::warn!(page_id, "page id space exhausted; restarting at 1");
            1
        });
        tracing::debug!(page_id, view_id = params.view_id, "creating view");
        self.engine.create_view(page_id, &params);
        self.widget_created();
    }

    pub fn on_set_cache_capacities(&mut self, capacities: CacheCapacities) {
        if self.ensure_engine() {
            self.engine.set_cache_capacities(capacities);
        }
    }

    pub fn on_get_renderer_histograms(&mut self, sequence: i32) {
        self.send_histograms(sequence);
    }

    /// Reply with per-type resource cache statistics.
    pub fn on_get_cache_resource_stats(&mut self) {
        if !self.ensure_engine() {
            return;
        }
        let stats = self.engine.resource_type_stats();
        self.channel.send(HostMsg::ResourceTypeStats(stats));
    }

    /// Replace the user script set. A malformed table empties it.
    pub fn on_update_user_scripts(&mut self, scripts: SharedMemoryHandle) {
        match self.user_scripts.update_scripts(&scripts) {
            Ok(count) => tracing::debug!(count, "user scripts updated"),
            Err(err) => tracing::warn!(error = %err, "user script table rejected"),
        }
    }

    pub fn on_extension_message_invoke(&mut self, function_name: String, args: serde_json::Value) {
        if self.ensure_engine() {
            self.engine.invoke_extension_function(&function_name, &args);
        }
    }

    pub fn on_set_extension_function_names(&mut self, names: Vec<String>) {
        self.extensions.set_function_names(names);
    }

    /// The parent's plugin list changed. The engine rebuilds its copy
    /// without asking the parent for another refresh.
    pub fn on_purge_plugin_list_cache(&mut self) {
        if !self.ensure_engine() {
            return;
        }
        self.plugin_refresh_allowed.set(false);
        self.engine.reset_plugin_cache();
        self.plugin_refresh_allowed.set(true);
    }

    /// Page actions declared by one extension.
    pub fn on_page_actions_updated(&mut self, extension_id: String, page_actions: Vec<String>) {
        self.extensions.set_page_actions(extension_id, page_actions);
    }

    pub fn on_extension_set_api_permissions(&mut self, extension_id: String, permissions: Vec<String>) {
        self.extensions.set_api_permissions(extension_id, permissions);
    }

    pub fn on_extension_set_host_permissions(&mut self, extension_url: String, patterns: Vec<String>) {
        self.extensions.set_host_permissions(extension_url, patterns);
    }

    // Teardown

    /// Release everything in reverse acquisition order. Returns the order
    /// used; a second call releases nothing.
    pub fn shutdown(&mut self) -> Vec<Resource> {
        if self.torn_down {
            return Vec::new();
        }
        self.torn_down = true;
        let mut released = Vec::with_capacity(self.acquired.len());
        while let Some(resource) = self.acquired.pop() {
            match resource {
                Resource::Engine => self.engine.shutdown(),
                Resource::Filter(name) => {
                    self.channel.remove_filter(name);
                }
                Resource::ThreadSlot => {
                    // Fails only while the thread's locals are being destroyed.
                    let _ = CURRENT.try_with(|slot| *slot.borrow_mut() = Weak::new());
                }
                Resource::Channel => self.channel.close(),
            }
            released.push(resource);
        }
        tracing::info!(released = ?released, "control thread stopped");
        released
    }

    // Accessors

    /// Configuration the thread was built with.
    #[must_use]
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Timer queue for delayed work. The loop polls it.
    #[must_use]
    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Live widgets, hidden or not.
    #[must_use]
    pub fn widget_count(&self) -> u32 {
        self.idle.widget_count()
    }

    #[must_use]
    pub fn hidden_widget_count(&self) -> u32 {
        self.idle.hidden_widget_count()
    }

    /// Current idle back-off, in seconds.
    #[must_use]
    pub fn idle_delay(&self) -> f64 {
        self.idle.idle_delay()
    }

    #[must_use]
    pub fn idle_state(&self) -> IdleState {
        self.idle.state()
    }

    /// Bumped whenever an armed idle timer is cancelled or replaced.
    #[must_use]
    pub fn idle_generation(&self) -> u64 {
        self.idle.generation()
    }

    /// Whether the init gate has brought the engine up.
    #[must_use]
    pub fn engine_initialized(&self) -> bool {
        self.gate.is_initialized()
    }

    /// A cache report is scheduled and has not fired yet.
    #[must_use]
    pub fn cache_stats_pending(&self) -> bool {
        self.cache_stats.is_pending()
    }

    #[must_use]
    pub fn next_page_id(&self) -> i32 {
        self.next_page_id
    }

    /// Cleared only while a plugin list purge is running.
    #[must_use]
    pub fn plugin_refresh_allowed(&self) -> bool {
        self.plugin_refresh_allowed.get()
    }

    /// Hooks handed to the engine at start-up.
    #[must_use]
    pub fn hooks(&self) -> &EngineHooks {
        &self.init.hooks
    }

    #[must_use]
    pub fn visited_links(&self) -> &VisitedLinkTable {
        &self.visited_links
    }

    #[must_use]
    pub fn user_scripts(&self) -> &UserScriptTable {
        &self.user_scripts
    }

    #[must_use]
    pub fn extensions(&self) -> &ExtensionBindings {
        &self.extensions
    }

    #[must_use]
    pub fn appcache(&self) -> &AppCacheDispatcher {
        &self.appcache
    }

    /// Installed channel filters, in installation order.
    #[must_use]
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.channel.filter_names()
    }

    /// Devtools messages still waiting for the engine.
    #[must_use]
    pub fn pending_devtools_messages(&self) -> usize {
        self.devtools_inbox.borrow().len()
    }

    /// Last reported `(size, space_available)` of a database.
    #[must_use]
    pub fn database_size(&self, origin: &str, name: &str) -> Option<(i64, i64)> {
        self.database_sizes
            .borrow()
            .get(&(origin.to_owned(), name.to_owned()))
            .copied()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for ControlThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
