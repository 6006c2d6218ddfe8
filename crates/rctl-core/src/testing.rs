#![forbid(unsafe_code)]

//! Recording engine double.
//!
//! [`RecordingEngine`] implements [`Engine`] by appending every call to a
//! shared log. The paired [`EngineProbe`] stays with the test (or harness)
//! after the engine has been moved into the control thread, and can script
//! idle-notification results, fake a dead engine, or seed cache statistics.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::engine::{
    CacheCapacities, Capability, Engine, EngineHooks, PlatformSupport, RegistrationTarget,
    ResourceTypeStats, UsageStats,
};
use crate::message::{ColorMapping, Fingerprint, NewViewParams};

/// Counter bumped on every idle notification once hooks are installed.
pub const IDLE_NOTIFICATION_COUNTER: &str = "c:engine.idle_notifications";

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    SetHooks,
    Initialize,
    EnableSingleThreadMode,
    RegisterSchemeAsLocal(String),
    RegisterSchemeAsNoAccess(String),
    RegisterExtension(Capability, RegistrationTarget),
    EnableMediaPlayer,
    CreateView { page_id: i32, view_id: i32 },
    SetCacheCapacities(CacheCapacities),
    ResourceTypeStats,
    UsageStats,
    IdleNotification,
    UpdateVisitedLinkState(Fingerprint),
    ResetVisitedLinkState,
    SetNamedColors(Vec<ColorMapping>),
    ResetPluginCache { refresh_allowed: bool },
    InvokeExtensionFunction(String),
    DevToolsMessage(String),
    Shutdown,
}

#[derive(Debug, Default)]
struct EngineState {
    calls: Vec<EngineCall>,
    idle_results: VecDeque<bool>,
    dead: bool,
    usage: UsageStats,
    resources: ResourceTypeStats,
    hooks: Option<EngineHooks>,
    platform: Option<PlatformSupport>,
}

/// Engine double that records every call.
#[derive(Debug)]
pub struct RecordingEngine {
    state: Rc<RefCell<EngineState>>,
}

/// Test-side view of a [`RecordingEngine`].
#[derive(Debug, Clone)]
pub struct EngineProbe {
    state: Rc<RefCell<EngineState>>,
}

impl RecordingEngine {
    /// Create an engine and its probe.
    #[must_use]
    pub fn new() -> (Self, EngineProbe) {
        let state = Rc::new(RefCell::new(EngineState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            EngineProbe { state },
        )
    }

    fn record(&self, call: EngineCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl EngineProbe {
    /// Snapshot of all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.borrow().calls.clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Queue results for upcoming idle notifications. When the queue is
    /// empty the engine reports "not finished" (`false`).
    pub fn push_idle_results(&self, results: impl IntoIterator<Item = bool>) {
        self.state.borrow_mut().idle_results.extend(results);
    }

    pub fn set_dead(&self, dead: bool) {
        self.state.borrow_mut().dead = dead;
    }

    pub fn set_usage_stats(&self, usage: UsageStats) {
        self.state.borrow_mut().usage = usage;
    }

    pub fn set_resource_stats(&self, stats: ResourceTypeStats) {
        self.state.borrow_mut().resources = stats;
    }

    /// Hooks installed by the init gate, if it ran.
    #[must_use]
    pub fn hooks(&self) -> Option<EngineHooks> {
        self.state.borrow().hooks.clone()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.borrow().platform.is_some()
    }
}

impl Engine for RecordingEngine {
    fn set_hooks(&mut self, hooks: EngineHooks) {
        self.state.borrow_mut().hooks = Some(hooks);
        self.record(EngineCall::SetHooks);
    }

    fn initialize(&mut self, platform: PlatformSupport) {
        self.state.borrow_mut().platform = Some(platform);
        self.record(EngineCall::Initialize);
    }

    fn enable_single_thread_mode(&mut self) {
        self.record(EngineCall::EnableSingleThreadMode);
    }

    fn register_scheme_as_local(&mut self, scheme: &str) {
        self.record(EngineCall::RegisterSchemeAsLocal(scheme.to_owned()));
    }

    fn register_scheme_as_no_access(&mut self, scheme: &str) {
        self.record(EngineCall::RegisterSchemeAsNoAccess(scheme.to_owned()));
    }

    fn register_extension(&mut self, capability: Capability, target: RegistrationTarget) {
        self.record(EngineCall::RegisterExtension(capability, target));
    }

    fn enable_media_player(&mut self) {
        self.record(EngineCall::EnableMediaPlayer);
    }

    fn create_view(&mut self, page_id: i32, params: &NewViewParams) {
        self.record(EngineCall::CreateView {
            page_id,
            view_id: params.view_id,
        });
    }

    fn set_cache_capacities(&mut self, capacities: CacheCapacities) {
        self.record(EngineCall::SetCacheCapacities(capacities));
    }

    fn resource_type_stats(&self) -> ResourceTypeStats {
        self.record(EngineCall::ResourceTypeStats);
        self.state.borrow().resources
    }

    fn usage_stats(&self) -> UsageStats {
        self.record(EngineCall::UsageStats);
        self.state.borrow().usage
    }

    fn idle_notification(&mut self) -> bool {
        self.record(EngineCall::IdleNotification);
        let mut state = self.state.borrow_mut();
        if let Some(hooks) = &state.hooks {
            let slot = hooks.find_counter(IDLE_NOTIFICATION_COUNTER);
            hooks.add_to_counter(slot, 1);
        }
        state.idle_results.pop_front().unwrap_or(false)
    }

    fn is_dead(&self) -> bool {
        self.state.borrow().dead
    }

    fn update_visited_link_state(&mut self, fingerprint: Fingerprint) {
        self.record(EngineCall::UpdateVisitedLinkState(fingerprint));
    }

    fn reset_visited_link_state(&mut self) {
        self.record(EngineCall::ResetVisitedLinkState);
    }

    fn set_named_colors(&mut self, colors: &[ColorMapping]) {
        self.record(EngineCall::SetNamedColors(colors.to_vec()));
    }

    fn reset_plugin_cache(&mut self) {
        let refresh_allowed = self
            .state
            .borrow()
            .platform
            .as_ref()
            .is_some_and(PlatformSupport::plugin_refresh_allowed);
        self.record(EngineCall::ResetPluginCache { refresh_allowed });
    }

    fn invoke_extension_function(&mut self, function_name: &str, _args: &serde_json::Value) {
        self.record(EngineCall::InvokeExtensionFunction(function_name.to_owned()));
    }

    fn dispatch_devtools_message(&mut self, payload: &str) {
        self.record(EngineCall::DevToolsMessage(payload.to_owned()));
    }

    fn shutdown(&mut self) {
        self.state.borrow_mut().dead = true;
        self.record(EngineCall::Shutdown);
    }
}
