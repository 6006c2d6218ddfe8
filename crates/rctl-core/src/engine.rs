#![forbid(unsafe_code)]

//! Contract of the embedded content engine.
//!
//! The engine itself is an external collaborator. The control actor only
//! talks to it through [`Engine`], and only after the init gate has brought
//! it up. Every call happens on the control thread, so the trait carries no
//! `Send`/`Sync` bounds.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::message::{ColorMapping, Fingerprint, NewViewParams};
use crate::stats::{HistogramId, HistogramRegistry, StatsTable};

/// Object-cache sizing, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCapacities {
    pub min_dead_capacity: usize,
    pub max_dead_capacity: usize,
    pub capacity: usize,
}

/// Overall cache usage, reported upstream on a debounce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub min_dead_capacity: usize,
    pub max_dead_capacity: usize,
    pub capacity: usize,
    pub live_size: usize,
    pub dead_size: usize,
}

/// Usage for one resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeStat {
    pub count: usize,
    pub size: usize,
    pub live_size: usize,
    pub decoded_size: usize,
}

/// Usage broken down by resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeStats {
    pub images: ResourceTypeStat,
    pub css_style_sheets: ResourceTypeStat,
    pub scripts: ResourceTypeStat,
    pub xsl_style_sheets: ResourceTypeStat,
    pub fonts: ResourceTypeStat,
}

/// Named script capability the engine can expose to pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Gears,
    Interval,
    LoadTimes,
    External,
    ExtensionProcessBindings,
    BaseJs,
    JsonSchema,
    EventBindings,
    RendererExtensionBindings,
    ExtensionApiTest,
    Benchmarking,
    Playback,
}

impl Capability {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gears => "v8/Gears",
            Self::Interval => "v8/Interval",
            Self::LoadTimes => "v8/LoadTimes",
            Self::External => "v8/External",
            Self::ExtensionProcessBindings => "chrome/ExtensionProcessBindings",
            Self::BaseJs => "chrome/BaseJsV8Extension",
            Self::JsonSchema => "chrome/JsonSchema",
            Self::EventBindings => "chrome/EventBindings",
            Self::RendererExtensionBindings => "chrome/RendererExtensionBindings",
            Self::ExtensionApiTest => "chrome/ExtensionApiTest",
            Self::Benchmarking => "v8/Benchmarking",
            Self::Playback => "v8/Playback",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a capability becomes visible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationTarget {
    /// Every script context.
    AllContexts,
    /// Only contexts running extension content scripts.
    ContentScripts,
    /// Only pages loaded from the given URL scheme.
    Scheme(String),
}

/// Platform-integration object handed to the engine at start-up.
///
/// Shares the plugin-refresh flag with the control thread so the engine can
/// tell, while rebuilding its plugin list, whether it may ask the parent for
/// a fresh one.
#[derive(Debug, Clone)]
pub struct PlatformSupport {
    plugin_refresh_allowed: Rc<Cell<bool>>,
}

impl PlatformSupport {
    #[must_use]
    pub fn new(plugin_refresh_allowed: Rc<Cell<bool>>) -> Self {
        Self {
            plugin_refresh_allowed,
        }
    }

    /// Whether a plugin-list lookup may ask for a refresh right now.
    #[inline]
    #[must_use]
    pub fn plugin_refresh_allowed(&self) -> bool {
        self.plugin_refresh_allowed.get()
    }
}

/// Counter and histogram sinks installed into the engine before start-up.
#[derive(Debug, Clone, Default)]
pub struct EngineHooks {
    counters: StatsTable,
    histograms: HistogramRegistry,
}

impl EngineHooks {
    #[must_use]
    pub fn new(counters: StatsTable, histograms: HistogramRegistry) -> Self {
        Self {
            counters,
            histograms,
        }
    }

    /// Counter lookup hook: resolve a counter name to its slot.
    pub fn find_counter(&self, name: &str) -> usize {
        self.counters.find_location(name)
    }

    /// Counter increment hook.
    pub fn add_to_counter(&self, slot: usize, delta: i64) {
        self.counters.add(slot, delta);
    }

    /// Histogram creation hook. Histograms created by the engine are
    /// flagged for upload.
    pub fn create_histogram(&self, name: &str, min: i64, max: i64, buckets: usize) -> HistogramId {
        self.histograms.create(name, min, max, buckets, true)
    }

    /// Histogram sample hook.
    pub fn add_histogram_sample(&self, id: HistogramId, sample: i64) {
        self.histograms.add_sample(id, sample);
    }

    #[must_use]
    pub fn counters(&self) -> &StatsTable {
        &self.counters
    }

    #[must_use]
    pub fn histograms(&self) -> &HistogramRegistry {
        &self.histograms
    }
}

/// The embedded rendering and scripting engine.
pub trait Engine {
    /// Install counter/histogram hooks. Called before [`initialize`](Self::initialize).
    fn set_hooks(&mut self, hooks: EngineHooks);

    /// Start the engine with its platform-integration object.
    fn initialize(&mut self, platform: PlatformSupport);

    /// Lock the script engine to the calling thread.
    fn enable_single_thread_mode(&mut self);

    /// Treat pages from `scheme` as local content.
    fn register_scheme_as_local(&mut self, scheme: &str);

    /// Deny cross-origin script access to and from `scheme`.
    fn register_scheme_as_no_access(&mut self, scheme: &str);

    /// Expose a script capability to the given contexts.
    fn register_extension(&mut self, capability: Capability, target: RegistrationTarget);

    /// Turn on the platform media player.
    fn enable_media_player(&mut self);

    /// Create a top-level surface.
    fn create_view(&mut self, page_id: i32, params: &NewViewParams);

    fn set_cache_capacities(&mut self, capacities: CacheCapacities);

    fn resource_type_stats(&self) -> ResourceTypeStats;

    fn usage_stats(&self) -> UsageStats;

    /// Reclaim idle resources. Returns `true` once nothing more can be freed.
    fn idle_notification(&mut self) -> bool;

    /// Whether the script engine has already been torn down.
    fn is_dead(&self) -> bool;

    fn update_visited_link_state(&mut self, fingerprint: Fingerprint);

    fn reset_visited_link_state(&mut self);

    fn set_named_colors(&mut self, colors: &[ColorMapping]);

    /// Drop the cached plugin list. The engine may consult
    /// [`PlatformSupport::plugin_refresh_allowed`] while rebuilding it.
    fn reset_plugin_cache(&mut self);

    /// Deliver an extension event to script.
    fn invoke_extension_function(&mut self, function_name: &str, args: &serde_json::Value);

    /// Hand one remote-debugger message to the engine's devtools agent.
    fn dispatch_devtools_message(&mut self, payload: &str);

    /// Stop the engine. Called at most once, and only after `initialize`.
    fn shutdown(&mut self);
}
