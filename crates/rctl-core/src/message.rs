#![forbid(unsafe_code)]

//! Control-channel message vocabulary.
//!
//! Messages arrive already decoded; framing and serialization belong to the
//! transport. [`ControlMsg`] flows from the parent process into the renderer,
//! [`HostMsg`] flows back out.
//!
//! Every inbound message maps to exactly one [`MsgKind`]. The dispatch table in
//! the runtime is keyed by kind, so adding a variant here means adding a kind
//! and (usually) a binding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::{CacheCapacities, ResourceTypeStats, UsageStats};
use crate::shared_memory::SharedMemoryHandle;
use crate::stats::HistogramDelta;

/// 64-bit hash identifying a visited URL.
pub type Fingerprint = u64;

/// A named system color override pushed by the parent process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMapping {
    /// CSS system color name (e.g. `"ButtonFace"`).
    pub name: String,
    /// Packed ARGB value.
    pub argb: u32,
}

impl ColorMapping {
    #[must_use]
    pub fn new(name: impl Into<String>, argb: u32) -> Self {
        Self {
            name: name.into(),
            argb,
        }
    }
}

/// Parameters for a new top-level surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewViewParams {
    /// Native handle of the parent window, opaque to the renderer.
    pub parent_window: u64,
    /// Routing id assigned by the parent process.
    pub view_id: i32,
    /// Event the parent signals while a modal dialog is up, if any.
    pub modal_dialog_event: Option<u64>,
    /// Renderer and engine preferences, passed through untouched.
    pub preferences: BTreeMap<String, String>,
}

/// Application-cache status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppCacheEvent {
    Checking,
    Error,
    NoUpdate,
    Downloading,
    Progress,
    UpdateReady,
    Cached,
    Obsolete,
}

/// Messages owned by the application-cache dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppCacheMsg {
    /// A host was associated with a cache.
    SetCacheId { host_id: i32, cache_id: i64 },
    /// A status event fired for a set of hosts.
    EventRaised {
        host_ids: Vec<i32>,
        event: AppCacheEvent,
    },
}

/// Inbound control message from the parent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlMsg {
    /// Replace the visited-link table with a new shared segment.
    VisitedLinkNewTable(SharedMemoryHandle),
    /// Fingerprints added since the table was last shared.
    VisitedLinkAdd(Vec<Fingerprint>),
    /// Forget every visited link.
    VisitedLinkReset,
    /// First page id this process should hand out.
    SetNextPageId(i32),
    /// System color overrides.
    SetCssColors(Vec<ColorMapping>),
    /// Create a new top-level surface.
    New(NewViewParams),
    /// Resize the engine's object cache.
    SetCacheCapacities(CacheCapacities),
    /// Request histogram deltas tagged with a sequence number.
    GetRendererHistograms { sequence: i32 },
    /// Request per-resource-type cache statistics.
    GetCacheResourceStats,
    /// Replace the user-script table with a new shared segment.
    UserScriptsUpdated(SharedMemoryHandle),
    /// Invoke a script-side extension function by name.
    ExtensionMessageInvoke {
        function_name: String,
        args: serde_json::Value,
    },
    /// Full list of extension API function names.
    ExtensionSetFunctionNames(Vec<String>),
    /// The parent refreshed its plugin list.
    PurgePluginListCache,
    /// Page actions declared by an extension.
    ExtensionUpdatePageActions {
        extension_id: String,
        page_actions: Vec<String>,
    },
    /// API permissions granted to an extension.
    ExtensionSetApiPermissions {
        extension_id: String,
        permissions: Vec<String>,
    },
    /// Host match patterns granted to an extension.
    ExtensionSetHostPermissions {
        extension_url: String,
        patterns: Vec<String>,
    },
    /// Application-cache traffic; consumed before table dispatch.
    AppCache(AppCacheMsg),
    /// Remote debugger traffic; consumed by the devtools filter.
    DevToolsRpc(String),
    /// Storage usage update; consumed by the database filter.
    DatabaseUpdateSize {
        origin: String,
        name: String,
        size: i64,
        space_available: i64,
    },
}

/// Discriminant of a [`ControlMsg`], used as the dispatch-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MsgKind {
    VisitedLinkNewTable,
    VisitedLinkAdd,
    VisitedLinkReset,
    SetNextPageId,
    SetCssColors,
    New,
    SetCacheCapacities,
    GetRendererHistograms,
    GetCacheResourceStats,
    UserScriptsUpdated,
    ExtensionMessageInvoke,
    ExtensionSetFunctionNames,
    PurgePluginListCache,
    ExtensionUpdatePageActions,
    ExtensionSetApiPermissions,
    ExtensionSetHostPermissions,
    AppCache,
    DevToolsRpc,
    DatabaseUpdateSize,
}

impl MsgKind {
    /// Every kind, in declaration order.
    pub const ALL: [MsgKind; 19] = [
        MsgKind::VisitedLinkNewTable,
        MsgKind::VisitedLinkAdd,
        MsgKind::VisitedLinkReset,
        MsgKind::SetNextPageId,
        MsgKind::SetCssColors,
        MsgKind::New,
        MsgKind::SetCacheCapacities,
        MsgKind::GetRendererHistograms,
        MsgKind::GetCacheResourceStats,
        MsgKind::UserScriptsUpdated,
        MsgKind::ExtensionMessageInvoke,
        MsgKind::ExtensionSetFunctionNames,
        MsgKind::PurgePluginListCache,
        MsgKind::ExtensionUpdatePageActions,
        MsgKind::ExtensionSetApiPermissions,
        MsgKind::ExtensionSetHostPermissions,
        MsgKind::AppCache,
        MsgKind::DevToolsRpc,
        MsgKind::DatabaseUpdateSize,
    ];

    /// Stable name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::VisitedLinkNewTable => "visited_link_new_table",
            Self::VisitedLinkAdd => "visited_link_add",
            Self::VisitedLinkReset => "visited_link_reset",
            Self::SetNextPageId => "set_next_page_id",
            Self::SetCssColors => "set_css_colors",
            Self::New => "new",
            Self::SetCacheCapacities => "set_cache_capacities",
            Self::GetRendererHistograms => "get_renderer_histograms",
            Self::GetCacheResourceStats => "get_cache_resource_stats",
            Self::UserScriptsUpdated => "user_scripts_updated",
            Self::ExtensionMessageInvoke => "extension_message_invoke",
            Self::ExtensionSetFunctionNames => "extension_set_function_names",
            Self::PurgePluginListCache => "purge_plugin_list_cache",
            Self::ExtensionUpdatePageActions => "extension_update_page_actions",
            Self::ExtensionSetApiPermissions => "extension_set_api_permissions",
            Self::ExtensionSetHostPermissions => "extension_set_host_permissions",
            Self::AppCache => "app_cache",
            Self::DevToolsRpc => "devtools_rpc",
            Self::DatabaseUpdateSize => "database_update_size",
        }
    }
}

impl ControlMsg {
    /// The dispatch key of this message.
    #[must_use]
    pub fn kind(&self) -> MsgKind {
        match self {
            Self::VisitedLinkNewTable(_) => MsgKind::VisitedLinkNewTable,
            Self::VisitedLinkAdd(_) => MsgKind::VisitedLinkAdd,
            Self::VisitedLinkReset => MsgKind::VisitedLinkReset,
            Self::SetNextPageId(_) => MsgKind::SetNextPageId,
            Self::SetCssColors(_) => MsgKind::SetCssColors,
            Self::New(_) => MsgKind::New,
            Self::SetCacheCapacities(_) => MsgKind::SetCacheCapacities,
            Self::GetRendererHistograms { .. } => MsgKind::GetRendererHistograms,
            Self::GetCacheResourceStats => MsgKind::GetCacheResourceStats,
            Self::UserScriptsUpdated(_) => MsgKind::UserScriptsUpdated,
            Self::ExtensionMessageInvoke { .. } => MsgKind::ExtensionMessageInvoke,
            Self::ExtensionSetFunctionNames(_) => MsgKind::ExtensionSetFunctionNames,
            Self::PurgePluginListCache => MsgKind::PurgePluginListCache,
            Self::ExtensionUpdatePageActions { .. } => MsgKind::ExtensionUpdatePageActions,
            Self::ExtensionSetApiPermissions { .. } => MsgKind::ExtensionSetApiPermissions,
            Self::ExtensionSetHostPermissions { .. } => MsgKind::ExtensionSetHostPermissions,
            Self::AppCache(_) => MsgKind::AppCache,
            Self::DevToolsRpc(_) => MsgKind::DevToolsRpc,
            Self::DatabaseUpdateSize { .. } => MsgKind::DatabaseUpdateSize,
        }
    }
}

/// Outbound message to the parent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostMsg {
    /// Reply to [`ControlMsg::GetCacheResourceStats`].
    ResourceTypeStats(ResourceTypeStats),
    /// Debounced cache usage report.
    UpdatedCacheStats(UsageStats),
    /// Ask the network stack to drop idle sockets.
    CloseIdleConnections,
    /// Toggle the parent's HTTP cache.
    SetCacheMode(bool),
    /// Histogram deltas for a sequence number.
    RendererHistograms {
        sequence: i32,
        deltas: Vec<HistogramDelta>,
    },
    /// Host names worth resolving ahead of navigation.
    DnsPrefetch(Vec<String>),
    /// An application-cache host came into existence.
    AppCacheRegisterHost(i32),
    /// An application-cache host went away.
    AppCacheUnregisterHost(i32),
}

impl HostMsg {
    /// Stable name for logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ResourceTypeStats(_) => "ResourceTypeStats",
            Self::UpdatedCacheStats(_) => "UpdatedCacheStats",
            Self::CloseIdleConnections => "CloseIdleConnections",
            Self::SetCacheMode(_) => "SetCacheMode",
            Self::RendererHistograms { .. } => "RendererHistograms",
            Self::DnsPrefetch(_) => "DnsPrefetch",
            Self::AppCacheRegisterHost(_) => "AppCacheRegisterHost",
            Self::AppCacheUnregisterHost(_) => "AppCacheUnregisterHost",
        }
    }
}
