#![forbid(unsafe_code)]

//! Message-kind routing table.
//!
//! Each inbound [`MsgKind`] maps to at most one handler. Handlers are plain
//! function pointers over the control thread, so the table is `Copy`-cheap
//! to consult and carries no borrows.

use std::collections::BTreeMap;
use std::fmt;

use rctl_core::{ControlMsg, MsgKind};

use crate::control_thread::ControlThread;

/// A bound handler. It receives the message it was bound for.
pub type Handler = fn(&mut ControlThread, ControlMsg);

/// Bind `$kind` to a handler that destructures `$pat` and runs `$body`.
macro_rules! bind {
    ($table:ident, $kind:expr, $pat:pat, |$thread:ident| $body:expr) => {{
        let handler: Handler = |$thread, msg| {
            if let $pat = msg {
                $body
            } else {
                mismatched($kind);
            }
        };
        $table.bind($kind, handler);
    }};
}

#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: BTreeMap<MsgKind, Handler>,
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.handlers.keys().map(|k| k.name()))
            .finish()
    }
}

impl DispatchTable {
    /// A table with nothing bound.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The renderer's bindings: one handler per control message kind.
    #[must_use]
    pub fn standard() -> Self {
        let mut table = Self::empty();
        bind!(table, MsgKind::VisitedLinkNewTable, ControlMsg::VisitedLinkNewTable(handle), |t| {
            t.on_update_visited_links(handle)
        });
        bind!(table, MsgKind::VisitedLinkAdd, ControlMsg::VisitedLinkAdd(fps), |t| {
            t.on_add_visited_links(fps)
        });
        bind!(table, MsgKind::VisitedLinkReset, ControlMsg::VisitedLinkReset, |t| {
            t.on_reset_visited_links()
        });
        bind!(table, MsgKind::SetNextPageId, ControlMsg::SetNextPageId(id), |t| {
            t.on_set_next_page_id(id)
        });
        bind!(table, MsgKind::SetCssColors, ControlMsg::SetCssColors(colors), |t| {
            t.on_set_css_colors(colors)
        });
        bind!(table, MsgKind::New, ControlMsg::New(params), |t| t.on_create_new_view(params));
        bind!(table, MsgKind::SetCacheCapacities, ControlMsg::SetCacheCapacities(caps), |t| {
            t.on_set_cache_capacities(caps)
        });
        bind!(
            table,
            MsgKind::GetRendererHistograms,
            ControlMsg::GetRendererHistograms { sequence },
            |t| t.on_get_renderer_histograms(sequence)
        );
        bind!(table, MsgKind::GetCacheResourceStats, ControlMsg::GetCacheResourceStats, |t| {
            t.on_get_cache_resource_stats()
        });
        bind!(table, MsgKind::UserScriptsUpdated, ControlMsg::UserScriptsUpdated(handle), |t| {
            t.on_update_user_scripts(handle)
        });
        bind!(
            table,
            MsgKind::ExtensionMessageInvoke,
            ControlMsg::ExtensionMessageInvoke {
                function_name,
                args
            },
            |t| t.on_extension_message_invoke(function_name, args)
        );
        bind!(
            table,
            MsgKind::ExtensionSetFunctionNames,
            ControlMsg::ExtensionSetFunctionNames(names),
            |t| t.on_set_extension_function_names(names)
        );
        bind!(table, MsgKind::PurgePluginListCache, ControlMsg::PurgePluginListCache, |t| {
            t.on_purge_plugin_list_cache()
        });
        bind!(
            table,
            MsgKind::ExtensionUpdatePageActions,
            ControlMsg::ExtensionUpdatePageActions {
                extension_id,
                page_actions
            },
            |t| t.on_page_actions_updated(extension_id, page_actions)
        );
        bind!(
            table,
            MsgKind::ExtensionSetApiPermissions,
            ControlMsg::ExtensionSetApiPermissions {
                extension_id,
                permissions
            },
            |t| t.on_extension_set_api_permissions(extension_id, permissions)
        );
        bind!(
            table,
            MsgKind::ExtensionSetHostPermissions,
            ControlMsg::ExtensionSetHostPermissions {
                extension_url,
                patterns
            },
            |t| t.on_extension_set_host_permissions(extension_url, patterns)
        );
        table
    }

    /// Bind `kind` to `handler`, returning the handler it replaced.
    pub fn bind(&mut self, kind: MsgKind, handler: Handler) -> Option<Handler> {
        self.handlers.insert(kind, handler)
    }

    pub fn unbind(&mut self, kind: MsgKind) -> Option<Handler> {
        self.handlers.remove(&kind)
    }

    #[must_use]
    pub fn handler_for(&self, kind: MsgKind) -> Option<Handler> {
        self.handlers.get(&kind).copied()
    }

    #[must_use]
    pub fn is_bound(&self, kind: MsgKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = MsgKind> + '_ {
        self.handlers.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn mismatched(kind: MsgKind) {
    tracing::warn!(kind = kind.name(), "handler invoked with a message of another kind");
}
