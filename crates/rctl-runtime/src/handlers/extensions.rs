#![forbid(unsafe_code)]

//! Extension state mirrored from the parent process.
//!
//! The parent tells every renderer which extension API functions exist,
//! which page actions each extension declares, and what each extension may
//! touch. Script bindings consult this before exposing anything.

use std::collections::{BTreeMap, BTreeSet};

use super::glob_matches;

#[derive(Debug, Default)]
pub struct ExtensionBindings {
    function_names: BTreeSet<String>,
    page_actions: BTreeMap<String, Vec<String>>,
    api_permissions: BTreeMap<String, BTreeSet<String>>,
    host_permissions: BTreeMap<String, Vec<String>>,
}

impl ExtensionBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of known API function names.
    pub fn set_function_names(&mut self, names: Vec<String>) {
        self.function_names = names.into_iter().collect();
    }

    #[must_use]
    pub fn has_function(&self, name: &str) -> bool {
        self.function_names.contains(name)
    }

    #[must_use]
    pub fn function_count(&self) -> usize {
        self.function_names.len()
    }

    pub fn set_page_actions(&mut self, extension_id: String, page_actions: Vec<String>) {
        if page_actions.is_empty() {
            self.page_actions.remove(&extension_id);
        } else {
            self.page_actions.insert(extension_id, page_actions);
        }
    }

    #[must_use]
    pub fn page_actions(&self, extension_id: &str) -> &[String] {
        self.page_actions.get(extension_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn set_api_permissions(&mut self, extension_id: String, permissions: Vec<String>) {
        self.api_permissions
            .insert(extension_id, permissions.into_iter().collect());
    }

    #[must_use]
    pub fn has_api_permission(&self, extension_id: &str, permission: &str) -> bool {
        self.api_permissions
            .get(extension_id)
            .is_some_and(|p| p.contains(permission))
    }

    pub fn set_host_permissions(&mut self, extension_url: String, patterns: Vec<String>) {
        self.host_permissions.insert(extension_url, patterns);
    }

    /// Whether the extension served from `extension_url` may access `url`.
    #[must_use]
    pub fn is_host_permitted(&self, extension_url: &str, url: &str) -> bool {
        self.host_permissions
            .get(extension_url)
            .is_some_and(|patterns| patterns.iter().any(|p| glob_matches(p, url)))
    }
}
