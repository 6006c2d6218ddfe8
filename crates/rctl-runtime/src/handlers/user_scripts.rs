#![forbid(unsafe_code)]

//! User scripts pushed by the parent process.
//!
//! The parent serializes the full script table as JSON into a shared
//! segment and sends a handle whenever it changes. The table is replaced
//! wholesale; a segment that fails to decode leaves the renderer with no
//! scripts rather than a stale set.

use serde::{Deserialize, Serialize};

use rctl_core::{SharedMemoryHandle, TableResult};

use super::glob_matches;

/// When in the page load a script is injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLocation {
    DocumentStart,
    #[default]
    DocumentEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserScript {
    pub name: String,
    /// URL patterns; `*` matches any run of characters.
    pub matches: Vec<String>,
    #[serde(default)]
    pub run_at: RunLocation,
    #[serde(default)]
    pub js: Vec<String>,
    #[serde(default)]
    pub css: Vec<String>,
}

impl UserScript {
    #[must_use]
    pub fn matches_url(&self, url: &str) -> bool {
        self.matches.iter().any(|p| glob_matches(p, url))
    }
}

#[derive(Debug, Default)]
pub struct UserScriptTable {
    scripts: Vec<UserScript>,
}

impl UserScriptTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Replace the table with the contents of `handle`.
    ///
    /// # Panics
    ///
    /// If `handle` is invalid.
    pub fn update_scripts(&mut self, handle: &SharedMemoryHandle) -> TableResult<usize> {
        assert!(handle.is_valid(), "user script update with invalid handle");
        self.scripts.clear();
        let bytes = handle.bytes().unwrap_or_default();
        self.scripts = serde_json::from_slice(bytes)?;
        Ok(self.scripts.len())
    }

    /// Scripts to inject into `url` at `run_at`, in table order.
    pub fn scripts_for<'a>(&'a self, url: &'a str, run_at: RunLocation) -> impl Iterator<Item = &'a UserScript> + 'a {
        self.scripts
            .iter()
            .filter(move |s| s.run_at == run_at && s.matches_url(url))
    }
}
