#![forbid(unsafe_code)]

//! Control-thread configuration.
//!
//! Defaults match the production renderer. A handful of timing knobs can be
//! overridden from the environment, which is handy when profiling idle
//! behavior without rebuilding:
//!
//! | Variable                     | Field                  | Default |
//! |------------------------------|------------------------|---------|
//! | `RCTL_CACHE_STATS_DELAY_MS`  | `cache_stats_delay`    | 2000 ms |
//! | `RCTL_IDLE_INITIAL_DELAY_S`  | `initial_idle_delay_s` | 1.0 s   |
//! | `RCTL_DNS_SUBMIT_DELAY_MS`   | `dns_submit_delay`     | 10 ms   |
//!
//! Unparseable or out-of-range values are ignored with a warning.

use std::time::Duration;

use rctl_core::Switches;

/// Delay between a cache-stats request and the report it triggers.
pub const DEFAULT_CACHE_STATS_DELAY: Duration = Duration::from_millis(2000);

/// Starting point of the idle-notification backoff, in seconds.
pub const DEFAULT_INITIAL_IDLE_DELAY_S: f64 = 1.0;

/// Delay before queued host names are submitted for prefetch.
pub const DEFAULT_DNS_SUBMIT_DELAY: Duration = Duration::from_millis(10);

/// Most host names sent in one prefetch message.
pub const DEFAULT_DNS_BATCH_LIMIT: usize = 30;

/// Runtime configuration for a [`ControlThread`](crate::ControlThread).
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    /// Debounce window for outbound cache usage reports.
    pub cache_stats_delay: Duration,
    /// Idle-notification delay restored on every all-hidden edge.
    pub initial_idle_delay_s: f64,
    /// Debounce window for DNS prefetch submissions.
    pub dns_submit_delay: Duration,
    /// Most names per prefetch message.
    pub dns_batch_limit: usize,
    /// Process-start switches.
    pub switches: Switches,
    /// Whether the owning process loaded its media library.
    pub media_library_initialized: bool,
    /// Install the filter that exits the process on a broken channel.
    pub exit_on_channel_error: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cache_stats_delay: DEFAULT_CACHE_STATS_DELAY,
            initial_idle_delay_s: DEFAULT_INITIAL_IDLE_DELAY_S,
            dns_submit_delay: DEFAULT_DNS_SUBMIT_DELAY,
            dns_batch_limit: DEFAULT_DNS_BATCH_LIMIT,
            switches: Switches::empty(),
            media_library_initialized: false,
            // Platforms without process-group cleanup must not leave an
            // orphaned renderer spinning.
            exit_on_channel_error: cfg!(unix),
        }
    }
}

impl ControlConfig {
    /// Defaults with environment overrides and this process's switches.
    #[must_use]
    pub fn for_process() -> Self {
        Self::from_env().with_switches(Switches::from_process())
    }

    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides read through `get_env`.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(ms) = parse_env::<u64>(&get_env, "RCTL_CACHE_STATS_DELAY_MS") {
            config.cache_stats_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_env::<f64>(&get_env, "RCTL_IDLE_INITIAL_DELAY_S") {
            if secs.is_finite() && secs > 0.0 {
                config.initial_idle_delay_s = secs;
            } else {
                tracing::warn!(value = secs, "ignoring non-positive RCTL_IDLE_INITIAL_DELAY_S");
            }
        }
        if let Some(ms) = parse_env::<u64>(&get_env, "RCTL_DNS_SUBMIT_DELAY_MS") {
            config.dns_submit_delay = Duration::from_millis(ms);
        }
        config
    }

    #[must_use]
    pub fn with_switches(mut self, switches: Switches) -> Self {
        self.switches = switches;
        self
    }

    #[must_use]
    pub fn with_cache_stats_delay(mut self, delay: Duration) -> Self {
        self.cache_stats_delay = delay;
        self
    }

    /// Set the initial idle delay. Non-positive values are clamped to the
    /// default.
    #[must_use]
    pub fn with_initial_idle_delay(mut self, secs: f64) -> Self {
        self.initial_idle_delay_s = if secs.is_finite() && secs > 0.0 {
            secs
        } else {
            DEFAULT_INITIAL_IDLE_DELAY_S
        };
        self
    }

    #[must_use]
    pub fn with_dns_submit_delay(mut self, delay: Duration) -> Self {
        self.dns_submit_delay = delay;
        self
    }

    #[must_use]
    pub fn with_dns_batch_limit(mut self, limit: usize) -> Self {
        self.dns_batch_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_media_library(mut self, initialized: bool) -> Self {
        self.media_library_initialized = initialized;
        self
    }

    #[must_use]
    pub fn with_exit_on_channel_error(mut self, enabled: bool) -> Self {
        self.exit_on_channel_error = enabled;
        self
    }
}

fn parse_env<T: std::str::FromStr>(get_env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = get_env(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_production() {
        let config = ControlConfig::default();
        assert_eq!(config.cache_stats_delay, Duration::from_millis(2000));
        assert_eq!(config.initial_idle_delay_s, 1.0);
        assert_eq!(config.dns_batch_limit, 30);
        assert!(config.switches.is_empty());
        assert_eq!(config.exit_on_channel_error, cfg!(unix));
    }

    #[test]
    fn env_overrides_apply() {
        let config = ControlConfig::from_env_with(env(&[
            ("RCTL_CACHE_STATS_DELAY_MS", "500"),
            ("RCTL_IDLE_INITIAL_DELAY_S", "2.5"),
            ("RCTL_DNS_SUBMIT_DELAY_MS", " 20 "),
        ]));
        assert_eq!(config.cache_stats_delay, Duration::from_millis(500));
        assert_eq!(config.initial_idle_delay_s, 2.5);
        assert_eq!(config.dns_submit_delay, Duration::from_millis(20));
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let config = ControlConfig::from_env_with(env(&[
            ("RCTL_CACHE_STATS_DELAY_MS", "soon"),
            ("RCTL_IDLE_INITIAL_DELAY_S", "-1"),
        ]));
        assert_eq!(config.cache_stats_delay, DEFAULT_CACHE_STATS_DELAY);
        assert_eq!(config.initial_idle_delay_s, DEFAULT_INITIAL_IDLE_DELAY_S);
    }

    #[test]
    fn builder_clamps_idle_delay() {
        let config = ControlConfig::default().with_initial_idle_delay(0.0);
        assert_eq!(config.initial_idle_delay_s, DEFAULT_INITIAL_IDLE_DELAY_S);
        let config = ControlConfig::default().with_initial_idle_delay(3.0);
        assert_eq!(config.initial_idle_delay_s, 3.0);
    }

    #[test]
    fn builder_sets_switches() {
        let config = ControlConfig::default().with_switches(Switches::RECORD_MODE);
        assert!(config.switches.wants_playback());
    }
}
