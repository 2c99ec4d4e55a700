//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::target::{HandlerCapabilities, HandlerTarget};
use crate::dispatch::DEFAULT_BROWSER;
use crate::profiles::{Profile, Workspace};
use crate::routing::RolloutFlags;
use crate::rules::store::StorePaths;

/// Root configuration for the link router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Rule store location.
    pub store: StoreConfig,

    /// Legacy / new engine switches.
    pub rollout: RolloutFlags,

    pub dispatch: DispatchConfig,

    pub legacy: LegacyConfig,

    pub observability: ObservabilityConfig,

    /// How handlers are launched.
    pub launcher: LauncherConfig,

    /// Installed handler programs, in discovery order.
    pub handlers: Vec<HandlerConfig>,

    pub profiles: Vec<Profile>,

    pub workspaces: Vec<Workspace>,
}

/// Rule store file locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub backup_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let dir = default_data_dir();
        Self {
            path: dir.join("rules.json"),
            backup_path: dir.join("rules.backup.json"),
        }
    }
}

impl StoreConfig {
    pub fn paths(&self) -> StorePaths {
        StorePaths::new(self.path.clone(), self.backup_path.clone())
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".linkroute")
}

/// Dispatch orchestration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Window in which a repeated reference is refused.
    pub loop_guard_ttl_ms: u64,

    /// Loop guard capacity.
    pub max_guard_entries: usize,

    /// Used when the preferred handler is not installed.
    pub default_browser: String,

    /// Configured fallback consulted before the default browser.
    pub fallback_target: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            loop_guard_ttl_ms: 2_000,
            max_guard_entries: 256,
            default_browser: DEFAULT_BROWSER.to_string(),
            fallback_target: None,
        }
    }
}

impl DispatchConfig {
    pub fn loop_guard_ttl(&self) -> Duration {
        Duration::from_millis(self.loop_guard_ttl_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Decision latency budget in milliseconds.
    pub decision_budget_ms: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self { decision_budget_ms: 1_500 }
    }
}

impl LegacyConfig {
    pub fn decision_budget(&self) -> Duration {
        Duration::from_millis(self.decision_budget_ms)
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log full references instead of redacted ones.
    pub debug_urls: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_urls: false,
        }
    }
}

/// External launcher settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub program: String,

    /// Argument template with `{url}`, `{location}` and `{target}` placeholders.
    pub args: Vec<String>,

    /// The router's own id, never offered as a target.
    pub self_id: Option<String>,

    /// Handler ids hidden from discovery.
    pub hidden: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            program: "open".to_string(),
            args: vec!["-a".into(), "{location}".into(), "{url}".into()],
            self_id: None,
            hidden: Vec::new(),
        }
    }
}

/// One installed handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerConfig {
    pub id: String,

    pub display_name: String,

    /// Path or name passed to the launcher as `{location}`.
    pub location: String,

    #[serde(default)]
    pub schemes: Vec<String>,

    #[serde(default)]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub mime_types: Vec<String>,

    #[serde(default)]
    pub supports_profiles: bool,

    #[serde(default)]
    pub supports_workspaces: bool,
}

impl HandlerConfig {
    pub fn to_target(&self) -> HandlerTarget {
        HandlerTarget::new(self.id.trim(), self.display_name.trim(), self.location.trim()).with_capabilities(
            HandlerCapabilities::new(
                &self.schemes,
                &self.extensions,
                &self.mime_types,
                self.supports_profiles,
                self.supports_workspaces,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: RouterConfig = toml::from_str("").unwrap();
        assert_eq!(config.dispatch.loop_guard_ttl(), Duration::from_secs(2));
        assert_eq!(config.dispatch.max_guard_entries, 256);
        assert_eq!(config.dispatch.default_browser, "com.apple.Safari");
        assert_eq!(config.legacy.decision_budget(), Duration::from_millis(1500));
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.rollout.enable_new_engine);
        assert!(config.handlers.is_empty());
        assert!(config.launcher.args.iter().any(|a| a == "{url}"));
    }

    #[test]
    fn test_full_file() {
        let config: RouterConfig = toml::from_str(
            r#"
            [store]
            path = "/tmp/lr/rules.json"
            backup_path = "/tmp/lr/rules.bak"

            [rollout]
            enable_shadow_comparison = true

            [dispatch]
            fallback_target = "org.mozilla.firefox"

            [[handlers]]
            id = "com.google.Chrome"
            display_name = "Chrome"
            location = "/Applications/Google Chrome.app"
            schemes = ["HTTPS", "http", "https"]
            supports_profiles = true

            [[profiles]]
            id = "profile:com.google.chrome:work"
            target_id = "com.google.chrome"
            display_name = "Work"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.paths().backup, PathBuf::from("/tmp/lr/rules.bak"));
        assert!(config.rollout.enable_shadow_comparison);
        assert_eq!(config.dispatch.fallback_target.as_deref(), Some("org.mozilla.firefox"));

        let target = config.handlers[0].to_target();
        assert_eq!(target.capabilities.schemes, vec!["http", "https"]);
        assert!(target.capabilities.supports_profiles);
        assert_eq!(config.profiles.len(), 1);
    }
}
