//! Configuration for the ATH watcher
//!
//! Two layers:
//! - `WatcherConfig`: file paths, proxy credential and log level, resolved once at startup
//! - `Settings`: the operator-editable document, re-read at the start of every poll cycle

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Poll interval used when neither the settings document nor the environment sets one
pub const DEFAULT_POLL_SECONDS: u64 = 15;

/// Accepted poll interval range (seconds)
pub const MIN_POLL_SECONDS: u64 = 5;
pub const MAX_POLL_SECONDS: u64 = 300;

/// Pool API base used when nothing else is configured
pub const DEFAULT_POOL_API_BASE: &str = "http://umbrel.local:21212";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Process-level configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Settings document written by the web UI
    pub settings_path: PathBuf,

    /// Persisted tracker state
    pub state_path: PathBuf,

    /// Umbrel app proxy token, sent as a cookie to the pool API
    pub proxy_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("/data/settings.toml")
}

fn default_state_path() -> PathBuf {
    PathBuf::from("/data/state.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            state_path: default_state_path(),
            proxy_token: None,
            log_level: default_log_level(),
        }
    }
}

impl WatcherConfig {
    /// Defaults with environment variable overrides applied
    pub fn load_with_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SETTINGS_FILE") {
            config.settings_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("STATE_FILE") {
            config.state_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("UMBREL_PROXY_TOKEN") {
            let token = val.trim();
            if !token.is_empty() {
                config.proxy_token = Some(token.to_string());
            }
        }
        if let Ok(val) = std::env::var("WATCHER_LOG_LEVEL") {
            config.log_level = val;
        }

        config
    }
}

/// Operator-editable settings document
///
/// Fields of the wrong type are treated as absent instead of failing the
/// whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub discord_webhook: String,
    pub poll_seconds: Option<u64>,
    pub umbrel_app_base: String,
}

impl Settings {
    /// Load the settings document. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let table: toml::Table = toml::from_str(&contents)?;
        Ok(Self::from_table(&table))
    }

    pub fn from_table(table: &toml::Table) -> Self {
        Self {
            discord_webhook: string_value(table.get("discord_webhook")),
            poll_seconds: table.get("poll_seconds").and_then(seconds_value),
            umbrel_app_base: string_value(table.get("umbrel_app_base")),
        }
    }
}

fn string_value(value: Option<&toml::Value>) -> String {
    match value {
        Some(toml::Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

fn seconds_value(value: &toml::Value) -> Option<u64> {
    match value {
        toml::Value::Integer(n) => u64::try_from(*n).ok(),
        toml::Value::String(s) => s.trim().parse().ok(),
        toml::Value::Float(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
        _ => None,
    }
}

/// Environment fallbacks, captured once so resolution stays a pure read of the file
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    /// `POLL_SECONDS`
    pub poll_seconds: Option<String>,
    /// `UMBREL_APP_BASE`
    pub app_base: Option<String>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        Self {
            poll_seconds: std::env::var("POLL_SECONDS").ok(),
            app_base: std::env::var("UMBREL_APP_BASE").ok(),
        }
    }
}

/// Settings in effect for one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    /// Webhook URL; empty means notifications are disabled
    pub notification_target: String,
    pub poll_interval: Duration,
    /// Pool API base URL without trailing slash
    pub pool_api_base: String,
}

impl EffectiveSettings {
    pub fn notifications_enabled(&self) -> bool {
        !self.notification_target.is_empty()
    }
}

/// Resolves `EffectiveSettings` from the settings document on every call
#[derive(Debug, Clone)]
pub struct SettingsProvider {
    path: PathBuf,
    env: EnvDefaults,
}

impl SettingsProvider {
    pub fn new(path: impl Into<PathBuf>, env: EnvDefaults) -> Self {
        Self {
            path: path.into(),
            env,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings document and apply fallbacks. Never fails: an
    /// unreadable or malformed document resolves to the defaults.
    pub async fn resolve(&self) -> EffectiveSettings {
        let settings = match Settings::load(&self.path).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Using default settings");
                Settings::default()
            }
        };

        let poll_seconds = settings
            .poll_seconds
            .or_else(|| {
                self.env
                    .poll_seconds
                    .as_deref()
                    .and_then(|s| s.trim().parse().ok())
            })
            .unwrap_or(DEFAULT_POLL_SECONDS)
            .clamp(MIN_POLL_SECONDS, MAX_POLL_SECONDS);

        let base = if !settings.umbrel_app_base.is_empty() {
            settings.umbrel_app_base
        } else {
            self.env
                .app_base
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_POOL_API_BASE)
                .to_string()
        };

        let resolved = EffectiveSettings {
            notification_target: settings.discord_webhook,
            poll_interval: Duration::from_secs(poll_seconds),
            pool_api_base: base.trim_end_matches('/').to_string(),
        };
        debug!(?resolved, "Resolved settings");
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with(contents: Option<&str>, env: EnvDefaults) -> (tempfile::TempDir, SettingsProvider) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        if let Some(contents) = contents {
            std::fs::write(&path, contents).unwrap();
        }
        (dir, SettingsProvider::new(path, env))
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let (_dir, provider) = provider_with(None, EnvDefaults::default());
        let settings = provider.resolve().await;

        assert_eq!(settings.notification_target, "");
        assert!(!settings.notifications_enabled());
        assert_eq!(settings.poll_interval, Duration::from_secs(DEFAULT_POLL_SECONDS));
        assert_eq!(settings.pool_api_base, DEFAULT_POOL_API_BASE);
    }

    #[tokio::test]
    async fn test_document_values() {
        let (_dir, provider) = provider_with(
            Some(
                r#"
discord_webhook = " https://discord.com/api/webhooks/1/abc "
poll_seconds = 30
umbrel_app_base = "http://10.0.0.5:21212/"
extra = "kept by the web ui"
"#,
            ),
            EnvDefaults::default(),
        );
        let settings = provider.resolve().await;

        assert_eq!(settings.notification_target, "https://discord.com/api/webhooks/1/abc");
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.pool_api_base, "http://10.0.0.5:21212");
    }

    #[tokio::test]
    async fn test_env_fallbacks() {
        let env = EnvDefaults {
            poll_seconds: Some("45".to_string()),
            app_base: Some("http://pool.lan:8080/".to_string()),
        };
        let (_dir, provider) = provider_with(Some("umbrel_app_base = \"\"\n"), env);
        let settings = provider.resolve().await;

        assert_eq!(settings.poll_interval, Duration::from_secs(45));
        assert_eq!(settings.pool_api_base, "http://pool.lan:8080");
    }

    #[tokio::test]
    async fn test_document_wins_over_env() {
        let env = EnvDefaults {
            poll_seconds: Some("45".to_string()),
            app_base: None,
        };
        let (_dir, provider) = provider_with(Some("poll_seconds = 20\n"), env);

        assert_eq!(provider.resolve().await.poll_interval, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_poll_seconds_clamped_and_tolerant() {
        let (_dir, provider) = provider_with(Some("poll_seconds = 1\n"), EnvDefaults::default());
        assert_eq!(provider.resolve().await.poll_interval, Duration::from_secs(MIN_POLL_SECONDS));

        let (_dir, provider) = provider_with(Some("poll_seconds = 100000\n"), EnvDefaults::default());
        assert_eq!(provider.resolve().await.poll_interval, Duration::from_secs(MAX_POLL_SECONDS));

        let (_dir, provider) = provider_with(Some("poll_seconds = \"60\"\n"), EnvDefaults::default());
        assert_eq!(provider.resolve().await.poll_interval, Duration::from_secs(60));

        let (_dir, provider) = provider_with(Some("poll_seconds = -3\n"), EnvDefaults::default());
        assert_eq!(provider.resolve().await.poll_interval, Duration::from_secs(DEFAULT_POLL_SECONDS));
    }

    #[tokio::test]
    async fn test_malformed_document_falls_back() {
        let (_dir, provider) = provider_with(Some("discord_webhook = [unterminated"), EnvDefaults::default());
        let settings = provider.resolve().await;

        assert!(!settings.notifications_enabled());
        assert_eq!(settings.pool_api_base, DEFAULT_POOL_API_BASE);
    }

    #[tokio::test]
    async fn test_wrong_typed_field_is_absent() {
        let (_dir, provider) = provider_with(
            Some("discord_webhook = 42\npoll_seconds = 25\n"),
            EnvDefaults::default(),
        );
        let settings = provider.resolve().await;

        assert_eq!(settings.notification_target, "");
        assert_eq!(settings.poll_interval, Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_edits_seen_on_next_resolve() {
        let (_dir, provider) = provider_with(Some("poll_seconds = 10\n"), EnvDefaults::default());
        assert_eq!(provider.resolve().await.poll_interval, Duration::from_secs(10));

        std::fs::write(
            provider.path(),
            "poll_seconds = 90\ndiscord_webhook = \"https://hooks.example/x\"\n",
        )
        .unwrap();
        let settings = provider.resolve().await;
        assert_eq!(settings.poll_interval, Duration::from_secs(90));
        assert!(settings.notifications_enabled());
    }
}
