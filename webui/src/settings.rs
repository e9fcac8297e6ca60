//! Settings document shared with the watcher
//!
//! The document is TOML. Only `discord_webhook`, `poll_seconds` and
//! `umbrel_app_base` are managed here; any other keys are carried through
//! saves untouched. Each write goes to its own uniquely named temp file in
//! the same directory, which is then renamed into place, so the watcher never
//! reads a half-written document and concurrent writers never share staging.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_POLL_SECONDS: u64 = 15;
pub const MIN_POLL_SECONDS: u64 = 5;
pub const MAX_POLL_SECONDS: u64 = 300;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Settings task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Webhook must be an http(s) URL")]
    InvalidWebhook,

    #[error("Poll interval must be a whole number of seconds between 5 and 300")]
    InvalidPollSeconds,

    #[error("Pool API base must be an http(s) URL")]
    InvalidBaseUrl,
}

/// Managed settings with defaults filled in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub discord_webhook: String,
    pub poll_seconds: u64,
    pub umbrel_app_base: String,
}

/// Body of a settings update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub discord_webhook: Option<String>,
    #[serde(default)]
    pub poll_seconds: Option<Value>,
    #[serde(default)]
    pub umbrel_app_base: Option<String>,
}

impl SettingsUpdate {
    pub fn validate(self) -> Result<SettingsView, ValidationError> {
        let discord_webhook = self.discord_webhook.unwrap_or_default().trim().to_string();
        if !is_optional_http_url(&discord_webhook) {
            return Err(ValidationError::InvalidWebhook);
        }

        let poll_seconds = match self.poll_seconds {
            None | Some(Value::Null) => DEFAULT_POLL_SECONDS,
            Some(Value::Number(n)) => n.as_u64().ok_or(ValidationError::InvalidPollSeconds)?,
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| ValidationError::InvalidPollSeconds)?,
            Some(_) => return Err(ValidationError::InvalidPollSeconds),
        };
        if !(MIN_POLL_SECONDS..=MAX_POLL_SECONDS).contains(&poll_seconds) {
            return Err(ValidationError::InvalidPollSeconds);
        }

        let umbrel_app_base = self.umbrel_app_base.unwrap_or_default().trim().to_string();
        if !is_optional_http_url(&umbrel_app_base) {
            return Err(ValidationError::InvalidBaseUrl);
        }

        Ok(SettingsView {
            discord_webhook,
            poll_seconds,
            umbrel_app_base,
        })
    }
}

fn is_optional_http_url(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.contains(char::is_whitespace))
}

/// Whole settings document, including keys this service does not manage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    table: toml::Table,
}

impl SettingsDocument {
    /// Read the document; a missing file is an empty document
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::load_blocking(&path)).await?
    }

    fn load_blocking(path: &Path) -> Result<Self, SettingsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Ok(Self {
            table: toml::from_str(&contents)?,
        })
    }

    pub fn view(&self) -> SettingsView {
        let text = |key: &str| match self.table.get(key) {
            Some(toml::Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        let poll_seconds = match self.table.get("poll_seconds") {
            Some(toml::Value::Integer(n)) => u64::try_from(*n).unwrap_or(DEFAULT_POLL_SECONDS),
            Some(toml::Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_POLL_SECONDS),
            _ => DEFAULT_POLL_SECONDS,
        };

        SettingsView {
            discord_webhook: text("discord_webhook"),
            poll_seconds,
            umbrel_app_base: text("umbrel_app_base"),
        }
    }

    pub fn apply(&mut self, settings: &SettingsView) {
        self.table.insert(
            "discord_webhook".to_string(),
            toml::Value::String(settings.discord_webhook.clone()),
        );
        self.table.insert(
            "poll_seconds".to_string(),
            toml::Value::Integer(settings.poll_seconds as i64),
        );
        self.table.insert(
            "umbrel_app_base".to_string(),
            toml::Value::String(settings.umbrel_app_base.clone()),
        );
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.table.get(key)
    }

    /// Replace the document on disk via temp file + rename
    pub async fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let contents = toml::to_string(&self.table)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&path, contents.as_bytes())).await?
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SettingsError> {
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source| SettingsError::Io { path: p, source }
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err(dir))?;

    let mut staged = tempfile::Builder::new()
        .prefix(".settings-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err(dir))?;
    let staged_path = staged.path().to_path_buf();
    staged.write_all(contents).map_err(io_err(&staged_path))?;
    staged.as_file().sync_all().map_err(io_err(&staged_path))?;

    staged.persist(path).map_err(|e| SettingsError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
