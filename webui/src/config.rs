use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Files shared with the watcher process
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Settings document the watcher re-reads every poll
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
    /// Watcher state file, used for liveness
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            state_path: default_state_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("/data/settings.toml")
}

fn default_state_path() -> PathBuf {
    PathBuf::from("/data/state.json")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // Optional config file, then environment overrides
        let config_path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "/data/webui.toml".to_string());

        let mut config = if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        if let Ok(val) = std::env::var("WEBUI_HOST") {
            config.server.host = val;
        }
        if let Ok(val) = std::env::var("WEBUI_PORT") {
            if let Ok(port) = val.parse() {
                config.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("SETTINGS_FILE") {
            config.files.settings_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("STATE_FILE") {
            config.files.state_path = PathBuf::from(val);
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            files: FilesConfig::default(),
        }
    }
}
