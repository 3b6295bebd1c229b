//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for flowchat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server root URL
    pub server: Option<String>,
    /// Model requested with each message
    pub model: Option<String>,
    /// Drop attached contexts after each send
    pub clear_contexts_after_send: Option<bool>,
    /// Drop attached contexts after creating an agent
    pub clear_contexts_after_agent_create: Option<bool>,
    /// Retries when a response stream cannot be opened
    pub max_retries: Option<u32>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flowchat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FLOWCHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            server: Some("http://localhost:8000".to_string()),
            model: None,
            clear_contexts_after_send: Some(false),
            clear_contexts_after_agent_create: Some(false),
            max_retries: Some(3),
        };

        default_config.save()?;
        Ok(path)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# flowchat configuration file
# Place at ~/.config/flowchat/config.toml (Linux) or set FLOWCHAT_CONFIG_PATH

# Chat server root
server = "http://localhost:8000"

# Model requested with each message (server default when unset)
# model = "qwen3:8b"

# Drop attached contexts once they have been sent
clear_contexts_after_send = false

# Drop attached contexts after /agent succeeds
clear_contexts_after_agent_create = false

# Retries when the server is unreachable or overloaded
max_retries = 3
"#
}
