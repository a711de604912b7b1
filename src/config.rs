// ABOUTME: Configuration loading for lockclaw.
// ABOUTME: Reads ~/.lockclaw/config.toml and provides the well-known data paths.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
        }
    }
}

/// Authorization flow configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client identifier sent in the authorization request.
    pub client_id: String,
    /// How long to keep the redirect listener open waiting for the callback.
    pub callback_timeout_seconds: u64,
    /// Default scopes requested when the CLI doesn't pass any.
    pub scopes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: "lockclaw".to_string(),
            callback_timeout_seconds: 300,
            scopes: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from ~/.lockclaw/config.toml, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lockclaw")
    }

    /// Path to the config file.
    pub fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Path to the encrypted secret store.
    pub fn secrets_path() -> PathBuf {
        Self::data_dir().join("secrets.enc")
    }

    /// Path to the persisted permission rule lists.
    pub fn permissions_path() -> PathBuf {
        Self::data_dir().join("permissions.json")
    }

    /// Path to the master key fallback file (lower security tier than the
    /// platform keychain).
    pub fn key_file_path() -> PathBuf {
        Self::data_dir().join("master.key")
    }
}
