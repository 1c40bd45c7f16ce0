use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_API_URL: &str = "PUBLIC_API_URL";
pub const ENV_WS_URL: &str = "PUBLIC_WS_URL";

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Invalid URL '{url}': expected {expected}")]
    InvalidUrl { url: String, expected: &'static str },
}

/// Backend locations. Only the two base URLs are configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub api_url: String,
    pub ws_url: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
        }
    }
}

impl ClientSettings {
    pub fn new(api_url: impl Into<String>, ws_url: impl Into<String>) -> Result<Self, SettingsError> {
        Self {
            api_url: api_url.into(),
            ws_url: ws_url.into(),
        }
        .normalized()
    }

    /// Trim trailing slashes and check the URL schemes.
    pub fn normalized(self) -> Result<Self, SettingsError> {
        let api_url = normalize_url(&self.api_url, &["http", "https"], "http:// or https://")?;
        let ws_url = normalize_url(&self.ws_url, &["ws", "wss"], "ws:// or wss://")?;
        Ok(Self { api_url, ws_url })
    }

    /// Apply `PUBLIC_API_URL` / `PUBLIC_WS_URL` on top of these settings.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(api_url) = env_non_empty(ENV_API_URL) {
            self.api_url = api_url;
        }
        if let Some(ws_url) = env_non_empty(ENV_WS_URL) {
            self.ws_url = ws_url;
        }
        self
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_url(raw: &str, schemes: &[&str], expected: &'static str) -> Result<String, SettingsError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = || SettingsError::InvalidUrl {
        url: raw.to_string(),
        expected,
    };

    let parsed = url::Url::parse(trimmed).map_err(|_| invalid())?;
    if !schemes.contains(&parsed.scheme()) || parsed.host_str().is_none() {
        return Err(invalid());
    }

    Ok(trimmed.to_string())
}

pub fn get_settings_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
    config_dir.join("yourapp").join("settings.json")
}

pub fn load_settings_from(path: &Path) -> Result<ClientSettings, SettingsError> {
    if !path.exists() {
        return Ok(ClientSettings::default());
    }

    let contents = std::fs::read_to_string(path)?;
    let settings = serde_json::from_str(&contents)?;
    Ok(settings)
}

pub fn save_settings_to(path: &Path, settings: &ClientSettings) -> Result<(), SettingsError> {
    // Ensure directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, contents)?;

    log::info!("Settings saved to {:?}", path);
    Ok(())
}

pub fn load_settings() -> Result<ClientSettings, SettingsError> {
    load_settings_from(&get_settings_path())
}

pub fn save_settings(settings: &ClientSettings) -> Result<(), SettingsError> {
    save_settings_to(&get_settings_path(), settings)
}

/// Settings file, then environment overrides, then validation.
pub fn resolve_settings() -> Result<ClientSettings, SettingsError> {
    load_settings()?.with_env_overrides().normalized()
}
