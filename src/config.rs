use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::email::IdentityPolicy;

const APP_NAME: &str = "mailpurge";
const CLIENT_SECRET_FILE: &str = "client_secret.json";
const TOKEN_CACHE_FILE: &str = "tokens.json";
const SETTINGS_FILE: &str = "settings.toml";

/// How the mailbox provider removes a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteMode {
    /// Move to Trash (recoverable for 30 days)
    #[default]
    Trash,
    /// Delete immediately and permanently
    Permanent,
}

/// Runtime settings, read from settings.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP server binds to
    pub listen_addr: String,
    /// Hard cap on messages scanned per index build
    pub max_messages: usize,
    /// In-flight metadata fetches per build
    pub metadata_concurrency: usize,
    /// In-flight delete requests per batch
    pub delete_concurrency: usize,
    pub delete_mode: DeleteMode,
    pub identity: IdentityPolicy,
    /// Optional provider search filter, e.g. "in:inbox"
    pub query: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            max_messages: 500,
            metadata_concurrency: 10,
            delete_concurrency: 25,
            delete_mode: DeleteMode::default(),
            identity: IdentityPolicy::default(),
            query: None,
        }
    }
}

impl Settings {
    /// Parses settings from TOML text and validates them
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).context("Failed to parse settings.toml")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_messages == 0 {
            anyhow::bail!("max_messages must be at least 1");
        }
        if self.metadata_concurrency == 0 {
            anyhow::bail!("metadata_concurrency must be at least 1");
        }
        if self.delete_concurrency == 0 {
            anyhow::bail!("delete_concurrency must be at least 1");
        }
        Ok(())
    }
}

/// Returns the configuration directory path
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .context("Failed to determine config directory")
}

/// Returns the path to the OAuth client secret
pub fn client_secret_path() -> Result<PathBuf> {
    config_dir().map(|p| p.join(CLIENT_SECRET_FILE))
}

/// Returns the path where OAuth tokens are persisted
pub fn token_cache_path() -> Result<PathBuf> {
    config_dir().map(|p| p.join(TOKEN_CACHE_FILE))
}

/// Returns the path to the settings file
pub fn settings_path() -> Result<PathBuf> {
    config_dir().map(|p| p.join(SETTINGS_FILE))
}

/// Ensures the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir()?;
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
    }
    Ok(dir)
}

/// Loads settings from the given file, or the default location.
/// A missing default file yields default settings; a missing explicit file is an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (settings_path()?, false),
    };

    if !explicit && !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read settings from {:?}", path))?;
    Settings::from_toml(&content)
}
