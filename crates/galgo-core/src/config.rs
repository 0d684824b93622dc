//! Configuration management for galgo.
//!
//! Loads configuration from ${GALGO_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
/// To update, edit default_config.toml directly.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for galgo configuration and data directories.
    //!
    //! GALGO_HOME resolution order:
    //! 1. GALGO_HOME environment variable (if set)
    //! 2. ~/.config/galgo (default)

    use std::path::PathBuf;

    /// Returns the galgo home directory.
    ///
    /// Checks GALGO_HOME env var first, falls back to ~/.config/galgo
    pub fn galgo_home() -> PathBuf {
        if let Ok(home) = std::env::var("GALGO_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("galgo"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        galgo_home().join("config.toml")
    }

    /// Returns the directory holding mirrored session transcripts.
    pub fn mirror_dir() -> PathBuf {
        galgo_home().join("mirror")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Institutional email that owns the sessions
    pub email: Option<String>,

    /// Base URL of the conversation store
    pub api_base_url: Option<String>,

    /// Base URL of the assistant endpoint
    pub assistant_base_url: Option<String>,
}

impl Config {
    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Resolves the session owner's email with precedence: explicit value
    /// (flag or env) > config file.
    ///
    /// # Errors
    /// Returns an error if no email is available from either source.
    pub fn resolve_email(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(email) = explicit {
            let trimmed = email.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        self.email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .context("No email configured. Pass --email, set GALGO_EMAIL, or set email in config.toml.")
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Resolves a base URL with precedence: env > config > default.
///
/// # Arguments
/// * `config_base_url` - Value from config file (if present)
/// * `env_var` - Environment variable name (e.g., "`GALGO_API_URL`")
/// * `default_url` - Default URL if neither env nor config is set
/// * `endpoint_name` - Human-readable endpoint name for error messages
///
/// # Errors
/// Returns an error if the resolved URL is malformed.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
    endpoint_name: &str,
) -> Result<String> {
    // Try env var first
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, endpoint_name)?;
            return Ok(trimmed.to_string());
        }
    }

    // Try config value
    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, endpoint_name)?;
            return Ok(trimmed.to_string());
        }
    }

    // Default
    Ok(default_url.to_string())
}

/// Validates that a URL is well-formed.
fn validate_url(url: &str, endpoint_name: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid {endpoint_name} base URL: {url}"))?;
    Ok(())
}
