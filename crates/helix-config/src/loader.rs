//! Configuration file loading.
//!
//! Supports TOML, JSON, and JSON5, auto-detected from the file extension.
//! Every load runs cross-field validation before the configuration is
//! handed out.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::types::HelixConfig;
use crate::validation::validate;

/// Supported configuration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Json5,
}

impl ConfigFormat {
    /// Detects the format from a file extension.
    pub fn from_extension(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some("json5") => Ok(ConfigFormat::Json5),
            other => Err(anyhow!(
                "unsupported config extension {:?} for '{}' (expected .toml, .json, or .json5)",
                other,
                path.display()
            )),
        }
    }
}

/// Parses configuration text in the given format and validates it.
pub fn load_from_str(text: &str, format: ConfigFormat) -> Result<HelixConfig> {
    let config: HelixConfig = match format {
        ConfigFormat::Toml => toml::from_str(text).context("failed to parse TOML config")?,
        ConfigFormat::Json => {
            serde_json::from_str(text).context("failed to parse JSON config")?
        }
        ConfigFormat::Json5 => json5::from_str(text).context("failed to parse JSON5 config")?,
    };
    validate(&config)?;
    Ok(config)
}

/// Loads and validates a configuration file, auto-detecting the format.
pub fn load_config(path: impl AsRef<Path>) -> Result<HelixConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::from_extension(path)?;
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    tracing::debug!(path = %path.display(), ?format, "loading configuration");
    load_from_str(&text, format)
        .with_context(|| format!("invalid config file '{}'", path.display()))
}
