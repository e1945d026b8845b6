//! CLI configuration
//!
//! Stored as TOML at `<config dir>/tangle/config.toml`, or wherever
//! `TANGLE_CONFIG` points. Command-line flags take precedence over it.

use std::fmt;
use std::path::PathBuf;

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const FORMATS: &[&str] = &["table", "json"];
const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

pub const DEFAULT_FORMAT: &str = "table";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tangle")
}

/// Location of the config file
pub fn config_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os("TANGLE_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tangle")
        .join("config.toml")
}

/// A settable config entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    #[value(name = "data_dir")]
    DataDir,
    #[value(name = "default_format")]
    DefaultFormat,
    #[value(name = "log_level")]
    LogLevel,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataDir => "data_dir",
            Self::DefaultFormat => "default_format",
            Self::LogLevel => "log_level",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective value of one key, as shown by `config list`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    /// Whether the value comes from the file rather than the built-in default
    pub explicit: bool,
}

/// Configuration for the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load the config file. A missing file yields the defaults; an
    /// unreadable or malformed one is an error naming the path.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        if let Some(format) = &config.default_format {
            check_choice("format", format, FORMATS)?;
        }
        if let Some(level) = &config.log_level {
            check_choice("log level", level, LOG_LEVELS)?;
        }
        Ok(config)
    }

    /// Every key set to its built-in default
    pub fn defaults() -> Self {
        Self {
            data_dir: Some(default_data_dir()),
            default_format: Some(DEFAULT_FORMAT.to_string()),
            log_level: Some(DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_file_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        tracing::debug!("Wrote config to {}", path.display());
        Ok(())
    }

    /// Effective value of `key`, falling back to its default
    pub fn get(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::DataDir => self
                .data_dir
                .clone()
                .unwrap_or_else(default_data_dir)
                .display()
                .to_string(),
            ConfigKey::DefaultFormat => self.format().to_string(),
            ConfigKey::LogLevel => self.log_level().to_string(),
        }
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) -> anyhow::Result<()> {
        match key {
            ConfigKey::DataDir => {
                if value.trim().is_empty() {
                    anyhow::bail!("data_dir cannot be empty");
                }
                self.data_dir = Some(PathBuf::from(value));
            }
            ConfigKey::DefaultFormat => {
                check_choice("format", value, FORMATS)?;
                self.default_format = Some(value.to_string());
            }
            ConfigKey::LogLevel => {
                check_choice("log level", value, LOG_LEVELS)?;
                self.log_level = Some(value.to_string());
            }
        }
        Ok(())
    }

    /// Clear `key` so its default applies again. Returns whether it was set.
    pub fn unset(&mut self, key: ConfigKey) -> bool {
        match key {
            ConfigKey::DataDir => self.data_dir.take().is_some(),
            ConfigKey::DefaultFormat => self.default_format.take().is_some(),
            ConfigKey::LogLevel => self.log_level.take().is_some(),
        }
    }

    pub fn is_set(&self, key: ConfigKey) -> bool {
        match key {
            ConfigKey::DataDir => self.data_dir.is_some(),
            ConfigKey::DefaultFormat => self.default_format.is_some(),
            ConfigKey::LogLevel => self.log_level.is_some(),
        }
    }

    pub fn entries(&self) -> Vec<ConfigEntry> {
        ConfigKey::value_variants()
            .iter()
            .map(|&key| ConfigEntry {
                key: key.as_str(),
                value: self.get(key),
                explicit: self.is_set(key),
            })
            .collect()
    }

    pub fn format(&self) -> &str {
        self.default_format.as_deref().unwrap_or(DEFAULT_FORMAT)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

fn check_choice(what: &str, value: &str, choices: &[&str]) -> anyhow::Result<()> {
    if !choices.contains(&value) {
        anyhow::bail!(
            "Invalid {} '{}'. Expected one of: {}",
            what,
            value,
            choices.join(", ")
        );
    }
    Ok(())
}
