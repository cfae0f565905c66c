//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use highrate_cddis::{ArchiveConfig, ConverterConfig};
use highrate_core::RetryPolicy;
use serde::Deserialize;

/// Global configuration for highrate
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub archive: ArchiveSection,
    pub retry: RetrySection,
    pub converter: ConverterSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_dir: PathBuf,
    pub keep_intermediates: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("downloads"),
            keep_intermediates: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveSection {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub user: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub password: String,
    pub remote_root: String,
    pub timeout_secs: u64,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        let archive = ArchiveConfig::default();
        Self {
            host: archive.host,
            port: archive.port,
            tls: archive.tls,
            user: archive.user,
            password: archive.password,
            remote_root: archive.remote_root,
            timeout_secs: archive.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_secs: policy.base_delay.as_secs(),
            max_delay_secs: policy.max_delay.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConverterSection {
    /// Program name on PATH, or a path
    pub program: PathBuf,
    pub timeout_secs: u64,
}

impl Default for ConverterSection {
    fn default() -> Self {
        let converter = ConverterConfig::default();
        Self {
            program: converter.program,
            timeout_secs: converter.timeout.as_secs(),
        }
    }
}

/// Deserialize a string that may be an environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_var(&s).unwrap_or_default())
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./highrate.toml (current directory)
    /// 2. ~/.config/highrate/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("highrate.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "highrate") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Engine configuration before per-command overrides
    pub fn engine(&self) -> highrate_cddis::Config {
        highrate_cddis::Config {
            archive: ArchiveConfig {
                host: self.archive.host.clone(),
                port: self.archive.port,
                tls: self.archive.tls,
                user: self.archive.user.clone(),
                password: self.archive.password.clone(),
                remote_root: self.archive.remote_root.clone(),
                timeout: Duration::from_secs(self.archive.timeout_secs),
            },
            output_dir: self.output.default_dir.clone(),
            retry: RetryPolicy {
                max_retries: self.retry.max_retries,
                base_delay: Duration::from_secs(self.retry.base_delay_secs),
                max_delay: Duration::from_secs(self.retry.max_delay_secs),
            },
            converter: ConverterConfig {
                program: self.converter.program.clone(),
                timeout: Duration::from_secs(self.converter.timeout_secs),
            },
            keep_intermediates: self.output.keep_intermediates,
        }
    }
}
