//! Retrieval engine configuration

use std::path::PathBuf;
use std::time::Duration;

use highrate_core::RetryPolicy;

/// Remote archive connection settings
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub host: String,
    pub port: u16,
    /// Explicit FTPS (`AUTH TLS` + protected data channel)
    pub tls: bool,
    pub user: String,
    pub password: String,
    /// Root of the high-rate tree on the server
    pub remote_root: String,
    /// Bound for connect and every socket read/write
    pub timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            host: "gdc.cddis.eosdis.nasa.gov".to_string(),
            port: 21,
            tls: true,
            user: "anonymous".to_string(),
            password: "anonymous".to_string(),
            remote_root: "/gnss/data/highrate".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// External Hatanaka converter settings
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Program name (looked up on PATH) or explicit path
    pub program: PathBuf,
    pub timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("CRX2RNX"),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Runtime configuration for a retrieval batch
#[derive(Debug, Clone)]
pub struct Config {
    pub archive: ArchiveConfig,
    /// Local output root (`<root>/<station>/<year>/<doy>/<hour>/`)
    pub output_dir: PathBuf,
    pub retry: RetryPolicy,
    pub converter: ConverterConfig,
    /// Keep `.crx.gz` after extraction and `.crx` after conversion
    pub keep_intermediates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive: ArchiveConfig::default(),
            output_dir: PathBuf::from("downloads"),
            retry: RetryPolicy::default(),
            converter: ConverterConfig::default(),
            keep_intermediates: true,
        }
    }
}
