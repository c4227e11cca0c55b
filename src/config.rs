//! Configuration file (`config.toml` in the platform config directory)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_BEACON_INTERVAL, DEFAULT_READ_TIMEOUT_MS, DEFAULT_RECV_BUFFER_SIZE};
use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub receptor: ReceptorConfig,
}

/// Fields announced in service beacons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    /// Empty means the machine's host name
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_comment: String,
    /// `0xRRGGBB`
    #[serde(default)]
    pub color_rgb: u32,
    #[serde(default)]
    pub distant_ip: String,
    #[serde(default)]
    pub distant_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptorConfig {
    /// Loop iterations between two service beacons
    #[serde(default = "default_beacon_interval")]
    pub beacon_interval: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

fn default_language() -> String { "en-us".to_string() }
fn default_manufacturer() -> String { "vban-link".to_string() }
fn default_beacon_interval() -> u32 { DEFAULT_BEACON_INTERVAL }
fn default_read_timeout_ms() -> u64 { DEFAULT_READ_TIMEOUT_MS }
fn default_recv_buffer_size() -> usize { DEFAULT_RECV_BUFFER_SIZE }

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            device_name: String::new(),
            manufacturer: default_manufacturer(),
            host_name: String::new(),
            user_name: String::new(),
            user_comment: String::new(),
            color_rgb: 0,
            distant_ip: String::new(),
            distant_port: 0,
        }
    }
}

impl Default for ReceptorConfig {
    fn default() -> Self {
        Self {
            beacon_interval: DEFAULT_BEACON_INTERVAL,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receptor.beacon_interval == 0 {
            return Err(ConfigError::Invalid(
                "receptor.beacon_interval must be at least 1".to_string(),
            ));
        }
        if self.identity.color_rgb > 0x00ff_ffff {
            return Err(ConfigError::Invalid(format!(
                "identity.color_rgb {:#x} is not an RGB value",
                self.identity.color_rgb
            )));
        }
        Ok(())
    }
}

pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "vban-link", "vban-link")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file location
pub fn default_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Parse a config from TOML text; `path` is only used in errors
pub fn parse(content: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration
///
/// An explicit path must exist. The default location is optional and falls
/// back to defaults when absent. A malformed file is always an error.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_path() {
            Some(path) => (path, false),
            None => return Ok(Config::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let config = parse(&content, &path)?;
            tracing::debug!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(source) => Err(ConfigError::Read { path, source }),
    }
}
