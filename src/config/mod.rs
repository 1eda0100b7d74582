//! Simulator configuration
//!
//! Configuration comes from an optional YAML file; every field has a default
//! so an empty file (or no file) yields a working simulator. Command-line
//! flags are applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::{DeviceProfile, ResourceProfile};

/// Default API port
pub const DEFAULT_PORT: u16 = 8282;

/// Default bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Default per-request deadline in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const GIB: u64 = 1024 * 1024 * 1024;

/// Errors for loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// The complete configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Resources given to nodes registered without a profile
    #[serde(default, rename = "defaultProfile")]
    pub default_profile: ProfileConfig,

    /// Simulated accelerators attached to every node
    #[serde(default)]
    pub devices: DeviceProfile,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr", rename = "bindAddr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline for a single lifecycle request
    #[serde(default = "default_request_timeout", rename = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Baseline node resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_cpu")]
    pub cpu: u32,

    #[serde(default = "default_memory_gib", rename = "memoryGib")]
    pub memory_gib: u64,

    #[serde(default = "default_pods")]
    pub pods: u32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory_gib: default_memory_gib(),
            pods: default_pods(),
        }
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_cpu() -> u32 {
    32
}

fn default_memory_gib() -> u64 {
    256
}

fn default_pods() -> u32 {
    110
}

impl SimulatorConfig {
    /// Address the API server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_addr, self.server.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Baseline profile including the accelerator resource
    pub fn resource_profile(&self) -> ResourceProfile {
        ResourceProfile {
            cpu: self.default_profile.cpu,
            memory: self.default_profile.memory_gib.saturating_mul(GIB),
            pods: self.default_profile.pods,
            accelerator: Some((
                self.devices.resource_name.clone(),
                u64::from(self.devices.count),
            )),
        }
    }

    /// Reject settings that would register unusable nodes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.requestTimeoutSecs must be non-zero".into(),
            ));
        }
        let profile = &self.default_profile;
        if profile.cpu == 0 || profile.memory_gib == 0 || profile.pods == 0 {
            return Err(ConfigError::Invalid(
                "defaultProfile cpu, memoryGib and pods must be non-zero".into(),
            ));
        }
        if profile.memory_gib.checked_mul(GIB).is_none() {
            return Err(ConfigError::Invalid(format!(
                "defaultProfile.memoryGib {} does not fit in bytes",
                profile.memory_gib
            )));
        }
        if self.devices.count == 0 {
            return Err(ConfigError::Invalid("devices.count must be non-zero".into()));
        }
        if self.devices.resource_name.is_empty() || self.devices.device_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "devices.resourceName and devices.devicePrefix must be set".into(),
            ));
        }
        Ok(())
    }
}

/// Parse and validate config from a YAML string
pub fn parse_config(content: &str) -> Result<SimulatorConfig, ConfigError> {
    let config: SimulatorConfig = if content.trim().is_empty() {
        SimulatorConfig::default()
    } else {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?
    };
    config.validate()?;
    Ok(config)
}

/// Load config from a file.
/// This is the I/O boundary - it reads the file and delegates to `parse_config`.
pub fn load_config_file(path: &Path) -> Result<SimulatorConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
