//! Minimal configuration loading for hootrpc.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by the peer-engine crates without causing
//! circular dependency issues.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): wire-level addressing and logging -
//!   fixed once an endpoint has called `connect()`/`bind()`.
//!
//! - **Bootstrap** (`BootstrapConfig`): which auth/heartbeat plugins to
//!   construct, their credentials, and call defaults. After construction,
//!   the resolved backend instance is the source of truth, not this config.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hooteconf::RpcConfig;
//!
//! let config = RpcConfig::load().expect("failed to load config");
//!
//! // Infrastructure (fixed)
//! println!("bind: {:?}", config.infra.endpoint.bind);
//! println!("log level: {}", config.infra.telemetry.log_level);
//!
//! // Bootstrap (seeds plugin construction)
//! println!("security plugin: {}", config.bootstrap.plugins.security_plugin);
//! println!("call timeout: {}s", config.bootstrap.defaults.timeout_secs);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/hootrpc/config.toml` (system)
//! 2. `$XDG_CONFIG_HOME/hootrpc/config.toml` (user)
//! 3. `./hootrpc.toml` (local override), or a CLI-supplied path
//! 4. Environment variables (`HOOTRPC_*`)
//!
//! # Example Config
//!
//! ```toml
//! [endpoint]
//! identity = "server-1"
//! bind = "tcp://0.0.0.0:5590"
//!
//! [telemetry]
//! log_level = "debug"
//!
//! [plugins]
//! security_plugin = "trusted"
//! heartbeat_plugin = "interval"
//!
//! [defaults]
//! timeout_secs = 10
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{BootstrapConfig, DefaultsConfig, PluginConfig};
pub use infra::{EndpointConfig, InfraConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete hootrpc configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RpcConfig {
    /// Infrastructure - fixed once bound/connected.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Bootstrap - seeds plugin construction and call defaults.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl RpcConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/hootrpc/config.toml`
    /// 3. `$XDG_CONFIG_HOME/hootrpc/config.toml`
    /// 4. `./hootrpc.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./hootrpc.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = RpcConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# hootrpc configuration\n\n");

        output.push_str("[endpoint]\n");
        if let Some(identity) = &self.infra.endpoint.identity {
            output.push_str(&format!("identity = \"{identity}\"\n"));
        }
        if let Some(peer_identity) = &self.infra.endpoint.peer_identity {
            output.push_str(&format!("peer_identity = \"{peer_identity}\"\n"));
        }
        if let Some(bind) = &self.infra.endpoint.bind {
            output.push_str(&format!("bind = \"{bind}\"\n"));
        }
        if let Some(connect) = &self.infra.endpoint.connect {
            output.push_str(&format!("connect = \"{connect}\"\n"));
        }
        if let Some(proxy_to) = &self.infra.endpoint.proxy_to {
            output.push_str(&format!("proxy_to = \"{proxy_to}\"\n"));
        }

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.infra.telemetry.log_level));

        output.push_str("\n[plugins]\n");
        output.push_str(&format!(
            "security_plugin = \"{}\"\n",
            self.bootstrap.plugins.security_plugin
        ));
        output.push_str(&format!(
            "heartbeat_plugin = \"{}\"\n",
            self.bootstrap.plugins.heartbeat_plugin
        ));

        output.push_str("\n[defaults]\n");
        output.push_str(&format!("timeout_secs = {}\n", self.bootstrap.defaults.timeout_secs));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RpcConfig::default();
        assert_eq!(config.bootstrap.defaults.timeout_secs, 5);
        assert_eq!(config.bootstrap.plugins.security_plugin, "noop");
    }

    #[test]
    fn test_to_toml() {
        let config = RpcConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[endpoint]"));
        assert!(toml.contains("[plugins]"));
        assert!(toml.contains("[defaults]"));
        assert!(toml.contains("timeout_secs = 5"));
    }

    #[test]
    fn test_load_defaults() {
        // Load should work even with no config files present.
        let config = RpcConfig::load().unwrap();
        assert_eq!(config.bootstrap.defaults.timeout_secs, 5);
    }
}
