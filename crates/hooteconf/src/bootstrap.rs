//! Bootstrap configuration - seeds which plugins an endpoint constructs
//! and with what credentials; once the endpoint has resolved a plugin
//! name to a concrete backend (see `hootrpc_core::auth::by_name` /
//! `hootrpc_core::heartbeat::by_name`), the backend instance becomes the
//! runtime's source of truth, not this config.

use serde::{Deserialize, Serialize};

/// Which auth/heartbeat plugins to construct, and the credential material
/// to hand them. Mirrors the constructor options enumerated in
/// SPEC_FULL.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Name of the auth backend to adapt (`"noop"`, `"trusted"`, `"curve"`).
    #[serde(default = "PluginConfig::default_security_plugin")]
    pub security_plugin: String,

    /// Name of the heartbeat backend to adapt (`"noop"`, `"interval"`).
    #[serde(default = "PluginConfig::default_heartbeat_plugin")]
    pub heartbeat_plugin: String,

    /// This endpoint's CURVE public key, if `security_plugin = "curve"`.
    #[serde(default)]
    pub public_key: Option<String>,

    /// This endpoint's CURVE secret key.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// The remote peer's CURVE public key, for a client connecting to a
    /// known server.
    #[serde(default)]
    pub peer_public_key: Option<String>,

    /// Password credential, for auth backends that use one instead of (or
    /// alongside) key material.
    #[serde(default)]
    pub password: Option<String>,
}

impl PluginConfig {
    fn default_security_plugin() -> String {
        "noop".to_string()
    }

    fn default_heartbeat_plugin() -> String {
        "noop".to_string()
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            security_plugin: Self::default_security_plugin(),
            heartbeat_plugin: Self::default_heartbeat_plugin(),
            public_key: None,
            secret_key: None,
            peer_public_key: None,
            password: None,
        }
    }
}

/// Default runtime policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Per-call wall-clock timeout, in seconds (SPEC_FULL.md §5, default 5).
    #[serde(default = "DefaultsConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DefaultsConfig {
    fn default_timeout_secs() -> u64 {
        5
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Bootstrap configuration - seeds plugin selection and call defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Auth/heartbeat plugin selection and credentials.
    #[serde(default)]
    pub plugins: PluginConfig,

    /// Call defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_defaults() {
        let plugins = PluginConfig::default();
        assert_eq!(plugins.security_plugin, "noop");
        assert_eq!(plugins.heartbeat_plugin, "noop");
        assert!(plugins.public_key.is_none());
    }

    #[test]
    fn test_defaults_config() {
        let defaults = DefaultsConfig::default();
        assert_eq!(defaults.timeout_secs, 5);
    }
}
