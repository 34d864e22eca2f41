//! Config file discovery, loading, and environment variable overlay.

use crate::{BootstrapConfig, ConfigError, InfraConfig, RpcConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/hootrpc/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("hootrpc/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("hootrpc.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<RpcConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string.
fn parse_toml(contents: &str, path: &Path) -> Result<RpcConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut infra = InfraConfig::default();
    if let Some(endpoint) = table.get("endpoint").and_then(|v| v.as_table()) {
        if let Some(v) = endpoint.get("identity").and_then(|v| v.as_str()) {
            infra.endpoint.identity = Some(v.to_string());
        }
        if let Some(v) = endpoint.get("peer_identity").and_then(|v| v.as_str()) {
            infra.endpoint.peer_identity = Some(v.to_string());
        }
        if let Some(v) = endpoint.get("bind").and_then(|v| v.as_str()) {
            infra.endpoint.bind = Some(expand_endpoint(v));
        }
        if let Some(v) = endpoint.get("connect").and_then(|v| v.as_str()) {
            infra.endpoint.connect = Some(expand_endpoint(v));
        }
        if let Some(v) = endpoint.get("proxy_to").and_then(|v| v.as_str()) {
            infra.endpoint.proxy_to = Some(v.to_string());
        }
    }
    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            infra.telemetry.log_level = v.to_string();
        }
    }

    let mut bootstrap = BootstrapConfig::default();
    if let Some(plugins) = table.get("plugins").and_then(|v| v.as_table()) {
        if let Some(v) = plugins.get("security_plugin").and_then(|v| v.as_str()) {
            bootstrap.plugins.security_plugin = v.to_string();
        }
        if let Some(v) = plugins.get("heartbeat_plugin").and_then(|v| v.as_str()) {
            bootstrap.plugins.heartbeat_plugin = v.to_string();
        }
        if let Some(v) = plugins.get("public_key").and_then(|v| v.as_str()) {
            bootstrap.plugins.public_key = Some(v.to_string());
        }
        if let Some(v) = plugins.get("secret_key").and_then(|v| v.as_str()) {
            bootstrap.plugins.secret_key = Some(v.to_string());
        }
        if let Some(v) = plugins.get("peer_public_key").and_then(|v| v.as_str()) {
            bootstrap.plugins.peer_public_key = Some(v.to_string());
        }
        if let Some(v) = plugins.get("password").and_then(|v| v.as_str()) {
            bootstrap.plugins.password = Some(v.to_string());
        }
    }
    if let Some(defaults) = table.get("defaults").and_then(|v| v.as_table()) {
        if let Some(v) = defaults.get("timeout_secs").and_then(|v| v.as_integer()) {
            bootstrap.defaults.timeout_secs = v as u64;
        }
    }

    Ok(RpcConfig { infra, bootstrap })
}

/// Merge two configs, with `overlay` taking precedence field-by-field.
/// A field counts as "set" in the overlay when it differs from the
/// compiled default (`Option` fields: `Some` at all).
pub fn merge_configs(base: RpcConfig, overlay: RpcConfig) -> RpcConfig {
    let default_telemetry = crate::TelemetryConfig::default();
    let default_plugins = crate::PluginConfig::default();
    let default_defaults = crate::DefaultsConfig::default();

    RpcConfig {
        infra: InfraConfig {
            endpoint: crate::EndpointConfig {
                identity: overlay.infra.endpoint.identity.or(base.infra.endpoint.identity),
                peer_identity: overlay
                    .infra
                    .endpoint
                    .peer_identity
                    .or(base.infra.endpoint.peer_identity),
                bind: overlay.infra.endpoint.bind.or(base.infra.endpoint.bind),
                connect: overlay.infra.endpoint.connect.or(base.infra.endpoint.connect),
                proxy_to: overlay.infra.endpoint.proxy_to.or(base.infra.endpoint.proxy_to),
            },
            telemetry: crate::TelemetryConfig {
                log_level: if overlay.infra.telemetry.log_level != default_telemetry.log_level {
                    overlay.infra.telemetry.log_level
                } else {
                    base.infra.telemetry.log_level
                },
            },
        },
        bootstrap: BootstrapConfig {
            plugins: crate::PluginConfig {
                security_plugin: if overlay.bootstrap.plugins.security_plugin != default_plugins.security_plugin {
                    overlay.bootstrap.plugins.security_plugin
                } else {
                    base.bootstrap.plugins.security_plugin
                },
                heartbeat_plugin: if overlay.bootstrap.plugins.heartbeat_plugin != default_plugins.heartbeat_plugin {
                    overlay.bootstrap.plugins.heartbeat_plugin
                } else {
                    base.bootstrap.plugins.heartbeat_plugin
                },
                public_key: overlay.bootstrap.plugins.public_key.or(base.bootstrap.plugins.public_key),
                secret_key: overlay.bootstrap.plugins.secret_key.or(base.bootstrap.plugins.secret_key),
                peer_public_key: overlay
                    .bootstrap
                    .plugins
                    .peer_public_key
                    .or(base.bootstrap.plugins.peer_public_key),
                password: overlay.bootstrap.plugins.password.or(base.bootstrap.plugins.password),
            },
            defaults: crate::DefaultsConfig {
                timeout_secs: if overlay.bootstrap.defaults.timeout_secs != default_defaults.timeout_secs {
                    overlay.bootstrap.defaults.timeout_secs
                } else {
                    base.bootstrap.defaults.timeout_secs
                },
            },
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut RpcConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("HOOTRPC_IDENTITY") {
        config.infra.endpoint.identity = Some(v);
        sources.env_overrides.push("HOOTRPC_IDENTITY".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_PEER_IDENTITY") {
        config.infra.endpoint.peer_identity = Some(v);
        sources.env_overrides.push("HOOTRPC_PEER_IDENTITY".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_BIND") {
        config.infra.endpoint.bind = Some(expand_endpoint(&v));
        sources.env_overrides.push("HOOTRPC_BIND".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_CONNECT") {
        config.infra.endpoint.connect = Some(expand_endpoint(&v));
        sources.env_overrides.push("HOOTRPC_CONNECT".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_PROXY_TO") {
        config.infra.endpoint.proxy_to = Some(v);
        sources.env_overrides.push("HOOTRPC_PROXY_TO".to_string());
    }

    if let Ok(v) = env::var("HOOTRPC_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("HOOTRPC_LOG_LEVEL".to_string());
    }
    // Also support the ecosystem-standard env var.
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("HOOTRPC_SECURITY_PLUGIN") {
        config.bootstrap.plugins.security_plugin = v;
        sources.env_overrides.push("HOOTRPC_SECURITY_PLUGIN".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_HEARTBEAT_PLUGIN") {
        config.bootstrap.plugins.heartbeat_plugin = v;
        sources.env_overrides.push("HOOTRPC_HEARTBEAT_PLUGIN".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_PUBLIC_KEY") {
        config.bootstrap.plugins.public_key = Some(v);
        sources.env_overrides.push("HOOTRPC_PUBLIC_KEY".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_SECRET_KEY") {
        config.bootstrap.plugins.secret_key = Some(v);
        sources.env_overrides.push("HOOTRPC_SECRET_KEY".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_PEER_PUBLIC_KEY") {
        config.bootstrap.plugins.peer_public_key = Some(v);
        sources.env_overrides.push("HOOTRPC_PEER_PUBLIC_KEY".to_string());
    }
    if let Ok(v) = env::var("HOOTRPC_PASSWORD") {
        config.bootstrap.plugins.password = Some(v);
        sources.env_overrides.push("HOOTRPC_PASSWORD".to_string());
    }

    if let Ok(v) = env::var("HOOTRPC_TIMEOUT_SECS") {
        if let Ok(secs) = v.parse() {
            config.bootstrap.defaults.timeout_secs = secs;
            sources.env_overrides.push("HOOTRPC_TIMEOUT_SECS".to_string());
        }
    }
}

/// Expand `~` and environment variables in an endpoint address. Endpoint
/// strings are usually `tcp://host:port`, which this leaves untouched, but
/// `ipc://~/run/hootrpc.sock`-style addresses need the same `~`/`$VAR`
/// expansion filesystem paths do.
pub fn expand_endpoint(address: &str) -> String {
    let Some(socket_path) = address.strip_prefix("ipc://") else {
        return address.to_string();
    };
    format!("ipc://{}", expand_path(socket_path).to_string_lossy())
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    };

    expanded
}
