//! Infrastructure configuration - things that cannot change once an
//! endpoint has called `connect`/`bind`.

use serde::{Deserialize, Serialize};

/// Where this endpoint sits on the wire: its own identity, the default
/// peer it talks to, and the socket address it binds or connects to.
///
/// Exactly one of `bind` / `connect` is expected to be set by the process
/// that owns the config (the loader doesn't enforce this — see
/// SPEC_FULL.md §6, `NotInitialized` is a construction-time error the
/// endpoint itself raises, not a config-validation one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// This endpoint's own transport identity. Defaults to a random one
    /// if left unset — `None` here, not an empty string, so the loader
    /// never has to invent random bytes itself.
    #[serde(default)]
    pub identity: Option<String>,

    /// Default destination for attribute-chain calls made without an
    /// explicit `with_target`.
    #[serde(default)]
    pub peer_identity: Option<String>,

    /// Address to `bind()`, e.g. `tcp://0.0.0.0:5590`.
    #[serde(default)]
    pub bind: Option<String>,

    /// Address to `connect()`, e.g. `tcp://peer.example:5590`.
    #[serde(default)]
    pub connect: Option<String>,

    /// Endpoint URI of a fallback peer whose registry is consulted on a
    /// local registry miss (`proxy_to`, SPEC_FULL.md §3).
    #[serde(default)]
    pub proxy_to: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            identity: None,
            peer_identity: None,
            bind: None,
            connect: None,
            proxy_to: None,
        }
    }
}

/// Logging configuration. Infrastructure in the same sense as the rest of
/// this module: decided once at process start, not mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Infrastructure configuration - cannot change at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraConfig {
    /// Wire-level addressing.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults() {
        let endpoint = EndpointConfig::default();
        assert!(endpoint.identity.is_none());
        assert!(endpoint.bind.is_none());
        assert!(endpoint.connect.is_none());
        assert!(endpoint.proxy_to.is_none());
    }

    #[test]
    fn test_telemetry_defaults() {
        let telemetry = TelemetryConfig::default();
        assert_eq!(telemetry.log_level, "info");
    }
}
