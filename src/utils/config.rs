//! Configuration management for the tox client.
//!
//! This module provides TOML-based configuration with support for multiple
//! configuration sources (default, file-based, environment variables) and
//! validation of configuration parameters.

use crate::network::BootstrapTarget;
use crate::utils::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "tox-client.toml";

/// Environment variable prefix for configuration
pub const ENV_PREFIX: &str = "TOX_CLIENT";

/// Complete configuration for the client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Options passed through to the engine at construction
    pub engine: EngineConfig,
    /// Lifecycle and event-loop settings
    pub client: RuntimeConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Engine construction options.
///
/// The lifecycle layer validates these and hands them to the engine
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Use IPv6 sockets (falls back to IPv4 when unavailable)
    pub ipv6_enabled: bool,
    /// Use UDP; when disabled all traffic goes through TCP relays
    pub udp_enabled: bool,
    /// Discover peers on the local network
    pub local_discovery_enabled: bool,
    /// First port of the UDP bind range (0 lets the engine choose)
    pub start_port: u16,
    /// Last port of the UDP bind range (0 lets the engine choose)
    pub end_port: u16,
    /// TCP relay server port (0 disables the relay server)
    pub tcp_port: u16,
    /// Opaque engine save state, stored as base64 text
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_blob"
    )]
    pub save_data: Option<Vec<u8>>,
    /// Outbound proxy
    pub proxy: ProxyConfig,
}

/// Proxy type understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    /// Direct connections
    #[default]
    None,
    /// HTTP CONNECT proxy
    Http,
    /// SOCKS5 proxy
    Socks5,
}

/// Outbound proxy settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy type
    #[serde(rename = "type")]
    pub kind: ProxyType,
    /// Proxy host name or address
    pub host: String,
    /// Proxy port
    pub port: u16,
}

/// Lifecycle and event-loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Tick interval in milliseconds; unset defers to the engine's suggestion
    pub tick_interval_ms: Option<u64>,
    /// Capacity of the engine request queue
    pub request_queue_depth: usize,
    /// Bootstrap targets used when none are given on the command line
    pub bootstrap_nodes: Vec<BootstrapTarget>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ipv6_enabled: true,
            udp_enabled: true,
            local_discovery_enabled: true,
            start_port: 0,
            end_port: 0,
            tcp_port: 0,
            save_data: None,
            proxy: ProxyConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: None,
            request_queue_depth: crate::defaults::DEFAULT_REQUEST_QUEUE_DEPTH,
            bootstrap_nodes: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Configured tick interval, if any
    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms.map(Duration::from_millis)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Without an explicit path the working directory and then the platform
    /// config directory are searched for [`DEFAULT_CONFIG_FILE`].
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default_locations()
                .into_iter()
                .find(|location| location.exists())
                .map(Self::from_file)
                .transpose()?
                .unwrap_or_default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn default_locations() -> [PathBuf; 2] {
        [
            PathBuf::from(DEFAULT_CONFIG_FILE),
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tox-client")
                .join(DEFAULT_CONFIG_FILE),
        ]
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Apply `TOX_CLIENT_*` environment overrides
    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_var("TICK_INTERVAL_MS") {
            self.client.tick_interval_ms = Some(parse_env("TICK_INTERVAL_MS", value)?);
        }

        if let Some(value) = env_var("ENGINE_IPV6") {
            self.engine.ipv6_enabled = parse_env("ENGINE_IPV6", value)?;
        }

        if let Some(value) = env_var("ENGINE_UDP") {
            self.engine.udp_enabled = parse_env("ENGINE_UDP", value)?;
        }

        if let Some(value) = env_var("BOOTSTRAP") {
            self.client.bootstrap_nodes = value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::parse::<BootstrapTarget>)
                .collect::<std::result::Result<Vec<_>, _>>()?;
        }

        if let Some(level) = env_var("LOGGING_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;

        if (engine.start_port == 0) != (engine.end_port == 0) {
            return Err(invalid(
                "engine.start_port",
                format!("{}..{}", engine.start_port, engine.end_port),
            ));
        }

        if engine.start_port > engine.end_port {
            return Err(invalid(
                "engine.end_port",
                format!("{} < {}", engine.end_port, engine.start_port),
            ));
        }

        if engine.proxy.kind != ProxyType::None {
            if engine.proxy.host.trim().is_empty() {
                return Err(invalid("engine.proxy.host", String::new()));
            }
            if engine.proxy.port == 0 {
                return Err(invalid("engine.proxy.port", "0".to_string()));
            }
        }

        if self.client.tick_interval_ms == Some(0) {
            return Err(invalid("client.tick_interval_ms", "0".to_string()));
        }

        if self.client.request_queue_depth == 0 {
            return Err(invalid("client.request_queue_depth", "0".to_string()));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => return Err(invalid("logging.level", self.logging.level.clone())),
        }

        Ok(())
    }

    /// Get the configuration as a pretty-printed TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::ParseError {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{suffix}")).ok()
}

fn parse_env<T: std::str::FromStr>(suffix: &str, value: String) -> Result<T> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: format!("{ENV_PREFIX}_{suffix}"),
            value,
        }
        .into()
    })
}

fn invalid(field: &str, value: String) -> crate::utils::ClientError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value,
    }
    .into()
}

/// Serde adapter storing an optional byte blob as base64 text
mod base64_blob {
    use base64::{engine::general_purpose, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(blob: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match blob {
            Some(bytes) => serializer.serialize_str(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| general_purpose::STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
