use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsConfig {
    /// Explicit upstream resolver (`host:port`). When unset, the first
    /// nameserver from the host resolver configuration is used.
    pub upstream_server: Option<String>,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    /// JSON record map loaded at startup and reloaded on SIGHUP.
    pub map_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Command-line flags that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub upstream_server: Option<String>,
    pub map_file: Option<String>,
    pub log_level: Option<String>,
}

impl ProxyConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, DomainError> {
        toml::from_str(raw).map_err(|e| DomainError::InvalidConfig(e.to_string()))
    }

    pub fn apply_overrides(&mut self, overrides: CliOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(upstream_server) = overrides.upstream_server {
            self.dns.upstream_server = Some(upstream_server);
        }
        if let Some(map_file) = overrides.map_file {
            self.dns.map_file = Some(map_file);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            upstream_server: None,
            query_timeout_ms: default_query_timeout(),
            map_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    15053
}

fn default_query_timeout() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}
