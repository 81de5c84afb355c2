//! Relay and direct-connect host configuration loaded from TOML.

use std::time::Duration;

use aircontrol_types::{LayoutKind, MAX_PLAYERS};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub direct: DirectConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            relay: RelayConfig::default(),
            direct: DirectConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

/// Session relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Seconds an empty, hostless session is kept before collection.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Client-side acknowledgement window.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_max_players")]
    pub max_players: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_relay_port(),
            idle_timeout_secs: default_idle_timeout_secs(),
            ack_timeout_ms: default_ack_timeout_ms(),
            max_players: default_max_players(),
        }
    }
}

impl RelayConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Direct-connect host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_direct_port")]
    pub port: u16,
    #[serde(default = "default_max_controllers")]
    pub max_controllers: u8,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default)]
    pub layout: LayoutKind,
    /// Deep link scheme, e.g. `aircontrol://connect?...`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_direct_port(),
            max_controllers: default_max_controllers(),
            ping_interval_secs: default_ping_interval_secs(),
            layout: LayoutKind::default(),
            scheme: default_scheme(),
        }
    }
}

impl DirectConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Profile catalog location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON catalog file. The built-in catalog is used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_relay_port() -> u16 {
    3000
}

fn default_idle_timeout_secs() -> u64 {
    20 * 60
}

fn default_ack_timeout_ms() -> u64 {
    3000
}

fn default_max_players() -> u8 {
    MAX_PLAYERS
}

fn default_direct_port() -> u16 {
    8765
}

fn default_max_controllers() -> u8 {
    4
}

fn default_ping_interval_secs() -> u64 {
    5
}

fn default_scheme() -> String {
    "aircontrol".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("port = 3000"));
        assert!(toml_str.contains("port = 8765"));
        assert!(toml_str.contains("layout = \"xbox\""));
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
log_level = "debug"

[relay]
port = 4000
idle_timeout_secs = 60

[direct]
max_controllers = 2
layout = "simple"
scheme = "airpad"

[catalog]
path = "profiles.json"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.relay.port, 4000);
        assert_eq!(config.relay.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.relay.ack_timeout(), Duration::from_millis(3000));
        assert_eq!(config.relay.max_players, 64);
        assert_eq!(config.direct.max_controllers, 2);
        assert_eq!(config.direct.layout, LayoutKind::Simple);
        assert_eq!(config.direct.scheme, "airpad");
        assert_eq!(config.direct.port, 8765);
        assert_eq!(config.catalog.path.as_deref(), Some("profiles.json"));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.relay.listen_addr(), "0.0.0.0:3000");
        assert_eq!(config.direct.ping_interval(), Duration::from_secs(5));
        assert!(config.catalog.path.is_none());
    }
}
