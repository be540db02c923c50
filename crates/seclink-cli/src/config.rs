//! CLI configuration loaded from TOML.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use seclink_protocol::{ConnectorOptions, ListenerOptions};
use seclink_types::Endpoint;
use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 10085;

/// Floor for the rebind backoff; zero would spin on a failing socket.
const MIN_BACKOFF_MS: u64 = 100;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

/// Listener settings for `serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind; every local address when absent.
    #[serde(default)]
    pub bind: Option<IpAddr>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// PEM certificate chain. Generated into the config directory if unset.
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: None,
            port: default_port(),
            cert: None,
            key: None,
            handshake_timeout_secs: default_timeout_secs(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl ServerConfig {
    pub fn endpoint(&self) -> Endpoint {
        match self.bind {
            Some(address) => Endpoint::new(address, self.port),
            None => Endpoint::any(self.port),
        }
    }

    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            backoff: Duration::from_millis(self.backoff_ms.max(MIN_BACKOFF_MS)),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        }
    }
}

/// Connector settings for `send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_address")]
    pub address: Endpoint,
    /// Name the server certificate must be valid for.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default)]
    pub accept_self_signed: bool,
    /// PEM trust anchors.
    #[serde(default)]
    pub ca: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            server_name: default_server_name(),
            accept_self_signed: false,
            ca: None,
            connect_timeout_secs: default_timeout_secs(),
            handshake_timeout_secs: default_timeout_secs(),
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

impl ClientConfig {
    pub fn connector_options(&self) -> ConnectorOptions {
        ConnectorOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_address() -> Endpoint {
    Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT)
}

fn default_server_name() -> String {
    "localhost".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_reply_timeout_secs() -> u64 {
    5
}
