//! src/config.rs
//!
//! Strongly-typed `Config` loaded via `figment`, layering a `Default` base,
//! a `config.toml` file, and `LACHESIS_`-prefixed environment overrides.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Top-level struct holding all application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub identity_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub bootstrap_peers: Vec<SocketAddr>,
    pub heartbeat_timeout_ms: u64,
    pub sync_limit: usize,
    pub stats_api: Option<StatsApiConfig>,
}

/// Configuration for the optional stats HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsApiConfig {
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Loads configuration from `config.toml` and environment variables.
    /// The `Default` implementation is used as the base layer.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("LACHESIS_"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity_path: PathBuf::from("identity.key"),
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5000),
            bootstrap_peers: Vec::new(),
            heartbeat_timeout_ms: 500,
            sync_limit: 500,
            stats_api: None,
        }
    }
}
