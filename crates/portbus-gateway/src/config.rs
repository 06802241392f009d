// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration.
//!
//! Loaded from TOML or assembled from command-line flags.

use portbus::transport::{UdpConfig, UdpPeer};
use portbus::{GatewayConfig, PortId, QueueConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub gateway: GatewaySection,

    /// Queue design for the registry's ports and the ingress queue.
    #[serde(default)]
    pub queue: QueueConfig,

    /// UDP binding and peer table.
    #[serde(default)]
    pub udp: UdpConfig,
}

/// `[gateway]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Gateway id: a channel route (`x.y.1`) or a backbone route.
    pub id: PortId,

    /// `SCHED_RR` priority of the workers (0 = inherit).
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Worker poll interval (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Statistics reporting interval (seconds, 0 disables).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_priority() -> u8 {
    portbus::sched::DEFAULT_RT_PRIORITY
}

fn default_poll_interval_ms() -> u64 {
    20
}

fn default_stats_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatewaySection {
    pub fn new(id: PortId) -> Self {
        Self {
            id,
            priority: default_priority(),
            poll_interval_ms: default_poll_interval_ms(),
            stats_interval_secs: default_stats_interval(),
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Configuration for gateway `id` with default queue and UDP settings.
    pub fn new(id: PortId) -> Self {
        Self {
            gateway: GatewaySection::new(id),
            queue: QueueConfig::default(),
            udp: UdpConfig::default(),
        }
    }

    /// Load and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Add a UDP peer.
    pub fn add_peer(&mut self, id: PortId, addr: std::net::SocketAddr) {
        self.udp.peers.push(UdpPeer { id, addr });
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.gateway.id;
        if id.is_reserved() {
            return Err(ConfigError::Invalid(format!(
                "Gateway id {} is reserved",
                id
            )));
        }
        if !id.is_route() && !id.is_backbone() {
            return Err(ConfigError::Invalid(format!(
                "Gateway id {} is not a route endpoint (expected x.y.1 or a backbone route)",
                id
            )));
        }
        if self.gateway.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.queue.capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "Queue capacity must be greater than 0 (omit it for unbounded)".into(),
            ));
        }

        if self.udp.peers.is_empty() {
            return Err(ConfigError::Invalid("No UDP peers configured".into()));
        }
        let mut seen = HashSet::new();
        for (i, peer) in self.udp.peers.iter().enumerate() {
            if peer.id.is_reserved() {
                return Err(ConfigError::Invalid(format!(
                    "Peer {} has reserved id {}",
                    i, peer.id
                )));
            }
            if peer.id == id {
                return Err(ConfigError::Invalid(format!(
                    "Peer {} has the gateway's own id {}",
                    i, peer.id
                )));
            }
            if !seen.insert(peer.id) {
                return Err(ConfigError::Invalid(format!(
                    "Peer {} duplicates id {}",
                    i, peer.id
                )));
            }
        }

        Ok(())
    }

    /// Gateway tuning derived from this configuration.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default()
            .priority(self.gateway.priority)
            .poll_interval(Duration::from_millis(self.gateway.poll_interval_ms))
            .ingress(self.queue)
    }
}
