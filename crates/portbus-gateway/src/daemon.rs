// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway process wiring: registry, UDP transport, gateway.

use crate::config::{ConfigError, DaemonConfig};
use portbus::transport::UdpTransport;
use portbus::{Gateway, GatewayStats, PortId, Registry};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Daemon errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Bus(#[from] portbus::Error),
}

/// A running gateway process.
pub struct Daemon {
    gateway: Gateway,
    registry: Arc<Registry>,
    local_addr: SocketAddr,
}

impl Daemon {
    /// Bind the UDP socket and register the gateway. Does not start it.
    pub fn new(config: &DaemonConfig) -> Result<Self, DaemonError> {
        config.validate()?;

        let registry = Arc::new(Registry::with_queue_config(config.queue));
        let transport = UdpTransport::new(config.udp.clone())?;
        let local_addr = transport.local_addr();

        let gateway = Gateway::create(
            registry.clone(),
            config.gateway.id,
            Box::new(transport),
            config.gateway_config(),
        )?;

        tracing::info!(
            "Gateway {} bound to {} with {} peer(s)",
            config.gateway.id,
            local_addr,
            config.udp.peers.len()
        );

        Ok(Self {
            gateway,
            registry,
            local_addr,
        })
    }

    pub fn start(&mut self) -> Result<(), DaemonError> {
        self.gateway.start()?;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), DaemonError> {
        self.gateway.stop()?;
        Ok(())
    }

    pub fn id(&self) -> PortId {
        self.gateway.id()
    }

    pub fn is_running(&self) -> bool {
        self.gateway.is_running()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<GatewayStats> {
        self.gateway.stats()
    }

    /// Registry the gateway is registered in.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}
