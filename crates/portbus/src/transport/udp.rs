// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP transport with a static peer table.
//!
//! Each gateway binds one datagram socket and knows the socket address of
//! every peer gateway it may forward to. One frame is one datagram. A
//! background thread receives datagrams and hands them to the gateway's
//! callback; it polls a stop flag between read timeouts.

use super::{RecvCallback, Transport};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::port::PortId;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM: usize = 65_507;

/// One entry of the peer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpPeer {
    /// Gateway id of the peer
    pub id: PortId,
    /// Socket address the peer is bound to
    pub addr: SocketAddr,
}

/// UDP binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Local bind address (port 0 = OS assigns)
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Peer gateways reachable from this one
    #[serde(default)]
    pub peers: Vec<UdpPeer>,

    /// Receive poll timeout (milliseconds)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7600))
}

fn default_read_timeout_ms() -> u64 {
    50
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            peers: Vec::new(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl UdpConfig {
    /// Config bound to `bind` with no peers.
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            ..Default::default()
        }
    }

    /// Add a peer.
    pub fn peer(mut self, id: PortId, addr: SocketAddr) -> Self {
        self.peers.push(UdpPeer { id, addr });
        self
    }
}

/// UDP transport binding.
pub struct UdpTransport {
    config: UdpConfig,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    id: Option<PortId>,
    callback: Option<RecvCallback>,
    running: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Bind the socket described by `config`.
    ///
    /// The socket is bound here rather than in `init` so callers can learn
    /// the local address (see [`local_addr`](Self::local_addr)) before
    /// handing the transport to a gateway.
    pub fn new(config: UdpConfig) -> Result<Self> {
        let domain = if config.bind.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket2 = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        socket2.bind(&config.bind.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms.max(1))))?;
        let local_addr = socket.local_addr()?;

        log::debug!("[UDP] bound {}", local_addr);

        Ok(Self {
            config,
            socket: Arc::new(socket),
            local_addr,
            id: None,
            callback: None,
            running: Arc::new(AtomicBool::new(false)),
            receiver: None,
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Add or replace a peer.
    pub fn add_peer(&mut self, id: PortId, addr: SocketAddr) {
        self.config.peers.retain(|p| p.id != id);
        self.config.peers.push(UdpPeer { id, addr });
    }

    pub fn peers(&self) -> &[UdpPeer] {
        &self.config.peers
    }

    fn peer_addr(&self, id: PortId) -> Option<SocketAddr> {
        self.config.peers.iter().find(|p| p.id == id).map(|p| p.addr)
    }

    fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> Result<()> {
        let sent = self.socket.send_to(bytes, addr)?;
        if sent != bytes.len() {
            return Err(Error::Transport(format!(
                "short send to {}: {} of {} bytes",
                addr,
                sent,
                bytes.len()
            )));
        }
        Ok(())
    }
}

fn receive_loop(socket: Arc<UdpSocket>, callback: RecvCallback, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                if len == 0 {
                    continue;
                }
                if let Err(e) = callback(&buf[..len]) {
                    log::debug!("[UDP] dropped {} bytes from {}: {}", len, from, e);
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                log::warn!("[UDP] receive error: {}", e);
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

impl Transport for UdpTransport {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn init(&mut self, id: PortId) -> Result<()> {
        if id.is_reserved() {
            return Err(Error::InvalidPortId(id));
        }
        self.id = Some(id);
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        self.stop()?;
        self.id = None;
        Ok(())
    }

    fn send(&mut self, dest: PortId, frame: &Frame) -> Result<()> {
        let id = self.id.ok_or(Error::NotRunning)?;
        let bytes = frame.data();
        if bytes.len() > MAX_DATAGRAM {
            return Err(Error::InvalidArgument(format!(
                "frame of {} bytes exceeds datagram limit",
                bytes.len()
            )));
        }

        if dest.is_broadcast() {
            for peer in self.config.peers.iter().filter(|p| p.id != id) {
                if let Err(e) = self.send_to(bytes, peer.addr) {
                    log::debug!("[UDP] broadcast to {} failed: {}", peer.id, e);
                }
            }
            return Ok(());
        }

        let addr = self.peer_addr(dest).ok_or(Error::Unreachable(dest))?;
        self.send_to(bytes, addr)
    }

    fn set_recv_callback(&mut self, callback: RecvCallback) {
        self.callback = Some(callback);
    }

    fn start(&mut self) -> Result<()> {
        let id = self.id.ok_or(Error::NotRunning)?;
        if self.receiver.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let callback = self
            .callback
            .clone()
            .ok_or_else(|| Error::InvalidArgument("no receive callback installed".into()))?;

        self.running.store(true, Ordering::Release);
        let socket = self.socket.clone();
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name(format!("pb-udp-{}", id))
            .spawn(move || receive_loop(socket, callback, running))
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                Error::Spawn(e.to_string())
            })?;
        self.receiver = Some(handle);

        log::info!(
            "[UDP] {} listening on {} ({} peers)",
            id,
            self.local_addr,
            self.config.peers.len()
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.receiver.take() {
            handle
                .join()
                .map_err(|_| Error::Spawn("UDP receive thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    fn loopback() -> UdpConfig {
        let mut config = UdpConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        config.read_timeout_ms = 10;
        config
    }

    #[test]
    fn test_config_builder() {
        let config = UdpConfig::default().peer(
            PortId::CHIP_ROUTE,
            SocketAddr::from(([10, 0, 0, 2], 7600)),
        );
        assert_eq!(config.bind.port(), 7600);
        assert_eq!(config.read_timeout_ms, 50);
        assert_eq!(config.peers[0].id, PortId::CHIP_ROUTE);
    }

    #[test]
    fn test_send_receive_loopback() {
        let mut a = UdpTransport::new(loopback()).unwrap();
        let mut b = UdpTransport::new(loopback()).unwrap();
        a.add_peer(PortId::CHIP_ROUTE, b.local_addr());

        let (tx, rx) = channel::unbounded();
        b.set_recv_callback(Arc::new(move |bytes: &[u8]| {
            let _ = tx.send(bytes.to_vec());
            Ok(())
        }));
        a.init(PortId::APP_ROUTE).unwrap();
        b.init(PortId::CHIP_ROUTE).unwrap();
        b.start().unwrap();

        a.send(PortId::CHIP_ROUTE, &Frame::from_bytes(b"datagram"))
            .unwrap();
        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, b"datagram");

        b.stop().unwrap();
        a.exit().unwrap();
        b.exit().unwrap();
    }

    #[test]
    fn test_unknown_peer_unreachable() {
        let mut a = UdpTransport::new(loopback()).unwrap();
        a.init(PortId::APP_ROUTE).unwrap();
        assert!(matches!(
            a.send(PortId::CHIP_ROUTE, &Frame::from_bytes(b"x")),
            Err(Error::Unreachable(_))
        ));
    }

    #[test]
    fn test_send_before_init_fails() {
        let mut a = UdpTransport::new(loopback()).unwrap();
        assert!(matches!(
            a.send(PortId::CHIP_ROUTE, &Frame::from_bytes(b"x")),
            Err(Error::NotRunning)
        ));
    }

    #[test]
    fn test_start_requires_callback() {
        let mut a = UdpTransport::new(loopback()).unwrap();
        a.init(PortId::APP_ROUTE).unwrap();
        assert!(a.start().is_err());
    }

    #[test]
    fn test_add_peer_replaces() {
        let mut a = UdpTransport::new(loopback()).unwrap();
        a.add_peer(PortId::CHIP_ROUTE, SocketAddr::from(([127, 0, 0, 1], 9000)));
        a.add_peer(PortId::CHIP_ROUTE, SocketAddr::from(([127, 0, 0, 1], 9001)));
        assert_eq!(a.peers().len(), 1);
        assert_eq!(a.peers()[0].addr.port(), 9001);
    }
}
