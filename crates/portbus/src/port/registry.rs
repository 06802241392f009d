// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-process port registry.
//!
//! One [`Registry`] is created at process start and shared (`Arc`) with
//! every gateway and event thread. The port list is small, so lookups are
//! linear scans under one lock. Queue pushes and broadcast callbacks always
//! run after that lock is released.

use super::{next_hop, Port, PortId};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::queue::QueueConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// A frame that could not be delivered, handed back to its owner.
#[derive(Debug, ThisError)]
#[error("{error}")]
pub struct Undelivered {
    /// Why delivery failed
    pub error: Error,
    /// The frame, untouched
    pub frame: Frame,
}

impl From<Undelivered> for Error {
    fn from(undelivered: Undelivered) -> Self {
        undelivered.error
    }
}

/// Live ports and event sessions of one process.
pub struct Registry {
    ports: Mutex<Vec<Arc<Port>>>,
    sessions: Mutex<Vec<PortId>>,
    queue_config: QueueConfig,
}

impl Registry {
    /// Registry whose ports use the default queue design, unbounded.
    pub fn new() -> Self {
        Self::with_queue_config(QueueConfig::default())
    }

    /// Registry whose ports use `queue_config`.
    pub fn with_queue_config(queue_config: QueueConfig) -> Self {
        Self {
            ports: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            queue_config,
        }
    }

    /// Queue parameters applied to new ports.
    pub fn queue_config(&self) -> QueueConfig {
        self.queue_config
    }

    /// Register a new port in state `Init`.
    pub fn create_port(&self, id: PortId) -> Result<Arc<Port>> {
        if id.is_reserved() {
            return Err(Error::InvalidPortId(id));
        }

        let mut ports = self.ports.lock();
        if ports.iter().any(|p| p.id() == id) {
            return Err(Error::PortExists(id));
        }
        let port = Arc::new(Port::new(id, self.queue_config.build()));
        ports.push(port.clone());
        log::debug!("[REGISTRY] port {} created ({} live)", id, ports.len());
        Ok(port)
    }

    /// Look up a port by id.
    pub fn get(&self, id: PortId) -> Option<Arc<Port>> {
        if id.is_reserved() {
            return None;
        }
        self.ports.lock().iter().find(|p| p.id() == id).cloned()
    }

    /// Remove a port, mark it `Exit` and close its queue.
    ///
    /// Frames still queued are dropped once the last handle goes away.
    pub fn destroy_port(&self, id: PortId) -> Result<()> {
        let port = {
            let mut ports = self.ports.lock();
            let index = ports
                .iter()
                .position(|p| p.id() == id)
                .ok_or(Error::PortNotFound(id))?;
            ports.swap_remove(index)
        };
        port.set_state(super::PortState::Exit);
        port.close();
        log::debug!("[REGISTRY] port {} destroyed", id);
        Ok(())
    }

    /// Ids of all registered ports.
    pub fn ports(&self) -> Vec<PortId> {
        self.ports.lock().iter().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.ports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.lock().is_empty()
    }

    /// Deliver `frame` from `from` toward `dest`.
    ///
    /// The target is `dest` itself when registered here, otherwise the
    /// registered port named by [`next_hop`]. Sender and target must both
    /// be connected. On failure the frame comes back unmodified and no
    /// queue was touched.
    pub fn send(
        &self,
        from: &Port,
        dest: PortId,
        frame: Frame,
    ) -> core::result::Result<(), Undelivered> {
        match self.resolve(from, dest) {
            Ok(target) => target.enqueue(frame).map_err(|closed| Undelivered {
                error: Error::QueueClosed,
                frame: closed.into_inner(),
            }),
            Err(error) => Err(Undelivered { error, frame }),
        }
    }

    fn resolve(&self, from: &Port, dest: PortId) -> Result<Arc<Port>> {
        if dest.is_reserved() {
            return Err(Error::InvalidPortId(dest));
        }
        if !from.is_connected() {
            return Err(Error::NotConnected(from.id()));
        }

        let target = {
            let ports = self.ports.lock();
            let lookup = |id: PortId| ports.iter().find(|p| p.id() == id).cloned();
            match lookup(dest) {
                Some(port) => port,
                None => next_hop(from.id(), dest)
                    // A hop back to the sender would loop forever
                    .filter(|hop| *hop != from.id())
                    .and_then(lookup)
                    .ok_or(Error::Unreachable(dest))?,
            }
        };

        if !target.is_connected() {
            return Err(Error::NotConnected(target.id()));
        }
        Ok(target)
    }

    /// Hand `frame` to the broadcast callback of every other connected port.
    ///
    /// Returns the number of callbacks that accepted it. The frame stays
    /// with the caller.
    pub fn broadcast(&self, from: &Port, frame: &Frame) -> Result<usize> {
        if !from.is_connected() {
            return Err(Error::NotConnected(from.id()));
        }

        let recipients: Vec<_> = self
            .ports
            .lock()
            .iter()
            .filter(|p| p.id() != from.id() && p.is_connected())
            .filter_map(|p| p.broadcast_callback().map(|cb| (p.clone(), cb)))
            .collect();

        let mut delivered = 0;
        for (port, callback) in recipients {
            match callback(&port, frame) {
                Ok(()) => delivered += 1,
                Err(e) => log::debug!("[REGISTRY] broadcast to {} failed: {}", port.id(), e),
            }
        }
        Ok(delivered)
    }

    /// Reserve an event-session id.
    pub fn claim_session(&self, id: PortId) -> Result<()> {
        if id.is_reserved() {
            return Err(Error::InvalidPortId(id));
        }
        let mut sessions = self.sessions.lock();
        if sessions.contains(&id) {
            return Err(Error::SessionExists(id));
        }
        sessions.push(id);
        Ok(())
    }

    /// Release an event-session id. Returns false if it was not claimed.
    pub fn release_session(&self, id: PortId) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.iter().position(|s| *s == id) {
            Some(index) => {
                sessions.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Ids of all live event sessions.
    pub fn sessions(&self) -> Vec<PortId> {
        self.sessions.lock().clone()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("ports", &self.ports())
            .field("sessions", &self.sessions())
            .field("queue_config", &self.queue_config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortState;
    use crate::queue::{Popped, QueueKind};
    use std::time::Duration;

    fn connected(registry: &Registry, id: PortId) -> Arc<Port> {
        let port = registry.create_port(id).unwrap();
        port.set_state(PortState::Conn);
        port
    }

    fn copy_on_broadcast(port: &Port) {
        port.set_broadcast_callback(Arc::new(|port: &Port, frame: &Frame| port.enqueue_copy(frame)));
    }

    #[test]
    fn test_create_rejects_reserved_and_duplicates() {
        let registry = Registry::new();
        assert!(matches!(
            registry.create_port(PortId::UNKNOWN),
            Err(Error::InvalidPortId(_))
        ));
        assert!(matches!(
            registry.create_port(PortId::BROADCAST),
            Err(Error::InvalidPortId(_))
        ));

        let id = PortId::new(1, 1, 2);
        let port = registry.create_port(id).unwrap();
        assert_eq!(port.state(), PortState::Init);
        assert!(matches!(registry.create_port(id), Err(Error::PortExists(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_and_destroy() {
        let registry = Registry::new();
        let id = PortId::new(0, 4, 4);
        let port = registry.create_port(id).unwrap();
        assert!(registry.get(id).is_some());

        registry.destroy_port(id).unwrap();
        assert!(registry.get(id).is_none());
        assert_eq!(port.state(), PortState::Exit);
        assert!(matches!(
            registry.destroy_port(id),
            Err(Error::PortNotFound(_))
        ));

        // Id is reusable after destroy
        registry.create_port(id).unwrap();
    }

    #[test]
    fn test_send_direct() {
        let registry = Registry::new();
        let a = connected(&registry, PortId::new(1, 1, 2));
        let b = connected(&registry, PortId::new(1, 1, 3));

        registry.send(&a, b.id(), Frame::from_bytes(b"hi")).unwrap();
        match b.recv_timeout(Duration::from_millis(10)) {
            Popped::Item(frame) => assert_eq!(frame.data(), b"hi"),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_send_via_next_hop() {
        let registry = Registry::new();
        let endpoint = connected(&registry, PortId::new(1, 2, 5));
        let route = connected(&registry, PortId::new(1, 2, 1));

        // Controller-side destination is not local: goes to the channel route
        registry
            .send(&endpoint, PortId::new(0, 0, 9), Frame::from_bytes(b"up"))
            .unwrap();
        assert_eq!(route.pending(), 1);
    }

    #[test]
    fn test_send_unreachable_returns_frame() {
        let registry = Registry::new();
        let endpoint = connected(&registry, PortId::new(1, 2, 5));

        let err = registry
            .send(&endpoint, PortId::new(0, 0, 9), Frame::from_bytes(b"lost"))
            .unwrap_err();
        assert!(matches!(err.error, Error::Unreachable(_)));
        assert_eq!(err.frame.data(), b"lost");
    }

    #[test]
    fn test_send_requires_connected_sender() {
        let registry = Registry::new();
        let a = registry.create_port(PortId::new(1, 1, 2)).unwrap();
        let b = connected(&registry, PortId::new(1, 1, 3));

        let err = registry.send(&a, b.id(), Frame::from_bytes(b"x")).unwrap_err();
        assert!(matches!(err.error, Error::NotConnected(id) if id == a.id()));
        assert_eq!(b.pending(), 0);
    }

    #[test]
    fn test_send_to_disconnected_leaves_queue_untouched() {
        let registry = Registry::new();
        let a = connected(&registry, PortId::new(1, 1, 2));
        let b = connected(&registry, PortId::new(1, 1, 3));
        b.set_state(PortState::Disconn);

        let err = registry.send(&a, b.id(), Frame::from_bytes(b"x")).unwrap_err();
        assert!(matches!(err.error, Error::NotConnected(id) if id == b.id()));
        assert_eq!(b.pending(), 0);
    }

    #[test]
    fn test_send_to_reserved_rejected() {
        let registry = Registry::new();
        let a = connected(&registry, PortId::new(1, 1, 2));
        let err = registry
            .send(&a, PortId::BROADCAST, Frame::from_bytes(b"x"))
            .unwrap_err();
        assert!(matches!(err.error, Error::InvalidPortId(_)));
    }

    #[test]
    fn test_broadcast_excludes_sender_and_disconnected() {
        let registry = Registry::new();
        let sender = connected(&registry, PortId::new(1, 1, 2));
        let r1 = connected(&registry, PortId::new(1, 1, 3));
        let r2 = connected(&registry, PortId::new(1, 1, 4));
        let idle = connected(&registry, PortId::new(1, 1, 5));
        let silent = connected(&registry, PortId::new(1, 1, 6));
        for port in [&sender, &r1, &r2, &idle] {
            copy_on_broadcast(port);
        }
        idle.set_state(PortState::Disconn);

        let frame = Frame::from_bytes(b"all");
        assert_eq!(registry.broadcast(&sender, &frame).unwrap(), 2);
        assert_eq!(sender.pending(), 0);
        assert_eq!(idle.pending(), 0);
        assert_eq!(silent.pending(), 0);

        // Each recipient owns its own copy
        let mut first = match r1.recv_timeout(Duration::from_millis(10)) {
            Popped::Item(frame) => frame,
            other => panic!("expected frame, got {:?}", other),
        };
        first.data_mut()[0] = b'X';
        match r2.recv_timeout(Duration::from_millis(10)) {
            Popped::Item(second) => assert_eq!(second.data(), b"all"),
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(frame.data(), b"all");
    }

    #[test]
    fn test_broadcast_callback_may_send() {
        // Callbacks run outside the registry lock
        let registry = Arc::new(Registry::new());
        let sender = connected(&registry, PortId::new(1, 1, 2));
        let relay = connected(&registry, PortId::new(1, 1, 3));
        let sink = connected(&registry, PortId::new(1, 1, 4));

        let reg = registry.clone();
        let sink_id = sink.id();
        relay.set_broadcast_callback(Arc::new(move |port: &Port, frame: &Frame| {
            reg.send(port, sink_id, frame.duplicate())?;
            Ok(())
        }));

        assert_eq!(registry.broadcast(&sender, &Frame::from_bytes(b"r")).unwrap(), 1);
        assert_eq!(sink.pending(), 1);
    }

    #[test]
    fn test_sessions() {
        let registry = Registry::new();
        let id = PortId::new(1, 3, 3);
        registry.claim_session(id).unwrap();
        assert!(matches!(
            registry.claim_session(id),
            Err(Error::SessionExists(_))
        ));
        assert_eq!(registry.sessions(), vec![id]);
        assert!(registry.release_session(id));
        assert!(!registry.release_session(id));

        // Sessions and ports are tracked separately
        assert!(registry.is_empty());
    }

    #[test]
    fn test_queue_config_applied() {
        let registry = Registry::with_queue_config(QueueConfig::bounded(QueueKind::Single, 2));
        assert_eq!(registry.queue_config().capacity, Some(2));
        let a = connected(&registry, PortId::new(1, 1, 2));
        let b = connected(&registry, PortId::new(1, 1, 3));
        registry.send(&a, b.id(), Frame::from_bytes(b"1")).unwrap();
        registry.send(&a, b.id(), Frame::from_bytes(b"2")).unwrap();
        assert_eq!(b.pending(), 2);
    }
}
