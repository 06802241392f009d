// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport.
//!
//! Several [`MemoryTransport`]s attached to one [`MemoryHub`] behave like
//! gateways of separate processes on a shared bus. Delivery calls the
//! receiver's callback synchronously on the sender's thread, so a receiver
//! whose callback blocks (a full bounded ingress queue) stalls the sender.

use super::{RecvCallback, Transport};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::port::PortId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Member {
    callback: Option<RecvCallback>,
    started: bool,
}

/// Shared bus for [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryHub {
    members: Arc<Mutex<HashMap<PortId, Member>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// New transport attached to this hub.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            id: None,
            callback: None,
        }
    }

    /// Ids currently attached.
    pub fn members(&self) -> Vec<PortId> {
        let mut ids: Vec<_> = self.members.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    fn attach(&self, id: PortId, callback: Option<RecvCallback>) -> Result<()> {
        let mut members = self.members.lock();
        if members.contains_key(&id) {
            return Err(Error::PortExists(id));
        }
        members.insert(
            id,
            Member {
                callback,
                started: false,
            },
        );
        Ok(())
    }

    fn detach(&self, id: PortId) {
        self.members.lock().remove(&id);
    }

    fn update(&self, id: PortId, f: impl FnOnce(&mut Member)) {
        if let Some(member) = self.members.lock().get_mut(&id) {
            f(member);
        }
    }

    /// Callbacks of the started members addressed by `dest`, excluding `from`.
    fn recipients(&self, from: PortId, dest: PortId) -> Result<Vec<RecvCallback>> {
        let members = self.members.lock();
        let live = |member: &Member| {
            if member.started {
                member.callback.clone()
            } else {
                None
            }
        };

        if dest.is_broadcast() {
            return Ok(members
                .iter()
                .filter(|(id, _)| **id != from)
                .filter_map(|(_, member)| live(member))
                .collect());
        }

        members
            .get(&dest)
            .and_then(live)
            .map(|callback| vec![callback])
            .ok_or(Error::Unreachable(dest))
    }
}

/// Transport endpoint on a [`MemoryHub`].
pub struct MemoryTransport {
    hub: MemoryHub,
    id: Option<PortId>,
    callback: Option<RecvCallback>,
}

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn init(&mut self, id: PortId) -> Result<()> {
        if id.is_reserved() {
            return Err(Error::InvalidPortId(id));
        }
        if self.id.is_some() {
            return Err(Error::AlreadyRunning);
        }
        self.hub.attach(id, self.callback.clone())?;
        self.id = Some(id);
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        if let Some(id) = self.id.take() {
            self.hub.detach(id);
        }
        Ok(())
    }

    fn send(&mut self, dest: PortId, frame: &Frame) -> Result<()> {
        let id = self.id.ok_or(Error::NotRunning)?;
        let recipients = self.hub.recipients(id, dest)?;
        if dest.is_broadcast() {
            for callback in recipients {
                if let Err(e) = callback(frame.data()) {
                    log::debug!("[MEMORY] broadcast delivery failed: {}", e);
                }
            }
            return Ok(());
        }
        for callback in recipients {
            callback(frame.data())?;
        }
        Ok(())
    }

    fn set_recv_callback(&mut self, callback: RecvCallback) {
        if let Some(id) = self.id {
            let cb = callback.clone();
            self.hub.update(id, move |member| member.callback = Some(cb));
        }
        self.callback = Some(callback);
    }

    fn start(&mut self) -> Result<()> {
        let id = self.id.ok_or(Error::NotRunning)?;
        self.hub.update(id, |member| member.started = true);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(id) = self.id {
            self.hub.update(id, |member| member.started = false);
        }
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        let _ = self.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (RecvCallback, Arc<Mutex<Vec<Vec<u8>>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let callback: RecvCallback = Arc::new(move |bytes: &[u8]| {
            sink.lock().push(bytes.to_vec());
            Ok(())
        });
        (callback, received)
    }

    fn started(hub: &MemoryHub, id: PortId) -> (MemoryTransport, Arc<Mutex<Vec<Vec<u8>>>>) {
        let mut transport = hub.transport();
        let (callback, received) = collector();
        transport.init(id).unwrap();
        transport.set_recv_callback(callback);
        transport.start().unwrap();
        (transport, received)
    }

    #[test]
    fn test_unicast() {
        let hub = MemoryHub::new();
        let (mut a, _) = started(&hub, PortId::APP_ROUTE);
        let (_b, b_rx) = started(&hub, PortId::CHIP_ROUTE);

        a.send(PortId::CHIP_ROUTE, &Frame::from_bytes(b"ping")).unwrap();
        assert_eq!(b_rx.lock().as_slice(), &[b"ping".to_vec()]);
    }

    #[test]
    fn test_unknown_peer_unreachable() {
        let hub = MemoryHub::new();
        let (mut a, _) = started(&hub, PortId::APP_ROUTE);
        assert!(matches!(
            a.send(PortId::CHIP_ROUTE, &Frame::from_bytes(b"x")),
            Err(Error::Unreachable(_))
        ));
    }

    #[test]
    fn test_stopped_peer_unreachable() {
        let hub = MemoryHub::new();
        let (mut a, _) = started(&hub, PortId::APP_ROUTE);
        let (mut b, b_rx) = started(&hub, PortId::CHIP_ROUTE);
        b.stop().unwrap();
        assert!(a.send(PortId::CHIP_ROUTE, &Frame::from_bytes(b"x")).is_err());
        assert!(b_rx.lock().is_empty());
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let hub = MemoryHub::new();
        let (mut a, a_rx) = started(&hub, PortId::APP_ROUTE);
        let (_b, b_rx) = started(&hub, PortId::CHIP_ROUTE);
        let (_c, c_rx) = started(&hub, PortId::CONTROLLER_ROUTE);

        a.send(PortId::BROADCAST, &Frame::from_bytes(b"all")).unwrap();
        assert!(a_rx.lock().is_empty());
        assert_eq!(b_rx.lock().len(), 1);
        assert_eq!(c_rx.lock().len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected_and_exit_releases() {
        let hub = MemoryHub::new();
        let mut a = hub.transport();
        a.init(PortId::APP_ROUTE).unwrap();

        let mut b = hub.transport();
        assert!(matches!(b.init(PortId::APP_ROUTE), Err(Error::PortExists(_))));

        a.exit().unwrap();
        b.init(PortId::APP_ROUTE).unwrap();
        assert_eq!(hub.members(), vec![PortId::APP_ROUTE]);

        drop(b);
        assert!(hub.members().is_empty());
    }
}
