// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event threads: pub/sub sessions on top of a port.
//!
//! An [`EventThread`] owns a port with its own id and a table mapping event
//! ids to callbacks. Its worker pops frames from the port, verifies the
//! event header and runs the callback registered for the event id. Each
//! event id has at most one callback; attaching an id twice keeps the first.
//!
//! # Example
//!
//! ```no_run
//! use portbus::{EventThread, PortId, Registry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(Registry::new());
//! let mut session = EventThread::create(registry, PortId::new(1, 2, 5), 0)?;
//! session.attach(0x10, |sender, msg| {
//!     // Echo back to whoever sent it
//!     let _ = sender.send(msg.source, 0x11, msg.payload);
//! })?;
//! session.start()?;
//! # Ok::<(), portbus::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::port::{Port, PortId, PortState, Registry};
use crate::queue::Popped;
use crate::sched::spawn_worker;
use crossbeam::channel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub mod wire;

pub use wire::{EventHeader, EVENT_HEADER_LEN};

/// An event delivered to a callback.
#[derive(Debug, Clone, Copy)]
pub struct Received<'a> {
    /// Sending session
    pub source: PortId,
    /// Event id
    pub event: u32,
    /// Payload bytes, valid for the duration of the callback
    pub payload: &'a [u8],
}

/// Event handler. Runs on the session's worker thread.
pub type EventCallback = Arc<dyn Fn(&EventSender, &Received<'_>) + Send + Sync>;

/// Event thread tuning.
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// `SCHED_RR` priority of the worker (0 = inherit)
    pub priority: u8,
    /// How long the worker waits on its queue before re-checking the stop flag
    pub poll_interval: Duration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            priority: 0,
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl EventConfig {
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

struct Session {
    id: PortId,
    registry: Arc<Registry>,
    port: Arc<Port>,
    table: Mutex<HashMap<u32, EventCallback>>,
    running: AtomicBool,
}

impl Session {
    fn dispatch(&self, sender: &EventSender, mut frame: Frame) {
        let header = match wire::decode(&mut frame) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("[EVENT] {} dropping frame: {}", self.id, e);
                return;
            }
        };

        // Clone out of the table so the callback may attach or detach
        let callback = self.table.lock().get(&header.event).cloned();
        match callback {
            Some(callback) => {
                let received = Received {
                    source: header.source,
                    event: header.event,
                    payload: &frame.data()[..header.len as usize],
                };
                callback(sender, &received);
            }
            None => log::debug!(
                "[EVENT] {} no handler for event {:#x} from {}",
                self.id,
                header.event,
                header.source
            ),
        }
    }
}

/// Cloneable handle for sending from a session, including from callbacks.
#[derive(Clone)]
pub struct EventSender {
    session: Arc<Session>,
}

impl EventSender {
    /// Id of the sending session.
    pub fn id(&self) -> PortId {
        self.session.id
    }

    /// Send `event` with `payload` to the session `dest`.
    ///
    /// Fails if this session is not started, or if `dest` is neither
    /// registered locally nor reachable through a connected next hop.
    pub fn send(&self, dest: PortId, event: u32, payload: &[u8]) -> Result<()> {
        if dest.is_broadcast() {
            return Err(Error::InvalidArgument(
                "broadcast destination requires broadcast()".into(),
            ));
        }
        if dest.is_reserved() {
            return Err(Error::InvalidPortId(dest));
        }

        let frame = wire::encode(self.session.id, dest, event, payload)?;
        self.session
            .registry
            .send(&self.session.port, dest, frame)?;
        Ok(())
    }

    /// Send `event` with `payload` to every other connected session.
    ///
    /// Returns the number of local recipients (a gateway counts as one).
    pub fn broadcast(&self, event: u32, payload: &[u8]) -> Result<usize> {
        let frame = wire::encode(self.session.id, PortId::BROADCAST, event, payload)?;
        self.session.registry.broadcast(&self.session.port, &frame)
    }
}

fn receive_loop(sender: EventSender, poll: Duration) {
    let session = sender.session.clone();
    while session.running.load(Ordering::Acquire) {
        match session.port.recv_timeout(poll) {
            Popped::Item(frame) => session.dispatch(&sender, frame),
            Popped::TimedOut => {}
            Popped::Closed => break,
        }
    }
    log::debug!("[EVENT] {} receive loop stopped", session.id);
}

/// Pub/sub session bound to one port.
pub struct EventThread {
    sender: EventSender,
    config: EventConfig,
    worker: Option<JoinHandle<()>>,
}

impl EventThread {
    /// Register session `id` with worker priority `priority` (0 = inherit).
    pub fn create(registry: Arc<Registry>, id: PortId, priority: u8) -> Result<Self> {
        Self::with_config(registry, id, EventConfig::default().priority(priority))
    }

    /// Register session `id` with explicit tuning.
    pub fn with_config(registry: Arc<Registry>, id: PortId, config: EventConfig) -> Result<Self> {
        if id.is_reserved() {
            return Err(Error::InvalidPortId(id));
        }

        registry.claim_session(id)?;
        let port = match registry.create_port(id) {
            Ok(port) => port,
            Err(e) => {
                registry.release_session(id);
                return Err(e);
            }
        };
        port.set_broadcast_callback(Arc::new(|port: &Port, frame: &Frame| {
            port.enqueue_copy(frame)
        }));

        log::debug!("[EVENT] {} created", id);

        Ok(Self {
            sender: EventSender {
                session: Arc::new(Session {
                    id,
                    registry,
                    port,
                    table: Mutex::new(HashMap::new()),
                    running: AtomicBool::new(false),
                }),
            },
            config,
            worker: None,
        })
    }

    pub fn id(&self) -> PortId {
        self.sender.session.id
    }

    /// Handle for sending from other threads or callbacks.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn is_running(&self) -> bool {
        self.sender.session.running.load(Ordering::Acquire)
    }

    /// Register `callback` for `event`. A no-op if `event` already has one.
    pub fn attach<F>(&self, event: u32, callback: F) -> Result<()>
    where
        F: Fn(&EventSender, &Received<'_>) + Send + Sync + 'static,
    {
        let mut table = self.sender.session.table.lock();
        if table.contains_key(&event) {
            log::debug!("[EVENT] {} event {:#x} already attached", self.id(), event);
            return Ok(());
        }
        table.insert(event, Arc::new(callback));
        Ok(())
    }

    /// Remove the callback for `event`.
    pub fn detach(&self, event: u32) -> Result<()> {
        self.sender
            .session
            .table
            .lock()
            .remove(&event)
            .map(|_| ())
            .ok_or(Error::EventNotFound(event))
    }

    /// Whether `event` has a callback.
    pub fn is_attached(&self, event: u32) -> bool {
        self.sender.session.table.lock().contains_key(&event)
    }

    /// Number of attached events.
    pub fn attached_count(&self) -> usize {
        self.sender.session.table.lock().len()
    }

    /// Start the receive worker; returns once the port is connected.
    pub fn start(&mut self) -> Result<()> {
        let session = &self.sender.session;
        if session.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }

        let (ready_tx, ready_rx) = channel::bounded::<()>(1);
        let sender = self.sender.clone();
        let poll = self.config.poll_interval;
        let spawned = spawn_worker(
            format!("pb-evt-{}", session.id),
            self.config.priority,
            move || {
                sender.session.port.set_state(PortState::Conn);
                let _ = ready_tx.send(());
                receive_loop(sender, poll);
            },
        );

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                session.running.store(false, Ordering::Release);
                return Err(e);
            }
        };
        self.worker = Some(worker);

        if ready_rx.recv().is_err() {
            self.halt();
            return Err(Error::Spawn("event worker exited during startup".into()));
        }
        log::debug!("[EVENT] {} started", self.id());
        Ok(())
    }

    fn halt(&mut self) {
        let session = &self.sender.session;
        session.running.store(false, Ordering::Release);
        session.port.set_state(PortState::Disconn);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("[EVENT] {} worker panicked", session.id);
            }
        }
    }

    /// Disconnect the port and join the worker.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        self.halt();
        log::debug!("[EVENT] {} stopped", self.id());
        Ok(())
    }

    /// See [`EventSender::send`].
    pub fn send(&self, dest: PortId, event: u32, payload: &[u8]) -> Result<()> {
        self.sender.send(dest, event, payload)
    }

    /// See [`EventSender::broadcast`].
    pub fn broadcast(&self, event: u32, payload: &[u8]) -> Result<usize> {
        self.sender.broadcast(event, payload)
    }
}

impl Drop for EventThread {
    fn drop(&mut self) {
        if self.is_running() {
            self.halt();
        }
        let session = &self.sender.session;
        let _ = session.registry.destroy_port(session.id);
        session.registry.release_session(session.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn quick(registry: &Arc<Registry>, id: PortId) -> EventThread {
        EventThread::with_config(
            registry.clone(),
            id,
            EventConfig::default().poll_interval(Duration::from_millis(5)),
        )
        .unwrap()
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_create_claims_session_and_port() {
        let registry = Arc::new(Registry::new());
        let id = PortId::new(1, 2, 5);
        let session = quick(&registry, id);
        assert_eq!(registry.sessions(), vec![id]);
        assert!(registry.get(id).is_some());

        assert!(matches!(
            EventThread::create(registry.clone(), id, 0),
            Err(Error::SessionExists(_))
        ));

        drop(session);
        assert!(registry.sessions().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_releases_session_when_port_taken() {
        let registry = Arc::new(Registry::new());
        let id = PortId::new(1, 2, 5);
        registry.create_port(id).unwrap();
        assert!(matches!(
            EventThread::create(registry.clone(), id, 0),
            Err(Error::PortExists(_))
        ));
        assert!(registry.sessions().is_empty());
    }

    #[test]
    fn test_attach_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let session = quick(&registry, PortId::new(1, 2, 5));
        session.attach(1, |_, _| {}).unwrap();
        session.attach(1, |_, _| panic!("second callback must not replace the first")).unwrap();
        assert_eq!(session.attached_count(), 1);

        session.detach(1).unwrap();
        assert!(!session.is_attached(1));
        assert!(matches!(session.detach(1), Err(Error::EventNotFound(1))));
    }

    #[test]
    fn test_send_before_start_fails() {
        let registry = Arc::new(Registry::new());
        let a = quick(&registry, PortId::new(1, 2, 5));
        let mut b = quick(&registry, PortId::new(1, 2, 6));
        b.start().unwrap();
        assert!(matches!(
            a.send(b.id(), 1, b"x"),
            Err(Error::NotConnected(_))
        ));
    }

    #[test]
    fn test_send_rejects_reserved_destinations() {
        let registry = Arc::new(Registry::new());
        let mut a = quick(&registry, PortId::new(1, 2, 5));
        a.start().unwrap();
        assert!(matches!(
            a.send(PortId::BROADCAST, 1, b"x"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            a.send(PortId::UNKNOWN, 1, b"x"),
            Err(Error::InvalidPortId(_))
        ));
    }

    #[test]
    fn test_local_send_dispatches() {
        let registry = Arc::new(Registry::new());
        let mut a = quick(&registry, PortId::new(1, 2, 5));
        let mut b = quick(&registry, PortId::new(1, 2, 6));

        let (tx, rx) = channel::unbounded();
        b.attach(0x20, move |_, msg| {
            let _ = tx.send((msg.source, msg.event, msg.payload.to_vec()));
        })
        .unwrap();
        a.start().unwrap();
        b.start().unwrap();

        a.send(b.id(), 0x20, b"hello").unwrap();
        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, (a.id(), 0x20, b"hello".to_vec()));
    }

    #[test]
    fn test_corrupted_frame_is_skipped() {
        let registry = Arc::new(Registry::new());
        let source = PortId::new(1, 2, 5);
        let mut session = quick(&registry, PortId::new(1, 2, 6));

        let (tx, rx) = channel::unbounded();
        session
            .attach(0x30, move |_, msg| {
                let _ = tx.send(msg.payload.to_vec());
            })
            .unwrap();
        session.start().unwrap();
        let port = registry.get(session.id()).unwrap();

        let mut flipped = wire::encode(source, session.id(), 0x30, b"bad").unwrap();
        flipped.data_mut()[EVENT_HEADER_LEN] ^= 0x01;
        port.enqueue(flipped).unwrap();
        port.enqueue(Frame::from_bytes(&[0u8; 6])).unwrap();
        port.enqueue(wire::encode(source, session.id(), 0x30, b"good").unwrap())
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"good".to_vec());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_callback_can_reply() {
        let registry = Arc::new(Registry::new());
        let mut ping = quick(&registry, PortId::new(1, 2, 5));
        let mut pong = quick(&registry, PortId::new(1, 2, 6));

        pong.attach(1, |sender, msg| {
            sender.send(msg.source, 2, msg.payload).unwrap();
        })
        .unwrap();
        let (tx, rx) = channel::unbounded();
        ping.attach(2, move |_, msg| {
            let _ = tx.send(msg.payload.to_vec());
        })
        .unwrap();
        ping.start().unwrap();
        pong.start().unwrap();

        ping.send(pong.id(), 1, b"seq-1").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), b"seq-1");
    }

    #[test]
    fn test_unattached_event_is_dropped() {
        let registry = Arc::new(Registry::new());
        let mut a = quick(&registry, PortId::new(1, 2, 5));
        let mut b = quick(&registry, PortId::new(1, 2, 6));
        let (tx, rx) = channel::unbounded();
        b.attach(2, move |_, _| {
            let _ = tx.send(());
        })
        .unwrap();
        a.start().unwrap();
        b.start().unwrap();

        a.send(b.id(), 1, b"ignored").unwrap();
        a.send(b.id(), 2, b"handled").unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_reaches_other_sessions() {
        let registry = Arc::new(Registry::new());
        let mut a = quick(&registry, PortId::new(1, 2, 5));
        let mut b = quick(&registry, PortId::new(1, 2, 6));
        let mut c = quick(&registry, PortId::new(1, 3, 6));
        let (tx, rx) = channel::unbounded();
        for session in [&a, &b, &c] {
            let tx = tx.clone();
            let id = session.id();
            session
                .attach(9, move |_, msg| {
                    let _ = tx.send((id, msg.payload.to_vec()));
                })
                .unwrap();
        }
        a.start().unwrap();
        b.start().unwrap();
        c.start().unwrap();

        assert_eq!(a.broadcast(9, b"all").unwrap(), 2);
        let mut got: Vec<_> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        got.sort();
        assert_eq!(got, vec![(b.id(), b"all".to_vec()), (c.id(), b"all".to_vec())]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_stop_is_prompt_and_restartable() {
        let registry = Arc::new(Registry::new());
        let mut a = quick(&registry, PortId::new(1, 2, 5));
        a.start().unwrap();
        assert!(matches!(a.start(), Err(Error::AlreadyRunning)));

        let started = Instant::now();
        a.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(registry.get(a.id()).unwrap().state(), PortState::Disconn);
        assert!(matches!(a.stop(), Err(Error::NotRunning)));

        a.start().unwrap();
        assert!(wait_for(|| registry.get(a.id()).unwrap().is_connected()));
    }
}
