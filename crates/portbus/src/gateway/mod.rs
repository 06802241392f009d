// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway: bridge between the local port namespace and a transport.
//!
//! A gateway owns the port of this process's channel route (`Z = 1`), so any
//! local frame whose next hop is the route lands in the gateway's queue. Two
//! workers move frames across:
//!
//! ```text
//!  local ports --registry send--> [gateway port] --uplink--> transport
//!  transport --recv callback--> [ingress] --downlink--> local ports
//!                                                  \--relay--> transport
//! ```
//!
//! - **Uplink** reads the addresses from the frame's port header, resolves
//!   the next hop from the gateway id, seals an [`envelope`] and sends it.
//! - **Downlink** verifies and strips the envelope, then fans broadcasts out
//!   to every other connected port, delivers unicast frames through the
//!   registry, or relays them over the transport when the next hop is
//!   another gateway.
//!
//! Integrity failures and unroutable frames are dropped, counted, and never
//! stop a worker.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::port::{next_hop, Port, PortId, PortState, Registry, Undelivered};
use crate::queue::{BlockingQueue, Popped, QueueConfig};
use crate::sched::{spawn_worker, DEFAULT_RT_PRIORITY};
use crate::transport::{RecvCallback, Transport};
use crossbeam::channel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub mod envelope;
mod stats;

pub use envelope::{Route, ENVELOPE_LEN};
pub use stats::{GatewayStats, GatewayStatsSnapshot};

/// Gateway tuning.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `SCHED_RR` priority of the workers (0 = inherit)
    pub priority: u8,
    /// How long a worker waits on its queue before re-checking the stop flag
    pub poll_interval: Duration,
    /// Ingress queue parameters
    ///
    /// Keep this unbounded (the default) on a [`MemoryHub`]: delivery there
    /// pushes into the peer's ingress on the sender's worker while the
    /// sender holds its transport lock, so two relaying gateways with full
    /// bounded ingress queues wait on each other forever.
    ///
    /// [`MemoryHub`]: crate::transport::memory::MemoryHub
    pub ingress: QueueConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            priority: DEFAULT_RT_PRIORITY,
            poll_interval: Duration::from_millis(20),
            ingress: QueueConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn ingress(mut self, ingress: QueueConfig) -> Self {
        self.ingress = ingress;
        self
    }
}

/// State shared with the worker threads.
struct Bridge {
    id: PortId,
    registry: Arc<Registry>,
    port: Arc<Port>,
    ingress: Arc<dyn BlockingQueue<Frame>>,
    transport: Mutex<Box<dyn Transport>>,
    running: AtomicBool,
    stats: Arc<GatewayStats>,
}

impl Bridge {
    /// Local frame headed off-process.
    fn uplink(&self, mut frame: Frame) {
        let route = match envelope::peek_route(&frame) {
            Ok(route) => route,
            Err(e) => {
                self.stats.record_malformed();
                log::warn!("[GATEWAY] {} uplink: dropping frame: {}", self.id, e);
                return;
            }
        };

        let hop = if route.dest.is_broadcast() {
            Some(PortId::BROADCAST)
        } else {
            next_hop(self.id, route.dest).filter(|hop| *hop != self.id)
        };
        let hop = match hop {
            Some(hop) => hop,
            None => {
                self.stats.record_unroutable();
                log::debug!(
                    "[GATEWAY] {} uplink: no route {} -> {}",
                    self.id,
                    route.source,
                    route.dest
                );
                return;
            }
        };

        if let Err(e) = envelope::seal(&mut frame, route) {
            self.stats.record_malformed();
            log::warn!("[GATEWAY] {} uplink: cannot seal frame: {}", self.id, e);
            return;
        }
        self.transmit(hop, &frame, false);
    }

    /// Frame received from the transport.
    fn downlink(&self, mut frame: Frame) {
        let wire_len = frame.len();
        let route = match envelope::open(&mut frame) {
            Ok(route) => route,
            Err(e @ Error::Integrity { .. }) => {
                self.stats.record_integrity_failure();
                log::warn!("[GATEWAY] {} downlink: dropping frame: {}", self.id, e);
                return;
            }
            Err(e) => {
                self.stats.record_malformed();
                log::warn!("[GATEWAY] {} downlink: dropping frame: {}", self.id, e);
                return;
            }
        };
        self.stats.record_downlink(wire_len);

        if route.dest.is_broadcast() {
            match self.registry.broadcast(&self.port, &frame) {
                Ok(recipients) => self.stats.record_broadcast(recipients),
                Err(e) => {
                    self.stats.record_undeliverable();
                    log::debug!("[GATEWAY] {} broadcast failed: {}", self.id, e);
                }
            }
            return;
        }

        match self.registry.send(&self.port, route.dest, frame) {
            Ok(()) => self.stats.record_delivered(),
            Err(undelivered) => self.relay(route, undelivered),
        }
    }

    /// Forward a frame with no local target to the next gateway.
    fn relay(&self, route: Route, undelivered: Undelivered) {
        let Undelivered { error, mut frame } = undelivered;

        let hop = match error {
            Error::Unreachable(_) => next_hop(self.id, route.dest)
                .filter(|hop| *hop != self.id && self.registry.get(*hop).is_none()),
            _ => None,
        };
        let hop = match hop {
            Some(hop) => hop,
            None => {
                self.stats.record_undeliverable();
                log::debug!(
                    "[GATEWAY] {} cannot deliver {} -> {}: {}",
                    self.id,
                    route.source,
                    route.dest,
                    error
                );
                return;
            }
        };

        if let Err(e) = envelope::seal(&mut frame, route) {
            self.stats.record_malformed();
            log::warn!("[GATEWAY] {} relay: cannot seal frame: {}", self.id, e);
            return;
        }
        self.transmit(hop, &frame, true);
    }

    fn transmit(&self, hop: PortId, frame: &Frame, relayed: bool) {
        let result = self.transport.lock().send(hop, frame);
        match result {
            Ok(()) => {
                self.stats.record_uplink(frame.len());
                if relayed {
                    self.stats.record_relayed();
                }
            }
            Err(e) => {
                self.stats.record_send_error();
                log::debug!("[GATEWAY] {} send to {} failed: {}", self.id, hop, e);
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

fn uplink_loop(bridge: &Bridge, poll: Duration) {
    while bridge.is_running() {
        match bridge.port.recv_timeout(poll) {
            Popped::Item(frame) => bridge.uplink(frame),
            Popped::TimedOut => {}
            Popped::Closed => break,
        }
    }
    log::debug!("[GATEWAY] {} uplink stopped", bridge.id);
}

fn downlink_loop(bridge: &Bridge, poll: Duration) {
    while bridge.is_running() {
        match bridge.ingress.pop_timeout(poll) {
            Popped::Item(frame) => bridge.downlink(frame),
            Popped::TimedOut => {}
            Popped::Closed => break,
        }
    }
    log::debug!("[GATEWAY] {} downlink stopped", bridge.id);
}

/// Per-process bridge to one transport binding.
pub struct Gateway {
    bridge: Arc<Bridge>,
    config: GatewayConfig,
    workers: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Register the gateway port `id` and bind `transport` to it.
    ///
    /// Nothing is left registered if any step fails.
    pub fn create(
        registry: Arc<Registry>,
        id: PortId,
        mut transport: Box<dyn Transport>,
        config: GatewayConfig,
    ) -> Result<Self> {
        if id.is_reserved() {
            return Err(Error::InvalidPortId(id));
        }

        let ingress = config.ingress.build::<Frame>();
        let port = registry.create_port(id)?;
        port.set_broadcast_callback(Arc::new(|port: &Port, frame: &Frame| {
            port.enqueue_copy(frame)
        }));

        if let Err(e) = transport.init(id) {
            let _ = registry.destroy_port(id);
            return Err(e);
        }

        let sink = ingress.clone();
        let on_receive: RecvCallback = Arc::new(move |bytes: &[u8]| {
            if bytes.is_empty() {
                return Err(Error::Malformed("empty datagram"));
            }
            sink.push(Frame::from_bytes(bytes))
                .map_err(|_| Error::QueueClosed)
        });
        transport.set_recv_callback(on_receive);

        log::info!(
            "[GATEWAY] {} created on {} transport",
            id,
            transport.name()
        );

        Ok(Self {
            bridge: Arc::new(Bridge {
                id,
                registry,
                port,
                ingress,
                transport: Mutex::new(transport),
                running: AtomicBool::new(false),
                stats: Arc::new(GatewayStats::new()),
            }),
            config,
            workers: Vec::new(),
        })
    }

    /// Gateway (and gateway port) id.
    pub fn id(&self) -> PortId {
        self.bridge.id
    }

    pub fn is_running(&self) -> bool {
        self.bridge.is_running()
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<GatewayStats> {
        self.bridge.stats.clone()
    }

    /// Start uplink and downlink workers, then the transport.
    ///
    /// Returns once the gateway port is connected and both workers are
    /// polling their queues.
    pub fn start(&mut self) -> Result<()> {
        if self.bridge.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }

        if let Err(e) = self.spawn_workers() {
            self.halt_workers();
            return Err(e);
        }

        let started = self.bridge.transport.lock().start();
        if let Err(e) = started {
            self.halt_workers();
            return Err(e);
        }

        log::info!("[GATEWAY] {} started", self.bridge.id);
        Ok(())
    }

    fn spawn_workers(&mut self) -> Result<()> {
        let id = self.bridge.id;
        let poll = self.config.poll_interval;

        // One channel per worker: a worker that dies early drops its sender
        let (ready_tx, ready_rx) = channel::bounded::<()>(1);
        let bridge = self.bridge.clone();
        self.workers.push(spawn_worker(
            format!("pb-gw-up-{}", id),
            self.config.priority,
            move || {
                bridge.port.set_state(PortState::Conn);
                let _ = ready_tx.send(());
                uplink_loop(&bridge, poll);
            },
        )?);
        ready_rx
            .recv()
            .map_err(|_| Error::Spawn("uplink worker exited during startup".into()))?;

        let (ready_tx, ready_rx) = channel::bounded::<()>(1);
        let bridge = self.bridge.clone();
        self.workers.push(spawn_worker(
            format!("pb-gw-down-{}", id),
            self.config.priority,
            move || {
                let _ = ready_tx.send(());
                downlink_loop(&bridge, poll);
            },
        )?);
        ready_rx
            .recv()
            .map_err(|_| Error::Spawn("downlink worker exited during startup".into()))?;

        Ok(())
    }

    fn halt_workers(&mut self) {
        self.bridge.running.store(false, Ordering::Release);
        self.bridge.port.set_state(PortState::Disconn);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("[GATEWAY] {} worker panicked", self.bridge.id);
            }
        }
    }

    /// Stop the transport and both workers.
    ///
    /// A frame a worker holds when the stop lands is finished, then the
    /// worker exits within one poll interval. Frames still queued stay
    /// queued and are processed after a restart.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }

        let stopped = self.bridge.transport.lock().stop();
        if let Err(e) = &stopped {
            log::warn!("[GATEWAY] {} transport stop failed: {}", self.bridge.id, e);
        }
        self.halt_workers();

        log::info!("[GATEWAY] {} stopped", self.bridge.id);
        stopped
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
        if let Err(e) = self.bridge.transport.lock().exit() {
            log::warn!("[GATEWAY] {} transport exit failed: {}", self.bridge.id, e);
        }
        self.bridge.ingress.close();
        let _ = self.bridge.registry.destroy_port(self.bridge.id);
    }
}
