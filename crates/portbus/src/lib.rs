// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # portbus - port-addressed messaging for embedded controllers
//!
//! In-process ports exchange [`Frame`]s through blocking queues. Ports that
//! live on another channel or domain are reached through a [`Gateway`],
//! which wraps frames in a hashed envelope and hands them to a
//! [`Transport`](transport::Transport). Applications talk through
//! [`EventThread`]s: pub/sub sessions keyed by 32-bit event ids.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portbus::{EventThread, Gateway, GatewayConfig, PortId, Registry};
//! use portbus::transport::{UdpConfig, UdpTransport};
//! use std::sync::Arc;
//!
//! fn main() -> portbus::Result<()> {
//!     let registry = Arc::new(Registry::new());
//!
//!     // Channel 2 of the application domain, reachable over UDP
//!     let udp = UdpTransport::new(UdpConfig::default())?;
//!     let mut gateway = Gateway::create(
//!         registry.clone(),
//!         PortId::new(1, 2, 1),
//!         Box::new(udp),
//!         GatewayConfig::default(),
//!     )?;
//!     gateway.start()?;
//!
//!     let mut session = EventThread::create(registry, PortId::new(1, 2, 5), 0)?;
//!     session.attach(0x100, |_, msg| println!("{} bytes from {}", msg.payload.len(), msg.source))?;
//!     session.start()?;
//!     session.send(PortId::new(0, 3, 4), 0x200, b"status")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  EventThread (event id -> callback, xxh32 event header)     |
//! +-------------------------------------------------------------+
//! |  Registry + Port (blocking queues)  |  next_hop router      |
//! +-------------------------------------------------------------+
//! |  Gateway (uplink / downlink, murmur3 envelope)              |
//! +-------------------------------------------------------------+
//! |  Transport: memory hub | UDP                                |
//! +-------------------------------------------------------------+
//! ```
//!
//! ## Addressing
//!
//! A [`PortId`] is `X.Y.Z`: domain bit, 8-bit channel, 7-bit role. Role 1
//! is a channel's gateway. `0.0.1`, `1.0.1` and `1.0.2` form the backbone
//! between the controller and application domains.

// Clippy: No blanket suppressions. Fix issues properly or use inline #[allow] with justification.

/// Error and result types.
pub mod error;
/// Contiguous byte buffer with head-room for prepending headers.
pub mod frame;
/// Blocking FIFO queues (single-lock list and double-buffered swap).
pub mod queue;
/// Port ids, ports, the registry and the router.
pub mod port;
/// Envelope and event-header hash functions.
pub mod hash;
/// Worker thread spawning with real-time priority.
pub mod sched;
/// Transport trait and bindings.
pub mod transport;
/// Bridge between local ports and a transport.
pub mod gateway;
/// Pub/sub sessions over ports.
pub mod event;

pub use error::{Error, Result};
pub use event::{EventConfig, EventSender, EventThread, Received};
pub use frame::Frame;
pub use gateway::{Gateway, GatewayConfig, GatewayStats, GatewayStatsSnapshot};
pub use port::{next_hop, Port, PortId, PortState, Registry};
pub use queue::{BlockingQueue, QueueConfig, QueueKind};
