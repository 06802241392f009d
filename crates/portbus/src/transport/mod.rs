// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport bindings used by gateways to reach other processes.
//!
//! A binding moves opaque byte frames between gateways addressed by
//! [`PortId`]. It knows nothing about headers or routing: the gateway
//! resolves the next hop and hands the sealed frame over.
//!
//! Bindings:
//! - [`MemoryTransport`]: in-process hub, for tests and single-binary demos
//! - [`UdpTransport`]: datagrams to a static peer table

use crate::error::Result;
use crate::frame::Frame;
use crate::port::PortId;
use std::sync::Arc;

pub mod memory;
pub mod udp;

pub use memory::{MemoryHub, MemoryTransport};
pub use udp::{UdpConfig, UdpPeer, UdpTransport};

/// Receive hook installed by the gateway.
///
/// May be called from any thread. The slice is only valid for the duration
/// of the call; implementations copy what they keep.
pub type RecvCallback = Arc<dyn Fn(&[u8]) -> Result<()> + Send + Sync>;

/// Uniform interface over the physical link between gateways.
///
/// Call order is `init`, `set_recv_callback`, `start`, then any number of
/// `send`, then `stop` and `exit`.
pub trait Transport: Send {
    /// Short binding name for logs.
    fn name(&self) -> &'static str;

    /// Bind the transport to the gateway's id.
    fn init(&mut self, id: PortId) -> Result<()>;

    /// Release every resource acquired by `init`.
    fn exit(&mut self) -> Result<()>;

    /// Send `frame` toward `dest`.
    ///
    /// [`PortId::BROADCAST`] reaches every known peer except this one.
    fn send(&mut self, dest: PortId, frame: &Frame) -> Result<()>;

    /// Install the receive hook.
    fn set_recv_callback(&mut self, callback: RecvCallback);

    /// Begin delivering received frames to the hook.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering received frames.
    fn stop(&mut self) -> Result<()>;
}
