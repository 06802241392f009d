// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Addressable endpoints, their registry, and the router.
//!
//! A [`Port`] is a numbered inbox: an id, a connection state, one blocking
//! queue of [`Frame`]s, and an optional broadcast callback. Ports are created
//! and looked up through a [`Registry`]; [`next_hop`] decides where a frame
//! goes when its destination is not registered locally.

use crate::error::Result;
use crate::frame::Frame;
use crate::queue::{BlockingQueue, Closed, Popped};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod id;
mod registry;
mod route;

pub use id::PortId;
pub use registry::{Registry, Undelivered};
pub use route::next_hop;

/// Port lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PortState {
    Unknown = 0,
    /// Destroyed
    Exit = 1,
    /// Registered, receive worker not running yet
    Init = 2,
    /// Receive worker ready; the port accepts frames
    Conn = 3,
    /// Stopped
    Disconn = 4,
}

impl PortState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PortState::Exit,
            2 => PortState::Init,
            3 => PortState::Conn,
            4 => PortState::Disconn,
            _ => PortState::Unknown,
        }
    }
}

/// Invoked for every connected port (except the sender) on broadcast.
///
/// The frame is borrowed: a recipient that keeps it must copy it.
pub type BroadcastCallback = Arc<dyn Fn(&Port, &Frame) -> Result<()> + Send + Sync>;

/// Addressable endpoint with one inbound queue.
pub struct Port {
    id: PortId,
    state: AtomicU8,
    queue: Arc<dyn BlockingQueue<Frame>>,
    on_broadcast: Mutex<Option<BroadcastCallback>>,
}

impl Port {
    pub(crate) fn new(id: PortId, queue: Arc<dyn BlockingQueue<Frame>>) -> Self {
        Self {
            id,
            state: AtomicU8::new(PortState::Init as u8),
            queue,
            on_broadcast: Mutex::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> PortState {
        PortState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PortState) {
        let previous = self.state.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            log::debug!(
                "[PORT] {} {:?} -> {:?}",
                self.id,
                PortState::from_u8(previous),
                state
            );
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == PortState::Conn
    }

    /// Number of frames waiting in the inbound queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Append a frame to the inbound queue, blocking while a bounded queue is full.
    pub fn enqueue(&self, frame: Frame) -> core::result::Result<(), Closed<Frame>> {
        self.queue.push(frame)
    }

    /// Copy a borrowed frame into the inbound queue.
    ///
    /// This is the broadcast callback installed by gateways and event threads.
    pub fn enqueue_copy(&self, frame: &Frame) -> Result<()> {
        self.enqueue(frame.duplicate())
            .map_err(|_| crate::Error::QueueClosed)
    }

    /// Wait up to `timeout` for the next inbound frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Popped<Frame> {
        self.queue.pop_timeout(timeout)
    }

    /// Install the broadcast callback.
    pub fn set_broadcast_callback(&self, callback: BroadcastCallback) {
        *self.on_broadcast.lock() = Some(callback);
    }

    pub(crate) fn broadcast_callback(&self) -> Option<BroadcastCallback> {
        self.on_broadcast.lock().clone()
    }

    /// Close the inbound queue; pending frames are dropped with the port.
    pub(crate) fn close(&self) {
        self.queue.close();
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}
