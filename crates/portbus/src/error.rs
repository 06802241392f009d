// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared by every portbus component.

use crate::port::PortId;
use thiserror::Error;

/// Result type for portbus operations
pub type Result<T> = core::result::Result<T, Error>;

/// portbus error type
///
/// Every failure is local to one call or one frame; nothing here is fatal
/// to the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Reserved (unknown/broadcast) or out-of-range port id
    #[error("invalid port id {0}")]
    InvalidPortId(PortId),

    /// Argument rejected before any side effect
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A frame cursor would leave its allocation
    #[error("frame has no space: needed {needed} bytes, {available} available")]
    NoSpace { needed: usize, available: usize },

    /// A port with this id is already registered
    #[error("port {0} already exists")]
    PortExists(PortId),

    /// No port with this id is registered
    #[error("port {0} not found")]
    PortNotFound(PortId),

    /// An event session with this id is already live
    #[error("event session {0} already exists")]
    SessionExists(PortId),

    /// Sender or target is not in the connected state
    #[error("port {0} is not connected")]
    NotConnected(PortId),

    /// Router could not resolve a next hop for this destination
    #[error("destination {0} is unreachable")]
    Unreachable(PortId),

    /// No callback registered for this event id
    #[error("event {0:#x} not attached")]
    EventNotFound(u32),

    /// Queue was closed while pushing
    #[error("queue closed")]
    QueueClosed,

    /// Frame failed header parsing
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// Header hash does not match the bytes it covers
    #[error("integrity check failed: header {expected:#010x}, computed {actual:#010x}")]
    Integrity { expected: u32, actual: u32 },

    /// Start called twice
    #[error("already running")]
    AlreadyRunning,

    /// Operation requires a running worker
    #[error("not running")]
    NotRunning,

    /// Transport binding failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Worker thread could not be spawned or joined
    #[error("thread error: {0}")]
    Spawn(String),

    /// I/O error from a socket or the OS
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
