// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway envelope: the per-hop header added around a frame in transit.
//!
//! ```text
//! 0       4        6      8
//! +-------+--------+------+----------------------+
//! | hash  | source | dest | inner frame          |
//! +-------+--------+------+----------------------+
//! ```
//!
//! `hash` is [`gateway_hash`] over everything after it. All fields are
//! big-endian. Inner frames carry their own `[hash][source][dest]` prefix,
//! which is where the uplink reads the addresses from.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::hash::gateway_hash;
use crate::port::PortId;

/// Envelope size in bytes
pub const ENVELOPE_LEN: usize = 8;

/// Addresses carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub source: PortId,
    pub dest: PortId,
}

/// Read source and destination from an inner frame without consuming it.
pub fn peek_route(frame: &Frame) -> Result<Route> {
    if frame.len() < ENVELOPE_LEN {
        return Err(Error::Malformed("frame shorter than port header"));
    }
    Ok(Route {
        source: PortId::from_raw(frame.peek_u16(4)?),
        dest: PortId::from_raw(frame.peek_u16(6)?),
    })
}

/// Prepend an envelope for `route` and hash it.
pub fn seal(frame: &mut Frame, route: Route) -> Result<()> {
    frame.push_u16(route.dest.raw())?;
    frame.push_u16(route.source.raw())?;
    let hash = gateway_hash(frame.data());
    frame.push_u32(hash)
}

/// Verify and strip an envelope, leaving the inner frame.
///
/// The frame is untouched on failure.
pub fn open(frame: &mut Frame) -> Result<Route> {
    if frame.len() < ENVELOPE_LEN {
        return Err(Error::Malformed("frame shorter than envelope"));
    }
    let expected = frame.peek_u32(0)?;
    let actual = gateway_hash(&frame.data()[4..]);
    if expected != actual {
        return Err(Error::Integrity { expected, actual });
    }

    frame.pull_front(4)?;
    let source = PortId::from_raw(frame.pull_u16()?);
    let dest = PortId::from_raw(frame.pull_u16()?);
    Ok(Route { source, dest })
}
