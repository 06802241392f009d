// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event header.
//!
//! ```text
//! 0       4        6      8        12       16
//! +-------+--------+------+--------+--------+-----------+
//! | hash  | source | dest | event  | length | payload   |
//! +-------+--------+------+--------+--------+-----------+
//! ```
//!
//! `hash` is [`event_hash`] over everything after it. Fields are pushed in
//! reverse order behind the payload and pulled back in forward order.

use crate::error::{Error, Result};
use crate::frame::{Frame, DEFAULT_HEAD_ROOM, DEFAULT_TAIL_ROOM};
use crate::hash::event_hash;
use crate::port::PortId;

/// Event header size in bytes
pub const EVENT_HEADER_LEN: usize = 16;

/// Decoded event header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub source: PortId,
    pub dest: PortId,
    pub event: u32,
    pub len: u32,
}

/// Build a frame carrying `payload` from `source` to `dest`.
pub fn encode(source: PortId, dest: PortId, event: u32, payload: &[u8]) -> Result<Frame> {
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::InvalidArgument(format!("payload of {} bytes", payload.len())))?;

    let mut frame = Frame::new(DEFAULT_HEAD_ROOM, payload.len(), DEFAULT_TAIL_ROOM);
    frame.copy_into_data(payload)?;
    frame.push_u32(len)?;
    frame.push_u32(event)?;
    frame.push_u16(dest.raw())?;
    frame.push_u16(source.raw())?;
    let hash = event_hash(frame.data());
    frame.push_u32(hash)?;
    Ok(frame)
}

/// Verify and strip the header, leaving the payload in the data window.
///
/// Bytes past the declared length are trimmed from the returned payload
/// length but left in the frame.
pub fn decode(frame: &mut Frame) -> Result<EventHeader> {
    if frame.len() < EVENT_HEADER_LEN {
        return Err(Error::Malformed("frame shorter than event header"));
    }
    let expected = frame.peek_u32(0)?;
    let actual = event_hash(&frame.data()[4..]);
    if expected != actual {
        return Err(Error::Integrity { expected, actual });
    }

    frame.pull_front(4)?;
    let source = PortId::from_raw(frame.pull_u16()?);
    let dest = PortId::from_raw(frame.pull_u16()?);
    let event = frame.pull_u32()?;
    let len = frame.pull_u32()?;
    if len as usize > frame.len() {
        return Err(Error::Malformed("event length exceeds frame"));
    }

    Ok(EventHeader {
        source,
        dest,
        event,
        len,
    })
}
