// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame buffer with head-room for in-place header construction.
//!
//! A [`Frame`] owns one contiguous allocation split by four cursors:
//!
//! ```text
//! head            data                 tail            end
//!  |<- head-room ->|<----- payload ----->|<- tail-room ->|
//! ```
//!
//! Headers are attached by pushing fields in front of `data` in reverse
//! field order and stripped by pulling them in forward order, so a frame
//! travels through every layer without being reallocated. The invariant
//! `head <= data <= tail <= end` holds after every operation; a call that
//! would break it fails with [`Error::NoSpace`] and leaves the frame
//! untouched.

use crate::error::{Error, Result};

/// Head-room reserved for headers by frame builders
pub const DEFAULT_HEAD_ROOM: usize = 32;

/// Tail-room reserved by frame builders
pub const DEFAULT_TAIL_ROOM: usize = 0;

/// Owned message buffer with head/data/tail cursors.
///
/// `head` is always offset 0 and `end` is always `buf.len()`.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    buf: Box<[u8]>,
    data: usize,
    tail: usize,
}

impl Frame {
    /// Allocate `head_room + payload_len + tail_room` zeroed bytes.
    ///
    /// The data window covers the `payload_len` bytes between the two rooms.
    pub fn new(head_room: usize, payload_len: usize, tail_room: usize) -> Self {
        let total = head_room + payload_len + tail_room;
        Self {
            buf: vec![0u8; total].into_boxed_slice(),
            data: head_room,
            tail: total - tail_room,
        }
    }

    /// Frame whose data window is an exact copy of `bytes`, with no spare room.
    ///
    /// Used for frames received from a transport, where headers are only
    /// ever stripped.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::with_head_room(0, bytes)
    }

    /// Frame holding a copy of `bytes` behind `head_room` spare bytes.
    pub fn with_head_room(head_room: usize, bytes: &[u8]) -> Self {
        let mut frame = Self::new(head_room, bytes.len(), 0);
        frame.buf[head_room..].copy_from_slice(bytes);
        frame
    }

    /// Independent copy of the data window with default head-room restored.
    ///
    /// Broadcast fan-out hands one of these to every recipient.
    pub fn duplicate(&self) -> Self {
        Self::with_head_room(DEFAULT_HEAD_ROOM, self.data())
    }

    /// Copy `bytes` to the start of the data window.
    pub fn copy_into_data(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if bytes.len() > self.len() {
            return Err(Error::NoSpace {
                needed: bytes.len(),
                available: self.len(),
            });
        }
        self.buf[self.data..self.data + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Grow the data window toward `head` and write `bytes` there.
    pub fn push_front(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if bytes.len() > self.head_room() {
            return Err(Error::NoSpace {
                needed: bytes.len(),
                available: self.head_room(),
            });
        }
        self.data -= bytes.len();
        self.buf[self.data..self.data + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Shrink the data window from the front by `len` bytes.
    pub fn pull_front(&mut self, len: usize) -> Result<()> {
        if len > self.len() {
            return Err(Error::NoSpace {
                needed: len,
                available: self.len(),
            });
        }
        self.data += len;
        Ok(())
    }

    /// Push a big-endian `u16`.
    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        self.push_front(&value.to_be_bytes())
    }

    /// Push a big-endian `u32`.
    pub fn push_u32(&mut self, value: u32) -> Result<()> {
        self.push_front(&value.to_be_bytes())
    }

    /// Read and strip a big-endian `u16`.
    pub fn pull_u16(&mut self) -> Result<u16> {
        let value = self.peek_u16(0)?;
        self.pull_front(2)?;
        Ok(value)
    }

    /// Read and strip a big-endian `u32`.
    pub fn pull_u32(&mut self) -> Result<u32> {
        let value = self.peek_u32(0)?;
        self.pull_front(4)?;
        Ok(value)
    }

    /// Read a big-endian `u16` at `offset` into the data window.
    pub fn peek_u16(&self, offset: usize) -> Result<u16> {
        let bytes = self.window(offset, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian `u32` at `offset` into the data window.
    pub fn peek_u32(&self, offset: usize) -> Result<u32> {
        let bytes = self.window(offset, 4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn window(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let data = self.data();
        match offset.checked_add(len) {
            Some(end) if end <= data.len() => Ok(&data[offset..end]),
            _ => Err(Error::NoSpace {
                needed: offset.saturating_add(len),
                available: data.len(),
            }),
        }
    }

    /// Current data window.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.data..self.tail]
    }

    /// Current data window (mutable).
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.data..self.tail]
    }

    /// Length of the data window.
    #[inline]
    pub fn len(&self) -> usize {
        self.tail - self.data
    }

    /// True if the data window is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tail == self.data
    }

    /// Bytes available in front of the data window.
    #[inline]
    pub fn head_room(&self) -> usize {
        self.data
    }

    /// Bytes available behind the data window.
    #[inline]
    pub fn tail_room(&self) -> usize {
        self.buf.len() - self.tail
    }

    /// Size of the backing allocation.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("head_room", &self.head_room())
            .field("len", &self.len())
            .field("tail_room", &self.tail_room())
            .finish()
    }
}
