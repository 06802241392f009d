// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking producer/consumer queues.
//!
//! Two interchangeable designs implement [`BlockingQueue`]:
//!
//! - [`ListQueue`]: one lock, one list, `not_full` / `not_empty` conditions.
//!   Every push and pop hands off through the same lock.
//! - [`SwapQueue`]: a push-side and a pop-side list behind separate locks.
//!   Consumers drain the pop side and, once it is empty, swap the whole
//!   push side across in O(1). Producers and consumers only meet on the
//!   swap, which keeps contention low under bursty traffic.
//!
//! Both block on condition variables (never spin), keep FIFO order for
//! non-concurrent operations, and honor an optional bound. A queue can be
//! closed: waiters wake up, pushes are rejected, and pops drain whatever is
//! left before reporting [`Popped::Closed`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

mod list;
mod swap;

pub use list::ListQueue;
pub use swap::SwapQueue;

/// Item handed back by a push on a closed queue.
#[derive(Debug, PartialEq, Eq)]
pub struct Closed<T>(pub T);

impl<T> Closed<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Outcome of a timed pop.
#[derive(Debug, PartialEq, Eq)]
pub enum Popped<T> {
    /// An item was dequeued
    Item(T),
    /// Nothing arrived before the deadline
    TimedOut,
    /// Queue is closed and fully drained
    Closed,
}

/// Thread-safe FIFO with blocking push (when bounded) and blocking pop.
pub trait BlockingQueue<T>: Send + Sync {
    /// Append `item`, blocking while a bounded queue is full.
    fn push(&self, item: T) -> Result<(), Closed<T>>;

    /// Remove the oldest item, blocking while empty.
    ///
    /// Returns `None` only once the queue is closed and drained.
    fn pop(&self) -> Option<T>;

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    fn pop_timeout(&self, timeout: Duration) -> Popped<T>;

    /// Number of queued items.
    fn len(&self) -> usize;

    /// True if no items are queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bound, or `None` when unbounded.
    ///
    /// [`ListQueue`] never holds more than this many items. [`SwapQueue`]
    /// bounds only its push-side list, so up to twice the bound can be
    /// queued while a swapped batch is still being drained.
    fn capacity(&self) -> Option<usize>;

    /// Close the queue and wake every blocked producer and consumer.
    fn close(&self);

    /// True once [`close`](Self::close) was called.
    fn is_closed(&self) -> bool;
}

/// Queue design selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Single list, single lock ([`ListQueue`])
    Single,
    /// Double list with bulk swap ([`SwapQueue`])
    #[default]
    Double,
}

impl FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "list" | "basic" => Ok(QueueKind::Single),
            "double" | "swap" | "double-list" => Ok(QueueKind::Double),
            _ => Err(format!("Unknown queue kind: {}", s)),
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::Single => write!(f, "single"),
            QueueKind::Double => write!(f, "double"),
        }
    }
}

/// Queue construction parameters shared by every port of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue design
    #[serde(default)]
    pub kind: QueueKind,

    /// Maximum queued items (`None` = unbounded)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl QueueConfig {
    /// Unbounded queue of the given kind.
    pub fn unbounded(kind: QueueKind) -> Self {
        Self {
            kind,
            capacity: None,
        }
    }

    /// Bounded queue of the given kind.
    pub fn bounded(kind: QueueKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity: Some(capacity),
        }
    }

    /// Build a queue as a trait object.
    pub fn build<T: Send + 'static>(&self) -> Arc<dyn BlockingQueue<T>> {
        match self.kind {
            QueueKind::Single => Arc::new(ListQueue::new(self.capacity)),
            QueueKind::Double => Arc::new(SwapQueue::new(self.capacity)),
        }
    }
}

/// A zero bound would block every producer forever.
pub(crate) fn normalize_capacity(capacity: Option<usize>) -> Option<usize> {
    capacity.map(|c| c.max(1))
}
