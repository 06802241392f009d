// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Double-list blocking queue with bulk swap.
//!
//! Producers append to the push side under `push_side`; consumers drain the
//! pop side under `pop_side`. When the pop side runs dry, the consumer
//! takes the push lock and swaps the two lists in O(1). The bound applies to
//! the push side (the staging list): a swap can free every slot at once, so
//! it wakes all blocked producers instead of one.
//!
//! Lock order is always `pop_side` then `push_side`. A consumer keeps
//! `pop_side` while it waits for items, so [`len`](BlockingQueue::len) reads
//! an atomic total instead of taking either lock.

use super::{normalize_capacity, BlockingQueue, Closed, Popped};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

struct PushSide<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Two lists behind two locks, swapped in bulk by consumers.
pub struct SwapQueue<T> {
    push_side: Mutex<PushSide<T>>,
    pop_side: Mutex<VecDeque<T>>,
    /// Paired with `push_side`, signaled on push
    not_empty: Condvar,
    /// Paired with `push_side`, broadcast on swap from a full staging list
    not_full: Condvar,
    /// Items on both sides
    total: AtomicUsize,
    capacity: Option<usize>,
}

impl<T> SwapQueue<T> {
    /// Create a queue; `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            push_side: Mutex::new(PushSide {
                items: VecDeque::new(),
                closed: false,
            }),
            pop_side: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            total: AtomicUsize::new(0),
            capacity: normalize_capacity(capacity),
        }
    }

    /// Items waiting on the push side.
    pub fn staged_len(&self) -> usize {
        self.push_side.lock().items.len()
    }

    fn taken(&self, item: T) -> T {
        self.total.fetch_sub(1, Ordering::AcqRel);
        item
    }

    /// Move the whole push side onto the (empty) pop side.
    fn swap_lists(&self, pop: &mut VecDeque<T>, push: &mut MutexGuard<'_, PushSide<T>>) {
        debug_assert!(pop.is_empty());
        let was_full = self
            .capacity
            .is_some_and(|cap| push.items.len() >= cap);
        std::mem::swap(pop, &mut push.items);
        if was_full {
            self.not_full.notify_all();
        }
    }
}

impl<T: Send> BlockingQueue<T> for SwapQueue<T> {
    fn push(&self, item: T) -> Result<(), Closed<T>> {
        let mut push = self.push_side.lock();
        while !push.closed && self.capacity.is_some_and(|cap| push.items.len() >= cap) {
            self.not_full.wait(&mut push);
        }
        if push.closed {
            return Err(Closed(item));
        }
        push.items.push_back(item);
        self.total.fetch_add(1, Ordering::AcqRel);
        self.not_empty.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<T> {
        let mut pop = self.pop_side.lock();
        if let Some(item) = pop.pop_front() {
            return Some(self.taken(item));
        }

        let mut push = self.push_side.lock();
        while push.items.is_empty() {
            if push.closed {
                return None;
            }
            self.not_empty.wait(&mut push);
        }
        self.swap_lists(&mut pop, &mut push);
        drop(push);
        pop.pop_front().map(|item| self.taken(item))
    }

    fn pop_timeout(&self, timeout: Duration) -> Popped<T> {
        let deadline = Instant::now() + timeout;
        let mut pop = self.pop_side.lock();
        if let Some(item) = pop.pop_front() {
            return Popped::Item(self.taken(item));
        }

        let mut push = self.push_side.lock();
        while push.items.is_empty() {
            if push.closed {
                return Popped::Closed;
            }
            if self.not_empty.wait_until(&mut push, deadline).timed_out() && push.items.is_empty() {
                return Popped::TimedOut;
            }
        }
        self.swap_lists(&mut pop, &mut push);
        drop(push);
        match pop.pop_front() {
            Some(item) => Popped::Item(self.taken(item)),
            None => Popped::TimedOut,
        }
    }

    fn len(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn close(&self) {
        let mut push = self.push_side.lock();
        push.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.push_side.lock().closed
    }
}
