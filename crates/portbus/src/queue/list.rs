// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-list blocking queue.

use super::{normalize_capacity, BlockingQueue, Closed, Popped};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// One lock guarding one list, with `not_full` and `not_empty` conditions.
pub struct ListQueue<T> {
    state: Mutex<State<T>>,
    /// Signaled on push
    not_empty: Condvar,
    /// Signaled on pop when bounded
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> ListQueue<T> {
    /// Create a queue; `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: normalize_capacity(capacity),
        }
    }

    #[inline]
    fn is_full(&self, state: &State<T>) -> bool {
        self.capacity.is_some_and(|cap| state.items.len() >= cap)
    }

    fn take(&self, state: &mut State<T>) -> Option<T> {
        let item = state.items.pop_front()?;
        if self.capacity.is_some() {
            self.not_full.notify_one();
        }
        Some(item)
    }
}

impl<T: Send> BlockingQueue<T> for ListQueue<T> {
    fn push(&self, item: T) -> Result<(), Closed<T>> {
        let mut state = self.state.lock();
        while self.is_full(&state) && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(Closed(item));
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = self.take(&mut state) {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    fn pop_timeout(&self, timeout: Duration) -> Popped<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = self.take(&mut state) {
                return Popped::Item(item);
            }
            if state.closed {
                return Popped::Closed;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return match self.take(&mut state) {
                    Some(item) => Popped::Item(item),
                    None => Popped::TimedOut,
                };
            }
        }
    }

    fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = ListQueue::new(None);
        for i in 0..10 {
            queue.push(i).unwrap();
        }
        for i in 0..10 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(ListQueue::new(None));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(42u32).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_close_wakes_consumer() {
        let queue: Arc<ListQueue<u32>> = Arc::new(ListQueue::new(None));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_close_drains_then_rejects() {
        let queue = ListQueue::new(Some(4));
        queue.push(1u8).unwrap();
        queue.push(2).unwrap();
        queue.close();

        assert_eq!(queue.push(3), Err(Closed(3)));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)), Popped::Item(2));
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)), Popped::Closed);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let queue = Arc::new(ListQueue::new(Some(1)));
        queue.push(0u8).unwrap();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(1))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(producer.join().unwrap(), Err(Closed(1)));
    }

    #[test]
    fn test_timeout_elapses() {
        let queue: ListQueue<u8> = ListQueue::new(None);
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(15)), Popped::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
