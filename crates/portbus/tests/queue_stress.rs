// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! Producer/consumer stress tests for both queue designs.

use portbus::queue::Popped;
use portbus::{BlockingQueue, QueueConfig, QueueKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ITEMS: u32 = 10_000;
const KINDS: [QueueKind; 2] = [QueueKind::Single, QueueKind::Double];

fn spsc(queue: Arc<dyn BlockingQueue<u32>>) {
    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..ITEMS {
                queue.push(i).unwrap();
            }
        })
    };

    let mut expected = 0;
    while expected < ITEMS {
        let item = queue.pop().expect("queue closed early");
        assert_eq!(item, expected, "out of order");
        expected += 1;
    }
    producer.join().unwrap();
    assert!(queue.is_empty());
}

#[test]
fn test_spsc_unbounded_preserves_order() {
    for kind in KINDS {
        spsc(QueueConfig::unbounded(kind).build());
    }
}

#[test]
fn test_spsc_bounded_preserves_order() {
    for kind in KINDS {
        for capacity in [1, 7, 64] {
            spsc(QueueConfig::bounded(kind, capacity).build());
        }
    }
}

#[test]
fn test_mpmc_delivers_every_item_once() {
    const PRODUCERS: u32 = 4;
    const CONSUMERS: usize = 3;

    for kind in KINDS {
        let queue: Arc<dyn BlockingQueue<u32>> = QueueConfig::bounded(kind, 16).build();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..ITEMS {
                        queue.push(p * ITEMS + i).unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.pop() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        queue.close();

        let mut all: Vec<u32> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..PRODUCERS * ITEMS).collect::<Vec<_>>(), "{}", kind);
    }
}

#[test]
fn test_bounded_push_blocks_until_pop() {
    const CAPACITY: usize = 4;

    for kind in KINDS {
        let queue: Arc<dyn BlockingQueue<u32>> = QueueConfig::bounded(kind, CAPACITY).build();
        for i in 0..CAPACITY as u32 {
            queue.push(i).unwrap();
        }

        let pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = queue.clone();
            let pushed = pushed.clone();
            thread::spawn(move || {
                queue.push(CAPACITY as u32).unwrap();
                pushed.store(true, Ordering::SeqCst);
            })
        };

        // The (k+1)-th push stays blocked while the queue is full
        thread::sleep(Duration::from_millis(100));
        assert!(!pushed.load(Ordering::SeqCst), "{} push did not block", kind);

        assert_eq!(queue.pop(), Some(0));
        producer.join().unwrap();
        assert!(pushed.load(Ordering::SeqCst));

        let rest: Vec<u32> = (0..CAPACITY)
            .map(|_| match queue.pop_timeout(Duration::from_secs(1)) {
                Popped::Item(item) => item,
                other => panic!("{}: expected item, got {:?}", kind, other),
            })
            .collect();
        assert_eq!(rest, vec![1, 2, 3, 4]);
    }
}

#[test]
fn test_close_releases_blocked_threads() {
    for kind in KINDS {
        let queue: Arc<dyn BlockingQueue<u32>> = QueueConfig::bounded(kind, 1).build();
        queue.push(0).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(1).map_err(|closed| closed.into_inner()))
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(producer.join().unwrap(), Err(1));

        // Remaining item still drains after close
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), None);
    }
}
