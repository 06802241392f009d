// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Gateway statistics, updated lock-free by the bridge workers.
#[derive(Debug)]
pub struct GatewayStats {
    /// Frames handed to the transport by the uplink
    pub uplink_frames: AtomicU64,
    /// Bytes handed to the transport by the uplink (envelope included)
    pub uplink_bytes: AtomicU64,
    /// Frames accepted by the downlink after verification
    pub downlink_frames: AtomicU64,
    /// Bytes accepted by the downlink (envelope included)
    pub downlink_bytes: AtomicU64,
    /// Downlink frames delivered to a local port
    pub delivered: AtomicU64,
    /// Downlink broadcast frames fanned out locally
    pub broadcasts: AtomicU64,
    /// Local recipients reached by those broadcasts
    pub broadcast_recipients: AtomicU64,
    /// Downlink frames forwarded back over the transport
    pub relayed: AtomicU64,
    /// Frames dropped on envelope hash mismatch
    pub integrity_failures: AtomicU64,
    /// Frames dropped because a header could not be parsed
    pub malformed: AtomicU64,
    /// Frames dropped because no next hop exists
    pub unroutable: AtomicU64,
    /// Frames dropped because the local target refused them
    pub undeliverable: AtomicU64,
    /// Transport send failures
    pub send_errors: AtomicU64,
    start_time: Instant,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self {
            uplink_frames: AtomicU64::new(0),
            uplink_bytes: AtomicU64::new(0),
            downlink_frames: AtomicU64::new(0),
            downlink_bytes: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            broadcast_recipients: AtomicU64::new(0),
            relayed: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            unroutable: AtomicU64::new(0),
            undeliverable: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_uplink(&self, bytes: usize) {
        self.uplink_frames.fetch_add(1, Ordering::Relaxed);
        self.uplink_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_downlink(&self, bytes: usize) {
        self.downlink_frames.fetch_add(1, Ordering::Relaxed);
        self.downlink_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, recipients: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.broadcast_recipients
            .fetch_add(recipients as u64, Ordering::Relaxed);
    }

    pub fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undeliverable(&self) {
        self.undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the gateway was created
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            uplink_frames: self.uplink_frames.load(Ordering::Relaxed),
            uplink_bytes: self.uplink_bytes.load(Ordering::Relaxed),
            downlink_frames: self.downlink_frames.load(Ordering::Relaxed),
            downlink_bytes: self.downlink_bytes.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            broadcast_recipients: self.broadcast_recipients.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            undeliverable: self.undeliverable.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Format stats as string
    pub fn format_summary(&self) -> String {
        let snap = self.snapshot();
        format!(
            "Gateway Stats (uptime: {}s)\n\
             Uplink:   {} frames ({} bytes)\n\
             Downlink: {} frames ({} bytes), delivered={}, relayed={}, broadcasts={} (to {})\n\
             Drops:    integrity={}, malformed={}, unroutable={}, undeliverable={}, send_errors={}",
            snap.uptime_secs,
            snap.uplink_frames,
            snap.uplink_bytes,
            snap.downlink_frames,
            snap.downlink_bytes,
            snap.delivered,
            snap.relayed,
            snap.broadcasts,
            snap.broadcast_recipients,
            snap.integrity_failures,
            snap.malformed,
            snap.unroutable,
            snap.undeliverable,
            snap.send_errors
        )
    }
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable copy of [`GatewayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStatsSnapshot {
    pub uplink_frames: u64,
    pub uplink_bytes: u64,
    pub downlink_frames: u64,
    pub downlink_bytes: u64,
    pub delivered: u64,
    pub broadcasts: u64,
    pub broadcast_recipients: u64,
    pub relayed: u64,
    pub integrity_failures: u64,
    pub malformed: u64,
    pub unroutable: u64,
    pub undeliverable: u64,
    pub send_errors: u64,
    pub uptime_secs: u64,
}

impl GatewayStatsSnapshot {
    /// Frames dropped for any reason
    pub fn dropped(&self) -> u64 {
        self.integrity_failures
            + self.malformed
            + self.unroutable
            + self.undeliverable
            + self.send_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = GatewayStats::new();
        stats.record_uplink(100);
        stats.record_uplink(50);
        stats.record_downlink(30);
        stats.record_broadcast(3);
        stats.record_integrity_failure();
        stats.record_unroutable();

        let snap = stats.snapshot();
        assert_eq!(snap.uplink_frames, 2);
        assert_eq!(snap.uplink_bytes, 150);
        assert_eq!(snap.downlink_frames, 1);
        assert_eq!(snap.broadcasts, 1);
        assert_eq!(snap.broadcast_recipients, 3);
        assert_eq!(snap.dropped(), 2);
    }

    #[test]
    fn test_format_summary() {
        let stats = GatewayStats::new();
        stats.record_relayed();
        let summary = stats.format_summary();
        assert!(summary.contains("relayed=1"));
        assert!(summary.contains("integrity=0"));
    }
}
