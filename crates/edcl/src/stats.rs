// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by the listener thread and the executor.
#[derive(Debug)]
pub struct EdclStats {
    /// Datagrams received
    pub rx_datagrams: AtomicU64,
    /// Datagrams sent
    pub tx_datagrams: AtomicU64,
    /// Datagrams dropped as malformed
    pub malformed: AtomicU64,
    /// Requests queued for execution
    pub accepted: AtomicU64,
    /// Duplicate writes re-acknowledged
    pub duplicates: AtomicU64,
    /// Requests NAKed for a sequence gap
    pub sequence_rejects: AtomicU64,
    /// Requests NAKed because the request queue was full
    pub queue_full: AtomicU64,
    /// Bus reads issued
    pub bus_reads: AtomicU64,
    /// Bus writes issued
    pub bus_writes: AtomicU64,
    /// Bus transactions that faulted
    pub bus_faults: AtomicU64,
    /// Transport send failures
    pub send_errors: AtomicU64,
    start_time: Instant,
}

impl Default for EdclStats {
    fn default() -> Self {
        Self::new()
    }
}

impl EdclStats {
    pub fn new() -> Self {
        Self {
            rx_datagrams: AtomicU64::new(0),
            tx_datagrams: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            sequence_rejects: AtomicU64::new(0),
            queue_full: AtomicU64::new(0),
            bus_reads: AtomicU64::new(0),
            bus_writes: AtomicU64::new(0),
            bus_faults: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_datagrams: self.rx_datagrams.load(Ordering::Relaxed),
            tx_datagrams: self.tx_datagrams.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            sequence_rejects: self.sequence_rejects.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            bus_reads: self.bus_reads.load(Ordering::Relaxed),
            bus_writes: self.bus_writes.load(Ordering::Relaxed),
            bus_faults: self.bus_faults.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }
}

/// Point-in-time copy of [`EdclStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub rx_datagrams: u64,
    pub tx_datagrams: u64,
    pub malformed: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub sequence_rejects: u64,
    pub queue_full: u64,
    pub bus_reads: u64,
    pub bus_writes: u64,
    pub bus_faults: u64,
    pub send_errors: u64,
    pub uptime: Duration,
}

impl StatsSnapshot {
    /// NAKs sent for protocol reasons (sequence + backpressure).
    pub fn protocol_naks(&self) -> u64 {
        self.sequence_rejects + self.queue_full
    }
}
