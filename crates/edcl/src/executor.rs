// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Clock-synchronous bus master.
//!
//! Runs on the simulator's clock thread, once per edge, and never blocks:
//! at most one queued operation is executed per call.

use std::sync::Arc;

use crate::bus::{Access, MemoryBus};
use crate::queue::{CompletedOperation, Outcome, RequestQueue, ResponseQueue};
use crate::stats::EdclStats;

/// Receives one callback per simulated clock edge.
pub trait ClockListener: Send {
    fn step_callback(&mut self, t: u64);
}

/// Executes queued EDCL operations against the bus.
pub struct Executor {
    requests: Arc<RequestQueue>,
    responses: Arc<ResponseQueue>,
    bus: Box<dyn MemoryBus>,
    stats: Arc<EdclStats>,
}

impl Executor {
    pub fn new(
        requests: Arc<RequestQueue>,
        responses: Arc<ResponseQueue>,
        bus: Box<dyn MemoryBus>,
        stats: Arc<EdclStats>,
    ) -> Self {
        Self {
            requests,
            responses,
            bus,
            stats,
        }
    }

    /// Execute at most one pending operation. Returns true if one ran.
    pub fn step(&mut self, t: u64) -> bool {
        // Only this side pushes responses, so room seen here is still
        // there at push time.
        if self.responses.is_full() {
            return false;
        }
        let Some(mut op) = self.requests.pop() else {
            return false;
        };
        debug_assert_eq!(op.buffer.len(), op.size as usize);

        let outcome = if op.size == 0 {
            match op.access {
                Access::Write => Outcome::Written,
                Access::Read => Outcome::Read(Vec::new()),
            }
        } else {
            match op.access {
                Access::Write => EdclStats::bump(&self.stats.bus_writes),
                Access::Read => EdclStats::bump(&self.stats.bus_reads),
            }
            match self.bus.transaction(op.address, op.access, &mut op.buffer) {
                Ok(()) => match op.access {
                    Access::Write => Outcome::Written,
                    Access::Read => Outcome::Read(std::mem::take(&mut op.buffer)),
                },
                Err(fault) => {
                    log::warn!(
                        "[EDCL] t={} bus fault on seq {}: {}",
                        t,
                        op.sequence_id,
                        fault
                    );
                    EdclStats::bump(&self.stats.bus_faults);
                    Outcome::Fault(fault)
                }
            }
        };

        let done = CompletedOperation::from_pending(op, outcome);
        if let Err(lost) = self.responses.try_push(done) {
            // Unreachable with a single producer.
            log::error!(
                "[EDCL] response queue overflow, result for seq {} dropped",
                lost.sequence_id
            );
            if cfg!(debug_assertions) {
                panic!("response queue filled behind the executor");
            }
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.requests.len()
    }
}

impl ClockListener for Executor {
    fn step_callback(&mut self, t: u64) {
        self.step(t);
    }
}
