// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Inbound sequence tracking.
//
// Only the listener thread touches this, so it holds plain state.

use crate::protocol::SEQ_MODULO;

/// What to do with an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Execute it. Covers the expected next id and duplicate reads.
    Accept,
    /// Retransmitted write already executed: acknowledge again, do not write.
    DuplicateAck,
    /// Gap or stale id: NAK with the last accepted id.
    Reject,
}

/// Tracks the last accepted 14-bit sequence id.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last_accepted: Option<u16>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted id, `None` until the first request is accepted.
    pub fn last_accepted(&self) -> Option<u16> {
        self.last_accepted
    }

    /// Id the tracker expects next.
    pub fn expected(&self) -> Option<u16> {
        self.last_accepted.map(next_seq)
    }

    /// Classify without changing state.
    pub fn check(&self, seq: u16, is_write: bool) -> Verdict {
        let seq = seq % SEQ_MODULO;
        match self.last_accepted {
            None => Verdict::Accept,
            Some(last) if seq == last => {
                if is_write {
                    Verdict::DuplicateAck
                } else {
                    // Reads are idempotent; execute again.
                    Verdict::Accept
                }
            }
            Some(last) if seq == next_seq(last) => Verdict::Accept,
            Some(_) => Verdict::Reject,
        }
    }

    /// Record `seq` as accepted.
    pub fn commit(&mut self, seq: u16) {
        self.last_accepted = Some(seq % SEQ_MODULO);
    }

    /// Classify and, on `Accept`, commit in one step.
    pub fn classify(&mut self, seq: u16, is_write: bool) -> Verdict {
        let verdict = self.check(seq, is_write);
        if verdict == Verdict::Accept {
            self.commit(seq);
        }
        verdict
    }

    /// Forget the last accepted id; the next request is accepted whatever its id.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

/// `(seq + 1) mod 16384`.
pub fn next_seq(seq: u16) -> u16 {
    (seq.wrapping_add(1)) % SEQ_MODULO
}
