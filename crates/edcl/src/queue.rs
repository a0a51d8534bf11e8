// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded queues between the listener thread and the clock-driven executor.
//!
//! One queue per direction, each with a single producer and a single
//! consumer. Both `push` and `pop` are non-blocking: the listener must never
//! stall other debug traffic and the executor must never stall the clock.

use crossbeam::queue::ArrayQueue;

use crate::bus::{Access, BusFault};
use crate::error::{EdclError, Result};
use crate::protocol::{MAX_PAYLOAD_WORDS, SCRATCH_BUFFER_SIZE};
use crate::transport::TransportAddr;

/// Number of maximum-size operations that fit in one scratch buffer.
pub const DEFAULT_QUEUE_DEPTH: usize = SCRATCH_BUFFER_SIZE / (MAX_PAYLOAD_WORDS as usize * 4);

/// Lock-free bounded FIFO.
pub struct BoundedQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> BoundedQueue<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Config validation rejects that earlier.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: ArrayQueue::new(capacity),
        }
    }

    /// Push without blocking. On `QueueFull` the value is dropped; callers
    /// that need it back use [`try_push`](Self::try_push).
    pub fn push(&self, value: T) -> Result<()> {
        self.try_push(value).map_err(|_| EdclError::QueueFull)
    }

    /// Push without blocking, handing the value back when full.
    pub fn try_push(&self, value: T) -> std::result::Result<(), T> {
        self.inner.push(value)
    }

    /// Pop without blocking. `None` when empty.
    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Drop every queued entry. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut n = 0;
        while self.inner.pop().is_some() {
            n += 1;
        }
        n
    }
}

// ---------------------------------------------------------------------------
// Queue elements
// ---------------------------------------------------------------------------

/// An accepted request waiting for a clock edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    /// Sender of the request.
    pub reply_to: TransportAddr,
    /// Echoed in the response.
    pub offset: u16,
    pub sequence_id: u16,
    pub address: u64,
    pub access: Access,
    /// Write data, or a zeroed buffer of `size` bytes for reads.
    pub buffer: Vec<u8>,
    pub size: u32,
}

impl PendingOperation {
    pub fn is_write(&self) -> bool {
        self.access.is_write()
    }
}

/// Result of executing a [`PendingOperation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written,
    /// Bytes read, in bus order.
    Read(Vec<u8>),
    Fault(BusFault),
}

/// A finished operation waiting to be transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedOperation {
    pub reply_to: TransportAddr,
    pub offset: u16,
    pub sequence_id: u16,
    pub address: u64,
    pub access: Access,
    pub outcome: Outcome,
}

impl CompletedOperation {
    pub fn from_pending(op: PendingOperation, outcome: Outcome) -> Self {
        Self {
            reply_to: op.reply_to,
            offset: op.offset,
            sequence_id: op.sequence_id,
            address: op.address,
            access: op.access,
            outcome,
        }
    }
}

pub type RequestQueue = BoundedQueue<PendingOperation>;
pub type ResponseQueue = BoundedQueue<CompletedOperation>;
