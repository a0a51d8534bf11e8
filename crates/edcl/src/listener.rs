// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// EDCL listener loop.
//
// Owns the transport and the sequence tracker. Decodes inbound requests,
// queues accepted ones for the clock-driven executor, answers rejects and
// duplicates immediately, and transmits finished results in queue order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::bus::Access;
use crate::error::{EdclError, Result};
use crate::protocol::{bus_bytes_to_words, words_to_bus_bytes, WirePacket, SCRATCH_BUFFER_SIZE};
use crate::queue::{CompletedOperation, Outcome, PendingOperation, RequestQueue, ResponseQueue};
use crate::sequence::{SequenceTracker, Verdict};
use crate::stats::EdclStats;
use crate::transport::{EdclTransport, TransportAddr};

/// What became of the most recently accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    /// Queued or executing; its own result answers retransmissions.
    Pending,
    Written,
    Faulted,
}

/// Transport side of the device.
pub struct TransportLoop {
    transport: Box<dyn EdclTransport>,
    tracker: SequenceTracker,
    last_write: Option<(u16, WriteState)>,
    requests: Arc<RequestQueue>,
    responses: Arc<ResponseQueue>,
    stats: Arc<EdclStats>,
    rxbuf: Vec<u8>,
    txbuf: Vec<u8>,
}

impl TransportLoop {
    pub fn new(
        transport: Box<dyn EdclTransport>,
        requests: Arc<RequestQueue>,
        responses: Arc<ResponseQueue>,
        stats: Arc<EdclStats>,
        max_datagram_size: usize,
    ) -> Self {
        Self {
            transport,
            tracker: SequenceTracker::new(),
            last_write: None,
            requests,
            responses,
            stats,
            rxbuf: vec![0u8; max_datagram_size.min(SCRATCH_BUFFER_SIZE)],
            txbuf: Vec::with_capacity(SCRATCH_BUFFER_SIZE),
        }
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut SequenceTracker {
        &mut self.tracker
    }

    /// Forget all sequence state, as after a restart.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.last_write = None;
    }

    /// Process one inbound datagram. Returns the reply to send right away,
    /// if any; accepted requests produce their reply later via the
    /// response queue.
    pub fn handle_datagram(&mut self, from: &TransportAddr, data: &[u8]) -> Option<Vec<u8>> {
        EdclStats::bump(&self.stats.rx_datagrams);

        let packet = match WirePacket::decode_request(data) {
            Ok(p) => p,
            Err(e) => {
                // Neither sender nor seq can be trusted; no reply.
                log::debug!("[EDCL] dropping datagram from {}: {}", from, e);
                EdclStats::bump(&self.stats.malformed);
                return None;
            }
        };
        let req = match packet.request() {
            Some(r) => *r,
            None => return None,
        };
        let seq = req.sequence_id;

        match self.tracker.check(seq, req.is_write) {
            Verdict::Reject => {
                let last = self.tracker.last_accepted().unwrap_or(seq);
                log::debug!(
                    "[EDCL] seq {} out of order (last accepted {}), NAK",
                    seq,
                    last
                );
                EdclStats::bump(&self.stats.sequence_rejects);
                Some(WirePacket::nak(packet.offset, last, packet.address).encode())
            }
            Verdict::DuplicateAck => {
                EdclStats::bump(&self.stats.duplicates);
                match self.last_write {
                    Some((s, WriteState::Written)) if s == seq => {
                        log::debug!("[EDCL] duplicate write seq {}, re-ack", seq);
                        Some(WirePacket::ack_write(packet.offset, seq, packet.address).encode())
                    }
                    Some((s, WriteState::Pending)) if s == seq => {
                        log::debug!("[EDCL] duplicate write seq {} still pending", seq);
                        None
                    }
                    _ => {
                        // Faulted, or the id was last used by a read: nothing was written.
                        log::debug!("[EDCL] duplicate write seq {} was not executed, NAK", seq);
                        Some(WirePacket::nak(packet.offset, seq, packet.address).encode())
                    }
                }
            }
            Verdict::Accept => {
                let size = req.length as u32 * 4;
                let buffer = if req.is_write {
                    words_to_bus_bytes(&packet.payload)
                } else {
                    vec![0u8; size as usize]
                };
                let op = PendingOperation {
                    reply_to: from.clone(),
                    offset: packet.offset,
                    sequence_id: seq,
                    address: packet.address as u64,
                    access: Access::from_write_flag(req.is_write),
                    buffer,
                    size,
                };
                match self.requests.push(op) {
                    Ok(()) => {
                        self.tracker.commit(seq);
                        if req.is_write {
                            self.last_write = Some((seq, WriteState::Pending));
                        }
                        EdclStats::bump(&self.stats.accepted);
                        None
                    }
                    Err(_) => {
                        // Tracker not advanced: the host retransmits this seq.
                        let last = self.tracker.last_accepted().unwrap_or(seq);
                        log::debug!("[EDCL] request queue full, NAK seq {}", seq);
                        EdclStats::bump(&self.stats.queue_full);
                        Some(WirePacket::nak(packet.offset, last, packet.address).encode())
                    }
                }
            }
        }
    }

    /// Encode and send every result the executor has produced so far.
    pub fn drain_responses(&mut self) -> usize {
        let mut sent = 0;
        while let Some(done) = self.responses.pop() {
            if done.access.is_write() {
                self.record_write(done.sequence_id, &done.outcome);
            }
            let to = done.reply_to.clone();
            let packet = response_packet(done);
            self.txbuf.clear();
            packet.encode_into(&mut self.txbuf);
            if let Err(e) = self.transport.send(&to, &self.txbuf) {
                log::warn!("[EDCL] failed to send response to {}: {}", to, e);
                EdclStats::bump(&self.stats.send_errors);
                continue;
            }
            EdclStats::bump(&self.stats.tx_datagrams);
            sent += 1;
        }
        sent
    }

    fn record_write(&mut self, seq: u16, outcome: &Outcome) {
        if let Some((s, state)) = &mut self.last_write {
            if *s == seq && *state == WriteState::Pending {
                *state = match outcome {
                    Outcome::Fault(_) => WriteState::Faulted,
                    _ => WriteState::Written,
                };
            }
        }
    }

    /// Drain, one bounded receive, drain again. Results finished while the
    /// receive waited go out as soon as it returns.
    pub fn poll_once(&mut self) -> Result<()> {
        self.drain_responses();
        let received = self.transport.recv(&mut self.rxbuf)?;
        if let Some((n, from)) = received {
            let data = self.rxbuf[..n].to_vec();
            if let Some(reply) = self.handle_datagram(&from, &data) {
                match self.transport.send(&from, &reply) {
                    Ok(()) => EdclStats::bump(&self.stats.tx_datagrams),
                    Err(e) => {
                        log::warn!("[EDCL] failed to send reply to {}: {}", from, e);
                        EdclStats::bump(&self.stats.send_errors);
                    }
                }
            }
        }
        self.drain_responses();
        Ok(())
    }

    /// Loop until `running` clears or the transport closes.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            match self.poll_once() {
                Ok(()) => {}
                Err(EdclError::TransportClosed) => {
                    log::info!("[EDCL] transport closed, listener exiting");
                    break;
                }
                Err(e) => {
                    log::warn!("[EDCL] receive failed: {}", e);
                }
            }
        }
    }

    /// Run on a named background thread. The loop comes back out of
    /// [`ListenerHandle::stop`] so the device can restart it.
    pub fn spawn(self, name: &str) -> Result<ListenerHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let mut worker = self;
        let thread = std::thread::Builder::new()
            .name(format!("edcl-{}", name))
            .spawn(move || {
                worker.run(&flag);
                worker
            })?;
        Ok(ListenerHandle {
            running,
            thread: Some(thread),
        })
    }
}

/// Build the wire response for a finished operation.
fn response_packet(done: CompletedOperation) -> WirePacket {
    let address = done.address as u32;
    match done.outcome {
        Outcome::Written => WirePacket::ack_write(done.offset, done.sequence_id, address),
        Outcome::Read(bytes) => {
            WirePacket::ack_read(done.offset, done.sequence_id, address, bus_bytes_to_words(&bytes))
        }
        Outcome::Fault(_) => WirePacket::nak(done.offset, done.sequence_id, address),
    }
}

// ---------------------------------------------------------------------------
// Thread handle
// ---------------------------------------------------------------------------

/// Background listener thread plus its stop flag.
pub struct ListenerHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<TransportLoop>>,
}

impl ListenerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the loop and wait for it. The loop exits after its current
    /// receive times out.
    pub fn stop(&mut self) -> Option<TransportLoop> {
        self.running.store(false, Ordering::Release);
        let handle = self.thread.take()?;
        match handle.join() {
            Ok(worker) => Some(worker),
            Err(_) => {
                log::warn!("[EDCL] listener thread panicked");
                None
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
