// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Debug-host side of the link.
//!
//! The device is a best-effort responder; reliability lives here. The client
//! learns the device's sequence id before its first request, retransmits on
//! timeout, resynchronizes from NAKs, and splits large transfers into
//! protocol-sized chunks.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use crate::error::{DecodeError, EdclError, Result};
use crate::protocol::{EdclResponse, WirePacket, MAX_PAYLOAD_WORDS, SCRATCH_BUFFER_SIZE};
use crate::sequence::next_seq;
use crate::transport::{EdclTransport, TransportAddr, UdpTransport};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);
const DEFAULT_RETRIES: u32 = 5;

/// Blocking EDCL client.
pub struct EdclClient<T: EdclTransport> {
    transport: T,
    peer: TransportAddr,
    next_seq: u16,
    synced: bool,
    timeout: Duration,
    retries: u32,
    rxbuf: Vec<u8>,
}

impl EdclClient<UdpTransport> {
    /// Bind an ephemeral UDP socket and target `device`.
    pub fn connect(device: SocketAddr) -> Result<Self> {
        let local_ip = if device.ip().is_loopback() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let transport = UdpTransport::bind(SocketAddr::new(local_ip, 0), Duration::from_millis(10))?;
        Ok(Self::new(transport, TransportAddr::Udp(device)))
    }
}

impl<T: EdclTransport> EdclClient<T> {
    pub fn new(transport: T, peer: TransportAddr) -> Self {
        Self {
            transport,
            peer,
            next_seq: 0,
            synced: false,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            rxbuf: vec![0u8; SCRATCH_BUFFER_SIZE],
        }
    }

    /// Wait per attempt before retransmitting.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retransmissions after the first attempt.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn next_seq(&self) -> u16 {
        self.next_seq
    }

    /// Use `seq` for the next request, skipping the initial sync.
    pub fn set_next_seq(&mut self, seq: u16) {
        self.next_seq = seq % crate::protocol::SEQ_MODULO;
        self.synced = true;
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Learn the id the device expects next.
    ///
    /// A zero-length read is harmless under every verdict: accepted, it is
    /// acknowledged without a bus access; rejected, the NAK carries the
    /// device's last accepted id. Runs implicitly before the first request.
    pub fn sync(&mut self) -> Result<()> {
        let mut attempts = 0u32;
        while attempts <= self.retries {
            attempts += 1;
            let seq = self.next_seq;
            let request = WirePacket::read_request(seq, 0, 0);
            self.transport.send(&self.peer, &request.encode())?;

            match self.await_reply(seq)?.as_ref().and_then(reply_control) {
                Some(ctrl) if !ctrl.is_nak => self.next_seq = next_seq(seq),
                Some(ctrl) if ctrl.sequence_id != seq => self.next_seq = next_seq(ctrl.sequence_id),
                // Own id NAKed: the device is backed up; try again.
                Some(_) => {
                    std::thread::sleep(self.timeout / 4);
                    continue;
                }
                None => continue,
            }
            self.synced = true;
            log::debug!("[EDCL] synced with {}, next seq {}", self.peer, self.next_seq);
            return Ok(());
        }
        Err(EdclError::Timeout {
            seq: self.next_seq,
            attempts,
        })
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Write `data` starting at `address`.
    pub fn write(&mut self, address: u32, data: &[u32]) -> Result<()> {
        let mut addr = address;
        for chunk in data.chunks(MAX_PAYLOAD_WORDS as usize) {
            self.transact(|seq| WirePacket::write_request(seq, addr, chunk))?;
            addr = addr.wrapping_add(chunk.len() as u32 * 4);
        }
        Ok(())
    }

    /// Read `words` 32-bit words starting at `address`.
    pub fn read(&mut self, address: u32, words: usize) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(words);
        let mut addr = address;
        let mut remaining = words;
        while remaining > 0 {
            let n = remaining.min(MAX_PAYLOAD_WORDS as usize);
            let resp = self.transact(|seq| WirePacket::read_request(seq, addr, n as u16))?;
            out.extend_from_slice(&resp.payload);
            addr = addr.wrapping_add(n as u32 * 4);
            remaining -= n;
        }
        Ok(out)
    }

    pub fn write_word(&mut self, address: u32, value: u32) -> Result<()> {
        self.write(address, &[value])
    }

    pub fn read_word(&mut self, address: u32) -> Result<u32> {
        let words = self.read(address, 1)?;
        words
            .first()
            .copied()
            .ok_or(EdclError::MalformedPacket(DecodeError::Truncated {
                expected: 4,
                actual: 0,
            }))
    }

    /// Send the request built for the current sequence id until it is
    /// acknowledged.
    fn transact<F>(&mut self, build: F) -> Result<WirePacket>
    where
        F: Fn(u16) -> WirePacket,
    {
        if !self.synced {
            self.sync()?;
        }
        let mut attempts = 0u32;
        let mut own_nak_retried = false;
        loop {
            if attempts > self.retries {
                return Err(EdclError::Timeout {
                    seq: self.next_seq,
                    attempts,
                });
            }
            attempts += 1;

            let seq = self.next_seq;
            let request = build(seq);
            let is_write = request.request().is_some_and(|r| r.is_write);
            self.transport.send(&self.peer, &request.encode())?;

            let Some(reply) = self.await_reply(seq)? else {
                continue;
            };
            let Some(ctrl) = reply_control(&reply) else {
                continue;
            };
            if !ctrl.is_nak {
                self.next_seq = next_seq(seq);
                return Ok(reply);
            }
            if ctrl.sequence_id != seq {
                let resync = next_seq(ctrl.sequence_id);
                log::debug!("[EDCL] NAK for seq {}, resync to {}", seq, resync);
                self.next_seq = resync;
                continue;
            }
            // Own id NAKed. A retransmitted read can meet a full queue;
            // give it one more try before calling it a bus fault.
            if !is_write && !own_nak_retried {
                own_nak_retried = true;
                std::thread::sleep(self.timeout / 4);
                continue;
            }
            self.next_seq = next_seq(seq);
            return Err(EdclError::RemoteFault {
                seq,
                address: request.address,
            });
        }
    }

    /// Wait up to the timeout for an ACK of `seq` or any NAK.
    fn await_reply(&mut self, seq: u16) -> Result<Option<WirePacket>> {
        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            let Some((n, from)) = self.transport.recv(&mut self.rxbuf)? else {
                continue;
            };
            if from != self.peer {
                continue;
            }
            let resp = match WirePacket::decode_response(&self.rxbuf[..n]) {
                Ok(p) => p,
                Err(e) => {
                    log::debug!("[EDCL] ignoring malformed response: {}", e);
                    continue;
                }
            };
            let Some(ctrl) = resp.response_control().copied() else {
                continue;
            };
            if ctrl.is_nak || ctrl.sequence_id == seq {
                return Ok(Some(resp));
            }
            // Stale ACK from an earlier retransmission.
        }
        Ok(None)
    }
}

fn reply_control(reply: &WirePacket) -> Option<EdclResponse> {
    reply.response_control().copied()
}
