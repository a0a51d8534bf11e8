// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// EDCL wire format parser/builder.
//
// Layout (big-endian, no padding):
//
//   0      2                6          10
//   +------+----------------+----------+------------------------+
//   |offset| control word   | address  | data words (0..=242)   |
//   +------+----------------+----------+------------------------+
//
// Control word bits: [0:6] reserved, [7:16] length (words), [17] write/nak,
// [18:31] sequence id.
//
// All parsing is safe: malformed input returns Err, never panics.

use crate::error::DecodeError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Offset (2) + control word (4) + address (4).
pub const HEADER_SIZE: usize = 10;

/// Maximum number of 32-bit data words in one packet.
pub const MAX_PAYLOAD_WORDS: u16 = 242;

/// Size of the receive/transmit scratch buffers.
pub const SCRATCH_BUFFER_SIZE: usize = 4096;

/// Sequence ids are 14 bits wide.
pub const SEQ_MODULO: u16 = 1 << 14;

const RESERVED_MASK: u32 = 0x7F;
const LENGTH_SHIFT: u32 = 7;
const LENGTH_MASK: u32 = 0x3FF;
const FLAG_SHIFT: u32 = 17;
const SEQ_SHIFT: u32 = 18;
const SEQ_MASK: u32 = 0x3FFF;

// ---------------------------------------------------------------------------
// Control word
// ---------------------------------------------------------------------------

/// Raw 32-bit control word. Requests and responses share this layout; only
/// the meaning of bit 17 differs (write for requests, nak for responses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlWord(pub u32);

impl ControlWord {
    pub fn pack(reserved: u8, length: u16, flag: bool, seq: u16) -> Self {
        let w = (reserved as u32 & RESERVED_MASK)
            | ((length as u32 & LENGTH_MASK) << LENGTH_SHIFT)
            | ((flag as u32) << FLAG_SHIFT)
            | ((seq as u32 & SEQ_MASK) << SEQ_SHIFT);
        Self(w)
    }

    pub fn reserved(self) -> u8 {
        (self.0 & RESERVED_MASK) as u8
    }

    pub fn length(self) -> u16 {
        ((self.0 >> LENGTH_SHIFT) & LENGTH_MASK) as u16
    }

    pub fn flag(self) -> bool {
        (self.0 >> FLAG_SHIFT) & 1 != 0
    }

    pub fn seq(self) -> u16 {
        ((self.0 >> SEQ_SHIFT) & SEQ_MASK) as u16
    }
}

/// Control word as seen on inbound (host -> device) packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdclRequest {
    /// Reserved bits, carried through untouched.
    pub reserved: u8,
    /// Word count, 0..=242.
    pub length: u16,
    pub is_write: bool,
    pub sequence_id: u16,
}

impl EdclRequest {
    pub fn new(sequence_id: u16, is_write: bool, length: u16) -> Self {
        Self {
            reserved: 0,
            length,
            is_write,
            sequence_id: sequence_id % SEQ_MODULO,
        }
    }

    pub fn from_word(w: ControlWord) -> Self {
        Self {
            reserved: w.reserved(),
            length: w.length(),
            is_write: w.flag(),
            sequence_id: w.seq(),
        }
    }

    pub fn to_word(self) -> ControlWord {
        ControlWord::pack(self.reserved, self.length, self.is_write, self.sequence_id)
    }
}

/// Control word as seen on outbound (device -> host) packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdclResponse {
    pub reserved: u8,
    pub length: u16,
    pub is_nak: bool,
    pub sequence_id: u16,
}

impl EdclResponse {
    pub fn from_word(w: ControlWord) -> Self {
        Self {
            reserved: w.reserved(),
            length: w.length(),
            is_nak: w.flag(),
            sequence_id: w.seq(),
        }
    }

    pub fn to_word(self) -> ControlWord {
        ControlWord::pack(self.reserved, self.length, self.is_nak, self.sequence_id)
    }
}

/// Which side of the link produced a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host -> device.
    Request,
    /// Device -> host.
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Request(EdclRequest),
    Response(EdclResponse),
}

impl Control {
    pub fn word(&self) -> ControlWord {
        match self {
            Control::Request(r) => r.to_word(),
            Control::Response(r) => r.to_word(),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Control::Request(_) => Direction::Request,
            Control::Response(_) => Direction::Response,
        }
    }

    pub fn length(&self) -> u16 {
        self.word().length()
    }

    pub fn sequence_id(&self) -> u16 {
        self.word().seq()
    }
}

/// Data words follow the header for write requests and for ACK responses.
fn carries_payload(direction: Direction, flag: bool) -> bool {
    match direction {
        Direction::Request => flag,
        Direction::Response => !flag,
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One EDCL datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePacket {
    pub offset: u16,
    pub control: Control,
    pub address: u32,
    pub payload: Vec<u32>,
}

impl WirePacket {
    /// Read request for `words` 32-bit words at `address`.
    pub fn read_request(sequence_id: u16, address: u32, words: u16) -> Self {
        Self {
            offset: 0,
            control: Control::Request(EdclRequest::new(sequence_id, false, words)),
            address,
            payload: Vec::new(),
        }
    }

    /// Write request carrying `data` to `address`.
    pub fn write_request(sequence_id: u16, address: u32, data: &[u32]) -> Self {
        Self {
            offset: 0,
            control: Control::Request(EdclRequest::new(sequence_id, true, data.len() as u16)),
            address,
            payload: data.to_vec(),
        }
    }

    /// ACK for a completed write: no data, length 0.
    pub fn ack_write(offset: u16, sequence_id: u16, address: u32) -> Self {
        Self::response(offset, sequence_id, address, false, Vec::new())
    }

    /// ACK for a completed read, carrying the data read.
    pub fn ack_read(offset: u16, sequence_id: u16, address: u32, data: Vec<u32>) -> Self {
        Self::response(offset, sequence_id, address, false, data)
    }

    /// NAK echoing `sequence_id`.
    pub fn nak(offset: u16, sequence_id: u16, address: u32) -> Self {
        Self::response(offset, sequence_id, address, true, Vec::new())
    }

    fn response(offset: u16, sequence_id: u16, address: u32, is_nak: bool, payload: Vec<u32>) -> Self {
        Self {
            offset,
            control: Control::Response(EdclResponse {
                reserved: 0,
                length: payload.len() as u16,
                is_nak,
                sequence_id: sequence_id % SEQ_MODULO,
            }),
            address,
            payload,
        }
    }

    pub fn request(&self) -> Option<&EdclRequest> {
        match &self.control {
            Control::Request(r) => Some(r),
            Control::Response(_) => None,
        }
    }

    pub fn response_control(&self) -> Option<&EdclResponse> {
        match &self.control {
            Control::Response(r) => Some(r),
            Control::Request(_) => None,
        }
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len() * 4
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&self.control.word().0.to_be_bytes());
        buf.extend_from_slice(&self.address.to_be_bytes());
        for w in &self.payload {
            buf.extend_from_slice(&w.to_be_bytes());
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode a packet travelling in `direction`.
    pub fn decode(buf: &[u8], direction: Direction) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort { len: buf.len() });
        }
        let offset = read_u16_be(buf, 0);
        let word = ControlWord(read_u32_be(buf, 2));
        let address = read_u32_be(buf, 6);

        let length = word.length();
        if length > MAX_PAYLOAD_WORDS {
            return Err(DecodeError::LengthExceeded {
                words: length,
                max: MAX_PAYLOAD_WORDS,
            });
        }

        let mut payload = Vec::new();
        if carries_payload(direction, word.flag()) {
            let expected = length as usize * 4;
            let actual = buf.len() - HEADER_SIZE;
            if actual < expected {
                return Err(DecodeError::Truncated { expected, actual });
            }
            payload = buf[HEADER_SIZE..HEADER_SIZE + expected]
                .chunks_exact(4)
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
        }

        let control = match direction {
            Direction::Request => Control::Request(EdclRequest::from_word(word)),
            Direction::Response => Control::Response(EdclResponse::from_word(word)),
        };
        Ok(Self {
            offset,
            control,
            address,
            payload,
        })
    }

    pub fn decode_request(buf: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(buf, Direction::Request)
    }

    pub fn decode_response(buf: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(buf, Direction::Response)
    }
}

// ---------------------------------------------------------------------------
// Byte helpers
// ---------------------------------------------------------------------------

// Callers have already checked the header length.
fn read_u16_be(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32_be(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Convert data words to the bus byte order (little-endian target memory).
pub fn words_to_bus_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

/// Inverse of [`words_to_bus_bytes`]. A trailing partial word is zero-padded.
pub fn bus_bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|c| {
            let mut w = [0u8; 4];
            w[..c.len()].copy_from_slice(c);
            u32::from_le_bytes(w)
        })
        .collect()
}
