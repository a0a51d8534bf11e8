// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the EDCL device model.
//!
//! Nothing in here is fatal to the surrounding simulator: decode errors are
//! dropped silently by the listener, bus faults become NAK responses, and
//! transport errors stop only the listener thread.

use thiserror::Error;

use crate::bus::BusFault;
use crate::config::ConfigError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EdclError>;

/// Reasons an inbound datagram cannot be decoded into a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the fixed offset + control + address header.
    #[error("packet too short: {len} bytes")]
    TooShort { len: usize },

    /// Declared word count is above the protocol limit.
    #[error("declared length {words} words exceeds limit of {max}")]
    LengthExceeded { words: u16, max: u16 },

    /// Declared payload runs past the end of the datagram.
    #[error("payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum EdclError {
    /// Datagram does not hold a well-formed EDCL packet.
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] DecodeError),

    /// The request queue has no room for another pending operation.
    #[error("request queue full")]
    QueueFull,

    /// A bus transaction failed.
    #[error("bus fault: {0}")]
    BusFault(#[from] BusFault),

    /// The remote device answered with a NAK for our own sequence id.
    #[error("remote NAK for seq {seq} at address 0x{address:08x}")]
    RemoteFault { seq: u16, address: u32 },

    /// No response after all retransmissions.
    #[error("request seq {seq} timed out after {attempts} attempts")]
    Timeout { seq: u16, attempts: u32 },

    /// The transport was closed under us.
    #[error("transport closed")]
    TransportClosed,

    /// Transport-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device registry has no factory for the requested class.
    #[error("unknown device class: {0}")]
    UnknownClass(String),

    /// Device is in the wrong lifecycle state for the call.
    #[error("invalid device state: {0}")]
    InvalidState(&'static str),

    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
