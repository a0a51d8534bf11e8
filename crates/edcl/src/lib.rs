// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! EDCL (Ethernet Debug Communication Link) device model.
//!
//! Exposes a simulated system bus to a remote debug host over UDP, the way
//! the EDCL port of a GRLIB Ethernet MAC does on silicon. Runs inside a
//! cycle-driven simulator.
//!
//! # Architecture
//!
//! ```text
//! Debug host                  EdclDevice                        Simulator
//!     |                           |                                 |
//!     |--- write {seq, addr} ---->| TransportLoop (own thread)      |
//!     |                           |   decode, sequence check        |
//!     |                           |   -> RequestQueue               |
//!     |                           |                  clock edge --->| Executor
//!     |                           |                                 |   bus transaction
//!     |                           |   ResponseQueue <---------------|
//!     |<-- ack {seq} -------------|   encode, send                  |
//! ```
//!
//! # Key Features
//!
//! - **Bit-exact wire codec**: big-endian header, packed control word
//! - **Sequence tracking**: duplicate writes are re-acknowledged, never re-executed
//! - **Non-blocking queues**: backpressure turns into NAKs, the clock never stalls
//! - **Faults are answers**: bus errors become NAKs, the simulation keeps running
//! - **Registry**: devices are built by class name from TOML configuration
//!
//! # Transports
//!
//! | Transport | Use Case |
//! |-----------|----------|
//! | [`UdpTransport`] | Real debug hosts |
//! | [`ChannelTransport`] | In-process hosts and tests |

pub mod bus;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod listener;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod regs;
pub mod sequence;
pub mod stats;
pub mod transport;

// Re-exports for convenience.
pub use bus::{
    Access, BusFault, MemoryBus, MemoryOperation, MemoryWindow, SharedBus, SharedRegion, SystemBus,
};
pub use client::EdclClient;
pub use config::{ConfigError, EdclConfig};
pub use device::{EdclDevice, SimDevice};
pub use error::{DecodeError, EdclError, Result};
pub use executor::{ClockListener, Executor};
pub use listener::{ListenerHandle, TransportLoop};
pub use protocol::{
    Control, ControlWord, Direction, EdclRequest, EdclResponse, WirePacket, HEADER_SIZE,
    MAX_PAYLOAD_WORDS, SCRATCH_BUFFER_SIZE, SEQ_MODULO,
};
pub use queue::{BoundedQueue, CompletedOperation, Outcome, PendingOperation, DEFAULT_QUEUE_DEPTH};
pub use registry::{DeviceContext, DeviceFactory, DeviceRegistry, GRETH_CLASS};
pub use regs::RegisterBlock;
pub use sequence::{SequenceTracker, Verdict};
pub use stats::{EdclStats, StatsSnapshot};
pub use transport::{ChannelTransport, EdclTransport, TransportAddr, UdpTransport};
