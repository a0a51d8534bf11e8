// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bus collaborator interfaces.
//!
//! The device model only ever talks to a [`MemoryBus`]. [`SystemBus`] and
//! [`MemoryWindow`] are small host-side implementations: an address decoder
//! over mapped regions and a RAM region. Simulators with their own bus plug
//! in by implementing [`MemoryBus`].

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Direction of a bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn from_write_flag(is_write: bool) -> Self {
        if is_write {
            Access::Write
        } else {
            Access::Read
        }
    }

    pub fn is_write(self) -> bool {
        self == Access::Write
    }
}

/// Failure of a single bus transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusFault {
    /// No region decodes this address.
    #[error("unmapped address 0x{address:x}")]
    Unmapped { address: u64 },

    /// Access starts inside a region but runs past its end.
    #[error("access of {size} bytes at 0x{address:x} crosses region boundary")]
    OutOfRange { address: u64, size: usize },

    /// Device-specific failure.
    #[error("device error: {0}")]
    Device(String),
}

/// The simulated system bus, as seen from a bus master.
pub trait MemoryBus: Send {
    /// Read into or write from `buf` at `address`. `buf.len()` is the size.
    fn transaction(&mut self, address: u64, access: Access, buf: &mut [u8]) -> Result<(), BusFault>;
}

/// A slave region mapped into the address space.
pub trait MemoryOperation: Send {
    fn base_address(&self) -> u64;

    fn length(&self) -> u64;

    /// `address` is absolute; implementations subtract their base.
    fn transaction(&mut self, address: u64, access: Access, buf: &mut [u8]) -> Result<(), BusFault>;

    fn contains(&self, address: u64) -> bool {
        address >= self.base_address() && address - self.base_address() < self.length()
    }
}

/// Shared handle to a mapped region.
pub type SharedRegion = Arc<Mutex<dyn MemoryOperation>>;

// ---------------------------------------------------------------------------
// RAM region
// ---------------------------------------------------------------------------

/// Plain RAM backing a window of the address space.
#[derive(Debug, Clone)]
pub struct MemoryWindow {
    base: u64,
    data: Vec<u8>,
}

impl MemoryWindow {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, address: u64, size: usize) -> Result<std::ops::Range<usize>, BusFault> {
        if !self.contains(address) {
            return Err(BusFault::Unmapped { address });
        }
        let start = (address - self.base) as usize;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.data.len())
            .ok_or(BusFault::OutOfRange { address, size })?;
        Ok(start..end)
    }
}

impl MemoryOperation for MemoryWindow {
    fn base_address(&self) -> u64 {
        self.base
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn transaction(&mut self, address: u64, access: Access, buf: &mut [u8]) -> Result<(), BusFault> {
        let range = self.range(address, buf.len())?;
        match access {
            Access::Read => buf.copy_from_slice(&self.data[range]),
            Access::Write => self.data[range].copy_from_slice(buf),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Address decoder
// ---------------------------------------------------------------------------

/// Routes transactions to the mapped region that decodes the address.
#[derive(Default)]
pub struct SystemBus {
    regions: Vec<SharedRegion>,
}

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a region. Fails if it overlaps one already mapped.
    pub fn map(&mut self, region: SharedRegion) -> Result<(), BusFault> {
        let (base, len) = {
            let r = region.lock();
            (r.base_address(), r.length())
        };
        let end = base.saturating_add(len);
        for other in &self.regions {
            let o = other.lock();
            let o_end = o.base_address().saturating_add(o.length());
            if base < o_end && o.base_address() < end {
                return Err(BusFault::Device(format!(
                    "region 0x{:x}..0x{:x} overlaps 0x{:x}..0x{:x}",
                    base,
                    end,
                    o.base_address(),
                    o_end
                )));
            }
        }
        self.regions.push(region);
        Ok(())
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

impl MemoryBus for SystemBus {
    fn transaction(&mut self, address: u64, access: Access, buf: &mut [u8]) -> Result<(), BusFault> {
        for region in &self.regions {
            let mut r = region.lock();
            if r.contains(address) {
                return r.transaction(address, access, buf);
            }
        }
        Err(BusFault::Unmapped { address })
    }
}

/// Decoder shared with its owner, so regions can still be mapped after a
/// bus master has been handed its handle.
pub type SharedBus = Arc<Mutex<SystemBus>>;

impl MemoryBus for SharedBus {
    fn transaction(&mut self, address: u64, access: Access, buf: &mut [u8]) -> Result<(), BusFault> {
        self.lock().transaction(address, access, buf)
    }
}
