// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Device register window.
//
// The MAC exposes a small reserved register map; nothing in it drives
// behavior. Writes are stored so reads return them, the rest of the
// window reads as zero.

use crate::bus::{Access, BusFault, MemoryOperation};

/// Bytes backed by storage: one 32-bit word padded to 8, then two 64-bit words.
pub const REGISTER_MAP_SIZE: usize = 24;

/// Register window of the device.
#[derive(Debug, Clone)]
pub struct RegisterBlock {
    base: u64,
    length: u64,
    regs: [u8; REGISTER_MAP_SIZE],
}

impl RegisterBlock {
    pub fn new(base: u64, length: u64) -> Self {
        Self {
            base,
            length,
            regs: [0; REGISTER_MAP_SIZE],
        }
    }
}

impl MemoryOperation for RegisterBlock {
    fn base_address(&self) -> u64 {
        self.base
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn transaction(&mut self, address: u64, access: Access, buf: &mut [u8]) -> Result<(), BusFault> {
        if !self.contains(address) {
            return Err(BusFault::Unmapped { address });
        }
        let off = address - self.base;
        if off + buf.len() as u64 > self.length {
            return Err(BusFault::OutOfRange {
                address,
                size: buf.len(),
            });
        }
        for (i, b) in buf.iter_mut().enumerate() {
            let idx = off as usize + i;
            match access {
                Access::Read => *b = self.regs.get(idx).copied().unwrap_or(0),
                Access::Write => {
                    if let Some(r) = self.regs.get_mut(idx) {
                        *r = *b;
                    }
                }
            }
        }
        Ok(())
    }
}
