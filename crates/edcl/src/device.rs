// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The EDCL device: register window, listener thread and clock-driven
//! executor composed behind one owner.
//!
//! ```text
//!  debug host ──UDP──> TransportLoop ──RequestQueue──> Executor ──> MemoryBus
//!             <──UDP── (own thread)  <──ResponseQueue── (clock edge)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bus::{MemoryBus, SharedRegion};
use crate::config::EdclConfig;
use crate::error::{EdclError, Result};
use crate::executor::{ClockListener, Executor};
use crate::listener::{ListenerHandle, TransportLoop};
use crate::queue::{RequestQueue, ResponseQueue};
use crate::regs::RegisterBlock;
use crate::registry::GRETH_CLASS;
use crate::stats::EdclStats;
use crate::transport::EdclTransport;

/// A device the simulator can instantiate by class name and clock.
pub trait SimDevice: ClockListener {
    fn name(&self) -> &str;

    fn class(&self) -> &'static str;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Register window to map into the simulator's address decoder.
    fn register_region(&self) -> SharedRegion;

    fn stats(&self) -> Arc<EdclStats>;
}

enum ListenerState {
    /// Built but not running; can be driven by hand.
    Idle(TransportLoop),
    Running(ListenerHandle),
    /// The listener thread panicked.
    Lost,
}

/// Ethernet debug link device model.
pub struct EdclDevice {
    config: EdclConfig,
    regs: Arc<Mutex<RegisterBlock>>,
    executor: Executor,
    listener: ListenerState,
    requests: Arc<RequestQueue>,
    responses: Arc<ResponseQueue>,
    stats: Arc<EdclStats>,
}

impl EdclDevice {
    pub fn new(
        config: EdclConfig,
        bus: Box<dyn MemoryBus>,
        transport: Box<dyn EdclTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let requests = Arc::new(RequestQueue::new(config.queue_depth));
        let responses = Arc::new(ResponseQueue::new(config.queue_depth));
        let stats = Arc::new(EdclStats::new());

        let executor = Executor::new(
            Arc::clone(&requests),
            Arc::clone(&responses),
            bus,
            Arc::clone(&stats),
        );
        let listener = TransportLoop::new(
            transport,
            Arc::clone(&requests),
            Arc::clone(&responses),
            Arc::clone(&stats),
            config.max_datagram_size,
        );
        let regs = Arc::new(Mutex::new(RegisterBlock::new(
            config.base_address,
            config.length,
        )));

        Ok(Self {
            config,
            regs,
            executor,
            listener: ListenerState::Idle(listener),
            requests,
            responses,
            stats,
        })
    }

    pub fn config(&self) -> &EdclConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<EdclStats> {
        &self.stats
    }

    pub fn registers(&self) -> &Arc<Mutex<RegisterBlock>> {
        &self.regs
    }

    /// The listener, while not running on its thread.
    pub fn listener_mut(&mut self) -> Option<&mut TransportLoop> {
        match &mut self.listener {
            ListenerState::Idle(l) => Some(l),
            _ => None,
        }
    }

    /// Operations waiting for a clock edge.
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Results waiting for transmission.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Clock edge: execute at most one queued operation.
    pub fn step(&mut self, t: u64) -> bool {
        self.executor.step(t)
    }

    /// Spawn the listener thread.
    pub fn start(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.listener, ListenerState::Lost) {
            ListenerState::Idle(listener) => {
                let handle = listener.spawn(&self.config.name)?;
                self.listener = ListenerState::Running(handle);
                log::info!(
                    "[EDCL] {} started, window 0x{:x}+0x{:x}",
                    self.config.name,
                    self.config.base_address,
                    self.config.length
                );
                Ok(())
            }
            ListenerState::Running(handle) => {
                self.listener = ListenerState::Running(handle);
                Err(EdclError::InvalidState("device already running"))
            }
            ListenerState::Lost => Err(EdclError::InvalidState("listener thread was lost")),
        }
    }

    /// Stop the listener thread and discard undelivered work.
    pub fn stop(&mut self) {
        if !matches!(self.listener, ListenerState::Running(_)) {
            return;
        }
        if let ListenerState::Running(mut handle) =
            std::mem::replace(&mut self.listener, ListenerState::Lost)
        {
            if let Some(mut listener) = handle.stop() {
                listener.reset();
                self.listener = ListenerState::Idle(listener);
            }
            let dropped = self.requests.clear() + self.responses.clear();
            if dropped > 0 {
                log::debug!("[EDCL] {} discarded {} queued entries", self.config.name, dropped);
            }
            log::info!("[EDCL] {} stopped", self.config.name);
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(&self.listener, ListenerState::Running(h) if h.is_running())
    }
}

impl ClockListener for EdclDevice {
    fn step_callback(&mut self, t: u64) {
        self.step(t);
    }
}

impl SimDevice for EdclDevice {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn class(&self) -> &'static str {
        GRETH_CLASS
    }

    fn start(&mut self) -> Result<()> {
        EdclDevice::start(self)
    }

    fn stop(&mut self) {
        EdclDevice::stop(self)
    }

    fn is_running(&self) -> bool {
        EdclDevice::is_running(self)
    }

    fn register_region(&self) -> SharedRegion {
        self.regs.clone()
    }

    fn stats(&self) -> Arc<EdclStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for EdclDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
