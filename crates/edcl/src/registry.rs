// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Device factories keyed by class name, so hosts can build devices from
// configuration files.

use std::collections::HashMap;

use crate::bus::MemoryBus;
use crate::config::EdclConfig;
use crate::device::{EdclDevice, SimDevice};
use crate::error::{EdclError, Result};
use crate::transport::EdclTransport;

/// Class name of the EDCL-capable Ethernet MAC model.
pub const GRETH_CLASS: &str = "Greth";

/// Collaborators handed to a factory.
pub struct DeviceContext {
    pub bus: Box<dyn MemoryBus>,
    pub transport: Box<dyn EdclTransport>,
}

/// Builds a device from its configuration and collaborators.
pub type DeviceFactory = fn(&EdclConfig, DeviceContext) -> Result<Box<dyn SimDevice>>;

/// Registry of device factories.
#[derive(Default)]
pub struct DeviceRegistry {
    factories: HashMap<String, DeviceFactory>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in classes registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(GRETH_CLASS, create_greth);
        registry
    }

    /// Register `factory` under `class`. Returns the factory it replaced.
    pub fn register(&mut self, class: &str, factory: DeviceFactory) -> Option<DeviceFactory> {
        self.factories.insert(class.to_string(), factory)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate `config.class`.
    pub fn create(&self, config: &EdclConfig, ctx: DeviceContext) -> Result<Box<dyn SimDevice>> {
        let factory = self
            .factories
            .get(&config.class)
            .ok_or_else(|| EdclError::UnknownClass(config.class.clone()))?;
        let device = factory(config, ctx)?;
        log::debug!("[EDCL] created {} ({})", config.name, config.class);
        Ok(device)
    }
}

fn create_greth(config: &EdclConfig, ctx: DeviceContext) -> Result<Box<dyn SimDevice>> {
    let device = EdclDevice::new(config.clone(), ctx.bus, ctx.transport)?;
    Ok(Box::new(device))
}
