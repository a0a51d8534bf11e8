// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device configuration.
//!
//! Loaded from TOML by simulator hosts, or built in code.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{HEADER_SIZE, SCRATCH_BUFFER_SIZE};
use crate::queue::DEFAULT_QUEUE_DEPTH;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for one EDCL device instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdclConfig {
    /// Instance name (used in logs and the listener thread name).
    #[serde(default = "default_name")]
    pub name: String,

    /// Registry class to instantiate.
    #[serde(default = "default_class")]
    pub class: String,

    /// Base of the device register window.
    #[serde(default = "default_base_address")]
    pub base_address: u64,

    /// Size of the device register window in bytes.
    #[serde(default = "default_length")]
    pub length: u64,

    /// Local address the UDP transport binds to.
    #[serde(default = "default_ip")]
    pub ip: Ipv4Addr,

    /// UDP port the debug host talks to.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// MAC address of the modeled interface, `aa:bb:cc:dd:ee:ff`.
    #[serde(default = "default_mac")]
    pub mac: String,

    /// Depth of the request and response queues.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Receive timeout of the listener. Bounds shutdown latency and how long
    /// a finished result can wait for transmission.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Largest datagram accepted, at most the 4096-byte scratch buffer.
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

fn default_name() -> String {
    "edcl0".to_string()
}

fn default_class() -> String {
    crate::registry::GRETH_CLASS.to_string()
}

fn default_base_address() -> u64 {
    0x8004_0000
}

fn default_length() -> u64 {
    0x4_0000
}

fn default_ip() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_udp_port() -> u16 {
    5555
}

fn default_mac() -> String {
    "20:5e:ed:cc:bb:aa".to_string()
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

fn default_poll_interval_ms() -> u64 {
    2
}

fn default_max_datagram_size() -> usize {
    SCRATCH_BUFFER_SIZE
}

impl Default for EdclConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            class: default_class(),
            base_address: default_base_address(),
            length: default_length(),
            ip: default_ip(),
            udp_port: default_udp_port(),
            mac: default_mac(),
            queue_depth: default_queue_depth(),
            poll_interval_ms: default_poll_interval_ms(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

impl EdclConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.length == 0 {
            return Err(ConfigError::Invalid("length must be > 0".into()));
        }
        if self.base_address.checked_add(self.length).is_none() {
            return Err(ConfigError::Invalid(format!(
                "window 0x{:x}+0x{:x} overflows the address space",
                self.base_address, self.length
            )));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        if self.max_datagram_size < HEADER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_datagram_size must be >= {}",
                HEADER_SIZE
            )));
        }
        if self.max_datagram_size > SCRATCH_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_datagram_size must be <= {}",
                SCRATCH_BUFFER_SIZE
            )));
        }
        parse_mac(&self.mac)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Socket address for the UDP transport.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((self.ip, self.udp_port))
    }

    pub fn mac_bytes(&self) -> Result<[u8; 6], ConfigError> {
        parse_mac(&self.mac)
    }
}

/// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated).
pub fn parse_mac(s: &str) -> Result<[u8; 6], ConfigError> {
    let parts: Vec<&str> = s.split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(ConfigError::Invalid(format!("bad MAC address: {}", s)));
    }
    let mut mac = [0u8; 6];
    for (byte, part) in mac.iter_mut().zip(&parts) {
        if part.len() != 2 {
            return Err(ConfigError::Invalid(format!("bad MAC address: {}", s)));
        }
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| ConfigError::Invalid(format!("bad MAC address: {}", s)))?;
    }
    Ok(mac)
}
