// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! edcl-sim - standalone EDCL simulator host
//!
//! Builds a device from configuration, backs it with RAM, and clocks it
//! while a debug host talks to it over UDP.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: port 5555, 1 MiB RAM at 0x40000000, 1 MHz clock
//! edcl-sim
//!
//! # Using configuration file
//! edcl-sim --config sim.toml
//!
//! # Override port and RAM window
//! edcl-sim --port 6000 --ram-base 0x0 --ram-size 0x400000
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use edcl::{
    ClockListener, DeviceContext, DeviceRegistry, EdclConfig, EdclStats, MemoryWindow, SharedBus,
    SimDevice, StatsSnapshot, SystemBus, UdpTransport,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// EDCL simulator host
#[derive(Parser, Debug)]
#[command(name = "edcl-sim")]
#[command(about = "Serve a simulated system bus over the EDCL debug link")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP port (overrides the configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// RAM base address (hex with 0x prefix, or decimal)
    #[arg(long, value_parser = parse_u64)]
    ram_base: Option<u64>,

    /// RAM size in bytes (hex with 0x prefix, or decimal)
    #[arg(long, value_parser = parse_u64)]
    ram_size: Option<u64>,

    /// Simulated clock frequency
    #[arg(long)]
    clock_hz: Option<u64>,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long, default_value = "10")]
    stats_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "edcl-sim.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Host configuration: the device plus what the host puts around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SimConfig {
    #[serde(default = "default_clock_hz")]
    clock_hz: u64,

    #[serde(default)]
    device: EdclConfig,

    #[serde(default)]
    ram: RamConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RamConfig {
    #[serde(default = "default_ram_base")]
    base: u64,

    #[serde(default = "default_ram_size")]
    size: u64,
}

fn default_clock_hz() -> u64 {
    1_000_000
}

fn default_ram_base() -> u64 {
    0x4000_0000
}

fn default_ram_size() -> u64 {
    0x10_0000
}

impl Default for RamConfig {
    fn default() -> Self {
        Self {
            base: default_ram_base(),
            size: default_ram_size(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            clock_hz: default_clock_hz(),
            device: EdclConfig::default(),
            ram: RamConfig::default(),
        }
    }
}

impl SimConfig {
    fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn from_toml_str(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.device.validate()?;
        if self.clock_hz == 0 {
            return Err("clock_hz must be > 0".into());
        }
        if self.ram.size == 0 {
            return Err("ram.size must be > 0".into());
        }
        let ram_end = self
            .ram
            .base
            .checked_add(self.ram.size)
            .ok_or("RAM window overflows the address space")?;
        let dev_end = self.device.base_address + self.device.length;
        if self.ram.base < dev_end && self.device.base_address < ram_end {
            return Err(format!(
                "RAM 0x{:x}..0x{:x} overlaps device window 0x{:x}..0x{:x}",
                self.ram.base, ram_end, self.device.base_address, dev_end
            )
            .into());
        }
        Ok(())
    }
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn main() {
    let args = Args::parse();

    // Initialize logging; the library's `log` records are bridged in.
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match args.command {
        Some(Commands::GenConfig { ref output }) => cmd_gen_config(output),
        Some(Commands::Validate { ref config }) => cmd_validate(config),
        None => run(&args),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn build_config(args: &Args) -> Result<SimConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(port) = args.port {
        config.device.udp_port = port;
    }
    if let Some(base) = args.ram_base {
        config.ram.base = base;
    }
    if let Some(size) = args.ram_size {
        config.ram.size = size;
    }
    if let Some(hz) = args.clock_hz {
        config.clock_hz = hz;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(args)?;
    let dev = &config.device;

    let bus: SharedBus = Arc::new(Mutex::new(SystemBus::new()));
    let ram_size = usize::try_from(config.ram.size)?;
    bus.lock()
        .map(Arc::new(Mutex::new(MemoryWindow::new(config.ram.base, ram_size))))?;

    let transport = UdpTransport::bind(dev.bind_addr(), dev.poll_interval())?;
    let local = transport.local_addr()?;

    let registry = DeviceRegistry::with_builtin();
    let mut device = registry.create(
        dev,
        DeviceContext {
            bus: Box::new(Arc::clone(&bus)),
            transport: Box::new(transport),
        },
    )?;
    bus.lock().map(device.register_region())?;

    println!("EDCL Simulator v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    println!("Device:    {} ({})", device.name(), device.class());
    println!("Listening: udp://{}", local);
    println!(
        "Registers: 0x{:08x}..0x{:08x}",
        dev.base_address,
        dev.base_address + dev.length
    );
    println!(
        "RAM:       0x{:08x}..0x{:08x}",
        config.ram.base,
        config.ram.base + config.ram.size
    );
    println!("Clock:     {} Hz", config.clock_hz);
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let stats = device.stats();
    device.start()?;
    let ticks = run_clock(
        device.as_mut(),
        config.clock_hz,
        &running,
        Duration::from_secs(args.stats_interval),
        &stats,
    );

    println!("\nShutting down...");
    device.stop();
    tracing::info!("clock stopped after {} ticks", ticks);

    println!("\nFinal Statistics:");
    print_stats(&stats.snapshot());
    Ok(())
}

/// Step `device` at `hz` until `running` clears. Ticks are issued in 1 ms
/// slices paced with `spin_sleep`. Returns the number of ticks issued.
fn run_clock(
    device: &mut dyn SimDevice,
    hz: u64,
    running: &AtomicBool,
    stats_interval: Duration,
    stats: &EdclStats,
) -> u64 {
    let ticks_per_slice = (hz / 1000).max(1);
    let slice = Duration::from_nanos(ticks_per_slice.saturating_mul(1_000_000_000) / hz);

    let start = Instant::now();
    let mut last_report = Instant::now();
    let mut t = 0u64;
    let mut slices = 0u64;
    while running.load(Ordering::SeqCst) {
        for _ in 0..ticks_per_slice {
            device.step_callback(t);
            t += 1;
        }
        slices += 1;

        if !stats_interval.is_zero() && last_report.elapsed() >= stats_interval {
            print_stats(&stats.snapshot());
            last_report = Instant::now();
        }

        // Pace against wall time so drift does not accumulate.
        let target = slice_deadline(slice, slices);
        if let Some(ahead) = target.checked_sub(start.elapsed()) {
            spin_sleep::sleep(ahead);
        }
    }
    t
}

/// Wall-clock offset at which `slices` slices should have finished.
fn slice_deadline(slice: Duration, slices: u64) -> Duration {
    let nanos = slice.as_nanos().saturating_mul(u128::from(slices));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn cmd_gen_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = SimConfig::default();
    let content = toml::to_string_pretty(&config)?;
    std::fs::write(output, content)?;
    println!("Generated configuration: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match SimConfig::from_file(config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Device: {} ({})", config.device.name, config.device.class);
            println!("  UDP:       {}", config.device.bind_addr());
            println!(
                "  Registers: 0x{:x}+0x{:x}",
                config.device.base_address, config.device.length
            );
            println!("  Queues:    {} entries", config.device.queue_depth);
            println!("RAM: 0x{:x}+0x{:x}", config.ram.base, config.ram.size);
            println!("Clock: {} Hz", config.clock_hz);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_stats(stats: &StatsSnapshot) {
    println!("--- EDCL Statistics ({:.0?}) ---", stats.uptime);
    println!(
        "  rx {} / tx {} datagrams, {} malformed, {} send errors",
        stats.rx_datagrams, stats.tx_datagrams, stats.malformed, stats.send_errors
    );
    println!(
        "  {} accepted, {} duplicates, {} NAKs ({} out of order, {} queue full)",
        stats.accepted,
        stats.duplicates,
        stats.protocol_naks(),
        stats.sequence_rejects,
        stats.queue_full
    );
    println!(
        "  bus: {} reads, {} writes, {} faults",
        stats.bus_reads, stats.bus_writes, stats.bus_faults
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_deadline_past_u32_slices() {
        let slice = Duration::from_millis(1);
        assert_eq!(slice_deadline(slice, 3), Duration::from_millis(3));

        // 2^33 ms: a u32 slice count would have wrapped to zero.
        let slices = 1u64 << 33;
        assert_eq!(slice_deadline(slice, slices), Duration::from_millis(slices));
        assert!(slice_deadline(slice, slices) > slice_deadline(slice, slices - 1));

        assert_eq!(
            slice_deadline(Duration::from_secs(1), u64::MAX),
            Duration::from_nanos(u64::MAX)
        );
    }

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64("0x4000_0000"), Ok(0x4000_0000));
        assert_eq!(parse_u64("4096"), Ok(4096));
        assert!(parse_u64("0xZZ").is_err());
    }

    #[test]
    fn test_sim_config_toml() {
        let config = SimConfig::from_toml_str(
            r#"
            clock_hz = 50000000

            [device]
            name = "greth0"
            udp_port = 6000

            [ram]
            base = 0x0
            size = 0x400000
            "#,
        )
        .unwrap();
        assert_eq!(config.clock_hz, 50_000_000);
        assert_eq!(config.device.name, "greth0");
        assert_eq!(config.device.udp_port, 6000);
        assert_eq!(config.ram.size, 0x40_0000);
        assert_eq!(config.device.queue_depth, edcl::DEFAULT_QUEUE_DEPTH);
    }

    #[test]
    fn test_sim_config_rejects_overlap() {
        let config = SimConfig {
            ram: RamConfig {
                base: 0x8000_0000,
                size: 0x10_0000,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(SimConfig::from_toml_str("clock_hz = 0").is_err());
    }

    #[test]
    fn test_gen_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edcl-sim.toml");
        cmd_gen_config(&path).unwrap();
        assert_eq!(SimConfig::from_file(&path).unwrap(), SimConfig::default());
    }
}
