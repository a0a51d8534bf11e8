// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Full stack over loopback UDP: client, listener thread, clocked executor,
//! RAM behind a system bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use edcl::{
    EdclClient, EdclConfig, EdclDevice, EdclError, MemoryWindow, SharedBus, SimDevice, SystemBus,
    UdpTransport,
};
use parking_lot::Mutex;

const RAM_BASE: u64 = 0x4000_0000;

fn start_device() -> (std::net::SocketAddr, Arc<AtomicBool>, thread::JoinHandle<EdclDevice>) {
    let config = EdclConfig {
        ip: std::net::Ipv4Addr::LOCALHOST,
        udp_port: 0,
        poll_interval_ms: 5,
        ..Default::default()
    };

    let transport = UdpTransport::bind(config.bind_addr(), config.poll_interval()).unwrap();
    let addr = transport.local_addr().unwrap();

    let bus: SharedBus = Arc::new(Mutex::new(SystemBus::new()));
    bus.lock()
        .map(Arc::new(Mutex::new(MemoryWindow::new(RAM_BASE, 0x1_0000))))
        .unwrap();

    let mut device = EdclDevice::new(config, Box::new(Arc::clone(&bus)), Box::new(transport)).unwrap();
    bus.lock().map(device.register_region()).unwrap();
    device.start().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let clock = thread::spawn(move || {
        let mut t = 0u64;
        while flag.load(Ordering::Acquire) {
            device.step(t);
            t += 1;
            thread::sleep(Duration::from_micros(100));
        }
        device.stop();
        device
    });
    (addr, running, clock)
}

#[test]
fn udp_write_then_read() {
    let (addr, running, clock) = start_device();
    let mut client = EdclClient::connect(addr).unwrap();

    client.write_word(0x4000_1000, 0xAABB_CCDD).unwrap();
    assert_eq!(client.read_word(0x4000_1000).unwrap(), 0xAABB_CCDD);

    let block: Vec<u32> = (0..500u32).map(|i| i.wrapping_mul(0x9E37_79B9)).collect();
    client.write(0x4000_2000, &block).unwrap();
    assert_eq!(client.read(0x4000_2000, block.len()).unwrap(), block);

    // Device registers are reachable through the same bus.
    client.write_word(0x8004_0004, 0x1234_5678).unwrap();
    assert_eq!(client.read_word(0x8004_0004).unwrap(), 0x1234_5678);

    assert!(matches!(
        client.read_word(0x1000_0000),
        Err(EdclError::RemoteFault { .. })
    ));

    running.store(false, Ordering::Release);
    let device = clock.join().unwrap();
    let stats = device.stats().snapshot();
    // Reads NAKed with their own id are retried once.
    assert_eq!(stats.bus_faults, 2);
    assert!(stats.accepted >= 10);
    assert!(!device.is_running());
}

#[test]
fn udp_out_of_sync_client_recovers() {
    let (addr, running, clock) = start_device();
    let mut client = EdclClient::connect(addr).unwrap();

    client.write_word(0x4000_0000, 1).unwrap();
    client.set_next_seq(4000);
    client.write_word(0x4000_0004, 2).unwrap();
    // Sync read 0, write 1, rejected 4000, write 2.
    assert_eq!(client.next_seq(), 3);
    assert_eq!(client.read(0x4000_0000, 2).unwrap(), vec![1, 2]);

    running.store(false, Ordering::Release);
    let device = clock.join().unwrap();
    assert_eq!(device.stats().snapshot().sequence_rejects, 1);
}

#[test]
fn udp_second_session_writes_reach_the_bus() {
    let (addr, running, clock) = start_device();

    let mut first = EdclClient::connect(addr).unwrap();
    first.write_word(0x4000_0000, 1).unwrap();
    drop(first);

    // Fresh client, fresh sequence state on the host side.
    let mut second = EdclClient::connect(addr).unwrap();
    second.write_word(0x4000_0000, 2).unwrap();
    assert_eq!(second.read_word(0x4000_0000).unwrap(), 2);

    let mut third = EdclClient::connect(addr).unwrap();
    third.write_word(0x4000_0000, 3).unwrap();
    assert_eq!(third.read_word(0x4000_0000).unwrap(), 3);

    running.store(false, Ordering::Release);
    let device = clock.join().unwrap();
    assert_eq!(device.stats().snapshot().bus_writes, 3);
}
