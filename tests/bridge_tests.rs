//! End-to-end pipeline tests: channel byte source → bridge → collector

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender as ByteTx};
use std::thread;
use std::time::{Duration, Instant};

use uart_telemetry_bridge::collector;
use uart_telemetry_bridge::{Bridge, BridgeConfig, ByteSource, Result, SystemResolver};

/// Peripheral stand-in fed from a channel.
struct ChannelSource {
    rx: Receiver<u8>,
}

impl ByteSource for ChannelSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self.rx.recv_timeout(timeout) {
            Ok(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                Ok(0)
            }
        }
    }
}

fn channel_source() -> (ByteTx<u8>, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (tx, ChannelSource { rx })
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bridge-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn read_all_logs(dir: &PathBuf) -> String {
    let mut content = String::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        content.push_str(&std::fs::read_to_string(entry.unwrap().path()).unwrap());
    }
    content
}

#[test]
fn test_frames_reach_collector() {
    let dir = temp_dir("e2e");
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    {
        let dir = dir.clone();
        thread::spawn(move || collector::serve(listener, &dir));
    }

    let mut config = BridgeConfig::default();
    config.collector.host = "127.0.0.1".into();
    config.collector.port = port;

    let bridge = Bridge::new(config).unwrap();
    bridge.link().link_up();
    let (tx, source) = channel_source();
    let handles = bridge.start(source, SystemResolver).unwrap();

    assert!(handles.link.wait_resolved(Duration::from_secs(5)).is_some());

    for byte in [0x01, 0x02, 0x03] {
        tx.send(byte).unwrap();
    }
    thread::sleep(Duration::from_millis(100));
    for byte in [0xCA, 0xFE] {
        tx.send(byte).unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(10), || handles.stats.snapshot().sent >= 2),
        "records not delivered: {:?}",
        handles.stats.snapshot()
    );
    assert!(wait_until(Duration::from_secs(5), || {
        read_all_logs(&dir).lines().count() >= 2
    }));

    let logs = read_all_logs(&dir);
    let bodies: Vec<&str> = logs.lines().filter_map(|l| l.split_once("  |")).map(|(_, b)| b).collect();
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0].ends_with(", 010203"), "{}", bodies[0]);
    assert!(bodies[1].ends_with(", CAFE"), "{}", bodies[1]);

    // Timestamps are decimal and non-decreasing
    let ts: Vec<u64> = bodies
        .iter()
        .map(|b| b.split_once(", ").unwrap().0.parse().unwrap())
        .collect();
    assert!(ts[0] <= ts[1]);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unresolved_records_are_dropped() {
    let mut config = BridgeConfig::default();
    config.collector.host = "127.0.0.1".into();

    // Link never comes up: nothing can resolve
    let bridge = Bridge::new(config).unwrap();
    let (tx, source) = channel_source();
    let handles = bridge.start(source, SystemResolver).unwrap();

    tx.send(0x55).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        handles.stats.snapshot().dropped_unresolved == 1
    }));

    assert!(handles.queue.is_empty());
    assert!(handles.link.resolve_requested());
    assert!(!handles.link.resolve_completed());
    assert_eq!(handles.stats.snapshot().sent, 0);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = BridgeConfig::default();
    config.queue_capacity = 16;
    assert!(Bridge::new(config).is_err());
}
