//! Idle-gap framing tests driven by a scripted, virtual-time byte source

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use uart_telemetry_bridge::config::FramerConfig;
use uart_telemetry_bridge::framer::{ByteSource, Framer, FramerState, FramerTask};
use uart_telemetry_bridge::queue::RecordQueue;
use uart_telemetry_bridge::{BridgeError, Result};

/// Byte source replaying `(delay_ms, byte)` pairs on a virtual clock.
///
/// A byte whose delay is shorter than the read timeout is delivered;
/// otherwise the read times out and the delay shrinks by the timeout.
struct ScriptedSource {
    script: VecDeque<(u64, u8)>,
    remaining: Rc<Cell<usize>>,
}

impl ScriptedSource {
    fn new(script: &[(u64, u8)]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            remaining: Rc::new(Cell::new(script.len())),
        }
    }
}

impl ByteSource for ScriptedSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let timeout_ms = timeout.as_millis() as u64;
        match self.script.front_mut() {
            Some((delay, byte)) if *delay < timeout_ms => {
                buf[0] = *byte;
                self.script.pop_front();
                self.remaining.set(self.script.len());
                Ok(1)
            }
            Some((delay, _)) => {
                *delay -= timeout_ms;
                Ok(0)
            }
            None => Ok(0),
        }
    }
}

fn config(max_frame_len: usize) -> FramerConfig {
    FramerConfig {
        idle_gap: Duration::from_millis(15),
        idle_poll: Duration::from_millis(1000),
        max_frame_len,
    }
}

fn fixed_clock() -> u64 {
    4242
}

/// Drive the task until the script is consumed and the framer is idle,
/// then return every queued record as text.
fn run_script(script: &[(u64, u8)], max_frame_len: usize) -> Vec<String> {
    let queue = Arc::new(RecordQueue::new(4096));
    let source = ScriptedSource::new(script);
    let remaining = Rc::clone(&source.remaining);
    let mut task =
        FramerTask::new(source, config(max_frame_len), Arc::clone(&queue)).with_clock(fixed_clock);

    let mut steps = 0;
    while remaining.get() > 0 || task.framer().state() == FramerState::Receiving {
        task.step().unwrap();
        steps += 1;
        assert!(steps < 100_000, "framer did not settle");
    }

    let mut records = Vec::new();
    while let Some(record) = queue.try_take_next() {
        records.push(record.to_string());
    }
    records
}

#[test]
fn test_three_bytes_then_gap_make_one_record() {
    let script = [(5, 0x01), (5, 0x02), (5, 0x03), (20, 0xAA)];
    let queue = Arc::new(RecordQueue::new(256));
    let mut task = FramerTask::new(ScriptedSource::new(&script), config(64), Arc::clone(&queue))
        .with_clock(fixed_clock);

    // 3 bytes, then one 15 ms timeout completes the frame
    for _ in 0..3 {
        assert!(!task.step().unwrap());
    }
    assert_eq!(task.framer().pending(), &[0x01, 0x02, 0x03]);
    assert!(task.step().unwrap());

    let record = queue.try_take_next().unwrap();
    assert_eq!(record.to_string(), "4242, 010203");
    assert!(queue.is_empty());
}

#[test]
fn test_idle_polls_do_not_emit() {
    let queue = Arc::new(RecordQueue::new(256));
    let mut task = FramerTask::new(ScriptedSource::new(&[]), config(64), Arc::clone(&queue));

    for _ in 0..5 {
        assert!(!task.step().unwrap());
    }
    assert_eq!(task.framer().state(), FramerState::Idle);
    assert!(queue.is_empty());
}

#[test]
fn test_gap_threshold_is_inclusive() {
    // 14 ms keeps the run together, 15 ms splits it
    let script = [(0, 0x10), (14, 0x11), (15, 0x20), (40, 0x30)];
    let records = run_script(&script, 64);
    assert_eq!(records, vec!["4242, 1011", "4242, 20", "4242, 30"]);
}

#[test]
fn test_long_run_is_cut_at_max_frame_len() {
    let script: Vec<(u64, u8)> = (0..10u8).map(|b| (1, b)).collect();
    let records = run_script(&script, 4);
    assert_eq!(
        records,
        vec!["4242, 00010203", "4242, 04050607", "4242, 0809"]
    );
}

/// Deterministic pseudo-random byte streams: every run separated by a gap
/// of at least 15 ms becomes one frame, split only by the length bound.
#[test]
fn test_random_streams_split_on_gaps_only() {
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) as u32
    };

    for _ in 0..50 {
        let max_frame_len = 1 + (next() % 12) as usize;
        let mut script = Vec::new();
        let mut expected_runs: Vec<Vec<u8>> = Vec::new();

        let runs = 1 + next() % 6;
        for _ in 0..runs {
            let len = 1 + next() % 20;
            let mut run = Vec::new();
            for i in 0..len {
                let byte = next() as u8;
                let delay = if i == 0 {
                    15 + (next() % 100) as u64
                } else {
                    (next() % 15) as u64
                };
                script.push((delay, byte));
                run.push(byte);
            }
            expected_runs.push(run);
        }

        let expected: Vec<String> = expected_runs
            .iter()
            .flat_map(|run| run.chunks(max_frame_len))
            .map(|chunk| {
                let hex: String = chunk.iter().map(|b| format!("{:02X}", b)).collect();
                format!("4242, {}", hex)
            })
            .collect();

        assert_eq!(run_script(&script, max_frame_len), expected);
    }
}

#[test]
fn test_framer_never_emits_empty_frame() {
    let mut framer = Framer::new(config(2));
    assert_eq!(framer.on_timeout(), None);
    assert!(framer.push_byte(1).is_none());
    assert!(framer.push_byte(2).is_some());
    assert_eq!(framer.on_timeout(), None);
}

/// Replays read results in order: a byte, a timeout or a peripheral error.
enum Reply {
    Byte(u8),
    Timeout,
    Fail,
}

struct FaultySource {
    reads: VecDeque<Reply>,
}

impl ByteSource for FaultySource {
    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        match self.reads.pop_front() {
            Some(Reply::Byte(byte)) => {
                buf[0] = byte;
                Ok(1)
            }
            Some(Reply::Fail) => Err(BridgeError::Peripheral("framing error".into())),
            Some(Reply::Timeout) | None => Ok(0),
        }
    }
}

#[test]
fn test_read_error_keeps_partial_frame() {
    let reads = [Reply::Byte(0x01), Reply::Byte(0x02), Reply::Fail, Reply::Byte(0x03), Reply::Timeout];
    let queue = Arc::new(RecordQueue::new(256));
    let source = FaultySource {
        reads: reads.into_iter().collect(),
    };
    let mut task = FramerTask::new(source, config(64), Arc::clone(&queue)).with_clock(fixed_clock);

    assert!(!task.step().unwrap());
    assert!(!task.step().unwrap());

    let err = task.step().unwrap_err();
    assert!(matches!(err, BridgeError::Peripheral(_)));
    assert_eq!(task.framer().pending(), &[0x01, 0x02]);
    assert_eq!(task.framer().state(), FramerState::Receiving);
    assert!(queue.is_empty());

    // The frame continues after the failed read
    assert!(!task.step().unwrap());
    assert!(task.step().unwrap());
    assert_eq!(queue.try_take_next().unwrap().to_string(), "4242, 010203");
    assert!(queue.is_empty());
}
