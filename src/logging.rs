//! Non-blocking logging for the telemetry bridge.
//!
//! # Architecture
//!
//! ```text
//! Tasks                  LogStream              Drain thread
//! ─────                  ─────────              ────────────
//!
//! log::info!() ────────▶ [L0][L1][L2] ────────▶ console UART / stdout
//! never blocks            lock-free              blocking ok
//! ```
//!
//! # Rules
//!
//! - Producers (framer, resolver, sender) never block on logging.
//! - Log messages may be dropped if the ring is full; drops are counted and
//!   reported by the drain thread.
//! - Messages are truncated to [`MAX_MSG_LEN`] bytes.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock;

/// Maximum message length.
pub const MAX_MSG_LEN: usize = 120;

/// Log buffer size (number of entries).
pub const LOG_BUFFER_SIZE: usize = 256;

/// How often the drain thread reports dropped entries.
const DROPPED_REPORT_INTERVAL_US: i64 = 10_000_000;

/// Drain thread sleep when there is nothing to write.
const DRAIN_IDLE: Duration = Duration::from_millis(10);

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Convert to string for output.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Trace,
        }
    }
}

/// A single log entry.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct LogEntry {
    /// Timestamp in microseconds.
    pub timestamp_us: i64,
    /// Log level.
    pub level: LogLevel,
    /// Message length.
    pub len: u8,
    /// Message bytes (not null-terminated).
    pub msg: [u8; MAX_MSG_LEN],
}

impl LogEntry {
    /// Message text.
    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.msg[..self.len as usize]).unwrap_or("<invalid utf8>")
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            timestamp_us: 0,
            level: LogLevel::Info,
            len: 0,
            msg: [0; MAX_MSG_LEN],
        }
    }
}

struct Slot {
    /// Slot sequence: `pos` when free for the write at `pos`,
    /// `pos + 1` once that write is complete.
    seq: AtomicUsize,
    entry: UnsafeCell<LogEntry>,
}

/// Lock-free bounded log ring (multiple producers, drained by one thread).
///
/// Each slot carries a sequence number, so a reader never sees an entry
/// whose write has not finished and a full ring never corrupts its cursors.
pub struct LogStream<const N: usize = LOG_BUFFER_SIZE> {
    slots: Box<[Slot]>,
    write_idx: AtomicUsize,
    read_idx: AtomicUsize,
    dropped: AtomicU32,
}

// SAFETY: a slot's entry is only written by the producer that won the CAS
// on `write_idx` for that position, and only read by the consumer that won
// the CAS on `read_idx`; the slot sequence orders the two.
unsafe impl<const N: usize> Sync for LogStream<N> {}
unsafe impl<const N: usize> Send for LogStream<N> {}

impl<const N: usize> LogStream<N> {
    const MASK: usize = N - 1;

    /// Create a new empty log stream.
    ///
    /// # Panics
    ///
    /// Panics if N is not a power of 2.
    pub fn new() -> Self {
        assert!(N.is_power_of_two(), "Log buffer size must be power of 2");

        Self {
            slots: (0..N)
                .map(|i| Slot {
                    seq: AtomicUsize::new(i),
                    entry: UnsafeCell::new(LogEntry::default()),
                })
                .collect(),
            write_idx: AtomicUsize::new(0),
            read_idx: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push a log entry, never blocks.
    ///
    /// Returns `true` if the message was queued, `false` if dropped (ring full).
    pub fn push(&self, timestamp_us: i64, level: LogLevel, msg: &[u8]) -> bool {
        let mut pos = self.write_idx.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & Self::MASK];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as isize;

            if diff == 0 {
                match self.write_idx.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS made this producer the only writer of the slot
                        unsafe {
                            let entry = &mut *slot.entry.get();
                            entry.timestamp_us = timestamp_us;
                            entry.level = level;
                            entry.len = msg.len().min(MAX_MSG_LEN) as u8;
                            entry.msg[..entry.len as usize]
                                .copy_from_slice(&msg[..entry.len as usize]);
                        }
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        return true;
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // Slot still holds an undrained entry from the previous lap
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            } else {
                pos = self.write_idx.load(Ordering::Relaxed);
            }
        }
    }

    /// Drain next log entry.
    ///
    /// Returns `None` if no complete entry is available.
    pub fn drain(&self) -> Option<LogEntry> {
        let mut pos = self.read_idx.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & Self::MASK];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;

            if diff == 0 {
                match self.read_idx.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS made this consumer the only reader of the slot
                        let entry = unsafe { *slot.entry.get() };
                        slot.seq.store(pos.wrapping_add(N), Ordering::Release);
                        return Some(entry);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.read_idx.load(Ordering::Relaxed);
            }
        }
    }

    /// Get count of dropped messages.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset dropped counter (e.g., after reporting).
    #[inline]
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Number of entries claimed by producers and not yet drained.
    #[inline]
    pub fn pending(&self) -> usize {
        let read = self.read_idx.load(Ordering::Acquire);
        let write = self.write_idx.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    #[inline]
    pub fn has_entries(&self) -> bool {
        self.pending() > 0
    }
}

impl<const N: usize> Default for LogStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a message into a buffer, truncating at the end of `buf`.
///
/// Returns the number of bytes written.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    use core::fmt::Write;

    struct BufWriter<'a> {
        buf: &'a mut [u8],
        pos: usize,
    }

    impl<'a> Write for BufWriter<'a> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let remaining = self.buf.len() - self.pos;
            let mut to_write = s.len().min(remaining);
            // Never split a UTF-8 sequence
            while !s.is_char_boundary(to_write) {
                to_write -= 1;
            }
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&s.as_bytes()[..to_write]);
            self.pos += to_write;
            Ok(())
        }
    }

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = core::fmt::write(&mut writer, args);
    writer.pos
}

/// Format log entry for output.
///
/// Format: `[timestamp_us] LEVEL: message\n`
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    format_to_buffer(
        buf,
        format_args!(
            "[{:10}] {}: {}\n",
            entry.timestamp_us,
            entry.level.as_str(),
            entry.message()
        ),
    )
}

/// `log` backend that pushes records into a [`LogStream`].
pub struct RingLogger {
    stream: &'static LogStream,
    level: log::LevelFilter,
}

impl RingLogger {
    pub fn new(stream: &'static LogStream, level: log::LevelFilter) -> Self {
        Self { stream, level }
    }
}

impl log::Log for RingLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Module name only, like an ESP-IDF log tag
        let tag = record.target().rsplit("::").next().unwrap_or("");
        let mut buf = [0u8; MAX_MSG_LEN];
        let len = format_to_buffer(&mut buf, format_args!("{}: {}", tag, record.args()));
        self.stream
            .push(clock::timestamp_us(), record.level().into(), &buf[..len]);
    }

    fn flush(&self) {}
}

/// Install the ring logger as the global `log` backend.
///
/// Returns the stream to hand to [`spawn_drain`].
pub fn init(level: log::LevelFilter) -> Result<&'static LogStream, log::SetLoggerError> {
    let stream: &'static LogStream = Box::leak(Box::new(LogStream::new()));
    let logger: &'static RingLogger = Box::leak(Box::new(RingLogger::new(stream, level)));
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(stream)
}

/// Write every pending entry to `sink`. Returns how many were written.
pub fn drain_into<const N: usize>(stream: &LogStream<N>, sink: &mut impl Write) -> usize {
    let mut format_buf = [0u8; 256];
    let mut count = 0;
    while let Some(entry) = stream.drain() {
        let len = format_log_entry(&entry, &mut format_buf);
        let _ = sink.write_all(&format_buf[..len]);
        count += 1;
    }
    if count > 0 {
        let _ = sink.flush();
    }
    count
}

fn report_dropped<const N: usize>(stream: &LogStream<N>, sink: &mut impl Write) {
    let dropped = stream.dropped();
    if dropped > 0 {
        let _ = writeln!(sink, "[WARN] Dropped log entries: {}", dropped);
        stream.reset_dropped();
    }
}

/// Drain loop. Never returns.
fn drain_task(stream: &'static LogStream, mut sink: impl Write) -> ! {
    let mut last_dropped_report = clock::timestamp_us();

    loop {
        let work_done = drain_into(stream, &mut sink) > 0;

        let now = clock::timestamp_us();
        if now - last_dropped_report > DROPPED_REPORT_INTERVAL_US {
            report_dropped(stream, &mut sink);
            last_dropped_report = now;
        }

        if !work_done {
            thread::sleep(DRAIN_IDLE);
        }
    }
}

/// Run the drain loop on its own thread, writing to `sink`.
pub fn spawn_drain<W: Write + Send + 'static>(
    stream: &'static LogStream,
    sink: W,
    stack_size: usize,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("log_drain".into())
        .stack_size(stack_size)
        .spawn(move || drain_task(stream, sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_stream_basic() {
        let stream = LogStream::<16>::new();

        assert!(stream.push(1000, LogLevel::Info, b"test message"));
        assert!(stream.has_entries());
        assert_eq!(stream.pending(), 1);

        let entry = stream.drain().unwrap();
        assert_eq!(entry.timestamp_us, 1000);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message(), "test message");

        assert!(!stream.has_entries());
        assert!(stream.drain().is_none());
    }

    #[test]
    fn test_log_stream_full() {
        let stream = LogStream::<4>::new();

        assert!(stream.push(1, LogLevel::Info, b"1"));
        assert!(stream.push(2, LogLevel::Info, b"2"));
        assert!(stream.push(3, LogLevel::Info, b"3"));
        assert!(stream.push(4, LogLevel::Info, b"4"));

        // Should drop without disturbing the queued entries
        assert!(!stream.push(5, LogLevel::Info, b"5"));
        assert_eq!(stream.dropped(), 1);
        assert_eq!(stream.pending(), 4);

        assert_eq!(stream.drain().unwrap().message(), "1");
        assert!(stream.push(6, LogLevel::Info, b"6"));

        let rest: Vec<String> = core::iter::from_fn(|| stream.drain())
            .map(|e| e.message().to_string())
            .collect();
        assert_eq!(rest, ["2", "3", "4", "6"]);
    }

    #[test]
    fn test_message_truncated() {
        let stream = LogStream::<4>::new();
        let long = [b'x'; MAX_MSG_LEN + 30];
        assert!(stream.push(1, LogLevel::Warn, &long));
        assert_eq!(stream.drain().unwrap().len as usize, MAX_MSG_LEN);
    }

    #[test]
    fn test_format_to_buffer() {
        let mut buf = [0u8; 32];
        let len = format_to_buffer(&mut buf, format_args!("Hello {}", 42));
        assert_eq!(&buf[..len], b"Hello 42");

        let mut small = [0u8; 4];
        let len = format_to_buffer(&mut small, format_args!("Hello"));
        assert_eq!(&small[..len], b"Hell");
    }

    #[test]
    fn test_format_log_entry() {
        let mut entry = LogEntry {
            timestamp_us: 1234567,
            level: LogLevel::Error,
            ..LogEntry::default()
        };
        entry.msg[..11].copy_from_slice(b"Hello world");
        entry.len = 11;

        let mut buf = [0u8; 256];
        let len = format_log_entry(&entry, &mut buf);
        let formatted = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(formatted, "[   1234567] ERROR: Hello world\n");
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warn);
    }

    #[test]
    fn test_drain_into_and_report_dropped() {
        let stream = LogStream::<2>::new();
        stream.push(1, LogLevel::Info, b"a");
        stream.push(2, LogLevel::Info, b"b");
        stream.push(3, LogLevel::Info, b"c");

        let mut out = Vec::new();
        assert_eq!(drain_into(&stream, &mut out), 2);
        report_dropped(&stream, &mut out);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("INFO: a"));
        assert!(text.contains("INFO: b"));
        assert!(text.contains("Dropped log entries: 1"));
        assert_eq!(stream.dropped(), 0);
    }

    #[test]
    fn test_ring_logger_tags_module() {
        use log::Log;

        let stream: &'static LogStream = Box::leak(Box::new(LogStream::new()));
        let logger = RingLogger::new(stream, log::LevelFilter::Info);

        logger.log(
            &log::Record::builder()
                .level(log::Level::Info)
                .target("uart_telemetry_bridge::sender")
                .args(format_args!("Sent data via HTTP"))
                .build(),
        );
        logger.log(
            &log::Record::builder()
                .level(log::Level::Debug)
                .target("uart_telemetry_bridge::sender")
                .args(format_args!("filtered"))
                .build(),
        );

        let entry = stream.drain().unwrap();
        assert_eq!(entry.message(), "sender: Sent data via HTTP");
        assert!(stream.drain().is_none());
    }

    #[test]
    fn test_concurrent_producers() {
        use std::sync::Arc;

        let stream = Arc::new(LogStream::<64>::new());
        let mut handles = vec![];

        for i in 0..4 {
            let stream = Arc::clone(&stream);
            handles.push(thread::spawn(move || {
                for j in 0..10 {
                    let msg = format!("Thread {} msg {}", i, j);
                    assert!(stream.push(j as i64, LogLevel::Info, msg.as_bytes()));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while let Some(entry) = stream.drain() {
            assert!(entry.message().starts_with("Thread "));
            count += 1;
        }
        assert_eq!(count, 40, "All messages should be present");
    }

    #[test]
    fn test_concurrent_producer_and_drain() {
        use std::sync::Arc;

        let stream = Arc::new(LogStream::<16>::new());
        let producer = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || {
                let mut sent = 0u32;
                for j in 0..500 {
                    let msg = format!("msg {:04}", j);
                    if stream.push(j, LogLevel::Info, msg.as_bytes()) {
                        sent += 1;
                    }
                }
                sent
            })
        };

        let mut received = 0u32;
        let mut last = -1i64;
        while !producer.is_finished() || stream.has_entries() {
            match stream.drain() {
                Some(entry) => {
                    // Entries are complete and in order
                    assert_eq!(entry.message(), format!("msg {:04}", entry.timestamp_us));
                    assert!(entry.timestamp_us > last);
                    last = entry.timestamp_us;
                    received += 1;
                }
                None => thread::yield_now(),
            }
        }
        let sent = producer.join().unwrap();
        assert_eq!(received, sent);
        assert_eq!(sent + stream.dropped(), 500);
    }
}
