//! Idle-gap framer.
//!
//! Pure state machine plus a task that drives it from a [`ByteSource`].
//! Fully testable on host.
//!
//! # States
//!
//! - **Idle**: nothing received since the last flush. Polls with the long
//!   idle timeout (1 s) to keep peripheral polling cheap; a timeout does
//!   nothing.
//! - **Receiving**: at least one byte buffered. Every byte restarts the
//!   short idle-gap timeout (15 ms); when it expires the buffered bytes
//!   become a [`Frame`].
//!
//! A frame that reaches `max_frame_len` is flushed immediately so a
//! continuous stream can never outgrow the record queue.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info};

use crate::clock;
use crate::config::FramerConfig;
use crate::error::Result;
use crate::queue::RecordQueue;
use crate::record::{encode_frame, Frame};

/// Pause after a failed peripheral read before polling again.
const READ_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Peripheral byte source.
pub trait ByteSource {
    /// Read into `buf`, waiting at most `timeout` for data.
    ///
    /// Returns the number of bytes read; `Ok(0)` means the timeout elapsed.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }
}

/// Framer state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramerState {
    Idle,
    Receiving,
}

/// Idle-gap framing state machine.
pub struct Framer {
    config: FramerConfig,
    pending: Vec<u8>,
}

impl Framer {
    pub fn new(config: FramerConfig) -> Self {
        Self {
            pending: Vec::with_capacity(config.max_frame_len),
            config,
        }
    }

    #[inline]
    pub fn state(&self) -> FramerState {
        if self.pending.is_empty() {
            FramerState::Idle
        } else {
            FramerState::Receiving
        }
    }

    /// How long the next peripheral read may wait.
    #[inline]
    pub fn poll_timeout(&self) -> Duration {
        match self.state() {
            FramerState::Idle => self.config.idle_poll,
            FramerState::Receiving => self.config.idle_gap,
        }
    }

    /// Buffered bytes of the frame in progress.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Feed one byte. Returns a frame if the length bound was reached.
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        self.pending.push(byte);
        if self.pending.len() >= self.config.max_frame_len {
            return Some(self.take());
        }
        None
    }

    /// A poll timed out. Completes the frame in progress, if any.
    pub fn on_timeout(&mut self) -> Option<Frame> {
        match self.state() {
            FramerState::Idle => None,
            FramerState::Receiving => Some(self.take()),
        }
    }

    fn take(&mut self) -> Frame {
        let bytes = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.config.max_frame_len),
        );
        Frame::new(bytes)
    }
}

/// Framer task: peripheral → framer → encoder → queue.
pub struct FramerTask<S: ByteSource> {
    source: S,
    framer: Framer,
    queue: Arc<RecordQueue>,
    clock: fn() -> u64,
}

impl<S: ByteSource> FramerTask<S> {
    pub fn new(source: S, config: FramerConfig, queue: Arc<RecordQueue>) -> Self {
        Self {
            source,
            framer: Framer::new(config),
            queue,
            clock: clock::uptime_ms,
        }
    }

    /// Replace the millisecond tick source used to stamp records.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    /// One bounded peripheral read. Returns a completed frame, if any.
    ///
    /// Bytes are read one at a time so a multi-byte read can never wait
    /// across a gap.
    pub fn poll_once(&mut self) -> Result<Option<Frame>> {
        let timeout = self.framer.poll_timeout();
        let mut byte = [0u8; 1];
        let frame = match self.source.read(&mut byte, timeout)? {
            0 => self.framer.on_timeout(),
            _ => self.framer.push_byte(byte[0]),
        };
        Ok(frame)
    }

    /// Poll once and publish a completed frame. Returns whether one was
    /// published. Blocks while the queue is full.
    pub fn step(&mut self) -> Result<bool> {
        match self.poll_once()? {
            Some(frame) => {
                self.publish(frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn publish(&self, frame: Frame) -> Result<()> {
        let len = frame.len();
        let record = encode_frame(frame, (self.clock)());
        self.queue.publish(&record)?;
        info!("{} bytes queued", len);
        Ok(())
    }

    /// Framer loop. Never returns.
    pub fn run(mut self) -> ! {
        loop {
            if let Err(e) = self.step() {
                error!("{}", e);
                thread::sleep(READ_ERROR_PAUSE);
            }
        }
    }
}

impl<S: ByteSource + Send + 'static> FramerTask<S> {
    /// Run the framer loop on its own thread.
    pub fn spawn(self, stack_size: usize) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("uart_rx".into())
            .stack_size(stack_size)
            .spawn(move || self.run())
    }
}
