//! Sender task: queue → single-shot POST.
//!
//! Takes exactly one record at a time. A taken record is consumed whatever
//! happens to it: there is no retry queue. Telemetry favours device
//! availability over delivery of any single record.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};

use crate::config::{BridgeConfig, CollectorConfig, UnknownAddressPolicy};
use crate::http::{self, TransactionReport};
use crate::link::{LinkState, ResolvedAddress};
use crate::queue::RecordQueue;
use crate::record::EncodedRecord;

/// Fate of one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transaction completed.
    Sent(TransactionReport),
    /// No collector address was known; the record was dropped.
    DroppedUnresolved,
    /// Connect, write or socket setup failed; the record was dropped.
    Failed,
}

/// Sender counters since boot.
pub struct SenderStats {
    sent: AtomicU32,
    dropped_unresolved: AtomicU32,
    failed: AtomicU32,
}

impl SenderStats {
    pub const fn new() -> Self {
        Self {
            sent: AtomicU32::new(0),
            dropped_unresolved: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    fn record(&self, outcome: &SendOutcome) {
        let counter = match outcome {
            SendOutcome::Sent(_) => &self.sent,
            SendOutcome::DroppedUnresolved => &self.dropped_unresolved,
            SendOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SenderSnapshot {
        SenderSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            dropped_unresolved: self.dropped_unresolved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for SenderStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`SenderStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SenderSnapshot {
    pub sent: u32,
    pub dropped_unresolved: u32,
    pub failed: u32,
}

/// Sender task.
pub struct Sender {
    queue: Arc<RecordQueue>,
    link: Arc<LinkState>,
    collector: CollectorConfig,
    receive_timeout: Duration,
    policy: UnknownAddressPolicy,
    stats: Arc<SenderStats>,
}

impl Sender {
    pub fn new(config: &BridgeConfig, queue: Arc<RecordQueue>, link: Arc<LinkState>) -> Self {
        Self {
            queue,
            link,
            collector: config.collector.clone(),
            receive_timeout: config.receive_timeout,
            policy: config.unknown_address,
            stats: Arc::new(SenderStats::new()),
        }
    }

    /// Shared handle to the sender counters.
    pub fn stats(&self) -> Arc<SenderStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for a record and send it.
    pub fn step(&self) -> SendOutcome {
        let record = self.queue.take_next();
        self.send(&record)
    }

    /// Send one already dequeued record.
    pub fn send(&self, record: &EncodedRecord) -> SendOutcome {
        let outcome = match self.destination() {
            Some(address) => self.post(address, record),
            None => SendOutcome::DroppedUnresolved,
        };
        self.stats.record(&outcome);
        outcome
    }

    /// Current collector address, applying the unknown-address policy.
    fn destination(&self) -> Option<ResolvedAddress> {
        if let Some(address) = self.link.resolved_address() {
            return Some(address);
        }

        error!("IP address not resolved yet");
        self.link.request_resolve();

        match self.policy {
            UnknownAddressPolicy::Drop => None,
            UnknownAddressPolicy::Hold { max_wait } => {
                let address = self.link.wait_resolved(max_wait);
                if address.is_none() {
                    warn!("no address after {:?}, record dropped", max_wait);
                }
                address
            }
        }
    }

    fn post(&self, address: ResolvedAddress, record: &EncodedRecord) -> SendOutcome {
        info!("Sending data via HTTP");
        let request = http::build_request(&self.collector, record.as_bytes());

        match http::post(address.socket_addr(), &request, self.receive_timeout) {
            Ok(report) => {
                info!("Sent data via HTTP");
                SendOutcome::Sent(report)
            }
            Err(e) => {
                error!("{}", e);
                SendOutcome::Failed
            }
        }
    }

    /// Sender loop. Never returns.
    pub fn run(self) -> ! {
        loop {
            self.step();
        }
    }

    /// Run the sender loop on its own thread.
    pub fn spawn(self, stack_size: usize) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("http_post".into())
            .stack_size(stack_size)
            .spawn(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{encode_frame, Frame};

    #[test]
    fn test_unresolved_drop_requests_resolution() {
        let queue = Arc::new(RecordQueue::new(256));
        let link = Arc::new(LinkState::new());
        let sender = Sender::new(&BridgeConfig::default(), Arc::clone(&queue), Arc::clone(&link));

        queue.publish(&encode_frame(Frame::from(&[0x01][..]), 1)).unwrap();
        assert_eq!(sender.step(), SendOutcome::DroppedUnresolved);

        assert!(queue.is_empty(), "dropped record is not re-queued");
        assert!(link.resolve_requested());
        assert_eq!(sender.stats().snapshot().dropped_unresolved, 1);
    }

    #[test]
    fn test_hold_policy_gives_up_after_max_wait() {
        let mut config = BridgeConfig::default();
        config.unknown_address = UnknownAddressPolicy::Hold {
            max_wait: Duration::from_millis(20),
        };
        let queue = Arc::new(RecordQueue::new(256));
        let link = Arc::new(LinkState::new());
        let sender = Sender::new(&config, queue, Arc::clone(&link));

        let record = encode_frame(Frame::from(&[0x01][..]), 1);
        assert_eq!(sender.send(&record), SendOutcome::DroppedUnresolved);
        assert!(link.resolve_requested());
    }
}
