//! # UartTelemetryBridge
//!
//! Serial-to-HTTP telemetry bridge for small devices.
//!
//! ## Architecture
//!
//! Bytes from a serial peripheral are cut into frames at idle gaps, stamped
//! and hex-encoded, buffered in a bounded record queue and posted one by one
//! to a collector:
//! - The framer blocks when the queue is full (backpressure, never drops)
//! - The sender drops a record it cannot deliver (best-effort telemetry)
//! - Link state gates address resolution; every task runs forever
//!
//! Platform bring-up (UART driver, Wi-Fi, status LEDs) lives in [`platform`].

pub mod bridge;
pub mod clock;
pub mod config;
pub mod error;
pub mod framer;
pub mod http;
pub mod link;
pub mod logging;
pub mod platform;
pub mod queue;
pub mod record;
pub mod resolver;
pub mod sender;
pub mod status;

#[cfg(not(target_os = "espidf"))]
pub mod collector;

pub use bridge::{Bridge, BridgeHandles};
pub use config::{BridgeConfig, UnknownAddressPolicy};
pub use error::{BridgeError, Result};
pub use framer::{ByteSource, Framer, FramerState};
pub use link::{LinkState, ResolvedAddress};
pub use queue::RecordQueue;
pub use record::{EncodedRecord, Frame, LogRecord};
pub use resolver::{AddressResolver, NameResolver, SystemResolver};
pub use sender::{SendOutcome, Sender};
