//! Module: config
//!
//! Purpose: Build-time configuration for the telemetry bridge.
//!
//! Architecture:
//! - Collector endpoint, token and network credentials are baked in at build
//!   time from `BRIDGE_*` environment variables (see build.rs), falling back
//!   to the defaults below.
//! - Timing constants of the pipeline live here so tests can shrink them.
//! - `BridgeConfig::validate()` is called once at startup.

use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::record;

/// Inter-byte gap that terminates a frame.
pub const IDLE_GAP: Duration = Duration::from_millis(15);

/// Peripheral poll interval while no frame is in progress.
pub const IDLE_POLL: Duration = Duration::from_millis(1000);

/// Default record queue capacity in bytes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Delay between failed name resolution attempts.
pub const RESOLVE_BACKOFF: Duration = Duration::from_millis(1000);

/// Receive timeout of a single POST transaction.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

const fn env_or(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => default,
    }
}

/// Collector host name.
pub const COLLECTOR_HOST: &str = env_or(option_env!("BRIDGE_COLLECTOR_HOST"), "logger.local");

/// Collector TCP port (decimal).
pub const COLLECTOR_PORT: &str = env_or(option_env!("BRIDGE_COLLECTOR_PORT"), "8000");

/// Request path on the collector.
pub const COLLECTOR_PATH: &str = env_or(option_env!("BRIDGE_COLLECTOR_PATH"), "/");

/// Access token appended to the request path.
pub const COLLECTOR_TOKEN: &str = env_or(
    option_env!("BRIDGE_TOKEN"),
    "574c9800-ac34-4e07-ae2f-391fef828c41",
);

/// Wi-Fi station SSID.
pub const WIFI_SSID: &str = env_or(option_env!("BRIDGE_WIFI_SSID"), "");

/// Wi-Fi station password.
pub const WIFI_PASSWORD: &str = env_or(option_env!("BRIDGE_WIFI_PASSWORD"), "");

/// Hostname announced by the station interface.
pub const DEVICE_HOSTNAME: &str = env_or(option_env!("BRIDGE_HOSTNAME"), "uart-bridge");

#[cfg(target_os = "espidf")]
const DEVICE_KIND: &str = "esp32";
#[cfg(not(target_os = "espidf"))]
const DEVICE_KIND: &str = "host";

/// What the sender does with a dequeued record while the collector address
/// is still unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnknownAddressPolicy {
    /// Request resolution and drop the record.
    Drop,
    /// Request resolution, keep the record and wait up to `max_wait` for the
    /// address before dropping it.
    Hold { max_wait: Duration },
}

impl Default for UnknownAddressPolicy {
    fn default() -> Self {
        UnknownAddressPolicy::Drop
    }
}

/// Where and how records are posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub token: String,
    pub user_agent: String,
}

impl CollectorConfig {
    /// Request target: path plus token query.
    pub fn request_target(&self) -> String {
        format!("{}?token={}", self.path, self.token)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            host: COLLECTOR_HOST.to_string(),
            port: COLLECTOR_PORT.parse().unwrap_or(8000),
            path: COLLECTOR_PATH.to_string(),
            token: COLLECTOR_TOKEN.to_string(),
            user_agent: format!("{} {}", env!("VERSION_STRING"), DEVICE_KIND),
        }
    }
}

/// Idle-gap framer timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramerConfig {
    /// Gap that ends a frame.
    pub idle_gap: Duration,
    /// Poll timeout while idle.
    pub idle_poll: Duration,
    /// Payload length at which a frame is flushed early.
    pub max_frame_len: usize,
}

impl FramerConfig {
    /// Framer settings whose longest frame encodes to at most a quarter of
    /// `queue_capacity` bytes.
    pub fn for_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            idle_gap: IDLE_GAP,
            idle_poll: IDLE_POLL,
            max_frame_len: record::max_payload_for(queue_capacity / 4).max(1),
        }
    }
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self::for_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Serial peripheral settings (8N1, no flow control).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UartConfig {
    pub baud_rate: u32,
    /// Invert both RX and TX lines.
    pub invert_lines: bool,
    /// Driver receive buffer in bytes.
    pub rx_buffer_size: usize,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            invert_lines: true,
            rx_buffer_size: 2048,
        }
    }
}

/// Wi-Fi station credentials and identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
    pub hostname: String,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: WIFI_SSID.to_string(),
            password: WIFI_PASSWORD.to_string(),
            hostname: DEVICE_HOSTNAME.to_string(),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub collector: CollectorConfig,
    pub framer: FramerConfig,
    /// Record queue capacity in bytes.
    pub queue_capacity: usize,
    pub resolve_backoff: Duration,
    pub receive_timeout: Duration,
    /// Pick the first IPv4 address when a lookup returns several families.
    pub prefer_ipv4: bool,
    pub unknown_address: UnknownAddressPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            framer: FramerConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            resolve_backoff: RESOLVE_BACKOFF,
            receive_timeout: RECEIVE_TIMEOUT,
            prefer_ipv4: true,
            unknown_address: UnknownAddressPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Check that the settings can work together.
    pub fn validate(&self) -> Result<()> {
        if self.collector.host.is_empty() {
            return Err(BridgeError::Config("collector host is empty".into()));
        }
        if self.collector.port == 0 {
            return Err(BridgeError::Config("collector port is 0".into()));
        }
        if self.framer.max_frame_len == 0 {
            return Err(BridgeError::Config("max frame length is 0".into()));
        }
        if self.framer.idle_gap.is_zero() || self.receive_timeout.is_zero() {
            return Err(BridgeError::Config("idle gap and receive timeout must be non-zero".into()));
        }
        let worst = record::max_encoded_len(self.framer.max_frame_len);
        if worst > self.queue_capacity {
            return Err(BridgeError::Config(format!(
                "frames of {} bytes encode to {} bytes, queue holds {}",
                self.framer.max_frame_len, worst, self.queue_capacity
            )));
        }
        Ok(())
    }
}
