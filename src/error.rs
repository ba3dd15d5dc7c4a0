//! Error types for the telemetry bridge.
//!
//! Nothing in the core is fatal: every error ends up in the diagnostic log
//! at a task boundary and the task carries on.

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Name resolution failed or returned no usable address.
    #[error("DNS lookup of {host}:{port} failed: {reason}")]
    Resolve {
        host: String,
        port: u16,
        reason: String,
    },

    /// Stream connection to the collector could not be opened.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Writing the request failed part way.
    #[error("socket write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Receive timeout could not be configured.
    #[error("failed to set socket receiving timeout: {0}")]
    SocketOption(#[source] std::io::Error),

    /// Record can never fit into the queue.
    #[error("record of {len} bytes exceeds queue capacity of {capacity} bytes")]
    RecordTooLarge { len: usize, capacity: usize },

    /// Peripheral read failed.
    #[error("peripheral error: {0}")]
    Peripheral(String),

    /// Configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Platform bring-up error (driver install, Wi-Fi, event loop).
    #[error("platform error: {0}")]
    Platform(String),

    /// ESP-IDF call failed.
    #[cfg(target_os = "espidf")]
    #[error("ESP-IDF error: {0}")]
    Esp(#[from] esp_idf_svc::sys::EspError),
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
