//! Host collaborators: a serial port through the `serialport` crate.

use std::io::{ErrorKind, Read};
use std::time::Duration;

use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{BridgeError, Result};
use crate::framer::ByteSource;

/// Serial port byte source.
pub struct SerialSource {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialSource {
    /// Open a serial port, 8N1 without flow control.
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Baud rate (e.g., 9600)
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let timeout = Duration::from_millis(1000);
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| BridgeError::Peripheral(format!("{}: {}", path, e)))?;

        info!("Opened serial port: {} at {} baud", path, baud_rate);
        Ok(Self { port, timeout })
    }
}

impl ByteSource for SerialSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if timeout != self.timeout {
            self.port
                .set_timeout(timeout)
                .map_err(|e| BridgeError::Peripheral(e.to_string()))?;
            self.timeout = timeout;
        }

        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(BridgeError::Peripheral(e.to_string())),
        }
    }
}
