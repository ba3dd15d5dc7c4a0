//! Single-shot HTTP/1.0 POST.
//!
//! One connect, one request write, drain the response, close. No retry and
//! no connection reuse; the response is never parsed.
//!
//! ```text
//! POST /?token=... HTTP/1.0\r\n
//! Host: <host>:<port>\r\n
//! User-Agent: <agent>\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <body>
//! ```

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use log::debug;

use crate::config::CollectorConfig;
use crate::error::{BridgeError, Result};

/// Response read chunk size.
const RECV_CHUNK: usize = 64;

/// Render the complete request for `body`.
///
/// `Content-Length` is always the exact byte length of `body`.
pub fn build_request(collector: &CollectorConfig, body: &[u8]) -> Vec<u8> {
    let head = format!(
        "POST {} HTTP/1.0\r\nHost: {}:{}\r\nUser-Agent: {}\r\nContent-Length: {}\r\n\r\n",
        collector.request_target(),
        collector.host,
        collector.port,
        collector.user_agent,
        body.len()
    );

    let mut request = Vec::with_capacity(head.len() + body.len());
    request.extend_from_slice(head.as_bytes());
    request.extend_from_slice(body);
    request
}

/// What happened during a completed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionReport {
    /// Request bytes written.
    pub request_bytes: usize,
    /// Response bytes read and discarded.
    pub response_bytes: usize,
    /// Draining stopped at the receive timeout instead of a close.
    pub timed_out: bool,
}

/// Connect to `addr`, write `request`, drain the response and close.
///
/// The connection is closed on every path (the stream is dropped).
pub fn post(addr: SocketAddr, request: &[u8], receive_timeout: Duration) -> Result<TransactionReport> {
    let mut stream = TcpStream::connect_timeout(&addr, receive_timeout)
        .map_err(|source| BridgeError::Connect { addr, source })?;

    stream.write_all(request).map_err(BridgeError::Write)?;
    stream.flush().map_err(BridgeError::Write)?;

    stream
        .set_read_timeout(Some(receive_timeout))
        .map_err(BridgeError::SocketOption)?;

    let (response_bytes, timed_out) = drain(&mut stream, receive_timeout);
    debug!(
        "{}: {} bytes sent, {} bytes received{}",
        addr,
        request.len(),
        response_bytes,
        if timed_out { " (timed out)" } else { "" }
    );

    Ok(TransactionReport {
        request_bytes: request.len(),
        response_bytes,
        timed_out,
    })
}

/// Read and discard until close, error or `limit` has elapsed.
fn drain(stream: &mut impl Read, limit: Duration) -> (usize, bool) {
    let start = Instant::now();
    let mut buf = [0u8; RECV_CHUNK];
    let mut total = 0;

    loop {
        match stream.read(&mut buf) {
            Ok(0) => return (total, false),
            Ok(n) => {
                total += n;
                if start.elapsed() >= limit {
                    return (total, true);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return (total, true)
            }
            Err(e) => {
                debug!("response read ended: {}", e);
                return (total, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> CollectorConfig {
        CollectorConfig {
            host: "logger.local".into(),
            port: 8000,
            path: "/".into(),
            token: "tok".into(),
            user_agent: "uart-bridge/0.1.0 host".into(),
        }
    }

    #[test]
    fn test_request_layout() {
        let request = build_request(&collector(), b"1234, 010203");
        let text = String::from_utf8(request).unwrap();
        assert_eq!(
            text,
            "POST /?token=tok HTTP/1.0\r\n\
             Host: logger.local:8000\r\n\
             User-Agent: uart-bridge/0.1.0 host\r\n\
             Content-Length: 12\r\n\
             \r\n\
             1234, 010203"
        );
    }

    #[test]
    fn test_content_length_is_body_length() {
        for len in [0usize, 1, 9, 10, 255, 1000] {
            let body = vec![b'A'; len];
            let request = build_request(&collector(), &body);
            let text = String::from_utf8(request).unwrap();
            let (head, tail) = text.split_once("\r\n\r\n").unwrap();
            let declared: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("Content-Length: "))
                .unwrap()
                .parse()
                .unwrap();
            assert_eq!(declared, len);
            assert_eq!(tail.len(), len);
        }
    }

    #[test]
    fn test_drain_reads_until_close() {
        let mut response: &[u8] = b"HTTP/1.0 201 CREATED\r\n\r\n";
        let (n, timed_out) = drain(&mut response, Duration::from_secs(1));
        assert_eq!(n, 24);
        assert!(!timed_out);
    }
}
