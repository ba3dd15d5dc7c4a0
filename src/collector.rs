//! Host-side collector for bridge telemetry.
//!
//! Accepts `POST /?token=<token>` HTTP/1.0 requests and appends every body
//! line to a daily log file:
//!
//! ```text
//! logfile.2026-10-19.txt
//! 2026-10-19T18.21.07  |123456, 010203
//! ```
//!
//! Requests without a token get 404, anything but `POST /` gets 404/405.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::error::{BridgeError, Result};

/// Largest accepted header block.
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Largest accepted body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Per-connection read timeout.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub token: Option<String>,
    pub body: Vec<u8>,
}

fn bad_request(msg: impl Into<String>) -> BridgeError {
    BridgeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into()))
}

/// Read one line, consuming at most `budget` bytes.
///
/// A line that does not end within the budget is rejected.
fn read_header_line(reader: &mut impl BufRead, line: &mut String, budget: usize) -> Result<usize> {
    line.clear();
    let n = reader.by_ref().take(budget as u64).read_line(line)?;
    if n == budget && !line.ends_with('\n') {
        return Err(bad_request("header block too large"));
    }
    Ok(n)
}

/// Read one request: request line, headers, `Content-Length` body.
///
/// The request line and headers together may not exceed
/// `MAX_HEADER_BYTES`, and the limit holds while reading.
pub fn read_request(reader: &mut impl BufRead) -> Result<Request> {
    let mut line = String::new();

    let mut header_bytes = read_header_line(reader, &mut line, MAX_HEADER_BYTES)?;
    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or_else(|| bad_request("empty request line"))?.to_string();
    let target = parts.next().ok_or_else(|| bad_request("missing request target"))?.to_string();

    let mut content_length = 0usize;
    loop {
        let n = read_header_line(reader, &mut line, MAX_HEADER_BYTES - header_bytes)?;
        if n == 0 {
            return Err(bad_request("connection closed inside headers"));
        }
        header_bytes += n;

        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| bad_request("invalid Content-Length"))?;
            }
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(bad_request("body too large"));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query)),
        None => (target.clone(), None),
    };
    let token = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == "token" && !value.is_empty())
        .map(|(_, value)| value.to_string());

    Ok(Request {
        method,
        path,
        token,
        body,
    })
}

/// Daily log file inside `dir`.
pub fn log_file_path(dir: &Path, now: &DateTime<Local>) -> PathBuf {
    dir.join(format!("logfile.{}.txt", now.format("%Y-%m-%d")))
}

/// Append every body line, prefixed with `now`, to the daily log file.
pub fn append_lines(dir: &Path, now: &DateTime<Local>, body: &str) -> Result<PathBuf> {
    let path = log_file_path(dir, now);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

    let ts = now.format("%Y-%m-%dT%H.%M.%S");
    for line in body.lines() {
        writeln!(file, "{}  |{}", ts, line.trim())?;
    }
    file.flush()?;
    Ok(path)
}

/// Status code the collector answers `request` with.
pub fn status_for(request: &Request) -> u16 {
    if request.path != "/" {
        404
    } else if request.method != "POST" {
        405
    } else if request.token.is_none() {
        404
    } else {
        201
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

/// Serve one connection. Returns the status sent.
pub fn handle_connection(stream: TcpStream, dir: &Path) -> Result<u16> {
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    let status = match read_request(&mut reader) {
        Ok(request) => {
            let mut status = status_for(&request);
            if status == 201 {
                let body = String::from_utf8_lossy(&request.body);
                if let Err(e) = append_lines(dir, &Local::now(), &body) {
                    warn!("failed to store log lines: {}", e);
                    status = 500;
                }
            }
            status
        }
        Err(e) => {
            warn!("bad request: {}", e);
            400
        }
    };

    write!(
        writer,
        "HTTP/1.0 {} {}\r\nContent-Length: 0\r\n\r\n",
        status,
        reason(status)
    )?;
    writer.flush()?;
    Ok(status)
}

/// Accept connections forever, one at a time.
pub fn serve(listener: TcpListener, dir: &Path) -> ! {
    if let Ok(addr) = listener.local_addr() {
        info!("collector listening on {}, writing to {}", addr, dir.display());
    }

    loop {
        match listener.accept() {
            Ok((stream, peer)) => match handle_connection(stream, dir) {
                Ok(status) => info!("{} -> {}", peer, status),
                Err(e) => warn!("{}: {}", peer, e),
            },
            Err(e) => warn!("accept failed: {}", e),
        }
    }
}
