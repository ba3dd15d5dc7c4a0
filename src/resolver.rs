//! Background resolution of the collector address.
//!
//! The resolver sleeps until the link is up and someone asked for an
//! address, then looks the collector up. Failures are retried after a
//! fixed backoff for as long as the link stays up and the request is
//! pending; a link drop suspends it until the link comes back.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::link::{LinkState, ResolvedAddress};

/// Host name lookup backend.
pub trait NameResolver: Send + 'static {
    fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Platform resolver (`getaddrinfo`, lwIP on the device).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

impl NameResolver for SystemResolver {
    fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok((host, port).to_socket_addrs()?.collect())
    }
}

/// Pick the address to use from a lookup result.
pub fn select_address(addrs: &[SocketAddr], prefer_ipv4: bool) -> Option<SocketAddr> {
    if prefer_ipv4 {
        if let Some(v4) = addrs.iter().find(|a| a.is_ipv4()) {
            return Some(*v4);
        }
    }
    addrs.first().copied()
}

/// Address resolver task.
pub struct AddressResolver<R: NameResolver = SystemResolver> {
    backend: R,
    link: Arc<LinkState>,
    host: String,
    port: u16,
    backoff: Duration,
    prefer_ipv4: bool,
}

impl<R: NameResolver> AddressResolver<R> {
    pub fn new(config: &BridgeConfig, link: Arc<LinkState>, backend: R) -> Self {
        Self {
            backend,
            link,
            host: config.collector.host.clone(),
            port: config.collector.port,
            backoff: config.resolve_backoff,
            prefer_ipv4: config.prefer_ipv4,
        }
    }

    /// One lookup of the configured host, without touching link state.
    pub fn resolve_once(&self) -> Result<ResolvedAddress> {
        let addrs = self
            .backend
            .lookup(&self.host, self.port)
            .map_err(|e| BridgeError::Resolve {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            })?;

        select_address(&addrs, self.prefer_ipv4)
            .map(ResolvedAddress::new)
            .ok_or_else(|| BridgeError::Resolve {
                host: self.host.clone(),
                port: self.port,
                reason: "no addresses returned".into(),
            })
    }

    /// Wait for work, make one attempt and back off if it failed.
    ///
    /// Returns whether the attempt succeeded.
    pub fn run_cycle(&self) -> bool {
        self.link.wait_for_resolve_work();
        debug!("resolving {}:{}", self.host, self.port);

        match self.resolve_once() {
            Ok(address) => {
                info!("DNS lookup succeeded. IP={}", address);
                self.link.complete_resolve(address);
                true
            }
            Err(e) => {
                error!("{}", e);
                self.link.resolve_failed();
                if !self.link.wait_backoff(self.backoff) {
                    warn!("link down, resolution suspended");
                }
                false
            }
        }
    }

    /// Resolver loop. Never returns.
    pub fn run(self) -> ! {
        loop {
            self.run_cycle();
        }
    }

    /// Run the resolver loop on its own thread.
    pub fn spawn(self, stack_size: usize) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("resolve_ip".into())
            .stack_size(stack_size)
            .spawn(move || self.run())
    }
}
