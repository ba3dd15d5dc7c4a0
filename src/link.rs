//! Link state and address resolution coordination.
//!
//! One [`LinkState`] is created at startup and shared (`Arc`) between the
//! link-event source, the address resolver and the sender.
//!
//! # Writers
//!
//! - `connected`: link-event source only (`link_up` / `link_down`)
//! - resolution requests: sender and startup (`request_resolve`)
//! - resolution progress and result: address resolver only
//!
//! Every field sits behind one mutex; every change wakes all waiters.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Address family of a resolved address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

/// Collector address produced by a successful lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedAddress {
    addr: SocketAddr,
}

impl ResolvedAddress {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn family(&self) -> AddressFamily {
        match self.addr {
            SocketAddr::V4(_) => AddressFamily::Ipv4,
            SocketAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Raw address bytes (4 or 16).
    pub fn octets(&self) -> Vec<u8> {
        match self.addr.ip() {
            IpAddr::V4(ip) => ip.octets().to_vec(),
            IpAddr::V6(ip) => ip.octets().to_vec(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl From<SocketAddr> for ResolvedAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Progress of the current resolution request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveState {
    /// Nothing requested.
    Idle,
    /// A resolution is wanted and will start once the link is up.
    Requested,
    /// The resolver is performing a lookup for a pending request.
    Resolving,
}

/// Point-in-time view of the link state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub connected: bool,
    pub resolve: ResolveState,
    pub resolve_requested: bool,
    pub resolve_completed: bool,
    pub address: Option<ResolvedAddress>,
    pub completions: u32,
}

struct Shared {
    connected: bool,
    resolve: ResolveState,
    /// Most recent known-good address; never cleared.
    address: Option<ResolvedAddress>,
    /// Successful resolutions since boot. Non-zero means "completed".
    completions: u32,
}

impl Shared {
    fn resolve_requested(&self) -> bool {
        self.resolve != ResolveState::Idle
    }
}

/// Shared coordination object for link and resolution state.
pub struct LinkState {
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl LinkState {
    /// Link down, nothing requested, address unknown.
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                connected: false,
                resolve: ResolveState::Idle,
                address: None,
                completions: 0,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut Shared)) {
        f(&mut self.lock());
        self.changed.notify_all();
    }

    /// Link-event source: an address has been obtained.
    pub fn link_up(&self) {
        self.update(|s| s.connected = true);
    }

    /// Link-event source: the network attachment was lost.
    pub fn link_down(&self) {
        self.update(|s| s.connected = false);
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Ask the resolver for a (new) lookup. Idempotent while one is pending.
    pub fn request_resolve(&self) {
        self.update(|s| {
            if s.resolve == ResolveState::Idle {
                s.resolve = ResolveState::Requested;
            }
        });
    }

    pub fn resolve_requested(&self) -> bool {
        self.lock().resolve_requested()
    }

    /// Sticky: true once any resolution has succeeded.
    pub fn resolve_completed(&self) -> bool {
        self.lock().completions > 0
    }

    /// Latest resolved address, or `None` while unknown.
    pub fn resolved_address(&self) -> Option<ResolvedAddress> {
        self.lock().address
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        let s = self.lock();
        LinkSnapshot {
            connected: s.connected,
            resolve: s.resolve,
            resolve_requested: s.resolve_requested(),
            resolve_completed: s.completions > 0,
            address: s.address,
            completions: s.completions,
        }
    }

    /// Resolver: block until the link is up and a resolution is pending,
    /// then mark it in progress.
    pub fn wait_for_resolve_work(&self) {
        let guard = self.lock();
        let mut s = self
            .changed
            .wait_while(guard, |s| !(s.connected && s.resolve == ResolveState::Requested))
            .unwrap_or_else(PoisonError::into_inner);
        s.resolve = ResolveState::Resolving;
    }

    /// Resolver: the lookup failed; the request stays pending.
    pub fn resolve_failed(&self) {
        self.update(|s| {
            if s.resolve == ResolveState::Resolving {
                s.resolve = ResolveState::Requested;
            }
        });
    }

    /// Resolver: store a fresh address, clear the request, signal completion.
    pub fn complete_resolve(&self, address: ResolvedAddress) {
        self.update(|s| {
            s.address = Some(address);
            s.resolve = ResolveState::Idle;
            s.completions = s.completions.wrapping_add(1).max(1);
        });
    }

    /// Sleep for `backoff`, returning early if the link goes down.
    ///
    /// Returns whether the link is still up.
    pub fn wait_backoff(&self, backoff: Duration) -> bool {
        let guard = self.lock();
        let (s, _) = self
            .changed
            .wait_timeout_while(guard, backoff, |s| s.connected)
            .unwrap_or_else(PoisonError::into_inner);
        s.connected
    }

    /// Wait up to `timeout` for an address to become known.
    pub fn wait_resolved(&self, timeout: Duration) -> Option<ResolvedAddress> {
        let guard = self.lock();
        let (s, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| s.address.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        s.address
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}
