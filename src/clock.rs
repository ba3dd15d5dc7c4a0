//! Monotonic time since boot.
//!
//! On the device this is the ESP high-resolution timer; on the host it is
//! an `Instant` captured the first time the clock is read.

/// Microseconds since boot.
#[cfg(target_os = "espidf")]
#[inline]
pub fn timestamp_us() -> i64 {
    // SAFETY: esp_timer_get_time has no preconditions
    unsafe { esp_idf_svc::sys::esp_timer_get_time() }
}

/// Microseconds since the first call.
#[cfg(not(target_os = "espidf"))]
#[inline]
pub fn timestamp_us() -> i64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static BOOT: OnceLock<Instant> = OnceLock::new();
    let boot = BOOT.get_or_init(Instant::now);
    i64::try_from(boot.elapsed().as_micros()).unwrap_or(i64::MAX)
}

/// Millisecond tick count used to stamp records.
#[inline]
pub fn uptime_ms() -> u64 {
    (timestamp_us() / 1000).max(0) as u64
}
