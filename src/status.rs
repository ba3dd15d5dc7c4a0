//! Status indicator driven by link state.
//!
//! Power lamp steady on; the blink pair toggles every second while the
//! station is connected and four times a second while it is not.

use std::time::Duration;

use crate::error::Result;

/// Blink half-period while connected.
pub const BLINK_CONNECTED: Duration = Duration::from_millis(1000);

/// Blink half-period while disconnected.
pub const BLINK_DISCONNECTED: Duration = Duration::from_millis(250);

/// Indicator outputs (LEDs on the device).
pub trait IndicatorOutput {
    /// Steady "powered" lamp.
    fn set_power(&mut self, on: bool) -> Result<()>;
    /// Both blinking lamps.
    fn set_blink(&mut self, on: bool) -> Result<()>;
}

#[inline]
pub fn blink_period(connected: bool) -> Duration {
    if connected {
        BLINK_CONNECTED
    } else {
        BLINK_DISCONNECTED
    }
}

/// Blink state machine over an [`IndicatorOutput`].
pub struct StatusIndicator<O: IndicatorOutput> {
    output: O,
    level: bool,
}

impl<O: IndicatorOutput> StatusIndicator<O> {
    /// Switch the power lamp on; blinking starts with the lamps off.
    pub fn new(mut output: O) -> Result<Self> {
        output.set_power(true)?;
        Ok(Self {
            output,
            level: false,
        })
    }

    /// Drive the blink lamps and toggle. Returns how long to wait before
    /// the next tick.
    pub fn tick(&mut self, connected: bool) -> Result<Duration> {
        self.output.set_blink(self.level)?;
        self.level = !self.level;
        Ok(blink_period(connected))
    }
}
