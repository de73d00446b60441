// Platform contract consumed by the pulse scheduler
//
// Output lines are plain embedded-hal stateful pins. Lines are active-low, as
// wired on the controller board: LOW while a joint's pulse is asserted, HIGH
// when idle.

pub use embedded_hal::digital::{ErrorType, OutputPin, StatefulOutputPin};

/// Countdown timer with auto-reload and an expiry interrupt
///
/// The reload value is the number of ticks until the next expiry. Programming
/// it from inside an expiry handler sets the length of the interval that
/// starts at that expiry.
pub trait CountdownTimer {
    fn set_reload(&mut self, ticks: u16);

    fn reload(&self) -> u16;

    /// Unmask the expiry interrupt (global and timer enable)
    fn enable_interrupt(&mut self);

    fn start(&mut self);

    fn is_running(&self) -> bool;
}

/// Encode an interval for a count-up timer that interrupts on overflow
pub fn reload_register(ticks: u16) -> u16 {
    ticks.wrapping_neg()
}

/// Inverse of [`reload_register`]
pub fn interval_from_register(raw: u16) -> u16 {
    raw.wrapping_neg()
}
