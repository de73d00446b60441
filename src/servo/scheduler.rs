// Software PWM for three servos on one countdown timer
//
// Every expiry runs `on_expiry`, which reads the line levels to find the
// current phase, moves the pulse on to the next joint and programs the length
// of the next interval:
//
//   lines at entry       action                        next interval
//   all idle             base on                       base width
//   base asserted        base off, mid on              mid width
//   mid asserted         mid off, tip on               tip width
//   tip asserted         all idle                      filler
//
// The filler pads the cycle so that one full period always takes
// `limits.period` ticks whatever the three widths are.

use std::sync::Arc;

use tracing::trace;

use super::table::{Joint, PulseTable};
use crate::hal::{CountdownTimer, StatefulOutputPin};
use crate::messages::JointTicks;

/// Machine cycles spent on one line-level test at interrupt entry
pub const LEVEL_TEST_CYCLES: u16 = 2;

/// Machine cycles of one phase-transition correction unit
pub const BRANCH_DELAY_CYCLES: u16 = 2;

/// Phase of the cycle, as observed from the line levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Base,
    Mid,
    Tip,
}

impl Phase {
    /// Decode the phase from which lines are asserted. Tests run in joint
    /// order and the first asserted line wins.
    pub fn observe(base: bool, mid: bool, tip: bool) -> Self {
        if base {
            Phase::Base
        } else if mid {
            Phase::Mid
        } else if tip {
            Phase::Tip
        } else {
            Phase::Idle
        }
    }

    pub fn next(self) -> Self {
        match self {
            Phase::Idle => Phase::Base,
            Phase::Base => Phase::Mid,
            Phase::Mid => Phase::Tip,
            Phase::Tip => Phase::Idle,
        }
    }

    /// Level tests executed before this phase's branch is taken
    pub fn level_tests(self) -> u16 {
        match self {
            Phase::Base => 1,
            Phase::Mid => 2,
            Phase::Tip | Phase::Idle => 3,
        }
    }

    /// Phase-transition correction units inserted before the toggle, so that
    /// earlier branches toggle as late as the last one
    pub fn correction_units(self) -> u16 {
        match self {
            Phase::Base => 2,
            Phase::Mid => 1,
            Phase::Tip | Phase::Idle => 0,
        }
    }

    /// Cycles from timer expiry to the line toggle
    pub fn toggle_latency(self) -> u16 {
        self.level_tests() * LEVEL_TEST_CYCLES + self.correction_units() * BRANCH_DELAY_CYCLES
    }
}

/// Interrupt-side state: the three lines, the timer and the table reader
pub struct PulseScheduler<P, T> {
    lines: [P; 3],
    timer: T,
    table: Arc<PulseTable>,
    latched: [u16; 3],
    expiries: u64,
}

impl<P, T> PulseScheduler<P, T>
where
    P: StatefulOutputPin,
    T: CountdownTimer,
{
    /// Take ownership of the lines ([base, mid, tip]) and timer, and drive
    /// every line to idle. The timer is not started here.
    pub fn new(mut lines: [P; 3], timer: T, table: Arc<PulseTable>) -> Result<Self, P::Error> {
        for line in &mut lines {
            line.set_high()?;
        }
        let latched = table.snapshot().as_array();
        Ok(Self {
            lines,
            timer,
            table,
            latched,
            expiries: 0,
        })
    }

    /// Program the first interval from the base width and start the timer
    pub(crate) fn start(&mut self) {
        self.timer.set_reload(self.table.get(Joint::Base));
        self.timer.enable_interrupt();
        self.timer.start();
    }

    /// Timer expiry handler
    pub fn on_expiry(&mut self) -> Result<Phase, P::Error> {
        let phase = Phase::observe(
            self.line(Joint::Base).is_set_low()?,
            self.line(Joint::Mid).is_set_low()?,
            self.line(Joint::Tip).is_set_low()?,
        );

        let reload = match phase {
            Phase::Idle => {
                self.line(Joint::Base).set_low()?;
                self.latch(Joint::Base)
            }
            Phase::Base => {
                self.line(Joint::Base).set_high()?;
                self.line(Joint::Mid).set_low()?;
                self.latch(Joint::Mid)
            }
            Phase::Mid => {
                self.line(Joint::Mid).set_high()?;
                self.line(Joint::Tip).set_low()?;
                self.latch(Joint::Tip)
            }
            Phase::Tip => {
                // Reset all lines in case one was altered outside the cycle
                for line in &mut self.lines {
                    line.set_high()?;
                }
                self.filler()
            }
        };

        self.timer.set_reload(reload);
        self.expiries += 1;
        trace!(
            "Expiry {}: {:?} phase, next interval {} ticks",
            self.expiries, phase, reload
        );
        Ok(phase)
    }

    /// Remaining ticks of the period after the three latched pulses
    pub fn filler(&self) -> u16 {
        let active: u16 = self.latched.iter().sum();
        self.table.limits().period.saturating_sub(active)
    }

    /// Widths used for the pulses of the current cycle
    pub fn latched(&self) -> JointTicks {
        JointTicks::new(self.latched[0], self.latched[1], self.latched[2])
    }

    pub fn expiries(&self) -> u64 {
        self.expiries
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub(crate) fn line(&mut self, joint: Joint) -> &mut P {
        &mut self.lines[joint.index()]
    }

    pub fn table(&self) -> &Arc<PulseTable> {
        &self.table
    }

    fn latch(&mut self, joint: Joint) -> u16 {
        let ticks = self.table.get(joint);
        self.latched[joint.index()] = ticks;
        ticks
    }
}
