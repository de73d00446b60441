// Shared pulse-width table
//
// Written from the foreground (solver or direct override), read from the
// timer interrupt. Each entry is a single atomic so a reader never sees a torn
// value; the three entries are not updated as one unit.

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Result, ServoError};
use crate::config::ArmConfig;
use crate::messages::JointTicks;

/// Servo channels, in the order the scheduler pulses them
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Base = 0,
    Mid = 1,
    Tip = 2,
}

impl Joint {
    pub const ALL: [Joint; 3] = [Joint::Base, Joint::Mid, Joint::Tip];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Joint {
    type Error = ServoError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Joint::Base),
            1 => Ok(Joint::Mid),
            2 => Ok(Joint::Tip),
            other => Err(ServoError::UnknownJoint(other)),
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Joint::Base => "base",
            Joint::Mid => "mid",
            Joint::Tip => "tip",
        };
        f.write_str(name)
    }
}

/// Tick values derived from an [`ArmConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickLimits {
    pub min: u16,
    pub max: u16,
    pub mid: u16,
    pub period: u16,
    /// Unrounded endpoints used for angle interpolation
    pub min_exact: f32,
    pub max_exact: f32,
}

impl TickLimits {
    /// Derive limits from a validated config
    pub fn from_config(config: &ArmConfig) -> Self {
        let min_us = f64::from(config.min_pulse_us);
        let max_us = f64::from(config.max_pulse_us);
        Self {
            min: config.us_to_ticks(min_us) as u16,
            max: config.us_to_ticks(max_us) as u16,
            mid: config.us_to_ticks((min_us + max_us) / 2.0) as u16,
            period: config.us_to_ticks(1e6 / f64::from(config.refresh_hz)) as u16,
            min_exact: (min_us * config.ticks_per_us()) as f32,
            max_exact: (max_us * config.ticks_per_us()) as f32,
        }
    }

    pub fn contains(&self, ticks: i32) -> bool {
        (i32::from(self.min)..=i32::from(self.max)).contains(&ticks)
    }

    /// Validate a tick count for `joint`
    pub fn check(&self, joint: Joint, ticks: i32) -> Result<u16> {
        if self.contains(ticks) {
            Ok(ticks as u16)
        } else {
            Err(ServoError::OutOfRange {
                joint,
                ticks,
                min: self.min,
                max: self.max,
            })
        }
    }

    /// Home configuration: links centered, tip up
    pub fn home(&self) -> JointTicks {
        JointTicks::new(self.mid, self.mid, self.min)
    }
}

/// Pulse widths for the three joints, always within `limits`
pub struct PulseTable {
    ticks: [AtomicU16; 3],
    limits: TickLimits,
}

impl PulseTable {
    pub fn new(limits: TickLimits) -> Self {
        let home = limits.home();
        Self {
            ticks: home.as_array().map(AtomicU16::new),
            limits,
        }
    }

    pub fn limits(&self) -> &TickLimits {
        &self.limits
    }

    /// Store a pulse width; out-of-range values leave the entry untouched
    pub fn set(&self, joint: Joint, ticks: u16) -> Result<()> {
        match self.limits.check(joint, i32::from(ticks)) {
            Ok(ticks) => {
                debug!("Pulse width {} -> {} ticks", joint, ticks);
                self.ticks[joint.index()].store(ticks, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                warn!("Rejected pulse width: {}", e);
                Err(e)
            }
        }
    }

    pub fn get(&self, joint: Joint) -> u16 {
        self.ticks[joint.index()].load(Ordering::Acquire)
    }

    /// Read all three entries (not atomic as a group)
    pub fn snapshot(&self) -> JointTicks {
        JointTicks::new(
            self.get(Joint::Base),
            self.get(Joint::Mid),
            self.get(Joint::Tip),
        )
    }
}

impl fmt::Debug for PulseTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseTable")
            .field("ticks", &self.snapshot())
            .field("limits", &self.limits)
            .finish()
    }
}
