// Message types exchanged with callers of the servo core

use serde::{Deserialize, Serialize};

use crate::servo::Joint;

// Target point from the mode logic -> kinematics solver
// x, y in centimeters, z = tip down
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: bool,
}

impl Point {
    pub const fn new(x: f32, y: f32, z: bool) -> Self {
        Self { x, y, z }
    }

    /// Squared distance from the base joint
    pub fn radius_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }
}

/// Snapshot of the pulse-width table, in timer ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointTicks {
    pub base: u16,
    pub mid: u16,
    pub tip: u16,
}

impl JointTicks {
    pub fn new(base: u16, mid: u16, tip: u16) -> Self {
        Self { base, mid, tip }
    }

    pub fn get(&self, joint: Joint) -> u16 {
        match joint {
            Joint::Base => self.base,
            Joint::Mid => self.mid,
            Joint::Tip => self.tip,
        }
    }

    /// Returns ticks as array [base, mid, tip]
    pub fn as_array(&self) -> [u16; 3] {
        [self.base, self.mid, self.tip]
    }

    /// Sum of the three active pulses
    pub fn active_ticks(&self) -> u32 {
        self.as_array().iter().map(|&t| u32::from(t)).sum()
    }
}

/// Result of a move request, printed by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct MoveReport {
    pub target: Point,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ticks: JointTicks,
}

/// Measured timing of one scheduler period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodReport {
    pub start_tick: u64,
    pub length_ticks: u64,
    pub asserted: JointTicks,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_tip_defaults_to_up() {
        let p: Point = serde_json::from_str(r#"{ "x": 1.5, "y": -2.0 }"#).unwrap();
        assert_eq!(p, Point::new(1.5, -2.0, false));
    }

    #[test]
    fn test_joint_ticks_lookup() {
        let ticks = JointTicks::new(1100, 1200, 1300);
        assert_eq!(ticks.get(Joint::Base), 1100);
        assert_eq!(ticks.get(Joint::Mid), 1200);
        assert_eq!(ticks.get(Joint::Tip), 1300);
        assert_eq!(ticks.active_ticks(), 3600);
    }
}
