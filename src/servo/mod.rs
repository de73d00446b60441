// Servo core for the SCARA arm
//
// Provides:
// - Two-link inverse kinematics (point -> joint ticks)
// - Shared pulse-width table with validated writes
// - Timer-driven pulse scheduler for the three servo lines
// - High-level servo API (init / move / direct override)

mod driver;
mod error;
pub mod kinematics;
pub mod scheduler;
pub mod table;

pub use driver::Servo;
pub use error::{Result, ServoError};
pub use kinematics::{JointAngles, Solver};
pub use scheduler::{Phase, PulseScheduler};
pub use table::{Joint, PulseTable, TickLimits};
