// High-level servo API for the SCARA arm
//
// Combines the kinematics solver and the pulse-width table, and hands the
// interrupt side its scheduler on init.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::kinematics::Solver;
use super::scheduler::PulseScheduler;
use super::table::{Joint, PulseTable, TickLimits};
use super::{Result, ServoError};
use crate::config::{ArmConfig, ConfigError};
use crate::hal::{CountdownTimer, StatefulOutputPin};
use crate::messages::{JointTicks, Point};

/// Foreground handle to the arm's three servos
#[derive(Debug)]
pub struct Servo {
    table: Arc<PulseTable>,
    solver: Solver,
    initialized: AtomicBool,
}

impl Servo {
    /// Build the core from a config; the table starts at the home position
    pub fn new(config: &ArmConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let limits = TickLimits::from_config(config);
        Ok(Self {
            table: Arc::new(PulseTable::new(limits)),
            solver: Solver::new(config, limits),
            initialized: AtomicBool::new(false),
        })
    }

    /// Start pulse generation
    ///
    /// Drives the lines ([base, mid, tip]) idle, programs the first interval
    /// from the base width and starts the timer. The returned scheduler's
    /// `on_expiry` must be wired to the timer's expiry interrupt. Can only
    /// succeed once per `Servo`.
    pub fn init<P, T>(&self, lines: [P; 3], timer: T) -> Result<PulseScheduler<P, T>>
    where
        P: StatefulOutputPin,
        T: CountdownTimer,
    {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServoError::AlreadyInitialized);
        }

        let mut scheduler = match PulseScheduler::new(lines, timer, Arc::clone(&self.table)) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                // Timer never started, allow another attempt
                self.initialized.store(false, Ordering::Release);
                warn!("Servo init failed: {:?}", e);
                return Err(ServoError::Line(format!("{:?}", e)));
            }
        };
        scheduler.start();

        let limits = self.table.limits();
        info!(
            "Servo timer started: {} tick period, pulses {}..={} ticks",
            limits.period, limits.min, limits.max
        );
        Ok(scheduler)
    }

    /// Position the arm tip over `p`
    ///
    /// Nothing is written unless both link angles are reachable and within
    /// servo travel. The new widths reach the lines from the next pulse of
    /// each joint, so joints may pick them up one period apart.
    pub fn move_to(&self, p: &Point) -> Result<()> {
        let ticks = self.solver.solve(p).inspect_err(|e| {
            warn!("Move to ({}, {}) rejected: {}", p.x, p.y, e);
        })?;

        self.table.set(Joint::Base, ticks.base)?;
        self.table.set(Joint::Tip, ticks.tip)?;
        self.table.set(Joint::Mid, ticks.mid)?;

        info!(
            "Moved to ({:.2}, {:.2}, tip {}): base={}, mid={}, tip={}",
            p.x,
            p.y,
            if p.z { "down" } else { "up" },
            ticks.base,
            ticks.mid,
            ticks.tip
        );
        Ok(())
    }

    /// Direct pulse-width override for one joint
    pub fn set_pulse_width(&self, joint: Joint, ticks: u16) -> Result<()> {
        self.table.set(joint, ticks)
    }

    /// Current table contents
    pub fn pulse_widths(&self) -> JointTicks {
        self.table.snapshot()
    }

    pub fn limits(&self) -> &TickLimits {
        self.table.limits()
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}
