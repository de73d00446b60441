// Arm geometry, servo timing and clock configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::messages::Point;

// Link lengths in centimeters
pub const LINK_BASE_CM: f32 = 8.0; // base servo to mid servo
pub const LINK_MID_CM: f32 = 9.0; // mid servo to tip

// HIGH pulse time in microseconds for the minimum and maximum servo angle
pub const MIN_PULSE_US: f32 = 1000.0;
pub const MAX_PULSE_US: f32 = 2000.0;

// Servo refresh rate
pub const REFRESH_HZ: f32 = 50.0;

// Core clock is MAX_CORE_CLK_MHZ / 2^CLOCK_DIVIDER_EXP
pub const MAX_CORE_CLK_MHZ: f64 = 12.582912;
pub const CLOCK_DIVIDER_EXP: u8 = 0;

// One timer tick is one machine cycle
pub const CYCLES_PER_TICK: f64 = 12.0;

// Position commanded right after init
pub const INITIAL_POSITION: Point = Point::new(10.0, 10.0, false);

// Delay between points when replaying the built-in route
pub const ROUTE_STEP_DELAY: Duration = Duration::from_millis(1000);

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Runtime arm configuration, resolved once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    pub link_base_cm: f32,
    pub link_mid_cm: f32,
    pub min_pulse_us: f32,
    pub max_pulse_us: f32,
    pub refresh_hz: f32,
    pub core_clk_mhz: f64,
    pub clock_divider_exp: u8,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            link_base_cm: LINK_BASE_CM,
            link_mid_cm: LINK_MID_CM,
            min_pulse_us: MIN_PULSE_US,
            max_pulse_us: MAX_PULSE_US,
            refresh_hz: REFRESH_HZ,
            core_clk_mhz: MAX_CORE_CLK_MHZ,
            clock_divider_exp: CLOCK_DIVIDER_EXP,
        }
    }
}

impl ArmConfig {
    /// Load and validate a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Effective core clock after the divider
    pub fn core_clk(&self) -> f64 {
        self.core_clk_mhz / f64::from(1u32 << (self.clock_divider_exp & 0x07))
    }

    /// Timer ticks per microsecond
    pub fn ticks_per_us(&self) -> f64 {
        self.core_clk() / CYCLES_PER_TICK
    }

    /// Wall-clock length of one timer tick
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1e-6 / self.ticks_per_us())
    }

    /// Microseconds to ticks, rounded half-up
    pub fn us_to_ticks(&self, us: f64) -> u32 {
        (us * self.ticks_per_us() + 0.5) as u32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, len) in [
            ("link_base_cm", self.link_base_cm),
            ("link_mid_cm", self.link_mid_cm),
        ] {
            if !len.is_finite() || len <= 0.0 {
                return Err(invalid(field, format!("{} must be a positive length", len)));
            }
        }

        if !self.max_pulse_us.is_finite() {
            return Err(invalid("max_pulse_us", format!("{} us", self.max_pulse_us)));
        }
        if !(self.min_pulse_us > 0.0 && self.min_pulse_us < self.max_pulse_us) {
            return Err(invalid(
                "min_pulse_us",
                format!(
                    "expected 0 < min ({}) < max ({})",
                    self.min_pulse_us, self.max_pulse_us
                ),
            ));
        }

        if !self.refresh_hz.is_finite() || self.refresh_hz <= 0.0 {
            return Err(invalid("refresh_hz", format!("{} Hz", self.refresh_hz)));
        }

        if !self.core_clk_mhz.is_finite() || self.core_clk_mhz <= 0.0 {
            return Err(invalid("core_clk_mhz", format!("{} MHz", self.core_clk_mhz)));
        }

        let period = self.us_to_ticks(1e6 / f64::from(self.refresh_hz));
        if period > u32::from(u16::MAX) {
            return Err(invalid(
                "refresh_hz",
                format!("period of {} ticks does not fit the 16-bit timer", period),
            ));
        }

        let max = self.us_to_ticks(f64::from(self.max_pulse_us));
        if self.us_to_ticks(f64::from(self.min_pulse_us)) == 0 {
            return Err(invalid("min_pulse_us", "rounds to zero ticks".to_string()));
        }
        // us_to_ticks saturates, so a huge pulse must not overflow here
        if max >= period || 3 * u64::from(max) >= u64::from(period) {
            return Err(invalid(
                "max_pulse_us",
                format!(
                    "three {} tick pulses leave no filler in a {} tick period",
                    max, period
                ),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
