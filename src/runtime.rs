// Hosted runtime: drives the servo core on simulated hardware from the CLI
//
// The interrupt side runs either on a virtual clock (trace) or on a background
// thread at real-time deadlines (route), while commands arrive on the
// foreground like they would from the arm's mode logic.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ArmConfig, INITIAL_POSITION, ROUTE_STEP_DELAY};
use crate::messages::{MoveReport, PeriodReport, Point};
use crate::route::{self, FIGURE, RouteOutcome};
use crate::servo::{Joint, Servo};
use crate::sim::{InterruptThread, SimPin, SimTimer, Timeline};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "scara-servo", about = "SCARA arm servo timing and kinematics core")]
pub struct Cli {
    /// JSON file overriding arm geometry and timing
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Solve a point and apply it to the pulse table
    Move {
        #[arg(long, allow_negative_numbers = true)]
        x: f32,
        #[arg(long, allow_negative_numbers = true)]
        y: f32,
        /// Lower the tip
        #[arg(long)]
        tip: bool,
    },
    /// Write one joint's pulse width directly (0 = base, 1 = mid, 2 = tip)
    Setcnt {
        #[arg(long)]
        joint: u8,
        #[arg(long)]
        ticks: u16,
    },
    /// Simulate the pulse train on a virtual clock and report each period
    Trace {
        #[arg(long, default_value_t = 3)]
        periods: usize,
        /// Optional target to move to before tracing, as "x,y"
        #[arg(long, value_parser = parse_xy, allow_hyphen_values = true)]
        at: Option<(f32, f32)>,
        #[arg(long)]
        tip: bool,
    },
    /// Replay the built-in figure with the interrupt running in real time
    Route {
        #[arg(long, default_value_t = ROUTE_STEP_DELAY.as_millis() as u64)]
        delay_ms: u64,
    },
}

fn parse_xy(s: &str) -> Result<(f32, f32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got {:?}", s))?;
    let parse = |v: &str| v.trim().parse::<f32>().map_err(|e| e.to_string());
    Ok((parse(x)?, parse(y)?))
}

#[derive(Debug, Serialize)]
struct TraceReport {
    periods: Vec<PeriodReport>,
}

#[derive(Debug, Serialize)]
struct RouteReport {
    outcome: RouteOutcome,
    expiries: u64,
}

pub struct Runtime {
    config: ArmConfig,
    servo: Servo,
}

impl Runtime {
    pub fn new(config: ArmConfig) -> Result<Self, BoxError> {
        let servo = Servo::new(&config)?;
        Ok(Self { config, servo })
    }

    fn sim_lines() -> [SimPin; 3] {
        [SimPin::new(), SimPin::new(), SimPin::new()]
    }

    /// Apply a move and report the table, rejected or not
    fn on_move(&self, target: Point) -> MoveReport {
        let result = self.servo.move_to(&target);
        MoveReport {
            target,
            applied: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            ticks: self.servo.pulse_widths(),
        }
    }

    fn on_setcnt(&self, joint: u8, ticks: u16) -> Result<(), BoxError> {
        let joint = Joint::try_from(joint)?;
        self.servo.set_pulse_width(joint, ticks)?;
        info!("Set {} joint to {} ticks", joint, ticks);
        Ok(())
    }

    fn trace(&self, periods: usize) -> Result<TraceReport, BoxError> {
        let scheduler = self.servo.init(Self::sim_lines(), SimTimer::new())?;
        let mut timeline = Timeline::new(scheduler);
        let trace = timeline.run_periods(periods);
        info!("Simulated {} ticks", timeline.now());
        Ok(TraceReport {
            periods: trace.periods(),
        })
    }

    async fn route(&self, delay: Duration) -> Result<RouteReport, BoxError> {
        let scheduler = self.servo.init(Self::sim_lines(), SimTimer::new())?;
        let isr = InterruptThread::spawn(scheduler, self.config.tick_duration())?;

        if let Err(e) = self.servo.move_to(&INITIAL_POSITION) {
            warn!("Initial position rejected: {}", e);
        }
        let outcome = route::replay(&self.servo, &FIGURE, delay).await;
        if let Err(e) = self.servo.move_to(&INITIAL_POSITION) {
            warn!("Return to initial position rejected: {}", e);
        }
        // Let the return move reach the lines before stopping
        let settle = Duration::from_secs_f64(2.0 / f64::from(self.config.refresh_hz));
        tokio::time::sleep(settle).await;

        let expiries = isr.expiries();
        isr.stop();
        Ok(RouteReport { outcome, expiries })
    }
}

pub async fn run(cli: Cli) -> Result<(), BoxError> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            ArmConfig::from_json_file(path)?
        }
        None => ArmConfig::default(),
    };
    let runtime = Runtime::new(config)?;

    let output = match cli.command {
        Command::Move { x, y, tip } => {
            serde_json::to_string_pretty(&runtime.on_move(Point::new(x, y, tip)))?
        }
        Command::Setcnt { joint, ticks } => {
            runtime.on_setcnt(joint, ticks)?;
            serde_json::to_string_pretty(&runtime.servo.pulse_widths())?
        }
        Command::Trace { periods, at, tip } => {
            if let Some((x, y)) = at {
                let report = runtime.on_move(Point::new(x, y, tip));
                if !report.applied {
                    warn!("Tracing from the previous position");
                }
            }
            serde_json::to_string_pretty(&runtime.trace(periods)?)?
        }
        Command::Route { delay_ms } => {
            serde_json::to_string_pretty(&runtime.route(Duration::from_millis(delay_ms)).await?)?
        }
    };

    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        Runtime::new(ArmConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_xy() {
        assert_eq!(parse_xy("-5,15").unwrap(), (-5.0, 15.0));
        assert_eq!(parse_xy(" 1.5 , -2 ").unwrap(), (1.5, -2.0));
        assert!(parse_xy("5").is_err());
        assert!(parse_xy("a,b").is_err());
    }

    #[test]
    fn test_cli_parses_negative_coordinates() {
        let args = ["scara-servo", "move", "--x", "-5", "--y", "15", "--tip"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Move { x, y, tip: true } if x == -5.0 && y == 15.0
        ));
    }

    #[test]
    fn test_rejected_move_reports_previous_ticks() {
        let runtime = runtime();
        let home = runtime.servo.pulse_widths();
        let report = runtime.on_move(Point::new(0.0, 0.5, false));
        assert!(!report.applied);
        assert!(report.error.is_some());
        assert_eq!(report.ticks, home);
    }

    #[test]
    fn test_setcnt_unknown_joint() {
        let runtime = runtime();
        assert!(runtime.on_setcnt(3, 1500).is_err());
        assert!(runtime.on_setcnt(0, 1500).is_ok());
        assert_eq!(runtime.servo.pulse_widths().base, 1500);
    }

    #[test]
    fn test_trace_reports_full_periods() {
        let runtime = runtime();
        let report = runtime.trace(2).unwrap();
        assert_eq!(report.periods.len(), 2);
        for period in &report.periods {
            assert_eq!(period.length_ticks, 20972);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_route_completes() {
        let runtime = runtime();
        let report = runtime.route(Duration::from_millis(1)).await.unwrap();
        assert!(report.outcome.completed());
        assert!(report.expiries > 0);
        assert_eq!(
            runtime.servo.pulse_widths(),
            runtime.servo.solver().solve(&INITIAL_POSITION).unwrap()
        );
    }
}
