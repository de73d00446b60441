// Simulated hardware for running the servo core on a host
//
// - SimPin / SimTimer: stand-ins for the output port and the countdown timer
// - Timeline: drives the scheduler in virtual ticks and records line edges
// - InterruptThread: calls the expiry handler from a thread at wall-clock deadlines

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::hal::{
    CountdownTimer, ErrorType, OutputPin, StatefulOutputPin, interval_from_register,
    reload_register,
};
use crate::messages::{JointTicks, PeriodReport};
use crate::servo::{Joint, Phase, PulseScheduler};

/// Simulated active-low output line. Clones share the same level.
#[derive(Debug, Clone)]
pub struct SimPin {
    high: Arc<AtomicBool>,
}

impl SimPin {
    /// New line at idle (high) level
    pub fn new() -> Self {
        Self {
            high: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the servo pulse is currently asserted (line low)
    pub fn is_asserted(&self) -> bool {
        !self.high.load(Ordering::Acquire)
    }
}

impl Default for SimPin {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.store(false, Ordering::Release);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.store(true, Ordering::Release);
        Ok(())
    }
}

impl StatefulOutputPin for SimPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high.load(Ordering::Acquire))
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high.load(Ordering::Acquire))
    }
}

/// Simulated 16-bit count-up timer with a two's complement reload register
#[derive(Debug, Default)]
pub struct SimTimer {
    register: u16,
    running: bool,
    interrupt_enabled: bool,
}

impl SimTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload register as (high byte, low byte)
    pub fn register_bytes(&self) -> (u8, u8) {
        let [high, low] = self.register.to_be_bytes();
        (high, low)
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.interrupt_enabled
    }
}

impl CountdownTimer for SimTimer {
    fn set_reload(&mut self, ticks: u16) {
        self.register = reload_register(ticks);
    }

    fn reload(&self) -> u16 {
        interval_from_register(self.register)
    }

    fn enable_interrupt(&mut self) {
        self.interrupt_enabled = true;
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// One line transition at a virtual tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub tick: u64,
    pub joint: Joint,
    pub asserted: bool,
}

/// Runs a scheduler against a virtual clock
pub struct Timeline {
    scheduler: PulseScheduler<SimPin, SimTimer>,
    now: u64,
    edges: Vec<Edge>,
}

impl Timeline {
    pub fn new(scheduler: PulseScheduler<SimPin, SimTimer>) -> Self {
        Self {
            scheduler,
            now: 0,
            edges: Vec::new(),
        }
    }

    /// Advance to the next expiry and run the handler
    pub fn step(&mut self) -> Phase {
        let before = self.levels();
        self.now += u64::from(self.scheduler.timer().reload());

        let Ok(phase) = self.scheduler.on_expiry();
        let toggled_at = self.now + u64::from(phase.toggle_latency());

        let after = self.levels();
        for joint in Joint::ALL {
            if before[joint.index()] != after[joint.index()] {
                self.edges.push(Edge {
                    tick: toggled_at,
                    joint,
                    asserted: after[joint.index()],
                });
            }
        }
        phase
    }

    pub fn run_expiries(&mut self, count: usize) {
        for _ in 0..count {
            self.step();
        }
    }

    /// Run until `count` more full periods have been recorded
    pub fn run_periods(&mut self, count: usize) -> PulseTrace {
        let starts = |edges: &[Edge]| {
            edges
                .iter()
                .filter(|e| e.joint == Joint::Base && e.asserted)
                .count()
        };
        // The first period needs an opening base pulse as well
        let seen = starts(&self.edges);
        let target = seen + count + usize::from(seen == 0);
        while starts(&self.edges) < target {
            self.step();
        }
        self.trace()
    }

    pub fn trace(&self) -> PulseTrace {
        PulseTrace {
            edges: self.edges.clone(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn scheduler(&mut self) -> &mut PulseScheduler<SimPin, SimTimer> {
        &mut self.scheduler
    }

    fn levels(&mut self) -> [bool; 3] {
        Joint::ALL.map(|j| self.scheduler.line(j).is_asserted())
    }
}

/// Recorded line edges, split into periods on demand
#[derive(Debug, Clone, Serialize)]
pub struct PulseTrace {
    pub edges: Vec<Edge>,
}

impl PulseTrace {
    /// Complete periods, each starting at a base pulse start
    pub fn periods(&self) -> Vec<PeriodReport> {
        let starts: Vec<u64> = self
            .edges
            .iter()
            .filter(|e| e.joint == Joint::Base && e.asserted)
            .map(|e| e.tick)
            .collect();

        starts
            .windows(2)
            .map(|w| {
                let (start, end) = (w[0], w[1]);
                let width = |joint| self.asserted_between(joint, start, end) as u16;
                PeriodReport {
                    start_tick: start,
                    length_ticks: end - start,
                    asserted: JointTicks::new(
                        width(Joint::Base),
                        width(Joint::Mid),
                        width(Joint::Tip),
                    ),
                }
            })
            .collect()
    }

    /// Total asserted ticks of pulses for `joint` that start in [start, end)
    fn asserted_between(&self, joint: Joint, start: u64, end: u64) -> u64 {
        let mut total = 0;
        let mut rising = None;
        for edge in self.edges.iter().filter(|e| e.joint == joint) {
            match (edge.asserted, rising) {
                (true, _) => rising = Some(edge.tick),
                (false, Some(from)) if (start..end).contains(&from) => {
                    total += edge.tick - from;
                    rising = None;
                }
                (false, _) => rising = None,
            }
        }
        total
    }
}

/// Background thread standing in for the timer interrupt
pub struct InterruptThread<P, T> {
    stop: Arc<AtomicBool>,
    expiries: Arc<AtomicU64>,
    handle: Option<JoinHandle<PulseScheduler<P, T>>>,
}

impl<P, T> InterruptThread<P, T>
where
    P: StatefulOutputPin + Send + 'static,
    T: CountdownTimer + Send + 'static,
{
    /// Start invoking `on_expiry` every time the programmed interval elapses
    pub fn spawn(mut scheduler: PulseScheduler<P, T>, tick: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let expiries = Arc::new(AtomicU64::new(0));

        let handle = thread::Builder::new().name("timer-isr".into()).spawn({
            let stop = Arc::clone(&stop);
            let expiries = Arc::clone(&expiries);
            move || {
                let mut deadline = Instant::now();
                while !stop.load(Ordering::Acquire) {
                    deadline += tick * u32::from(scheduler.timer().reload());
                    if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                        thread::sleep(wait);
                    }
                    if let Err(e) = scheduler.on_expiry() {
                        error!("Output line error in expiry handler: {:?}", e);
                        break;
                    }
                    expiries.fetch_add(1, Ordering::Release);
                }
                debug!("Interrupt thread exiting");
                scheduler
            }
        })?;

        info!("Interrupt thread started, tick = {:?}", tick);
        Ok(Self {
            stop,
            expiries,
            handle: Some(handle),
        })
    }

    pub fn expiries(&self) -> u64 {
        self.expiries.load(Ordering::Acquire)
    }

    /// Stop the thread and hand the scheduler back
    pub fn stop(mut self) -> Option<PulseScheduler<P, T>> {
        self.stop.store(true, Ordering::Release);
        self.handle.take().and_then(|h| h.join().ok())
    }
}

impl<P, T> Drop for InterruptThread<P, T> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Interrupt thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArmConfig;
    use crate::messages::Point;
    use crate::servo::Servo;

    fn setup() -> (Servo, Timeline) {
        let servo = Servo::new(&ArmConfig::default()).unwrap();
        let scheduler = servo.init(sim_lines(), SimTimer::new()).unwrap();
        (servo, Timeline::new(scheduler))
    }

    fn sim_lines() -> [SimPin; 3] {
        [SimPin::new(), SimPin::new(), SimPin::new()]
    }

    #[test]
    fn test_sim_pin_levels() {
        let mut pin = SimPin::new();
        let probe = pin.clone();
        assert!(!probe.is_asserted());
        pin.set_low().unwrap();
        assert!(probe.is_asserted());
        assert!(pin.is_set_low().unwrap());
        pin.toggle().unwrap();
        assert!(pin.is_set_high().unwrap());
    }

    #[test]
    fn test_sim_timer_register() {
        let mut timer = SimTimer::new();
        timer.set_reload(1573);
        assert_eq!(timer.register_bytes(), (0xF9, 0xDB));
        assert_eq!(timer.reload(), 1573);
    }

    #[test]
    fn test_first_pulse_after_lead_in() {
        let (_servo, mut timeline) = setup();
        assert_eq!(timeline.step(), Phase::Idle);
        let edges = timeline.trace().edges;
        assert_eq!(
            edges,
            vec![Edge {
                tick: 1573 + 6,
                joint: Joint::Base,
                asserted: true
            }]
        );
    }

    #[test]
    fn test_period_is_constant() {
        let (servo, mut timeline) = setup();
        let widths = [
            JointTicks::new(1049, 1049, 1049),
            JointTicks::new(2097, 2097, 2097),
            JointTicks::new(1100, 2000, 1500),
        ];

        for ticks in widths {
            for joint in Joint::ALL {
                servo.set_pulse_width(joint, ticks.get(joint)).unwrap();
            }
            // One period to pick up the change, then measure
            timeline.run_periods(1);
            let trace = timeline.run_periods(3);
            for period in trace.periods().iter().rev().take(3) {
                assert_eq!(period.length_ticks, 20972, "{:?}", period);
                assert_eq!(period.asserted, ticks, "{:?}", period);
            }
        }
    }

    #[test]
    fn test_each_line_asserted_once_per_period() {
        let (servo, mut timeline) = setup();
        servo.move_to(&Point::new(-5.0, 15.0, true)).unwrap();
        let trace = timeline.run_periods(4);

        for joint in Joint::ALL {
            let rises = trace
                .edges
                .iter()
                .filter(|e| e.joint == joint && e.asserted)
                .count();
            assert!((4..=5).contains(&rises), "{} rose {} times", joint, rises);
        }
        let last = trace.periods().last().copied().unwrap();
        assert_eq!(last.asserted, JointTicks::new(1547, 1300, 2097));
    }

    #[test]
    fn test_update_mid_cycle_applies_to_pending_joints() {
        let (servo, mut timeline) = setup();
        timeline.run_periods(1);
        let home = servo.pulse_widths();

        // Base pulse in flight
        while timeline.step() != Phase::Idle {}
        servo.set_pulse_width(Joint::Base, 1100).unwrap();
        servo.set_pulse_width(Joint::Mid, 1200).unwrap();

        let trace = timeline.run_periods(2);
        let periods = trace.periods();
        let torn = periods[periods.len() - 2];
        let settled = periods[periods.len() - 1];

        assert_eq!(torn.asserted.base, home.base);
        assert_eq!(torn.asserted.mid, 1200);
        assert_eq!(torn.length_ticks, 20972);
        assert_eq!(settled.asserted.base, 1100);
    }

    #[test]
    fn test_interrupt_thread_follows_moves() {
        let config = ArmConfig::default();
        let servo = Servo::new(&config).unwrap();
        let lines = sim_lines();
        let scheduler = servo.init(lines, SimTimer::new()).unwrap();
        let isr = InterruptThread::spawn(scheduler, config.tick_duration()).unwrap();

        // Foreground keeps commanding while the thread pulses
        servo.move_to(&Point::new(-2.5, 9.5, true)).unwrap();
        let seen = isr.expiries();
        let deadline = Instant::now() + Duration::from_secs(5);
        while isr.expiries() < seen + 8 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let scheduler = isr.stop().unwrap();
        assert!(scheduler.expiries() >= seen + 8);
        assert_eq!(scheduler.latched(), JointTicks::new(1311, 1688, 2097));
    }
}
