// Built-in drawing route and replay
//
// The figure is a circle of radius 5 centred on (-5, 10) followed by a square
// of side 5. Points with the tip up move the pen between the two shapes.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::messages::Point;
use crate::servo::{Servo, ServoError};

const fn up(x: f32, y: f32) -> Point {
    Point::new(x, y, false)
}

const fn down(x: f32, y: f32) -> Point {
    Point::new(x, y, true)
}

pub const FIGURE: [Point; 45] = [
    // (x + 5)^2 + (y - 10)^2 = 25
    up(-5.0, 15.0),
    down(-5.0, 15.0),
    down(-6.62, 14.73),
    down(-8.07, 13.95),
    down(-9.19, 12.73),
    down(-9.85, 11.23),
    down(-9.98, 9.59),
    down(-9.58, 7.99),
    down(-8.68, 6.61),
    down(-7.38, 5.6),
    down(-5.82, 5.07),
    down(-4.18, 5.07),
    down(-2.62, 5.6),
    down(-1.32, 6.61),
    down(-0.42, 7.99),
    down(-0.02, 9.59),
    down(-0.15, 11.23),
    down(-0.81, 12.73),
    down(-1.93, 13.95),
    down(-3.38, 14.73),
    down(-5.0, 15.0),
    up(-5.0, 15.0),
    // Square from (-7.5, 12.5) to (-2.5, 7.5)
    up(-7.5, 12.5),
    down(-7.5, 12.5),
    down(-6.5, 12.5),
    down(-5.5, 12.5),
    down(-4.5, 12.5),
    down(-3.5, 12.5),
    down(-2.5, 12.5),
    down(-2.5, 11.5),
    down(-2.5, 10.5),
    down(-2.5, 9.5),
    down(-2.5, 8.5),
    down(-2.5, 7.5),
    down(-3.5, 7.5),
    down(-4.5, 7.5),
    down(-5.5, 7.5),
    down(-6.5, 7.5),
    down(-7.5, 7.5),
    down(-7.5, 8.5),
    down(-7.5, 9.5),
    down(-7.5, 10.5),
    down(-7.5, 11.5),
    down(-7.5, 12.5),
    up(-7.5, 12.5),
];

/// How far a replay got
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub applied: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RouteOutcome {
    pub fn completed(&self) -> bool {
        self.failed_at.is_none()
    }
}

/// Move through `points` in order, waiting `delay` after each one.
/// Stops at the first rejected point; the arm stays where the last good
/// point put it.
pub async fn replay(servo: &Servo, points: &[Point], delay: Duration) -> RouteOutcome {
    info!("Replaying {} points, {:?} per step", points.len(), delay);

    for (i, p) in points.iter().enumerate() {
        if let Err(e) = servo.move_to(p) {
            warn!("Bad coordinate at step {}: {}", i, e);
            return failed(i, e);
        }
        tokio::time::sleep(delay).await;
    }

    RouteOutcome {
        applied: points.len(),
        failed_at: None,
        error: None,
    }
}

fn failed(index: usize, e: ServoError) -> RouteOutcome {
    RouteOutcome {
        applied: index,
        failed_at: Some(index),
        error: Some(e.to_string()),
    }
}
