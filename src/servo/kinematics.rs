// Two-link planar inverse kinematics for the SCARA arm
// Converts a target point (x, y, tip) into timer ticks for the three servos.
//
// Assumed arm configuration: the base servo sits at the origin, angles are
// measured counter-clockwise from the +x axis, the mid servo's angle is
// measured from the extension of the first link. Both joints travel [0, pi].

use std::f32::consts::PI;

use super::table::{Joint, TickLimits};
use super::{Result, ServoError};
use crate::config::ArmConfig;
use crate::messages::{JointTicks, Point};

/// Mechanical travel of the base and mid joints (radians)
pub const MIN_ANGLE: f32 = 0.0;
pub const MAX_ANGLE: f32 = PI;

/// Joint angles for a reachable point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngles {
    pub base: f32, // radians, (-pi, pi]
    pub mid: f32,  // radians, [0, pi]
}

/// Linear interpolation of `a` from [b, c] to [d, e]
pub fn lerp(a: f32, b: f32, c: f32, d: f32, e: f32) -> f32 {
    (e - d) * (a - b) / (c - b) + d
}

/// Inverse kinematics solver for fixed link lengths
#[derive(Debug, Clone, Copy)]
pub struct Solver {
    link_base: f32,
    link_mid: f32,
    limits: TickLimits,
}

impl Solver {
    pub fn new(config: &ArmConfig, limits: TickLimits) -> Self {
        Self::with_links(config.link_base_cm, config.link_mid_cm, limits)
    }

    pub fn with_links(link_base: f32, link_mid: f32, limits: TickLimits) -> Self {
        Self {
            link_base,
            link_mid,
            limits,
        }
    }

    /// Inner and outer radius of the reachable annulus
    pub fn reach(&self) -> (f32, f32) {
        (
            (self.link_base - self.link_mid).abs(),
            self.link_base + self.link_mid,
        )
    }

    /// Joint angles for `p`, elbow fixed to the non-negative sine branch
    pub fn angles(&self, p: &Point) -> Result<JointAngles> {
        let (l1, l2) = (self.link_base, self.link_mid);

        // Law of cosines for the elbow
        let c = (p.radius_sq() - l1 * l1 - l2 * l2) / (2.0 * l1 * l2);
        if c.is_nan() || c.abs() > 1.0 {
            return Err(ServoError::Unreachable { x: p.x, y: p.y });
        }
        let s = (1.0 - c * c).sqrt();

        let mut base = p.y.atan2(p.x) - (l2 * s).atan2(l1 + l2 * c);
        if base <= -PI {
            base += 2.0 * PI;
        }

        Ok(JointAngles {
            base,
            mid: s.atan2(c),
        })
    }

    /// Convert a joint angle to ticks, rounded half-up
    pub fn angle_to_ticks(&self, joint: Joint, angle: f32) -> Result<u16> {
        let exact = lerp(
            angle,
            MIN_ANGLE,
            MAX_ANGLE,
            self.limits.min_exact,
            self.limits.max_exact,
        );
        self.limits.check(joint, (exact + 0.5).floor() as i32)
    }

    /// Full solution for `p`. Both link angles are validated before anything
    /// is returned, so a caller never applies half a move.
    pub fn solve(&self, p: &Point) -> Result<JointTicks> {
        let angles = self.angles(p)?;

        let base = self.angle_to_ticks(Joint::Base, angles.base)?;
        let mid = self.angle_to_ticks(Joint::Mid, angles.mid)?;
        let tip = if p.z {
            self.limits.max
        } else {
            self.limits.min
        };

        Ok(JointTicks { base, mid, tip })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> Solver {
        let config = ArmConfig::default();
        Solver::new(&config, TickLimits::from_config(&config))
    }

    #[test]
    fn test_lerp_endpoints() {
        assert_eq!(lerp(0.0, 0.0, PI, 1000.0, 2000.0), 1000.0);
        assert_eq!(lerp(PI, 0.0, PI, 1000.0, 2000.0), 2000.0);
        assert_eq!(lerp(5.0, 0.0, 10.0, -1.0, 1.0), 0.0);
    }

    #[test]
    fn test_full_extension() {
        // (0, 17) is exactly L1 + L2 away: elbow straight, base at 90 degrees
        let s = solver();
        let angles = s.angles(&Point::new(0.0, 17.0, false)).unwrap();
        assert!((angles.base - PI / 2.0).abs() < 1e-5);
        assert!(angles.mid.abs() < 1e-5);

        let ticks = s.solve(&Point::new(0.0, 17.0, false)).unwrap();
        assert_eq!(ticks.base, 1573);
        assert_eq!(ticks.mid, 1049);
    }

    #[test]
    fn test_inside_inner_radius_unreachable() {
        let result = solver().solve(&Point::new(0.0, 0.5, true));
        assert!(matches!(result, Err(ServoError::Unreachable { .. })));
    }

    #[test]
    fn test_outside_outer_radius_unreachable() {
        for p in [
            Point::new(12.1, 12.1, false),
            Point::new(-17.01, 0.0, false),
            Point::new(0.0, -30.0, true),
        ] {
            assert!(
                matches!(solver().solve(&p), Err(ServoError::Unreachable { .. })),
                "{:?} should be unreachable",
                p
            );
        }
    }

    #[test]
    fn test_non_finite_unreachable() {
        assert!(solver().solve(&Point::new(f32::NAN, 1.0, false)).is_err());
        assert!(solver().solve(&Point::new(f32::INFINITY, 1.0, false)).is_err());
    }

    #[test]
    fn test_reachable_upper_half_plane_in_range() {
        let s = solver();
        let limits = TickLimits::from_config(&ArmConfig::default());
        let (inner, outer) = s.reach();

        // Sweep radii and angles where both joints stay inside their travel
        let mut solved = 0;
        for r_step in 0..=16 {
            let r = inner + 0.01 + (outer - inner - 0.02) * r_step as f32 / 16.0;
            for a_step in 0..=12 {
                let theta = PI / 2.0 + PI / 2.0 * a_step as f32 / 12.0;
                let p = Point::new(r * theta.cos(), r * theta.sin(), false);
                if let Ok(ticks) = s.solve(&p) {
                    solved += 1;
                    assert!(limits.contains(i32::from(ticks.base)));
                    assert!(limits.contains(i32::from(ticks.mid)));
                } else {
                    assert!(
                        !matches!(s.angles(&p), Err(ServoError::Unreachable { .. })),
                        "{:?} is inside the annulus",
                        p
                    );
                }
            }
        }
        assert!(solved > 150, "only {} points solved", solved);
    }

    #[test]
    fn test_reachable_but_outside_servo_travel() {
        // Straight down the -y axis needs a base angle of -90 degrees
        let result = solver().solve(&Point::new(0.0, -17.0, false));
        assert!(matches!(
            result,
            Err(ServoError::OutOfRange {
                joint: Joint::Base,
                ..
            })
        ));
    }

    #[test]
    fn test_base_angle_wraps_into_range() {
        // Far side of the -x axis: atan2 lands near -pi and is wrapped up
        let angles = solver().angles(&Point::new(-5.0, -0.0001, false)).unwrap();
        assert!(angles.base > -PI && angles.base <= PI);
    }

    #[test]
    fn test_tip_flag_mapping() {
        let s = solver();
        let down = s.solve(&Point::new(10.0, 10.0, true)).unwrap();
        let up = s.solve(&Point::new(10.0, 10.0, false)).unwrap();
        assert_eq!(down.tip, 2097);
        assert_eq!(up.tip, 1049);
        assert_eq!((down.base, down.mid), (up.base, up.mid));
    }

    #[test]
    fn test_known_point() {
        let ticks = solver().solve(&Point::new(-5.0, 15.0, false)).unwrap();
        println!("(-5, 15): base={}, mid={}", ticks.base, ticks.mid);
        assert_eq!(ticks.base, 1547);
        assert_eq!(ticks.mid, 1300);
    }

    #[test]
    fn test_solve_is_deterministic() {
        let s = solver();
        let p = Point::new(-2.5, 9.5, true);
        assert_eq!(s.solve(&p).unwrap(), s.solve(&p).unwrap());
    }
}
