//! Closed-loop stand-in for the robot's hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use spin_sleep::SpinSleeper;
use tracing::info;

use subsume_kinematics::Pose;
use subsume_motor::{OdometrySource, SimulatedDriveBase};

use crate::blackboard::{self, Blackboard, SensorSnapshot};
use crate::config::PoseSource;

/// A square arena centred on the origin, walls on all four sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub half_width: f64,
}

impl Arena {
    /// Distance from `pose` to the wall straight ahead.
    pub fn range_from(&self, pose: &Pose) -> f64 {
        let (sin, cos) = pose.theta.sin_cos();
        let along = |position: f64, direction: f64| {
            if direction > 0.0 {
                (self.half_width - position) / direction
            } else if direction < 0.0 {
                (-self.half_width - position) / direction
            } else {
                f64::INFINITY
            }
        };
        along(pose.x, cos).min(along(pose.y, sin)).max(0.0)
    }
}

/// Step `base` every `period` and publish its readings to the blackboard
/// until `running` is cleared.
pub fn spawn_sensor_thread(
    base: SimulatedDriveBase,
    arena: Arena,
    pose_source: PoseSource,
    period: Duration,
    bb: Blackboard,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("sensor".into()).spawn(move || {
        info!(?period, ?arena, "Sensor thread started.");
        let sleeper = SpinSleeper::default();
        let dt = period.as_secs_f64();
        while running.load(Ordering::Relaxed) {
            base.step(dt);
            let hardware_pose = match pose_source {
                PoseSource::Hardware => base.pose(),
                PoseSource::Encoders => None,
            };
            blackboard::publish_sensors(
                &bb,
                SensorSnapshot {
                    encoder_ticks: Some(base.encoder_ticks()),
                    hardware_pose,
                    obstacle_range: Some(arena.range_from(&base.ground_truth())),
                },
            );
            sleeper.sleep(period);
        }
        info!("Sensor thread stopped.");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_range_along_axes() {
        let arena = Arena { half_width: 1.5 };
        assert!((arena.range_from(&Pose::new(0.0, 0.0, 0.0)) - 1.5).abs() < EPSILON);
        assert!((arena.range_from(&Pose::new(1.0, 0.0, 0.0)) - 0.5).abs() < EPSILON);
        assert!((arena.range_from(&Pose::new(1.0, 0.0, -PI)) - 2.5).abs() < EPSILON);
        assert!((arena.range_from(&Pose::new(0.0, -1.0, FRAC_PI_2)) - 2.5).abs() < EPSILON);
    }

    #[test]
    fn test_range_on_a_diagonal_hits_the_nearer_wall() {
        let arena = Arena { half_width: 1.0 };
        let range = arena.range_from(&Pose::new(0.5, 0.0, FRAC_PI_4));
        assert!((range - 0.5 * 2f64.sqrt()).abs() < EPSILON);
    }

    #[test]
    fn test_range_outside_the_arena_is_zero() {
        let arena = Arena { half_width: 1.0 };
        assert_eq!(arena.range_from(&Pose::new(2.0, 0.0, 0.0)), 0.0);
    }
}
