#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for differential-drive robot kinematics."]
#![doc = ""]
#![doc = "This crate provides the drive geometry, unicycle to per-wheel velocity conversion"]
#![doc = "with speed derating, wheel-encoder odometry and pose integration."]

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod angle;
pub mod error;
pub mod geometry;
pub mod inputs;
pub mod odometry;

pub use error::KinematicsError;
pub use geometry::{DriveGeometry, WheelSpeeds};
pub use inputs::{DifferentialDriveInputs, DriveInputs};
pub use odometry::{DifferentialDriveOdometry, Displacement, EncoderTicks};

/// Something that holds a robot pose and can be moved by odometry.
///
/// The pose is owned by whoever implements this; odometry only borrows it
/// for the duration of an update.
pub trait PoseSink {
    /// Current heading (rad).
    fn theta(&self) -> f64;

    /// Shift the position by `(dx, dy)` meters in the world frame.
    fn translate(&mut self, dx: f64, dy: f64);

    /// Turn the heading by `d_theta` radians.
    fn rotate(&mut self, d_theta: f64);
}

/// A 2‑D pose `(x, y, θ)` in meters and radians.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// World‑frame x position (m).
    pub x: f64,
    /// World‑frame y position (m).
    pub y: f64,
    /// Heading (rad), normalized to `[-PI, PI)`.
    pub theta: f64,
}

impl Pose {
    /// Construct a new pose.
    ///
    /// # Arguments
    ///
    /// * `x`: World-frame x position in meters.
    /// * `y`: World-frame y position in meters.
    /// * `theta`: Heading in radians.
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }

    /// Normalize an angle to be within `[-PI, PI)`.
    ///
    /// Angles at `PI` will be normalized to `-PI`.
    pub fn normalize_angle(angle: f64) -> f64 {
        angle::normalize_radians(angle)
    }
}

impl PoseSink for Pose {
    fn theta(&self) -> f64 {
        self.theta
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    fn rotate(&mut self, d_theta: f64) {
        self.theta = Pose::normalize_angle(self.theta + d_theta);
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.2}, y: {:.2}, θ: {:.2} rad)", self.x, self.y, self.theta)
    }
}
