//! Unicycle drive commands and their conversion into per-wheel velocities.

use core::fmt;
use libm::fabs;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geometry::DriveGeometry;

/// Factor applied to the linear velocity on each derating pass.
pub const DERATE_FACTOR: f64 = 0.8;

/// Maximum number of derating passes before the result is accepted as is.
pub const MAX_DERATE_ITERATIONS: u32 = 10;

/// A unicycle drive command.
///
/// `Copy` so that whoever stores it holds a snapshot rather than a shared
/// reference to a behavior's working value.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveInputs {
    /// Linear velocity of the robot center (m/s).
    pub velocity: f64,
    /// Angular velocity (rad/s), positive counter-clockwise.
    pub omega: f64,
}

impl DriveInputs {
    /// A command that holds the robot still.
    pub const STOP: DriveInputs = DriveInputs::new(0.0, 0.0);

    /// Construct a drive command.
    pub const fn new(velocity: f64, omega: f64) -> Self {
        DriveInputs { velocity, omega }
    }

    /// Returns `true` when neither velocity nor omega asks for motion.
    pub fn is_stop(&self) -> bool {
        self.velocity == 0.0 && self.omega == 0.0
    }
}

impl fmt::Display for DriveInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(v: {:.2} m/s, ω: {:.2} rad/s)", self.velocity, self.omega)
    }
}

/// A drive command resolved into wheel rotation rates and rim velocities.
///
/// Produced fresh by [`DifferentialDriveInputs::compute`]; there is no way to
/// update one field without recomputing the rest.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialDriveInputs {
    /// Linear velocity after derating (m/s).
    pub velocity: f64,
    /// Angular velocity, never derated (rad/s).
    pub omega: f64,
    /// Left wheel rotation rate (rad/s).
    pub rotation_left_wheel: f64,
    /// Right wheel rotation rate (rad/s).
    pub rotation_right_wheel: f64,
    /// Left wheel rim velocity (m/s).
    pub velocity_left_wheel: f64,
    /// Right wheel rim velocity (m/s).
    pub velocity_right_wheel: f64,
    /// Number of derating passes applied to `velocity`.
    pub derate_iterations: u32,
    velocity_max: f64,
}

impl DifferentialDriveInputs {
    /// Resolve a unicycle command against the drive geometry.
    ///
    /// When a wheel would have to exceed [`DriveGeometry::velocity_max`], the
    /// linear velocity is scaled by [`DERATE_FACTOR`] and the wheels are
    /// recomputed, up to [`MAX_DERATE_ITERATIONS`] times. Omega is kept
    /// exactly. If the limit is still exceeded after the last pass the result
    /// is returned anyway; check [`is_within_limits`](Self::is_within_limits).
    pub fn compute(inputs: DriveInputs, geometry: &DriveGeometry) -> Self {
        let velocity_max = geometry.velocity_max();
        let mut resolved = Self::resolve(inputs.velocity, inputs.omega, velocity_max, geometry);

        while !resolved.is_within_limits() && resolved.derate_iterations < MAX_DERATE_ITERATIONS {
            let iterations = resolved.derate_iterations + 1;
            resolved = Self::resolve(
                resolved.velocity * DERATE_FACTOR,
                inputs.omega,
                velocity_max,
                geometry,
            );
            resolved.derate_iterations = iterations;
        }

        resolved
    }

    fn resolve(velocity: f64, omega: f64, velocity_max: f64, geometry: &DriveGeometry) -> Self {
        let wheels = geometry.inverse_kinematics(DriveInputs::new(velocity, omega));
        let r = geometry.wheel_radius();

        DifferentialDriveInputs {
            velocity,
            omega,
            rotation_left_wheel: wheels.omega_l,
            rotation_right_wheel: wheels.omega_r,
            velocity_left_wheel: wheels.omega_l * r,
            velocity_right_wheel: wheels.omega_r * r,
            derate_iterations: 0,
            velocity_max,
        }
    }

    /// Rim velocity limit this result was computed against (m/s).
    pub fn velocity_max(&self) -> f64 {
        self.velocity_max
    }

    /// Returns `true` when both rim velocities are within the limit.
    pub fn is_within_limits(&self) -> bool {
        fabs(self.velocity_left_wheel) <= self.velocity_max
            && fabs(self.velocity_right_wheel) <= self.velocity_max
    }

    /// The unicycle command these wheel velocities realize.
    pub fn drive_inputs(&self) -> DriveInputs {
        DriveInputs::new(self.velocity, self.omega)
    }
}

impl fmt::Display for DifferentialDriveInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(vL: {:.3} m/s, vR: {:.3} m/s, derated {}x)",
            self.velocity_left_wheel, self.velocity_right_wheel, self.derate_iterations
        )
    }
}
