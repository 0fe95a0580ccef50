//! Physical drive geometry and the two-wheel kinematic model.

use core::f64::consts::PI;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::KinematicsError;
use crate::inputs::DriveInputs;

/// Full scale of the abstract speed and turn command range (`±100`).
pub const ABSTRACT_FULL_SCALE: f64 = 100.0;

/// Left and right wheel angular velocities.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelSpeeds {
    /// Left wheel angular velocity (rad/s).
    pub omega_l: f64,
    /// Right wheel angular velocity (rad/s).
    pub omega_r: f64,
}

impl WheelSpeeds {
    /// Construct wheel speeds.
    pub const fn new(omega_l: f64, omega_r: f64) -> Self {
        WheelSpeeds { omega_l, omega_r }
    }
}

impl fmt::Display for WheelSpeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(ωL: {:.2} rad/s, ωR: {:.2} rad/s)", self.omega_l, self.omega_r)
    }
}

/// Drive geometry of a differential-drive robot.
///
/// Immutable once constructed. Besides the wheel radius and track width it
/// carries the encoder resolution and the two factors that relate the
/// hardware's abstract `±100` speed/turn range to physical units.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGeometry {
    wheel_radius_meters: f64,
    wheel_base_meters: f64,
    encoder_ticks_per_revolution: u32,
    speed_to_velocity_factor: f64,
    turn_to_omega_factor: f64,
}

impl DriveGeometry {
    /// Construct and validate a drive geometry.
    ///
    /// # Arguments
    ///
    /// * `wheel_radius_meters`: Radius of the drive wheels.
    /// * `wheel_base_meters`: Distance between the two wheel contact points.
    /// * `encoder_ticks_per_revolution`: Encoder ticks for one full wheel turn.
    /// * `speed_to_velocity_factor`: Meters per second per unit of abstract speed.
    /// * `turn_to_omega_factor`: Radians per second per unit of abstract turn.
    ///
    /// # Errors
    ///
    /// Returns the [`KinematicsError`] variant naming the first constant that
    /// is not strictly positive (NaN included).
    pub const fn new(
        wheel_radius_meters: f64,
        wheel_base_meters: f64,
        encoder_ticks_per_revolution: u32,
        speed_to_velocity_factor: f64,
        turn_to_omega_factor: f64,
    ) -> Result<Self, KinematicsError> {
        if !(wheel_radius_meters > 0.0) {
            return Err(KinematicsError::InvalidWheelRadius("must be positive"));
        }
        if !(wheel_base_meters > 0.0) {
            return Err(KinematicsError::InvalidWheelBase("must be positive"));
        }
        if encoder_ticks_per_revolution == 0 {
            return Err(KinematicsError::InvalidTicksPerRevolution("must be positive"));
        }
        if !(speed_to_velocity_factor > 0.0) {
            return Err(KinematicsError::InvalidSpeedFactor("must be positive"));
        }
        if !(turn_to_omega_factor > 0.0) {
            return Err(KinematicsError::InvalidTurnFactor("must be positive"));
        }
        Ok(DriveGeometry {
            wheel_radius_meters,
            wheel_base_meters,
            encoder_ticks_per_revolution,
            speed_to_velocity_factor,
            turn_to_omega_factor,
        })
    }

    /// Returns the wheel radius (m).
    pub fn wheel_radius(&self) -> f64 {
        self.wheel_radius_meters
    }

    /// Returns the wheel base (m).
    pub fn wheel_base(&self) -> f64 {
        self.wheel_base_meters
    }

    /// Returns the encoder resolution.
    pub fn encoder_ticks_per_revolution(&self) -> u32 {
        self.encoder_ticks_per_revolution
    }

    /// Returns the abstract speed to m/s factor.
    pub fn speed_to_velocity_factor(&self) -> f64 {
        self.speed_to_velocity_factor
    }

    /// Returns the abstract turn to rad/s factor.
    pub fn turn_to_omega_factor(&self) -> f64 {
        self.turn_to_omega_factor
    }

    /// Distance travelled at the wheel rim per encoder tick (m).
    pub fn meters_per_tick(&self) -> f64 {
        2.0 * PI * self.wheel_radius_meters / self.encoder_ticks_per_revolution as f64
    }

    /// Highest achievable rim velocity (m/s), reached at abstract speed 100.
    pub fn velocity_max(&self) -> f64 {
        self.speed_to_velocity_factor * ABSTRACT_FULL_SCALE
    }

    /// Highest commandable turn rate (rad/s), reached at abstract turn 100.
    pub fn omega_max(&self) -> f64 {
        self.turn_to_omega_factor * ABSTRACT_FULL_SCALE
    }

    /// Convert an abstract speed in `[-100, 100]` to a linear velocity (m/s).
    ///
    /// Out-of-range inputs are clamped.
    pub fn speed_to_velocity(&self, speed: f64) -> f64 {
        speed.clamp(-ABSTRACT_FULL_SCALE, ABSTRACT_FULL_SCALE) * self.speed_to_velocity_factor
    }

    /// Convert an abstract turn in `[-100, 100]` to an angular velocity (rad/s).
    ///
    /// Positive turn is counter-clockwise. Out-of-range inputs are clamped.
    pub fn turn_to_omega(&self, turn: f64) -> f64 {
        turn.clamp(-ABSTRACT_FULL_SCALE, ABSTRACT_FULL_SCALE) * self.turn_to_omega_factor
    }

    /// Calculates the unicycle command produced by the given wheel speeds.
    /// This is the forward kinematics problem.
    pub fn forward_kinematics(&self, wheel_speeds: WheelSpeeds) -> DriveInputs {
        let v_l = wheel_speeds.omega_l * self.wheel_radius_meters;
        let v_r = wheel_speeds.omega_r * self.wheel_radius_meters;

        DriveInputs::new((v_r + v_l) / 2.0, (v_r - v_l) / self.wheel_base_meters)
    }

    /// Calculates the wheel angular velocities needed for a unicycle command.
    /// This is the inverse kinematics problem.
    ///
    /// Left: `(2v − ωL) / 2r`, right: `(2v + ωL) / 2r`.
    pub fn inverse_kinematics(&self, inputs: DriveInputs) -> WheelSpeeds {
        let two_r = 2.0 * self.wheel_radius_meters;
        let turn = inputs.omega * self.wheel_base_meters;

        WheelSpeeds::new(
            (2.0 * inputs.velocity - turn) / two_r,
            (2.0 * inputs.velocity + turn) / two_r,
        )
    }
}

impl fmt::Display for DriveGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DriveGeometry (r: {:.3} m, L: {:.3} m, {} ticks/rev)",
            self.wheel_radius_meters, self.wheel_base_meters, self.encoder_ticks_per_revolution
        )
    }
}
