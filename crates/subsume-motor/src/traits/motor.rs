use std::convert::Infallible;
use std::error::Error;

use subsume_kinematics::Pose;

/// Left and right motor commands in the abstract `[-100, 100]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorSpeeds {
    /// Left motor command.
    pub left: i32,
    /// Right motor command.
    pub right: i32,
}

impl MotorSpeeds {
    /// Both motors stopped.
    pub const STOP: MotorSpeeds = MotorSpeeds { left: 0, right: 0 };

    pub const fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }
}

/// Interface to the hardware (or simulated) motor controller.
///
/// Speed setters only stage values; nothing reaches the motors until
/// [`drive`](DriveCommandSink::drive) or [`update`](DriveCommandSink::update)
/// is called.
pub trait DriveCommandSink {
    type Error: Error + Send + Sync + 'static;

    /// Stage the left motor command, `[-100, 100]`.
    fn set_left_motor_speed(&mut self, speed: i32) -> Result<(), Self::Error>;

    /// Stage the right motor command, `[-100, 100]`.
    fn set_right_motor_speed(&mut self, speed: i32) -> Result<(), Self::Error>;

    /// Transmit the staged speeds as a drive command.
    fn drive(&mut self) -> Result<(), Self::Error>;

    /// Transmit the staged speeds even if the controller believes nothing
    /// changed.
    fn update(&mut self) -> Result<(), Self::Error>;

    /// Power the motor controller on or off.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;

    fn is_enabled(&self) -> bool;

    /// Let both motors coast to a stop.
    fn feather(&mut self) -> Result<(), Self::Error>;

    /// Actively brake both motors.
    fn brake(&mut self) -> Result<(), Self::Error>;
}

/// Hardware that computes odometry on its own, e.g. a motor board that
/// integrates its encoders internally.
pub trait OdometrySource {
    type Error: Error + Send + Sync + 'static;

    /// Start or stop odometry reporting.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Latest pose reported by the hardware, if reporting is enabled.
    fn pose(&self) -> Option<Pose>;
}

/// Placeholder for drives without a hardware odometry source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOdometrySource;

impl OdometrySource for NoOdometrySource {
    type Error = Infallible;

    fn set_enabled(&mut self, _enabled: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn pose(&self) -> Option<Pose> {
        None
    }
}
