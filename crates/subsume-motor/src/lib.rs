//! Motor control for a two-wheel differential-drive base.
//!
//! [`DifferentialDrive`] takes a unicycle command, derates it into reachable
//! wheel speeds, shapes those into abstract motor commands and hands them to
//! a [`DriveCommandSink`]. [`SimulatedDriveBase`] implements the sink and an
//! [`OdometrySource`] in memory.

pub mod devices;
pub mod drive;
pub mod error;
pub mod traits;

pub use devices::simulated::{SimulatedDriveBase, SimulatedDriveError, Transmission};
pub use drive::{
    DEFAULT_MOTOR_DEAD_ZONE, DEFAULT_VIRTUAL_DEAD_ZONE, DifferentialDrive, MOTOR_SPEED_MAX,
    SpeedShaping,
};
pub use error::DriveError;
pub use traits::motor::{DriveCommandSink, MotorSpeeds, NoOdometrySource, OdometrySource};
