#![warn(missing_docs)]

//! Error types for the kinematics library.
//!
//! Every drive-geometry constant must be strictly positive; each variant names
//! the constant that failed validation.

use core::fmt;

/// Errors that can occur while setting up drive geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Returned when the wheel radius is not positive.
    InvalidWheelRadius(&'static str),
    /// Returned when the wheel base (track width) is not positive.
    InvalidWheelBase(&'static str),
    /// Returned when the encoder resolution is zero.
    InvalidTicksPerRevolution(&'static str),
    /// Returned when the abstract-speed to velocity factor is not positive.
    InvalidSpeedFactor(&'static str),
    /// Returned when the abstract-turn to omega factor is not positive.
    InvalidTurnFactor(&'static str),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::InvalidWheelRadius(msg) => write!(f, "Invalid wheel radius: {}", msg),
            KinematicsError::InvalidWheelBase(msg) => write!(f, "Invalid wheel base: {}", msg),
            KinematicsError::InvalidTicksPerRevolution(msg) => {
                write!(f, "Invalid encoder ticks per revolution: {}", msg)
            }
            KinematicsError::InvalidSpeedFactor(msg) => {
                write!(f, "Invalid speed to velocity factor: {}", msg)
            }
            KinematicsError::InvalidTurnFactor(msg) => {
                write!(f, "Invalid turn to omega factor: {}", msg)
            }
        }
    }
}

impl core::error::Error for KinematicsError {}
