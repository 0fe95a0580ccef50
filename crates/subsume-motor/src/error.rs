//! Error types for motor control.

use std::error::Error;

type BoxError = Box<dyn Error + Send + Sync>;

/// Errors raised while commanding the drive.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    /// The drive command sink rejected a command.
    #[error("drive command sink error")]
    Sink(#[source] BoxError),

    /// The hardware odometry source rejected a command.
    #[error("odometry source error")]
    Odometry(#[source] BoxError),

    /// A speed shaping parameter is out of range.
    #[error("invalid speed shaping: {0}")]
    InvalidShaping(&'static str),
}

impl DriveError {
    pub(crate) fn sink<E: Error + Send + Sync + 'static>(err: E) -> Self {
        DriveError::Sink(Box::new(err))
    }

    pub(crate) fn odometry<E: Error + Send + Sync + 'static>(err: E) -> Self {
        DriveError::Odometry(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedDriveError;

    #[test]
    fn test_display_leaves_the_cause_to_source() {
        let err = DriveError::sink(SimulatedDriveError::LinkDown);
        assert_eq!(err.to_string(), "drive command sink error");
        let cause = err.source().map(ToString::to_string);
        assert_eq!(cause, Some(SimulatedDriveError::LinkDown.to_string()));

        let err = DriveError::odometry(SimulatedDriveError::LinkDown);
        assert_eq!(err.to_string(), "odometry source error");
        assert!(err.source().is_some());
    }
}
