//! The differential-drive controller.
//!
//! Turns a unicycle command into motor commands: wheel rim velocities are
//! scaled into the abstract `[-100, 100]` range, pushed out of the motor
//! driver's dead zone and only transmitted when they differ from what was
//! last sent.

use tracing::{debug, info, warn};

use subsume_kinematics::{DifferentialDriveInputs, DriveGeometry, DriveInputs, Pose};

use crate::error::DriveError;
use crate::traits::motor::{DriveCommandSink, MotorSpeeds, NoOdometrySource, OdometrySource};

/// Full scale of the abstract motor speed range.
pub const MOTOR_SPEED_MAX: f64 = 100.0;

/// Default band around zero that is commanded as a true stop.
pub const DEFAULT_VIRTUAL_DEAD_ZONE: f64 = 2.0;

/// Default smallest magnitude that actually turns a wheel.
pub const DEFAULT_MOTOR_DEAD_ZONE: f64 = 25.0;

/// Dead-zone correction applied when mapping velocities to motor speeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedShaping {
    virtual_dead_zone: f64,
    motor_dead_zone: f64,
}

impl Default for SpeedShaping {
    fn default() -> Self {
        SpeedShaping {
            virtual_dead_zone: DEFAULT_VIRTUAL_DEAD_ZONE,
            motor_dead_zone: DEFAULT_MOTOR_DEAD_ZONE,
        }
    }
}

impl SpeedShaping {
    /// Build a shaping profile.
    ///
    /// # Errors
    ///
    /// `virtual_dead_zone` must lie in `[0, 100)` and `motor_dead_zone` in
    /// `[0, 100]`.
    pub fn new(virtual_dead_zone: f64, motor_dead_zone: f64) -> Result<Self, DriveError> {
        if !(0.0..MOTOR_SPEED_MAX).contains(&virtual_dead_zone) {
            return Err(DriveError::InvalidShaping("virtual dead zone must be in [0, 100)"));
        }
        if !(0.0..=MOTOR_SPEED_MAX).contains(&motor_dead_zone) {
            return Err(DriveError::InvalidShaping("motor dead zone must be in [0, 100]"));
        }
        Ok(SpeedShaping {
            virtual_dead_zone,
            motor_dead_zone,
        })
    }

    pub fn virtual_dead_zone(&self) -> f64 {
        self.virtual_dead_zone
    }

    pub fn motor_dead_zone(&self) -> f64 {
        self.motor_dead_zone
    }

    /// Map a rim velocity (m/s) to an abstract motor speed.
    ///
    /// `velocity / speed_to_velocity_factor` is clamped to `[-100, 100]`.
    /// Anything within the virtual dead zone becomes `0`; the remaining range
    /// is remapped linearly onto `motor_dead_zone..=100` with the sign kept,
    /// then rounded.
    pub fn velocity_to_motor_speed(&self, velocity: f64, speed_to_velocity_factor: f64) -> i32 {
        let ms = (velocity / speed_to_velocity_factor).clamp(-MOTOR_SPEED_MAX, MOTOR_SPEED_MAX);
        if ms.is_nan() || ms.abs() <= self.virtual_dead_zone {
            return 0;
        }

        let span_in = MOTOR_SPEED_MAX - self.virtual_dead_zone;
        let span_out = MOTOR_SPEED_MAX - self.motor_dead_zone;
        let magnitude = self.motor_dead_zone + (ms.abs() - self.virtual_dead_zone) * span_out / span_in;

        (magnitude.copysign(ms)).round() as i32
    }
}

/// Drives a two-wheel base through a [`DriveCommandSink`].
pub struct DifferentialDrive<S, O = NoOdometrySource> {
    geometry: DriveGeometry,
    shaping: SpeedShaping,
    sink: S,
    odometry_source: Option<O>,
    inputs: DriveInputs,
    wheels: DifferentialDriveInputs,
    /// `None` until something is transmitted, and after disabling.
    last_sent: Option<MotorSpeeds>,
    transmissions: u64,
}

impl<S: DriveCommandSink> DifferentialDrive<S> {
    pub fn new(geometry: DriveGeometry, sink: S) -> Self {
        DifferentialDrive {
            geometry,
            shaping: SpeedShaping::default(),
            sink,
            odometry_source: None,
            inputs: DriveInputs::STOP,
            wheels: DifferentialDriveInputs::compute(DriveInputs::STOP, &geometry),
            last_sent: None,
            transmissions: 0,
        }
    }
}

impl<S: DriveCommandSink, O: OdometrySource> DifferentialDrive<S, O> {
    /// Attach a hardware odometry source. It is switched on and off together
    /// with the motors.
    pub fn with_odometry_source<P: OdometrySource>(self, source: P) -> DifferentialDrive<S, P> {
        DifferentialDrive {
            geometry: self.geometry,
            shaping: self.shaping,
            sink: self.sink,
            odometry_source: Some(source),
            inputs: self.inputs,
            wheels: self.wheels,
            last_sent: self.last_sent,
            transmissions: self.transmissions,
        }
    }

    pub fn with_shaping(mut self, shaping: SpeedShaping) -> Self {
        self.shaping = shaping;
        self
    }

    pub fn geometry(&self) -> &DriveGeometry {
        &self.geometry
    }

    pub fn shaping(&self) -> &SpeedShaping {
        &self.shaping
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Current unicycle command.
    pub fn inputs(&self) -> DriveInputs {
        self.inputs
    }

    /// Wheel velocities from the most recent [`drive`](Self::drive).
    pub fn wheels(&self) -> &DifferentialDriveInputs {
        &self.wheels
    }

    /// Motor speeds last transmitted, if the cache is valid.
    pub fn last_sent(&self) -> Option<MotorSpeeds> {
        self.last_sent
    }

    /// Number of commands actually sent to the sink.
    pub fn transmissions(&self) -> u64 {
        self.transmissions
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_enabled()
    }

    /// Pose reported by the hardware odometry source, if one is attached and
    /// reporting.
    pub fn hardware_pose(&self) -> Option<Pose> {
        self.odometry_source.as_ref().and_then(OdometrySource::pose)
    }

    /// Replace the unicycle command. Takes effect on the next `drive`.
    pub fn set_inputs(&mut self, inputs: DriveInputs) {
        self.inputs = inputs;
    }

    /// Map a rim velocity to the motor speed this drive would command.
    pub fn velocity_to_motor_speed(&self, velocity: f64) -> i32 {
        self.shaping
            .velocity_to_motor_speed(velocity, self.geometry.speed_to_velocity_factor())
    }

    /// Recompute wheel speeds for the current command and transmit them if
    /// either side changed since the last transmission.
    ///
    /// Returns whether a command was sent.
    pub fn drive(&mut self) -> Result<bool, DriveError> {
        self.wheels = DifferentialDriveInputs::compute(self.inputs, &self.geometry);
        if !self.wheels.is_within_limits() {
            warn!(
                requested = %self.inputs,
                wheels = %self.wheels,
                "Wheel speed derating did not converge, sending best effort"
            );
        }

        let speeds = MotorSpeeds::new(
            self.velocity_to_motor_speed(self.wheels.velocity_left_wheel),
            self.velocity_to_motor_speed(self.wheels.velocity_right_wheel),
        );
        if self.last_sent == Some(speeds) {
            return Ok(false);
        }

        self.stage(speeds)?;
        self.sink.drive().map_err(DriveError::sink)?;
        self.record(speeds);
        debug!(left = speeds.left, right = speeds.right, "Motor speeds transmitted");
        Ok(true)
    }

    /// Command both motors to zero and send it, whatever was sent before.
    pub fn stop(&mut self) -> Result<(), DriveError> {
        self.inputs = DriveInputs::STOP;
        self.stage(MotorSpeeds::STOP)?;
        self.sink.update().map_err(DriveError::sink)?;
        self.record(MotorSpeeds::STOP);
        info!("Drive stopped");
        Ok(())
    }

    /// Stop, then actively brake.
    pub fn brake(&mut self) -> Result<(), DriveError> {
        self.stop()?;
        self.sink.brake().map_err(DriveError::sink)
    }

    /// Stop, then let the motors coast.
    pub fn feather(&mut self) -> Result<(), DriveError> {
        self.stop()?;
        self.sink.feather().map_err(DriveError::sink)
    }

    /// Switch the motors, and the hardware odometry source if attached, on
    /// or off.
    ///
    /// Disabling invalidates the transmission cache so the first `drive`
    /// after re-enabling always sends.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), DriveError> {
        self.sink.set_enabled(enabled).map_err(DriveError::sink)?;
        if let Some(source) = self.odometry_source.as_mut() {
            source.set_enabled(enabled).map_err(DriveError::odometry)?;
        }
        if !enabled {
            self.last_sent = None;
        }
        info!(enabled, "Drive enable toggled");
        Ok(())
    }

    fn stage(&mut self, speeds: MotorSpeeds) -> Result<(), DriveError> {
        self.sink
            .set_left_motor_speed(speeds.left)
            .map_err(DriveError::sink)?;
        self.sink
            .set_right_motor_speed(speeds.right)
            .map_err(DriveError::sink)
    }

    fn record(&mut self, speeds: MotorSpeeds) {
        self.last_sent = Some(speeds);
        self.transmissions += 1;
    }
}
