//! An in-memory drive base.
//!
//! [`SimulatedDriveBase`] is a cheap, cloneable handle: one clone can serve as
//! the drive's command sink, another as its odometry source, and a third can
//! be stepped by a sensor loop to produce encoder ticks.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use subsume_kinematics::{DriveGeometry, EncoderTicks, Pose, WheelSpeeds};

use crate::drive::DEFAULT_MOTOR_DEAD_ZONE;
use crate::traits::motor::{DriveCommandSink, MotorSpeeds, OdometrySource};

const HISTORY_LEN: usize = 64;

/// Errors from the simulated base.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulatedDriveError {
    /// The simulated command link has been taken down.
    #[error("simulated command link is down")]
    LinkDown,
}

/// A command that reached the simulated motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    Drive(MotorSpeeds),
    Update(MotorSpeeds),
    Feather,
    Brake,
}

#[derive(Debug)]
struct SimState {
    geometry: DriveGeometry,
    motor_dead_zone: f64,
    link_up: bool,
    enabled: bool,
    odometry_enabled: bool,
    staged: MotorSpeeds,
    applied: MotorSpeeds,
    history: VecDeque<Transmission>,
    left_ticks: f64,
    right_ticks: f64,
    pose: Pose,
}

impl SimState {
    fn check_link(&self) -> Result<(), SimulatedDriveError> {
        if self.link_up {
            Ok(())
        } else {
            Err(SimulatedDriveError::LinkDown)
        }
    }

    fn transmit(&mut self, transmission: Transmission) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(transmission);
    }

    /// Rim velocity a motor command produces; commands inside the motor's
    /// dead zone do not turn the wheel.
    fn rim_velocity(&self, speed: i32) -> f64 {
        if !self.enabled || (speed.abs() as f64) < self.motor_dead_zone {
            0.0
        } else {
            speed as f64 * self.geometry.speed_to_velocity_factor()
        }
    }
}

/// Shared handle to a simulated two-wheel base.
#[derive(Debug, Clone)]
pub struct SimulatedDriveBase {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDriveBase {
    pub fn new(geometry: DriveGeometry) -> Self {
        SimulatedDriveBase {
            state: Arc::new(Mutex::new(SimState {
                geometry,
                motor_dead_zone: DEFAULT_MOTOR_DEAD_ZONE,
                link_up: true,
                enabled: false,
                odometry_enabled: false,
                staged: MotorSpeeds::STOP,
                applied: MotorSpeeds::STOP,
                history: VecDeque::with_capacity(HISTORY_LEN),
                left_ticks: 0.0,
                right_ticks: 0.0,
                pose: Pose::default(),
            })),
        }
    }

    /// Commands whose magnitude is below `dead_zone` leave the wheel still.
    pub fn with_motor_dead_zone(self, dead_zone: f64) -> Self {
        self.state.lock().motor_dead_zone = dead_zone;
        self
    }

    /// Simulate a broken command link; every sink call fails while down.
    pub fn set_link_up(&self, up: bool) {
        self.state.lock().link_up = up;
    }

    pub fn odometry_enabled(&self) -> bool {
        self.state.lock().odometry_enabled
    }

    /// Speeds the motors are currently running at.
    pub fn applied_speeds(&self) -> MotorSpeeds {
        self.state.lock().applied
    }

    /// Most recent transmissions, oldest first.
    pub fn history(&self) -> Vec<Transmission> {
        self.state.lock().history.iter().copied().collect()
    }

    /// Cumulative encoder counts.
    pub fn encoder_ticks(&self) -> EncoderTicks {
        let state = self.state.lock();
        EncoderTicks::new(state.left_ticks.floor() as i64, state.right_ticks.floor() as i64)
    }

    /// Where the base actually is, whether or not odometry is reporting.
    pub fn ground_truth(&self) -> Pose {
        self.state.lock().pose
    }

    /// Advance the simulation by `dt` seconds at the applied motor speeds.
    pub fn step(&self, dt: f64) {
        let mut state = self.state.lock();
        let v_left = state.rim_velocity(state.applied.left);
        let v_right = state.rim_velocity(state.applied.right);
        let meters_per_tick = state.geometry.meters_per_tick();
        state.left_ticks += v_left * dt / meters_per_tick;
        state.right_ticks += v_right * dt / meters_per_tick;

        let r = state.geometry.wheel_radius();
        let chassis = state
            .geometry
            .forward_kinematics(WheelSpeeds::new(v_left / r, v_right / r));
        let heading = state.pose.theta + chassis.omega * dt / 2.0;
        state.pose.x += chassis.velocity * dt * heading.cos();
        state.pose.y += chassis.velocity * dt * heading.sin();
        state.pose.theta = Pose::normalize_angle(state.pose.theta + chassis.omega * dt);
    }
}

impl DriveCommandSink for SimulatedDriveBase {
    type Error = SimulatedDriveError;

    fn set_left_motor_speed(&mut self, speed: i32) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.staged.left = speed.clamp(-100, 100);
        Ok(())
    }

    fn set_right_motor_speed(&mut self, speed: i32) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.staged.right = speed.clamp(-100, 100);
        Ok(())
    }

    fn drive(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.applied = state.staged;
        let applied = state.applied;
        state.transmit(Transmission::Drive(applied));
        Ok(())
    }

    fn update(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.applied = state.staged;
        let applied = state.applied;
        state.transmit(Transmission::Update(applied));
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.enabled = enabled;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn feather(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.applied = MotorSpeeds::STOP;
        state.transmit(Transmission::Feather);
        Ok(())
    }

    fn brake(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.applied = MotorSpeeds::STOP;
        state.transmit(Transmission::Brake);
        Ok(())
    }
}

impl OdometrySource for SimulatedDriveBase {
    type Error = SimulatedDriveError;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.odometry_enabled = enabled;
        Ok(())
    }

    fn pose(&self) -> Option<Pose> {
        let state = self.state.lock();
        state.odometry_enabled.then_some(state.pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn geometry() -> DriveGeometry {
        DriveGeometry::new(0.03, 0.15, 36, 0.01, 0.05).unwrap()
    }

    fn enabled_base() -> SimulatedDriveBase {
        let mut base = SimulatedDriveBase::new(geometry());
        DriveCommandSink::set_enabled(&mut base, true).unwrap();
        base
    }

    #[test]
    fn test_staged_speeds_apply_only_on_drive() {
        let mut base = enabled_base();
        base.set_left_motor_speed(40).unwrap();
        base.set_right_motor_speed(-40).unwrap();
        assert_eq!(base.applied_speeds(), MotorSpeeds::STOP);
        base.drive().unwrap();
        assert_eq!(base.applied_speeds(), MotorSpeeds::new(40, -40));
    }

    #[test]
    fn test_full_speed_for_one_revolution_time() {
        let mut base = enabled_base();
        base.set_left_motor_speed(100).unwrap();
        base.set_right_motor_speed(100).unwrap();
        base.drive().unwrap();
        // 1 m/s for the time it takes to roll one circumference
        base.step(2.0 * PI * 0.03);
        let ticks = base.encoder_ticks();
        assert!((35..=36).contains(&ticks.left));
        assert_eq!(ticks.left, ticks.right);
    }

    #[test]
    fn test_motor_dead_zone_holds_wheels() {
        let mut base = enabled_base();
        base.set_left_motor_speed(20).unwrap();
        base.set_right_motor_speed(20).unwrap();
        base.drive().unwrap();
        base.step(1.0);
        assert_eq!(base.encoder_ticks(), EncoderTicks::new(0, 0));
    }

    #[test]
    fn test_disabled_base_does_not_move() {
        let mut base = SimulatedDriveBase::new(geometry());
        base.set_left_motor_speed(80).unwrap();
        base.set_right_motor_speed(80).unwrap();
        base.drive().unwrap();
        base.step(1.0);
        assert_eq!(base.encoder_ticks(), EncoderTicks::new(0, 0));
    }

    #[test]
    fn test_link_down_rejects_commands() {
        let mut base = enabled_base();
        base.set_link_up(false);
        assert_eq!(base.drive(), Err(SimulatedDriveError::LinkDown));
        assert_eq!(base.brake(), Err(SimulatedDriveError::LinkDown));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut base = enabled_base();
        for _ in 0..(HISTORY_LEN + 10) {
            base.update().unwrap();
        }
        assert_eq!(base.history().len(), HISTORY_LEN);
    }

    #[test]
    fn test_hardware_pose_turns_counter_clockwise_when_right_is_faster() {
        let mut base = enabled_base();
        OdometrySource::set_enabled(&mut base, true).unwrap();
        base.set_left_motor_speed(30).unwrap();
        base.set_right_motor_speed(60).unwrap();
        base.drive().unwrap();
        base.step(0.1);
        let pose = base.pose().unwrap();
        assert!(pose.theta > 0.0);
        assert!(pose.x > 0.0);
    }
}
