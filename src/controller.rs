//! One control cycle: odometry, behavior arbitration and the drive command.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use subsume_behavior::{DispatchError, SubsumptionTaskDispatcher, Task};
use subsume_kinematics::{DifferentialDriveOdometry, DriveInputs, Pose};
use subsume_motor::{DifferentialDrive, DriveCommandSink, OdometrySource};

use crate::blackboard::SensorSnapshot;

struct Claim {
    owner: String,
    inputs: DriveInputs,
}

/// What behaviors see on every tick.
///
/// Behaviors are resumed in priority order and the first one to claim the
/// drive wins; later claims in the same tick are ignored.
pub struct ControlContext {
    pub sensors: SensorSnapshot,
    pub pose: Pose,
    claim: Option<Claim>,
}

impl ControlContext {
    pub fn new(sensors: SensorSnapshot, pose: Pose) -> Self {
        ControlContext {
            sensors,
            pose,
            claim: None,
        }
    }

    /// Request `inputs` for this tick. Returns whether the claim won.
    pub fn claim_drive(&mut self, owner: &str, inputs: DriveInputs) -> bool {
        if self.is_drive_claimed() {
            return false;
        }
        self.claim = Some(Claim {
            owner: owner.to_string(),
            inputs,
        });
        true
    }

    pub fn is_drive_claimed(&self) -> bool {
        self.claim.is_some()
    }

    pub fn claimed_inputs(&self) -> Option<DriveInputs> {
        self.claim.as_ref().map(|c| c.inputs)
    }

    pub fn claimant(&self) -> Option<&str> {
        self.claim.as_ref().map(|c| c.owner.as_str())
    }

    /// True when an obstacle is reported closer than `threshold`.
    pub fn obstacle_within(&self, threshold: f64) -> bool {
        self.sensors.obstacle_range.is_some_and(|range| range < threshold)
    }
}

/// Outcome of one control tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub pose: Pose,
    /// Whether any behavior chain is still running.
    pub active: bool,
    pub claimant: Option<String>,
    pub inputs: DriveInputs,
    /// Whether new motor speeds went out.
    pub transmitted: bool,
}

pub struct RobotController<S, O> {
    dispatcher: SubsumptionTaskDispatcher<ControlContext>,
    drive: DifferentialDrive<S, O>,
    odometry: DifferentialDriveOdometry,
    pose: Pose,
    claimant: Option<String>,
    discontinuities: u32,
}

impl<S: DriveCommandSink, O: OdometrySource> RobotController<S, O> {
    pub fn new(
        dispatcher: SubsumptionTaskDispatcher<ControlContext>,
        drive: DifferentialDrive<S, O>,
        odometry: DifferentialDriveOdometry,
    ) -> Self {
        RobotController {
            dispatcher,
            drive,
            odometry,
            pose: Pose::default(),
            claimant: None,
            discontinuities: 0,
        }
    }

    pub fn dispatch(&mut self, task: Box<dyn Task<ControlContext>>) -> Result<(), DispatchError> {
        self.dispatcher.dispatch(task)
    }

    pub fn dispatcher(&self) -> &SubsumptionTaskDispatcher<ControlContext> {
        &self.dispatcher
    }

    /// Run one control cycle against `sensors`.
    pub fn tick(&mut self, sensors: SensorSnapshot) -> anyhow::Result<TickReport> {
        self.update_pose(&sensors);

        let mut ctx = ControlContext::new(sensors, self.pose);
        let active = self
            .dispatcher
            .process(&mut ctx)
            .context("behavior dispatch failed")?;

        let inputs = ctx.claimed_inputs().unwrap_or(DriveInputs::STOP);
        let claimant = ctx.claimant().map(str::to_string);
        if claimant != self.claimant {
            match &claimant {
                Some(owner) => info!(behavior = %owner, "Behavior took the drive"),
                None => info!("No behavior claimed the drive, stopping"),
            }
            self.claimant = claimant.clone();
        }

        self.drive.set_inputs(inputs);
        let transmitted = self.drive.drive().context("drive command failed")?;

        Ok(TickReport {
            pose: self.pose,
            active,
            claimant,
            inputs,
            transmitted,
        })
    }

    /// Forward an operator command. `enable` and `disable` also switch the
    /// drive; every command reaches every registered behavior.
    pub fn command(&mut self, command: &str) -> anyhow::Result<()> {
        match command {
            "enable" => self.drive.set_enabled(true)?,
            "disable" => self.drive.set_enabled(false)?,
            _ => {}
        }
        self.dispatcher.control_device_command(command);
        Ok(())
    }

    pub fn stop(&mut self) -> anyhow::Result<()> {
        self.drive.stop().context("stopping drive")
    }

    /// Close every behavior, then stop and disable the drive.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        self.dispatcher.close();
        self.drive.stop().context("stopping drive")?;
        self.drive.set_enabled(false).context("disabling drive")
    }

    fn update_pose(&mut self, sensors: &SensorSnapshot) {
        if let Some(pose) = sensors.hardware_pose {
            self.pose = pose;
            return;
        }

        let displacement = self.odometry.process_reading(sensors.encoder_ticks);
        let discontinuities = self.odometry.discontinuities();
        if discontinuities != self.discontinuities {
            warn!(
                ticks = ?sensors.encoder_ticks,
                total = discontinuities,
                "Encoder discontinuity, odometry re-seeded"
            );
            self.discontinuities = discontinuities;
        }
        if !displacement.is_zero() {
            displacement.apply_to(&mut self.pose);
            debug!(pose = %self.pose, "Pose updated");
        }
    }
}

/// Shared access to a value from the control thread and the async side.
///
/// The control thread only ever `try_run`s: if the async side holds the lock
/// the tick is dropped and counted, never queued.
pub struct TickGate<T> {
    inner: Arc<Mutex<T>>,
    skipped: Arc<AtomicU64>,
}

impl<T> Clone for TickGate<T> {
    fn clone(&self) -> Self {
        TickGate {
            inner: Arc::clone(&self.inner),
            skipped: Arc::clone(&self.skipped),
        }
    }
}

impl<T> TickGate<T> {
    pub fn new(value: T) -> Self {
        TickGate {
            inner: Arc::new(Mutex::new(value)),
            skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `f` if the lock is free right now.
    pub fn try_run<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self.inner.try_lock() {
            Some(mut guard) => Some(f(&mut guard)),
            None => {
                let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(skipped, "Tick overlapped a command, dropped");
                None
            }
        }
    }

    /// Run `f`, waiting for the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}
