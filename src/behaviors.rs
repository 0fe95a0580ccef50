//! Example behaviors, highest priority first: [`Escape`] then [`Cruise`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use subsume_behavior::{Routine, Step, Task, TaskError};
use subsume_kinematics::DriveInputs;

use crate::config::{CruiseConfig, EscapeConfig};
use crate::controller::ControlContext;

type Ctx = ControlContext;

/// A fixed drive command held for a number of ticks.
#[derive(Debug, Clone)]
pub struct Maneuver {
    name: &'static str,
    inputs: DriveInputs,
    ticks: u32,
}

impl Maneuver {
    pub fn new(name: &'static str, inputs: DriveInputs, ticks: u32) -> Self {
        Maneuver { name, inputs, ticks }
    }

    /// Reverse straight back.
    pub fn back_off(velocity: f64, ticks: u32) -> Self {
        Maneuver::new("back_off", DriveInputs::new(-velocity.abs(), 0.0), ticks)
    }

    /// Turn on the spot, counter-clockwise for positive `omega`.
    pub fn spin(omega: f64, ticks: u32) -> Self {
        Maneuver::new("spin", DriveInputs::new(0.0, omega), ticks)
    }
}

impl Task<Ctx> for Maneuver {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&mut self) -> Box<dyn Routine<Ctx>> {
        let Maneuver { name, inputs, ticks } = self.clone();
        let mut remaining = ticks;
        Box::new(move |ctx: &mut Ctx| -> Result<Step<Ctx>, TaskError> {
            if remaining == 0 {
                return Ok(Step::Done);
            }
            remaining -= 1;
            ctx.claim_drive(name, inputs);
            Ok(Step::Continue)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapePhase {
    Watching,
    BackedOff,
}

/// Backs away from a close obstacle and turns before handing the drive back.
///
/// Watches the obstacle range every tick without claiming the drive. Once
/// something is closer than the threshold it delegates to a `back_off`
/// maneuver and, when that is exhausted, to a `spin`.
#[derive(Debug, Clone)]
pub struct Escape {
    config: EscapeConfig,
}

impl Escape {
    pub fn new(config: EscapeConfig) -> Self {
        Escape { config }
    }
}

impl Task<Ctx> for Escape {
    fn name(&self) -> &str {
        "escape"
    }

    fn execute(&mut self) -> Box<dyn Routine<Ctx>> {
        let config = self.config.clone();
        let mut phase = EscapePhase::Watching;
        Box::new(move |ctx: &mut Ctx| -> Result<Step<Ctx>, TaskError> {
            match phase {
                EscapePhase::Watching => {
                    if !ctx.obstacle_within(config.obstacle_threshold) {
                        return Ok(Step::Continue);
                    }
                    info!(
                        range = ?ctx.sensors.obstacle_range,
                        pose = %ctx.pose,
                        "Obstacle ahead, escaping"
                    );
                    phase = EscapePhase::BackedOff;
                    Ok(Step::delegate(Maneuver::back_off(
                        config.back_off_velocity,
                        config.back_off_ticks,
                    )))
                }
                EscapePhase::BackedOff => {
                    phase = EscapePhase::Watching;
                    Ok(Step::delegate(Maneuver::spin(config.spin_omega, config.spin_ticks)))
                }
            }
        })
    }
}

/// Drives forward at a constant velocity unless paused by the operator.
///
/// Commands: `stop` pauses, `go` resumes.
#[derive(Debug)]
pub struct Cruise {
    velocity: f64,
    paused: Arc<AtomicBool>,
}

impl Cruise {
    pub fn new(config: &CruiseConfig) -> Self {
        Cruise {
            velocity: config.velocity,
            paused: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Task<Ctx> for Cruise {
    fn name(&self) -> &str {
        "cruise"
    }

    fn execute(&mut self) -> Box<dyn Routine<Ctx>> {
        let paused = Arc::clone(&self.paused);
        let inputs = DriveInputs::new(self.velocity, 0.0);
        Box::new(move |ctx: &mut Ctx| -> Result<Step<Ctx>, TaskError> {
            if !paused.load(Ordering::Relaxed) {
                ctx.claim_drive("cruise", inputs);
            }
            Ok(Step::Continue)
        })
    }

    fn on_command(&mut self, command: &str) {
        match command {
            "stop" => {
                if !self.paused.swap(true, Ordering::Relaxed) {
                    info!("Cruise paused");
                }
            }
            "go" => {
                if self.paused.swap(false, Ordering::Relaxed) {
                    info!("Cruise resumed");
                }
            }
            _ => {}
        }
    }
}
