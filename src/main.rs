mod behaviors;
mod blackboard;
mod bus;
mod config;
mod controller;
mod simulation;

use anyhow::Context;
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use subsume_behavior::{DispatcherConfig, SubsumptionTaskDispatcher};
use subsume_kinematics::{DifferentialDriveOdometry, Pose};
use subsume_motor::{DifferentialDrive, SimulatedDriveBase};

use behaviors::{Cruise, Escape};
use blackboard::{Blackboard, clear_fault, raise_fault, snapshot, touch_cmd};
use bus::Topic;
use config::RobotConfig;
use controller::{RobotController, TickGate};
use simulation::Arena;

type Controller = RobotController<SimulatedDriveBase, SimulatedDriveBase>;

const WATCHDOG_FAULT: &str = "control tick timeout";
const TICK_FAULT: &str = "control tick failed";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config(config::DEFAULT_CONFIG_PATH)
        .with_context(|| format!("loading {}", config::DEFAULT_CONFIG_PATH))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    info!(?cfg, "Subsume robot starting.");

    let bb: Blackboard = Arc::default();
    let pose_topic: Topic<Pose> = Topic::new("pose", cfg.control.pose_topic_capacity);
    let running = Arc::new(AtomicBool::new(true));

    let (gate, base) = build_controller(&cfg)?;

    info!("Spawning sensor thread...");
    let sensor = simulation::spawn_sensor_thread(
        base,
        Arena {
            half_width: cfg.simulation.arena_half_width,
        },
        cfg.control.pose_source,
        Duration::from_millis(cfg.simulation.sensor_period_ms),
        Arc::clone(&bb),
        Arc::clone(&running),
    )?;

    info!("Spawning control thread...");
    let control = spawn_control_thread(
        gate.clone(),
        Duration::from_millis(cfg.control.period_ms),
        Arc::clone(&bb),
        pose_topic.clone(),
        Arc::clone(&running),
    )?;

    let timeout = Duration::from_millis(cfg.control.watchdog_timeout_ms);
    let result = tokio::select! {
        r = operator_console(gate.clone()) => r,
        r = watchdog(bb.clone(), gate.clone(), timeout) => r,
        r = pose_logger(pose_topic.clone()) => r,
    };
    if let Err(e) = &result {
        error!(error = %e, "Async task failed, shutting down.");
    }

    running.store(false, Ordering::Relaxed);
    join(control);
    join(sensor);

    let finished = gate.with(|c| c.dispatcher().stats());
    gate.with(|c| c.shutdown()).context("shutting down controller")?;
    info!(ticks = finished.ticks, finished = finished.finished, faulted = finished.faulted, "Behaviors closed.");
    let state = snapshot(&bb);
    info!(skipped_ticks = gate.skipped(), pose = %state.pose, faults = ?state.faults, "Subsume robot stopped.");
    result
}

fn build_controller(cfg: &RobotConfig) -> anyhow::Result<(TickGate<Controller>, SimulatedDriveBase)> {
    let geometry = cfg.geometry.build().context("invalid drive geometry")?;
    let shaping = cfg.shaping.build().context("invalid speed shaping")?;
    info!(%geometry, "Drive geometry loaded.");

    let base = SimulatedDriveBase::new(geometry).with_motor_dead_zone(shaping.motor_dead_zone());
    let mut drive = DifferentialDrive::new(geometry, base.clone())
        .with_shaping(shaping)
        .with_odometry_source(base.clone());
    drive.set_enabled(true).context("enabling drive")?;

    let mut odometry = DifferentialDriveOdometry::new(&geometry);
    if let Some(max) = cfg.control.max_tick_delta {
        odometry = odometry.with_max_tick_delta(max);
    }

    let dispatcher = SubsumptionTaskDispatcher::new(DispatcherConfig {
        max_depth: cfg.control.max_task_depth,
    });
    let mut controller = RobotController::new(dispatcher, drive, odometry);

    // registration order is priority order
    if cfg.behaviors.escape.enabled {
        controller.dispatch(Box::new(Escape::new(cfg.behaviors.escape.clone())))?;
    }
    if cfg.behaviors.cruise.enabled {
        controller.dispatch(Box::new(Cruise::new(&cfg.behaviors.cruise)))?;
    }

    Ok((TickGate::new(controller), base))
}

fn spawn_control_thread(
    gate: TickGate<Controller>,
    period: Duration,
    bb: Blackboard,
    pose_topic: Topic<Pose>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("control".into()).spawn(move || {
        info!(?period, "Control thread started.");
        let sleeper = SpinSleeper::new(1_000);
        let mut deadline = Instant::now();
        let mut idle_reported = false;
        while running.load(Ordering::Relaxed) {
            let sensors = blackboard::sensors(&bb);
            match gate.try_run(|c| c.tick(sensors)) {
                Some(Ok(report)) => {
                    if report.transmitted {
                        debug!(behavior = ?report.claimant, inputs = %report.inputs, "Drive command sent.");
                    }
                    touch_cmd(&bb, report.pose);
                    clear_fault(&bb, TICK_FAULT);
                    pose_topic.publish(report.pose);
                    if !report.active && !idle_reported {
                        info!("All behaviors finished, holding stop.");
                    }
                    idle_reported = !report.active;
                }
                Some(Err(e)) => {
                    error!(error = %format!("{e:#}"), "Control tick failed.");
                    raise_fault(&bb, TICK_FAULT);
                }
                None => {}
            }

            // fixed rate; an overrun restarts the schedule
            deadline += period;
            let now = Instant::now();
            if deadline > now {
                sleeper.sleep(deadline - now);
            } else {
                deadline = now;
            }
        }
        info!("Control thread stopped.");
    })
}

/// Forward stdin lines to the controller until `quit` or end of input.
async fn operator_console(gate: TickGate<Controller>) -> anyhow::Result<()> {
    info!("Operator console ready: stop, go, enable, disable, quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let command = line.trim();
        match command {
            "" => continue,
            "quit" | "exit" => {
                info!("Quit requested.");
                return Ok(());
            }
            _ => {
                info!(command, "Operator command.");
                gate.with(|c| c.command(command))?;
            }
        }
    }
    info!("Stdin closed.");
    Ok(())
}

/// Stop the drive when the control loop has not completed a tick within
/// `timeout`. A stop the drive rejects is retried every interval.
async fn watchdog(bb: Blackboard, gate: TickGate<Controller>, timeout: Duration) -> anyhow::Result<()> {
    info!(?timeout, "Watchdog task started.");
    let mut tick = tokio::time::interval(timeout / 4);
    let mut timed_out = false;
    let mut stopped = false;
    loop {
        tick.tick().await;
        let last_cmd_ts = snapshot(&bb).last_cmd_ts;
        let age = last_cmd_ts.elapsed();
        if age > timeout {
            if !timed_out {
                warn!(?age, last_cmd_ts = ?last_cmd_ts, "Control tick timeout! Stopping drive.");
                raise_fault(&bb, WATCHDOG_FAULT);
                timed_out = true;
            }
            if !stopped {
                stopped = stop_drive(&gate);
            }
        } else if timed_out {
            info!("Control ticks resumed.");
            clear_fault(&bb, WATCHDOG_FAULT);
            timed_out = false;
            stopped = false;
        }
    }
}

fn stop_drive(gate: &TickGate<Controller>) -> bool {
    match gate.with(|c| c.stop()) {
        Ok(()) => true,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Watchdog could not stop the drive.");
            false
        }
    }
}

async fn pose_logger(topic: Topic<Pose>) -> anyhow::Result<()> {
    let mut rx = topic.subscribe();
    loop {
        match rx.recv().await {
            Ok(pose) => debug!(topic = topic.name(), %pose, "Pose"),
            Err(RecvError::Lagged(missed)) => warn!(missed, "Pose logger lagging."),
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

fn join(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    if handle.join().is_err() {
        error!(thread = %name, "Thread panicked.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_drive_reports_a_dead_link() {
        let (gate, base) = build_controller(&RobotConfig::default()).unwrap();
        base.set_link_up(false);
        assert!(!stop_drive(&gate));
        base.set_link_up(true);
        assert!(stop_drive(&gate));
    }

    #[tokio::test]
    async fn test_watchdog_survives_a_failed_stop() {
        let (gate, base) = build_controller(&RobotConfig::default()).unwrap();
        base.set_link_up(false);
        let bb: Blackboard = Arc::default();

        let run = watchdog(bb.clone(), gate.clone(), Duration::from_millis(10));
        // still looping when the timeout expires
        assert!(tokio::time::timeout(Duration::from_millis(100), run).await.is_err());
        assert_eq!(snapshot(&bb).faults, [WATCHDOG_FAULT]);
    }
}
