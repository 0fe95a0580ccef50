use parking_lot::RwLock;
use std::{sync::Arc, time::Instant};

use subsume_kinematics::{EncoderTicks, Pose};

/// Latest sensor readings, copied into every control tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    /// Cumulative wheel encoder counts; `None` when no reading arrived.
    pub encoder_ticks: Option<EncoderTicks>,
    /// Pose computed by the motor board, when it reports one.
    pub hardware_pose: Option<Pose>,
    /// Distance (m) to the nearest obstacle ahead.
    pub obstacle_range: Option<f64>,
}

#[derive(Clone)]
pub struct State {
    pub sensors: SensorSnapshot,
    pub pose: Pose,
    pub last_cmd_ts: Instant,
    pub faults: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        State {
            sensors: SensorSnapshot::default(),
            pose: Pose::default(),
            last_cmd_ts: Instant::now(),
            faults: Vec::new(),
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn sensors(bb: &Blackboard) -> SensorSnapshot {
    bb.read().sensors
}

pub fn publish_sensors(bb: &Blackboard, sensors: SensorSnapshot) {
    bb.write().sensors = sensors;
}

/// Record a completed control tick along with the pose it produced.
pub fn touch_cmd(bb: &Blackboard, pose: Pose) {
    let mut g = bb.write();
    g.pose = pose;
    g.last_cmd_ts = Instant::now();
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}

pub fn clear_fault(bb: &Blackboard, msg: &str) {
    bb.write().faults.retain(|s| s != msg);
}
