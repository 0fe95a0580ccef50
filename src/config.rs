use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use subsume_kinematics::{DriveGeometry, KinematicsError};
use subsume_motor::{DEFAULT_MOTOR_DEAD_ZONE, DEFAULT_VIRTUAL_DEAD_ZONE, DriveError, SpeedShaping};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variables with this prefix override file values, with `__`
/// between nested keys: `SUBSUME_CONTROL__PERIOD_MS=20`.
pub const ENV_PREFIX: &str = "SUBSUME";

/// Load the robot configuration from `path`, then apply environment overrides.
pub fn load_config(path: &str) -> Result<RobotConfig, ConfigError> {
    Config::builder()
        .add_source(File::new(path, FileFormat::Toml).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub geometry: GeometryConfig,
    pub shaping: ShapingConfig,
    pub control: ControlConfig,
    pub behaviors: BehaviorsConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub wheel_radius: f64,
    pub wheel_base: f64,
    pub encoder_ticks_per_revolution: u32,
    pub speed_to_velocity_factor: f64,
    pub turn_to_omega_factor: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig {
            wheel_radius: 0.03,
            wheel_base: 0.15,
            encoder_ticks_per_revolution: 36,
            speed_to_velocity_factor: 0.01,
            turn_to_omega_factor: 0.05,
        }
    }
}

impl GeometryConfig {
    pub fn build(&self) -> Result<DriveGeometry, KinematicsError> {
        DriveGeometry::new(
            self.wheel_radius,
            self.wheel_base,
            self.encoder_ticks_per_revolution,
            self.speed_to_velocity_factor,
            self.turn_to_omega_factor,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    pub virtual_dead_zone: f64,
    pub motor_dead_zone: f64,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        ShapingConfig {
            virtual_dead_zone: DEFAULT_VIRTUAL_DEAD_ZONE,
            motor_dead_zone: DEFAULT_MOTOR_DEAD_ZONE,
        }
    }
}

impl ShapingConfig {
    pub fn build(&self) -> Result<SpeedShaping, DriveError> {
        SpeedShaping::new(self.virtual_dead_zone, self.motor_dead_zone)
    }
}

/// Where the controller takes its pose from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseSource {
    /// Integrate wheel encoder ticks on the host.
    #[default]
    Encoders,
    /// Use the pose the motor board computes itself.
    Hardware,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub period_ms: u64,
    pub watchdog_timeout_ms: u64,
    pub max_task_depth: usize,
    /// Larger per-cycle encoder jumps are treated as a counter reset.
    pub max_tick_delta: Option<u64>,
    pub pose_source: PoseSource,
    pub pose_topic_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            period_ms: 50,
            watchdog_timeout_ms: 250,
            max_task_depth: subsume_behavior::DEFAULT_MAX_DEPTH,
            max_tick_delta: Some(1_000),
            pose_source: PoseSource::Encoders,
            pose_topic_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BehaviorsConfig {
    pub escape: EscapeConfig,
    pub cruise: CruiseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscapeConfig {
    pub enabled: bool,
    /// Obstacle range (m) that triggers an escape.
    pub obstacle_threshold: f64,
    pub back_off_velocity: f64,
    pub back_off_ticks: u32,
    pub spin_omega: f64,
    pub spin_ticks: u32,
}

impl Default for EscapeConfig {
    fn default() -> Self {
        EscapeConfig {
            enabled: true,
            obstacle_threshold: 0.25,
            back_off_velocity: 0.3,
            back_off_ticks: 10,
            spin_omega: 2.5,
            spin_ticks: 12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CruiseConfig {
    pub enabled: bool,
    pub velocity: f64,
}

impl Default for CruiseConfig {
    fn default() -> Self {
        CruiseConfig {
            enabled: true,
            velocity: 0.4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Half the side of the square arena the simulated robot drives in.
    pub arena_half_width: f64,
    pub sensor_period_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            arena_half_width: 1.5,
            sensor_period_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}
