//! Wheel-encoder odometry.
//!
//! [`DifferentialDriveOdometry`] turns successive encoder readings into a
//! [`Displacement`]: net forward travel of the robot center plus half of the
//! heading change. Applying the displacement projects the travel along the
//! mid-turn heading, which keeps curved segments accurate to second order.

use core::fmt;
use libm::{cos, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::PoseSink;
use crate::geometry::DriveGeometry;

/// Cumulative encoder tick counts for both wheels.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderTicks {
    /// Left wheel tick count.
    pub left: i64,
    /// Right wheel tick count.
    pub right: i64,
}

impl EncoderTicks {
    /// Construct a tick reading.
    pub const fn new(left: i64, right: i64) -> Self {
        EncoderTicks { left, right }
    }
}

impl From<[i64; 2]> for EncoderTicks {
    fn from(ticks: [i64; 2]) -> Self {
        EncoderTicks::new(ticks[0], ticks[1])
    }
}

/// Motion of the robot over one odometry update.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Displacement {
    /// Signed forward travel of the robot center (m).
    pub d_center: f64,
    /// Half of the heading change (rad).
    pub half_phi: f64,
}

impl Displacement {
    /// No motion.
    pub const ZERO: Displacement = Displacement { d_center: 0.0, half_phi: 0.0 };

    /// Construct a displacement.
    pub const fn new(d_center: f64, half_phi: f64) -> Self {
        Displacement { d_center, half_phi }
    }

    /// Returns `true` when there was no motion.
    pub fn is_zero(&self) -> bool {
        self.d_center == 0.0 && self.half_phi == 0.0
    }

    /// Total heading change (rad).
    pub fn phi(&self) -> f64 {
        2.0 * self.half_phi
    }

    /// Apply this displacement to a pose.
    ///
    /// Translation runs along `θ + halfPhi` and happens before the rotation by
    /// `2 · halfPhi`. Swapping the order, or using the pre- or post-turn
    /// heading, changes the result on curved paths.
    pub fn apply_to<P: PoseSink + ?Sized>(&self, pose: &mut P) {
        if self.is_zero() {
            return;
        }
        let theta_mid = pose.theta() + self.half_phi;
        pose.translate(self.d_center * cos(theta_mid), self.d_center * sin(theta_mid));
        pose.rotate(self.phi());
    }
}

impl fmt::Display for Displacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(dC: {:.4} m, φ/2: {:.4} rad)", self.d_center, self.half_phi)
    }
}

/// Integrates encoder tick deltas into displacements.
#[derive(Debug, Clone)]
pub struct DifferentialDriveOdometry {
    meters_per_tick: f64,
    wheel_base: f64,
    /// `None` until the first reading seeds the baseline.
    last_ticks: Option<EncoderTicks>,
    max_tick_delta: Option<u64>,
    discontinuities: u32,
}

impl DifferentialDriveOdometry {
    /// Create an odometry integrator for the given geometry.
    ///
    /// No jump bound is set: any first reading, `[0, 0]` included, becomes
    /// the baseline and every later delta is integrated as motion. A source
    /// that reports zeros before its first real count should be paired with
    /// [`with_max_tick_delta`](Self::with_max_tick_delta) so the jump to the
    /// real count is rejected instead of integrated.
    pub fn new(geometry: &DriveGeometry) -> Self {
        DifferentialDriveOdometry {
            meters_per_tick: geometry.meters_per_tick(),
            wheel_base: geometry.wheel_base(),
            last_ticks: None,
            max_tick_delta: None,
            discontinuities: 0,
        }
    }

    /// Treat a per-update jump larger than `max` ticks on either wheel as an
    /// encoder discontinuity rather than motion.
    pub fn with_max_tick_delta(mut self, max: u64) -> Self {
        self.max_tick_delta = Some(max);
        self
    }

    /// Returns `true` until a reading has seeded the baseline.
    pub fn is_awaiting_baseline(&self) -> bool {
        self.last_ticks.is_none()
    }

    /// Last reading used as the baseline, if any.
    pub fn baseline(&self) -> Option<EncoderTicks> {
        self.last_ticks
    }

    /// Number of readings rejected as discontinuities since construction.
    pub fn discontinuities(&self) -> u32 {
        self.discontinuities
    }

    /// Process a new cumulative tick reading.
    ///
    /// The first reading after construction or [`reset`](Self::reset) only
    /// seeds the baseline and yields [`Displacement::ZERO`]. A reading that
    /// jumps further than the configured maximum re-seeds the baseline,
    /// counts a discontinuity and also yields zero.
    pub fn process(&mut self, ticks: EncoderTicks) -> Displacement {
        let Some(last) = self.last_ticks else {
            self.last_ticks = Some(ticks);
            return Displacement::ZERO;
        };

        let delta_left = ticks.left.wrapping_sub(last.left);
        let delta_right = ticks.right.wrapping_sub(last.right);
        if delta_left == 0 && delta_right == 0 {
            return Displacement::ZERO;
        }

        self.last_ticks = Some(ticks);

        if let Some(max) = self.max_tick_delta {
            if delta_left.unsigned_abs() > max || delta_right.unsigned_abs() > max {
                self.discontinuities = self.discontinuities.saturating_add(1);
                return Displacement::ZERO;
            }
        }

        let distance_left = delta_left as f64 * self.meters_per_tick;
        let distance_right = delta_right as f64 * self.meters_per_tick;

        Displacement {
            d_center: (distance_left + distance_right) / 2.0,
            half_phi: (distance_left - distance_right) / (2.0 * self.wheel_base),
        }
    }

    /// Process a reading that may be missing this cycle.
    ///
    /// A missing reading is no motion; the baseline is left untouched.
    pub fn process_reading(&mut self, ticks: Option<EncoderTicks>) -> Displacement {
        match ticks {
            Some(ticks) => self.process(ticks),
            None => Displacement::ZERO,
        }
    }

    /// Forget the baseline so the next reading re-seeds it.
    pub fn reset(&mut self) {
        self.last_ticks = None;
    }
}
