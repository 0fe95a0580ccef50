//! Angle normalization and unit conversion.

use core::f64::consts::PI;

/// Normalize an angle in degrees to `[0, 360)`.
pub fn normalize_degrees(angle: f64) -> f64 {
    let a = angle % 360.0;
    let a = if a < 0.0 { a + 360.0 } else { a };
    // a tiny negative remainder rounds up to exactly 360 when shifted
    if a >= 360.0 { 0.0 } else { a }
}

/// Normalize an angle in degrees to `[-180, 180)`.
///
/// `180` maps to `-180`.
pub fn normalize_degrees_signed(angle: f64) -> f64 {
    let a = normalize_degrees(angle);
    if a >= 180.0 { a - 360.0 } else { a }
}

/// Normalize an angle in radians to `[-PI, PI)`.
///
/// Angles at `PI` will be normalized to `-PI`.
pub fn normalize_radians(angle: f64) -> f64 {
    let a = angle % (2.0 * PI);
    if a >= PI {
        a - 2.0 * PI
    } else if a < -PI {
        let shifted = a + 2.0 * PI;
        if shifted >= PI { -PI } else { shifted }
    } else {
        a
    }
}

/// Convert degrees to radians.
pub fn to_radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

/// Convert radians to degrees.
pub fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / PI
}
