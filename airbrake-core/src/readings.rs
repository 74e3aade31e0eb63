//! Validated per-device readings, as published by the sensor producer
//! tasks. The core never performs bus I/O; it only consumes these.
//!
//! Frames and units:
//! - Earth frame: ENU, +Z up, for all vertical quantities.
//! - Body frame: +X forward (nose), +Y right, +Z down.
//! - Quaternion: (w, x, y, z), body -> earth.

use libm::powf;

/// External barometer snapshot (BMP390-class).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaroReading {
    /// Temperature (C).
    pub temperature_c: f32,
    /// Pressure (Pa).
    pub pressure_pa: f32,
    /// Altitude above MSL (m), from the barometric formula.
    pub altitude_m: f32,
    /// True if the last device read succeeded.
    pub valid: bool,
}

impl BaroReading {
    pub const fn new() -> Self {
        Self {
            temperature_c: 0.0,
            pressure_pa: 0.0,
            altitude_m: 0.0,
            valid: false,
        }
    }
}

/// Primary IMU snapshot: quaternion attitude plus internal barometer.
/// The quaternion is the authoritative attitude source.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuAReading {
    /// Orientation quaternion (w, x, y, z), body -> earth.
    pub quat: [f32; 4],
    /// Acceleration (g), body frame.
    pub accel_g: [f32; 3],
    /// Internal baro pressure (Pa).
    pub pressure_pa: f32,
    /// Internal baro altitude above MSL (m).
    pub altitude_m: f32,
    /// True if the last device read succeeded.
    pub valid: bool,
}

impl ImuAReading {
    pub const fn new() -> Self {
        Self {
            quat: [1.0, 0.0, 0.0, 0.0],
            accel_g: [0.0; 3],
            pressure_pa: 0.0,
            altitude_m: 0.0,
            valid: false,
        }
    }
}

impl Default for ImuAReading {
    // Keeps the identity quaternion; a derived all-zero quat would be
    // degenerate.
    fn default() -> Self {
        Self::new()
    }
}

/// Secondary IMU snapshot: raw accel/gyro, already rotated into the body
/// frame by its producer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuBReading {
    /// Acceleration (g), body frame.
    pub accel_g: [f32; 3],
    /// Angular rate (deg/s), body frame.
    pub gyro_dps: [f32; 3],
    /// Die temperature (C).
    pub temp_c: f32,
    /// True if the last device read succeeded.
    pub valid: bool,
}

impl ImuBReading {
    pub const fn new() -> Self {
        Self {
            accel_g: [0.0; 3],
            gyro_dps: [0.0; 3],
            temp_c: 0.0,
            valid: false,
        }
    }
}

/// Errors surfaced by sensor producer drivers.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    BusError,
    InvalidData,
    DataNotReady,
    DeviceMissing,
    Timeout,
}

/// Standard barometric formula: pressure (Pa) to altitude above MSL (m)
/// for a given sea-level reference (hPa).
pub fn pressure_to_altitude_m(pressure_pa: f32, sea_level_hpa: f32) -> f32 {
    44330.0 * (1.0 - powf(pressure_pa / (sea_level_hpa * 100.0), 0.190_3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_altitude_at_sea_level_reference() {
        let alt = pressure_to_altitude_m(101_200.0, 1012.0);
        assert!(alt.abs() < 0.01, "alt = {alt}");
    }

    #[test]
    fn test_altitude_decreases_with_pressure() {
        let lo = pressure_to_altitude_m(101_200.0, 1012.0);
        let hi = pressure_to_altitude_m(90_000.0, 1012.0);
        assert!(hi > lo + 900.0, "hi = {hi}, lo = {lo}");
    }
}
