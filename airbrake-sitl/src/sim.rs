//! Point-mass flight model producing synthetic sensor readings.
//!
//! Just enough dynamics to exercise the whole core: a pad phase, a
//! boost with fixed net thrust, drag-limited coast, and ballistic
//! descent. Deterministic sensor jitter comes from a small LCG so runs
//! are reproducible.

use libm::{cosf, powf, sinf};

use airbrake_core::attitude::RAD_PER_DEG;
use airbrake_core::{BaroReading, ImuAReading, ImuBReading, G0_MPS2};

pub struct SimConfig {
    /// Wall time on the pad before ignition (s).
    pub pad_s: f32,
    /// Net upward acceleration during the burn, gravity excluded (m/s^2).
    pub thrust_mps2: f32,
    /// Burn duration (s).
    pub burn_s: f32,
    /// Quadratic drag coefficient (1/m).
    pub drag_k: f32,
    /// Constant tilt of the airframe from vertical (deg).
    pub tilt_deg: f32,
    /// Field elevation above MSL (m).
    pub field_elevation_m: f32,
    /// Ground temperature (C).
    pub ground_temp_c: f32,
    /// Sea-level reference (hPa).
    pub sea_level_hpa: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pad_s: 12.0,
            thrust_mps2: 150.0,
            burn_s: 3.0,
            drag_k: 0.000_5,
            tilt_deg: 3.0,
            field_elevation_m: 120.0,
            ground_temp_c: 15.0,
            sea_level_hpa: 1012.0,
        }
    }
}

/// One set of synthetic readings for a tick.
pub struct SimReadings {
    pub baro: BaroReading,
    pub imu_a: ImuAReading,
    pub imu_b: ImuBReading,
}

pub struct FlightSim {
    config: SimConfig,
    /// Altitude above the field (m).
    z_m: f32,
    vz_mps: f32,
    landed: bool,
    rng: u32,
}

impl FlightSim {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            z_m: 0.0,
            vz_mps: 0.0,
            landed: false,
            rng: 0x2F6E_2B1,
        }
    }

    pub fn altitude_agl_m(&self) -> f32 {
        self.z_m
    }

    /// Small deterministic jitter in [-1, 1].
    fn noise(&mut self) -> f32 {
        self.rng = self.rng.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.rng >> 16) as f32 / 32_768.0 - 1.0
    }

    /// Net vertical acceleration excluding gravity (what an ideal
    /// accelerometer chain would recover as az_earth).
    fn specific_accel(&self, t_s: f32) -> f32 {
        let cfg = &self.config;
        let burn_end = cfg.pad_s + cfg.burn_s;
        let mut a = 0.0;
        if (cfg.pad_s..burn_end).contains(&t_s) {
            a += cfg.thrust_mps2;
        }
        // Drag always opposes motion.
        a -= cfg.drag_k * self.vz_mps * self.vz_mps * self.vz_mps.signum();
        a
    }

    /// Advance the model by `dt_s` and sample every sensor.
    pub fn step(&mut self, t_s: f32, dt_s: f32) -> SimReadings {
        let cfg_tilt = self.config.tilt_deg;
        let on_pad = t_s < self.config.pad_s || self.landed;

        let az = if on_pad {
            0.0
        } else {
            let a = self.specific_accel(t_s) - G0_MPS2;
            self.vz_mps += a * dt_s;
            self.z_m += self.vz_mps * dt_s;
            if self.z_m <= 0.0 && self.vz_mps < 0.0 {
                self.z_m = 0.0;
                self.vz_mps = 0.0;
                self.landed = true;
            }
            self.specific_accel(t_s) - G0_MPS2
        };

        // Nose-up attitude with a constant lean: rotate about Y so body
        // +X maps to (90 - tilt) above the horizon.
        let half = -(90.0 - cfg_tilt) * RAD_PER_DEG * 0.5;
        let quat = [cosf(half), 0.0, sinf(half), 0.0];

        // Specific force in the earth frame is (az + g) on Z; fold it
        // back into the body frame through the conjugate rotation.
        let f_earth = [0.0, 0.0, (az + G0_MPS2) / G0_MPS2];
        let conj = [quat[0], -quat[1], -quat[2], -quat[3]];
        let accel_body = airbrake_core::attitude::rotate_vec(&conj, &f_earth);

        let alt_msl = self.config.field_elevation_m + self.z_m;
        let pressure_pa = self.pressure_at(alt_msl);
        // Standard lapse rate for the ambient temperature aloft.
        let temp_c = self.config.ground_temp_c - 0.0065 * self.z_m;

        let baro_noise = self.noise() * 0.3;
        let imu_alt_noise = self.noise() * 0.5;

        SimReadings {
            baro: BaroReading {
                temperature_c: temp_c,
                pressure_pa,
                altitude_m: alt_msl + baro_noise,
                valid: true,
            },
            imu_a: ImuAReading {
                quat,
                accel_g: accel_body,
                pressure_pa,
                altitude_m: alt_msl + 2.0 + imu_alt_noise,
                valid: true,
            },
            imu_b: ImuBReading {
                accel_g: accel_body,
                gyro_dps: [0.0, 0.0, 0.0],
                temp_c: temp_c + 5.0,
                valid: true,
            },
        }
    }

    fn pressure_at(&self, alt_msl_m: f32) -> f32 {
        self.config.sea_level_hpa * 100.0 * powf(1.0 - alt_msl_m / 44_330.0, 1.0 / 0.190_3)
    }
}
