//! Fusion / derivation engine.
//!
//! Recomputes the whole [`FusedAlt`] snapshot each tick from the latest
//! sensor readings: baseline capture, AGL fusion, complementary vertical
//! speed, quaternion-derived tilt and azimuth, conservative atmospherics
//! and apogee prediction. NaN is the explicit "unknown" sentinel; every
//! path propagates it rather than coercing to zero.

use libm::{cosf, fabsf, sqrtf};

use crate::attitude;
use crate::config::FusionParams;
use crate::readings::{BaroReading, ImuAReading};
use crate::G0_MPS2;

/// Fused / derived snapshot.
///
/// Units: meters, m/s, m/s^2, degrees, C, hPa. All floats are single
/// precision with NaN for "unknown".
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FusedAlt {
    /// Snapshot time (ms, local monotonic clock).
    pub stamp_ms: u32,
    /// True once baselines have been captured; AGL outputs valid after.
    pub agl_ready: bool,
    // Raw and baselined altitudes
    pub bmp_alt_m: f32,
    pub imu_alt_m: f32,
    pub agl_bmp_m: f32,
    pub agl_imu_m: f32,
    pub agl_fused_m: f32,
    // Kinematics
    /// Vertical speed from the AGL derivative, EMA-smoothed.
    pub vz_baro_mps: f32,
    /// Vertical speed from leaky accel integration.
    pub vz_acc_mps: f32,
    /// Complementary blend of the two.
    pub vz_fused_mps: f32,
    /// Earth-frame vertical acceleration, gravity removed.
    pub az_earth_mps2: f32,
    // Atmospherics
    pub temp_c: f32,
    pub press_hpa: f32,
    /// Dynamic speed of sound from current temperature.
    pub sos_mps: f32,
    /// |vz_baro| / sos, for visibility only.
    pub mach_vz: f32,
    pub sos_ground_mps: f32,
    pub sos_10kft_mps: f32,
    /// Conservative lower bound used for Mach gating.
    pub sos_min_mps: f32,
    /// Conservative Mach proxy under worst allowed tilt.
    pub mach_cons: f32,
    // Attitude
    pub yaw_deg: f32,
    pub pitch_deg: f32,
    pub roll_deg: f32,
    /// Angle between body +X and earth +Z.
    pub tilt_deg: f32,
    /// Smoothed tilt azimuth (deg, +/-180).
    pub tilt_az_deg: f32,
    /// Tilt azimuth mapped to [0, 360).
    pub tilt_az_deg360: f32,
    /// Continuous (unwrapped) tilt azimuth.
    pub tilt_az_unwrapped_deg: f32,
    // Predictors, biased early / low
    pub t_apogee_s: f32,
    pub apogee_agl_m: f32,
}

impl FusedAlt {
    pub const fn new() -> Self {
        Self {
            stamp_ms: 0,
            agl_ready: false,
            bmp_alt_m: f32::NAN,
            imu_alt_m: f32::NAN,
            agl_bmp_m: f32::NAN,
            agl_imu_m: f32::NAN,
            agl_fused_m: f32::NAN,
            vz_baro_mps: f32::NAN,
            vz_acc_mps: 0.0,
            vz_fused_mps: f32::NAN,
            az_earth_mps2: f32::NAN,
            temp_c: f32::NAN,
            press_hpa: f32::NAN,
            sos_mps: f32::NAN,
            mach_vz: f32::NAN,
            sos_ground_mps: f32::NAN,
            sos_10kft_mps: f32::NAN,
            sos_min_mps: f32::NAN,
            mach_cons: f32::NAN,
            yaw_deg: f32::NAN,
            pitch_deg: f32::NAN,
            roll_deg: f32::NAN,
            tilt_deg: f32::NAN,
            tilt_az_deg: f32::NAN,
            tilt_az_deg360: f32::NAN,
            tilt_az_unwrapped_deg: f32::NAN,
            t_apogee_s: f32::NAN,
            apogee_agl_m: f32::NAN,
        }
    }
}

impl Default for FusedAlt {
    fn default() -> Self {
        Self::new()
    }
}

/// Smoothed tilt-azimuth tracker: unit-vector EMA plus unwrap accumulator.
struct TiltAzimuth {
    have_axis: bool,
    x: f32,
    y: f32,
    have_unwrap: bool,
    prev_deg: f32,
    unwrapped_deg: f32,
}

impl TiltAzimuth {
    const fn new() -> Self {
        Self {
            have_axis: false,
            x: f32::NAN,
            y: f32::NAN,
            have_unwrap: false,
            prev_deg: 0.0,
            unwrapped_deg: 0.0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed one tick. Returns (azimuth, azimuth 0..360, unwrapped), each
    /// NaN until an axis has ever been observed.
    fn update(&mut self, params: &FusionParams, tilt_deg: f32, nose_earth: &[f32; 3]) -> (f32, f32, f32) {
        let h = sqrtf(nose_earth[0] * nose_earth[0] + nose_earth[1] * nose_earth[1]);
        let az_deg = if tilt_deg >= params.tilt_az_min_tilt_deg && h > 1e-4 {
            let hx = nose_earth[0] / h;
            let hy = nose_earth[1] / h;
            if !self.have_axis || self.x.is_nan() || self.y.is_nan() {
                self.x = hx;
                self.y = hy;
                self.have_axis = true;
            } else {
                self.x = params.tilt_az_alpha * self.x + (1.0 - params.tilt_az_alpha) * hx;
                self.y = params.tilt_az_alpha * self.y + (1.0 - params.tilt_az_alpha) * hy;
                let n = sqrtf(self.x * self.x + self.y * self.y);
                if n > 1e-6 {
                    self.x /= n;
                    self.y /= n;
                }
            }
            libm::atan2f(self.y, self.x) * attitude::DEG_PER_RAD
        } else if self.have_axis {
            // Near vertical: hold the last smoothed direction.
            libm::atan2f(self.y, self.x) * attitude::DEG_PER_RAD
        } else {
            f32::NAN
        };

        if az_deg.is_nan() {
            return (f32::NAN, f32::NAN, f32::NAN);
        }

        let az_360 = if az_deg < 0.0 { az_deg + 360.0 } else { az_deg };
        if !self.have_unwrap {
            self.prev_deg = az_deg;
            self.unwrapped_deg = az_deg;
            self.have_unwrap = true;
        } else {
            self.unwrapped_deg += attitude::wrap_delta_deg(az_deg - self.prev_deg);
            self.prev_deg = az_deg;
        }
        (az_deg, az_360, self.unwrapped_deg)
    }
}

/// Conservative speed-of-sound references, latched once from the first
/// valid barometer sample.
struct SosRefs {
    have: bool,
    ground_mps: f32,
    tenkft_mps: f32,
    min_mps: f32,
}

const GAMMA_AIR: f32 = 1.4;
const R_AIR: f32 = 287.05;

fn speed_of_sound(temp_k: f32) -> f32 {
    sqrtf(GAMMA_AIR * R_AIR * temp_k)
}

impl SosRefs {
    const fn new(floor_mps: f32) -> Self {
        Self {
            have: false,
            ground_mps: f32::NAN,
            tenkft_mps: f32::NAN,
            min_mps: floor_mps,
        }
    }

    fn latch(&mut self, params: &FusionParams, ground_temp_c: f32) {
        let t0 = ground_temp_c + 273.15;
        self.ground_mps = speed_of_sound(t0);
        // Clamp against absurdly cold estimates before the sqrt.
        let t10k = (t0 - params.sos_10kft_delta_k).max(150.0);
        self.tenkft_mps = speed_of_sound(t10k);
        self.min_mps = params.sos_min_floor_mps.max(self.ground_mps.min(self.tenkft_mps));
        self.have = true;
    }
}

/// The fusion engine. All filter state lives here so a soft reset clears
/// everything in one place.
pub struct FusionEngine {
    params: FusionParams,
    // Baseline state for AGL zeroing
    agl_ready: bool,
    arm_at_ms: u32,
    armed_timer_set: bool,
    base_bmp_m: f32,
    base_imu_m: f32,
    // Vertical-speed derivative chain
    have_prev_alt: bool,
    prev_alt_m: f32,
    prev_ms: u32,
    vz_filt_mps: f32,
    // Leaky accel integrator
    vz_acc_mps: f32,
    tilt_az: TiltAzimuth,
    sos: SosRefs,
}

impl FusionEngine {
    pub const fn new(params: FusionParams) -> Self {
        Self {
            params,
            agl_ready: false,
            arm_at_ms: 0,
            armed_timer_set: false,
            base_bmp_m: f32::NAN,
            base_imu_m: f32::NAN,
            have_prev_alt: false,
            prev_alt_m: f32::NAN,
            prev_ms: 0,
            vz_filt_mps: f32::NAN,
            vz_acc_mps: 0.0,
            tilt_az: TiltAzimuth::new(),
            sos: SosRefs::new(params.sos_min_floor_mps),
        }
    }

    /// Clear all filter state, baselines and the warm-up timer. The next
    /// tick restarts the warm-up as after power-on.
    pub fn reset(&mut self) {
        *self = Self::new(self.params);
    }

    pub fn agl_ready(&self) -> bool {
        self.agl_ready
    }

    /// One fusion tick. `now_ms` must come from a monotonic clock.
    pub fn step(&mut self, now_ms: u32, baro: &BaroReading, imu: &ImuAReading) -> FusedAlt {
        let mut out = FusedAlt::new();
        out.stamp_ms = now_ms;

        let bmp_alt = if baro.valid { baro.altitude_m } else { f32::NAN };
        let imu_alt = if imu.valid { imu.altitude_m } else { f32::NAN };
        out.bmp_alt_m = bmp_alt;
        out.imu_alt_m = imu_alt;

        // Arm the AGL baseline after the warm-up, then capture each
        // sensor's baseline lazily from its first valid altitude.
        if !self.armed_timer_set {
            self.arm_at_ms = now_ms.wrapping_add(self.params.zero_agl_after_ms);
            self.armed_timer_set = true;
        }
        if !self.agl_ready && now_ms.wrapping_sub(self.arm_at_ms) as i32 >= 0 {
            self.agl_ready = true;
        }
        if self.agl_ready {
            if self.base_bmp_m.is_nan() && !bmp_alt.is_nan() {
                self.base_bmp_m = bmp_alt;
            }
            if self.base_imu_m.is_nan() && !imu_alt.is_nan() {
                self.base_imu_m = imu_alt;
            }
        }
        out.agl_ready = self.agl_ready;

        if self.agl_ready {
            if !self.base_bmp_m.is_nan() && !bmp_alt.is_nan() {
                out.agl_bmp_m = bmp_alt - self.base_bmp_m;
            }
            if !self.base_imu_m.is_nan() && !imu_alt.is_nan() {
                out.agl_imu_m = imu_alt - self.base_imu_m;
            }
            // Weighted fusion when both available; fallback otherwise.
            let w = self.params.w_bmp;
            out.agl_fused_m = match (out.agl_bmp_m.is_nan(), out.agl_imu_m.is_nan()) {
                (false, false) => w * out.agl_bmp_m + (1.0 - w) * out.agl_imu_m,
                (false, true) => out.agl_bmp_m,
                (true, false) => out.agl_imu_m,
                (true, true) => f32::NAN,
            };
        }

        // Vertical speed from the AGL derivative (EMA over the
        // instantaneous slope, dt clamped at both ends).
        let mut dt_s_for_step = f32::NAN;
        if self.agl_ready && !out.agl_fused_m.is_nan() {
            if self.have_prev_alt {
                let dt_ms = (now_ms.wrapping_sub(self.prev_ms) as f32)
                    .clamp(1.0, self.params.vz_max_dt_ms as f32);
                dt_s_for_step = dt_ms / 1000.0;
                let inst_vz = (out.agl_fused_m - self.prev_alt_m) / dt_s_for_step;
                if self.vz_filt_mps.is_nan() {
                    self.vz_filt_mps = inst_vz;
                }
                self.vz_filt_mps =
                    self.params.vz_alpha * self.vz_filt_mps + (1.0 - self.params.vz_alpha) * inst_vz;
                out.vz_baro_mps = self.vz_filt_mps;
            }
            self.prev_alt_m = out.agl_fused_m;
            self.prev_ms = now_ms;
            self.have_prev_alt = true;
        } else {
            self.have_prev_alt = false;
            self.vz_filt_mps = f32::NAN;
        }

        // Earth-frame vertical acceleration and its leaky integral.
        if imu.valid {
            let v_body = [
                imu.accel_g[0] * G0_MPS2,
                imu.accel_g[1] * G0_MPS2,
                imu.accel_g[2] * G0_MPS2,
            ];
            let v_earth = attitude::rotate_vec(&imu.quat, &v_body);
            out.az_earth_mps2 = v_earth[2] - G0_MPS2;
            if !out.az_earth_mps2.is_nan() && self.have_prev_alt {
                let dt = if dt_s_for_step.is_nan() {
                    self.params.vz_max_dt_ms as f32 / 1000.0
                } else {
                    dt_s_for_step
                };
                self.vz_acc_mps =
                    (1.0 - self.params.vz_leak) * self.vz_acc_mps + out.az_earth_mps2 * dt;
            }
        }
        // The integrator only runs once the derivative chain is primed.
        if !self.have_prev_alt {
            self.vz_acc_mps = 0.0;
        }
        out.vz_acc_mps = self.vz_acc_mps;

        // Complementary blend; either side alone passes through unchanged.
        let beta = self.params.vz_fuse_beta;
        out.vz_fused_mps = match (out.vz_baro_mps.is_nan(), out.vz_acc_mps.is_nan()) {
            (false, false) => beta * out.vz_baro_mps + (1.0 - beta) * out.vz_acc_mps,
            (false, true) => out.vz_baro_mps,
            (true, false) => out.vz_acc_mps,
            (true, true) => f32::NAN,
        };

        // Atmospherics: dynamic speed of sound for visibility, plus the
        // conservative references latched from the first valid baro sample.
        if baro.valid {
            out.temp_c = baro.temperature_c;
            out.press_hpa = baro.pressure_pa / 100.0;
            out.sos_mps = speed_of_sound(baro.temperature_c + 273.15);
            if !out.vz_baro_mps.is_nan() {
                out.mach_vz = fabsf(out.vz_baro_mps) / out.sos_mps;
            }
            if !self.sos.have {
                self.sos.latch(&self.params, baro.temperature_c);
            }
        }
        out.sos_ground_mps = self.sos.ground_mps;
        out.sos_10kft_mps = self.sos.tenkft_mps;
        out.sos_min_mps = self.sos.min_mps;

        // Conservative Mach proxy under the worst allowed tilt.
        if !out.vz_fused_mps.is_nan() && self.sos.have {
            let c = cosf(self.params.tilt_max_deploy_deg * attitude::RAD_PER_DEG).max(0.1);
            out.mach_cons = (fabsf(out.vz_fused_mps) / c) / self.sos.min_mps;
        }

        // Apogee prediction, biased early and low.
        if self.agl_ready && !out.agl_fused_m.is_nan() && !out.vz_fused_mps.is_nan() {
            if out.vz_fused_mps > 0.0 {
                out.t_apogee_s = self.params.safe_tapx_factor * (out.vz_fused_mps / G0_MPS2);
                out.apogee_agl_m = out.agl_fused_m
                    + self.params.safe_zapx_factor * (out.vz_fused_mps * out.vz_fused_mps)
                        / (2.0 * G0_MPS2);
            } else {
                // Already descending.
                out.t_apogee_s = 0.0;
                out.apogee_agl_m = out.agl_fused_m;
            }
        }

        // Attitude: Euler for display, quaternion-derived tilt for gating.
        if imu.valid {
            let (yaw, pitch, roll) = attitude::to_euler(&imu.quat);
            out.yaw_deg = yaw;
            out.pitch_deg = pitch;
            out.roll_deg = roll;
            let (tilt, nose) = attitude::tilt_from_vertical(&imu.quat);
            out.tilt_deg = tilt;
            let (az, az_360, unwrapped) = self.tilt_az.update(&self.params, tilt, &nose);
            out.tilt_az_deg = az;
            out.tilt_az_deg360 = az_360;
            out.tilt_az_unwrapped_deg = unwrapped;
        }

        out
    }
}
