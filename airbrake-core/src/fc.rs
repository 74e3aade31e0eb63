//! Airbrake flight controller: debounced gates, liftoff/burnout
//! detection and the mission state machine.
//!
//! All persistent context (debounce accumulators, latches, state-entry
//! times) lives in [`FcContext`]; a step is a pure function of
//! (context, inputs). Flags reflect debounced state only — an
//! instantaneous sample never drives the bitmask directly.

use libm::{cosf, fabsf};

use crate::attitude::RAD_PER_DEG;
use crate::config::FcParams;

/// Mission states, in progress order. `ArmedWait` is reserved and
/// currently unreachable.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FcState {
    Safe = 0,
    #[default]
    Preflight = 1,
    ArmedWait = 2,
    Boost = 3,
    PostBurnHold = 4,
    Window = 5,
    Deployed = 6,
    Retracting = 7,
    Locked = 8,
    AbortLockout = 9,
}

impl FcState {
    pub fn name(self) -> &'static str {
        match self {
            FcState::Safe => "SAFE",
            FcState::Preflight => "PREFLIGHT",
            FcState::ArmedWait => "ARMED_WAIT",
            FcState::Boost => "BOOST",
            FcState::PostBurnHold => "POST_HOLD",
            FcState::Window => "WINDOW",
            FcState::Deployed => "DEPLOYED",
            FcState::Retracting => "RETRACT",
            FcState::Locked => "LOCKED",
            FcState::AbortLockout => "ABORT_LOCKOUT",
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => FcState::Safe,
            1 => FcState::Preflight,
            2 => FcState::ArmedWait,
            3 => FcState::Boost,
            4 => FcState::PostBurnHold,
            5 => FcState::Window,
            6 => FcState::Deployed,
            7 => FcState::Retracting,
            8 => FcState::Locked,
            _ => FcState::AbortLockout,
        }
    }

    /// Absorbing states: no transition ever leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, FcState::Locked | FcState::AbortLockout)
    }
}

// Controller flags (gates and events).
pub const FCF_SENS_IMU_A_OK: u32 = 1 << 0;
pub const FCF_SENS_BARO_OK: u32 = 1 << 1;
pub const FCF_SENS_IMU_B_OK: u32 = 1 << 2;
pub const FCF_BARO_AGREE: u32 = 1 << 3;
pub const FCF_MACH_OK: u32 = 1 << 4;
pub const FCF_TILT_OK: u32 = 1 << 5;
pub const FCF_TILT_LATCH: u32 = 1 << 6;
pub const FCF_LIFTOFF_DET: u32 = 1 << 7;
pub const FCF_BURNOUT_DET: u32 = 1 << 8;

/// Inputs consumed each tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct FcInputs {
    /// Delta time since the previous step (ms).
    pub dt_ms: u32,
    /// Absolute monotonic time (ms).
    pub now_ms: u32,
    // Fused values
    pub tilt_deg: f32,
    pub agl_fused_m: f32,
    pub vz_fused_mps: f32,
    /// Fallback when the fused vertical speed is unavailable.
    pub vz_baro_mps: f32,
    pub az_earth_mps2: f32,
    pub t_apogee_s: f32,
    pub apogee_agl_m: f32,
    pub agl_ready: bool,
    // Raw altitudes for the agreement gate
    pub baro_alt_m: f32,
    pub imu_alt_m: f32,
    // Raw device sampling state
    pub imu_a_valid: bool,
    pub baro_valid: bool,
    pub imu_b_valid: bool,
}

/// Outputs produced each tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct FcOutputs {
    pub state: FcState,
    pub flags: u32,
    pub airbrake_cmd_deg: f32,
    pub t_since_launch_s: f32,
    pub t_to_apogee_s: f32,
    pub mach_cons: f32,
    pub tilt_deg: f32,
}

/// Published FC snapshot.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FcStatus {
    pub stamp_ms: u32,
    pub state: FcState,
    pub flags: u32,
    pub mach_cons: f32,
    pub tilt_deg: f32,
    pub t_since_launch_s: f32,
    pub t_to_apogee_s: f32,
    pub airbrake_cmd_deg: f32,
}

impl FcStatus {
    pub const fn new() -> Self {
        Self {
            stamp_ms: 0,
            state: FcState::Preflight,
            flags: 0,
            mach_cons: f32::NAN,
            tilt_deg: f32::NAN,
            t_since_launch_s: 0.0,
            t_to_apogee_s: f32::NAN,
            airbrake_cmd_deg: 0.0,
        }
    }
}

impl Default for FcStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Good/bad accumulator for a sensor validity gate. Recovery is slower
/// than invalidation so a flapping sensor stays not-OK.
#[derive(Clone, Copy, Debug, Default)]
struct Debounce {
    ok: bool,
    good_ms: u32,
    bad_ms: u32,
}

impl Debounce {
    const fn new() -> Self {
        Self {
            ok: false,
            good_ms: 0,
            bad_ms: 0,
        }
    }

    fn update(&mut self, sample_ok: bool, dt_ms: u32, invalid_ms: u32, recovery_ms: u32) {
        if sample_ok {
            self.good_ms = self.good_ms.saturating_add(dt_ms);
            self.bad_ms = 0;
            if !self.ok && self.good_ms >= recovery_ms {
                self.ok = true;
            }
        } else {
            self.bad_ms = self.bad_ms.saturating_add(dt_ms);
            self.good_ms = 0;
            if self.ok && self.bad_ms >= invalid_ms {
                self.ok = false;
            }
        }
    }
}

/// Persistent controller context.
pub struct FcContext {
    params: FcParams,
    state: FcState,
    flags: u32,
    t_state_ms: u32,
    t_launch_ms: u32,
    t_burnout_ms: u32,
    t_deploy_ms: u32,
    // Latches and dwell accumulators
    tilt_latched: bool,
    tilt_bad_ms: u32,
    mach_ok: bool,
    mach_ok_ms: u32,
    baro_agree_ms: u32,
    liftoff_latched: bool,
    liftoff_ms: u32,
    burnout_latched: bool,
    burnout_ms: u32,
    // Sensor validity debounce
    imu_a: Debounce,
    baro: Debounce,
    imu_b: Debounce,
}

impl FcContext {
    pub const fn new(params: FcParams) -> Self {
        Self {
            params,
            state: FcState::Preflight,
            flags: 0,
            t_state_ms: 0,
            t_launch_ms: 0,
            t_burnout_ms: 0,
            t_deploy_ms: 0,
            tilt_latched: false,
            tilt_bad_ms: 0,
            mach_ok: false,
            mach_ok_ms: 0,
            baro_agree_ms: 0,
            liftoff_latched: false,
            liftoff_ms: 0,
            burnout_latched: false,
            burnout_ms: 0,
            imu_a: Debounce::new(),
            baro: Debounce::new(),
            imu_b: Debounce::new(),
        }
    }

    /// Soft reset: back to power-on defaults, clearing every latch and
    /// accumulator (mission one-shots included).
    pub fn reset(&mut self) {
        *self = Self::new(self.params);
    }

    pub fn state(&self) -> FcState {
        self.state
    }

    /// Single tick: update gates and the FSM, produce outputs.
    pub fn step(&mut self, input: &FcInputs) -> FcOutputs {
        let mach = self.update_gates(input);
        self.update_fsm(input);

        let cmd_deg = if self.state == FcState::Deployed {
            self.params.deploy_cmd_deg
        } else {
            0.0
        };

        FcOutputs {
            state: self.state,
            flags: self.flags,
            airbrake_cmd_deg: cmd_deg,
            t_since_launch_s: self.t_since_launch_s(input.now_ms),
            t_to_apogee_s: input.t_apogee_s,
            mach_cons: mach,
            tilt_deg: input.tilt_deg,
        }
    }

    fn t_since_launch_s(&self, now_ms: u32) -> f32 {
        if self.t_launch_ms > 0 {
            now_ms.wrapping_sub(self.t_launch_ms) as f32 * 0.001
        } else {
            0.0
        }
    }

    fn set_flag(&mut self, flag: u32, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    fn update_gates(&mut self, input: &FcInputs) -> f32 {
        let p = self.params;

        self.imu_a
            .update(input.imu_a_valid, input.dt_ms, p.sensor_invalid_ms, p.sensor_recovery_ms);
        self.baro
            .update(input.baro_valid, input.dt_ms, p.sensor_invalid_ms, p.sensor_recovery_ms);
        self.imu_b
            .update(input.imu_b_valid, input.dt_ms, p.sensor_invalid_ms, p.sensor_recovery_ms);

        // Tilt latch: absorbing once over-tilt has been sustained.
        let tilt = input.tilt_deg;
        if !tilt.is_nan() {
            if tilt >= p.tilt_abort_deg {
                self.tilt_bad_ms = self.tilt_bad_ms.saturating_add(input.dt_ms);
                if self.tilt_bad_ms >= p.tilt_abort_dwell_ms {
                    self.tilt_latched = true;
                }
            } else {
                self.tilt_bad_ms = 0;
            }
        }

        // Conservative Mach proxy from the fixed SoS and worst-case tilt,
        // with dwell to turn ON and immediate hysteresis to turn OFF.
        let vz = if !input.vz_fused_mps.is_nan() {
            input.vz_fused_mps
        } else {
            input.vz_baro_mps
        };
        let mut mach = f32::NAN;
        if !vz.is_nan() {
            let cth = cosf(p.tilt_abort_deg * RAD_PER_DEG).max(0.1);
            mach = (fabsf(vz) / cth) / p.sos_fixed_mps;
            if mach < p.mach_max_for_deploy {
                self.mach_ok_ms = self.mach_ok_ms.saturating_add(input.dt_ms);
                if !self.mach_ok && self.mach_ok_ms >= p.mach_dwell_ms {
                    self.mach_ok = true;
                }
            } else if mach > p.mach_max_for_deploy + p.mach_hyst {
                self.mach_ok_ms = 0;
                self.mach_ok = false;
            }
            self.set_flag(FCF_MACH_OK, self.mach_ok);
        }

        // Baro agreement gate: sustained agreement sets the flag, any
        // violation drops it immediately.
        if input.baro_valid
            && input.imu_a_valid
            && !input.baro_alt_m.is_nan()
            && !input.imu_alt_m.is_nan()
        {
            let diff = fabsf(input.baro_alt_m - input.imu_alt_m);
            if diff <= p.baro_agree_m {
                self.baro_agree_ms = self.baro_agree_ms.saturating_add(input.dt_ms);
                if self.baro_agree_ms >= p.baro_agree_ms {
                    self.flags |= FCF_BARO_AGREE;
                }
            } else {
                self.baro_agree_ms = 0;
                self.flags &= !FCF_BARO_AGREE;
            }
        }

        self.set_flag(FCF_SENS_IMU_A_OK, self.imu_a.ok);
        self.set_flag(FCF_SENS_BARO_OK, self.baro.ok);
        self.set_flag(FCF_SENS_IMU_B_OK, self.imu_b.ok);
        self.set_flag(
            FCF_TILT_OK,
            !self.tilt_latched && !tilt.is_nan() && tilt <= p.tilt_abort_deg,
        );
        self.set_flag(FCF_TILT_LATCH, self.tilt_latched);

        mach
    }

    fn update_fsm(&mut self, input: &FcInputs) {
        let p = self.params;

        // Liftoff: any of the three conditions, sustained. One-shot.
        if !self.liftoff_latched {
            let cond = (!input.vz_fused_mps.is_nan() && input.vz_fused_mps > p.vz_liftoff_mps)
                || (!input.az_earth_mps2.is_nan() && input.az_earth_mps2 > p.az_liftoff_mps2)
                || (!input.agl_fused_m.is_nan() && input.agl_fused_m >= p.liftoff_min_agl_m);
            if cond {
                self.liftoff_ms = self.liftoff_ms.saturating_add(input.dt_ms);
                if self.liftoff_ms >= p.liftoff_dwell_ms {
                    self.liftoff_latched = true;
                    self.t_launch_ms = input.now_ms;
                    self.flags |= FCF_LIFTOFF_DET;
                }
            } else {
                self.liftoff_ms = 0;
            }
        }

        // Burnout: earth-frame accel near or below zero, sustained. One-shot.
        if self.liftoff_latched && !self.burnout_latched {
            if !input.az_earth_mps2.is_nan() && input.az_earth_mps2 <= p.burnout_az_done_mps2 {
                self.burnout_ms = self.burnout_ms.saturating_add(input.dt_ms);
                if self.burnout_ms >= p.burnout_dwell_ms {
                    self.burnout_latched = true;
                    self.t_burnout_ms = input.now_ms;
                    self.flags |= FCF_BURNOUT_DET;
                }
            } else {
                self.burnout_ms = 0;
            }
        }

        // A tilt latch aborts from any non-terminal state.
        if self.tilt_latched && !self.state.is_terminal() {
            self.enter(FcState::AbortLockout, input.now_ms);
            return;
        }

        match self.state {
            FcState::Preflight => {
                if self.liftoff_latched {
                    self.enter(FcState::Boost, input.now_ms);
                }
            }
            FcState::Boost => {
                if self.burnout_latched {
                    self.enter(FcState::PostBurnHold, input.now_ms);
                }
            }
            FcState::PostBurnHold => {
                if input.now_ms.wrapping_sub(self.t_state_ms) >= p.burnout_hold_ms {
                    self.enter(FcState::Window, input.now_ms);
                }
            }
            FcState::Window => {
                let gates = self.flags & FCF_SENS_IMU_A_OK != 0
                    && self.flags & FCF_SENS_BARO_OK != 0
                    && self.flags & FCF_TILT_OK != 0
                    && self.flags & FCF_MACH_OK != 0;
                if !input.agl_fused_m.is_nan()
                    && input.agl_fused_m >= p.min_deploy_agl_m
                    && !input.apogee_agl_m.is_nan()
                    && input.apogee_agl_m >= p.target_apogee_agl_m + p.apogee_high_margin_m
                    && gates
                {
                    self.t_deploy_ms = input.now_ms;
                    self.enter(FcState::Deployed, input.now_ms);
                } else if self.flight_timed_out(input.now_ms) {
                    // A trajectory that never qualifies still closes out:
                    // retract and lock once the expected flight time is over.
                    self.enter(FcState::Retracting, input.now_ms);
                }
            }
            FcState::Deployed => {
                let near_apogee =
                    !input.t_apogee_s.is_nan() && input.t_apogee_s <= p.retract_before_apogee_s;
                if near_apogee || self.flight_timed_out(input.now_ms) {
                    self.enter(FcState::Retracting, input.now_ms);
                }
            }
            FcState::Retracting => {
                self.enter(FcState::Locked, input.now_ms);
            }
            FcState::Safe | FcState::ArmedWait => {
                self.enter(FcState::Safe, input.now_ms);
            }
            FcState::Locked | FcState::AbortLockout => {}
        }
    }

    fn flight_timed_out(&self, now_ms: u32) -> bool {
        self.t_launch_ms > 0
            && self.t_since_launch_s(now_ms)
                > self.params.expected_tta_s * self.params.expected_tta_scale_timeout
    }

    fn enter(&mut self, state: FcState, now_ms: u32) {
        self.state = state;
        self.t_state_ms = now_ms;
    }
}

#[cfg(test)]
mod tests;
