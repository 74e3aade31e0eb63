//! Build-time tunables, gathered into named profiles.
//!
//! `Params::FLIGHT` carries the flight defaults; `Params::BENCH` scales
//! thresholds and dwells down so the full pipeline can be exercised on a
//! desk. A profile is data, not a code fork.

/// Fusion / derivation tuning.
#[derive(Clone, Copy, Debug)]
pub struct FusionParams {
    /// Warm-up before AGL baselines are armed (ms).
    pub zero_agl_after_ms: u32,
    /// Weight of the external barometer in fused AGL (0..1).
    pub w_bmp: f32,
    /// EMA smoothing for the vertical-speed derivative (0..1).
    pub vz_alpha: f32,
    /// Cap on dt for the derivative, bounds first-sample and post-gap spikes (ms).
    pub vz_max_dt_ms: u32,
    /// Per-tick leak of the acceleration integrator (0..1).
    pub vz_leak: f32,
    /// Baro share in fused vertical speed (0..1).
    pub vz_fuse_beta: f32,
    /// Unit-vector EMA smoothing for tilt azimuth (0..1, higher = smoother).
    pub tilt_az_alpha: f32,
    /// Minimum tilt before azimuth updates are meaningful (deg).
    pub tilt_az_min_tilt_deg: f32,
    /// Bias factor making time-to-apogee predictions early (<= 1).
    pub safe_tapx_factor: f32,
    /// Bias factor making apogee-altitude predictions low (<= 1).
    pub safe_zapx_factor: f32,
    /// Worst-case tilt assumed by the conservative Mach proxy (deg).
    pub tilt_max_deploy_deg: f32,
    /// Temperature drop from ground to +10 kft (K).
    pub sos_10kft_delta_k: f32,
    /// Absolute floor for the conservative speed of sound (m/s).
    pub sos_min_floor_mps: f32,
}

impl FusionParams {
    pub const FLIGHT: Self = Self {
        zero_agl_after_ms: 10_000,
        w_bmp: 0.70,
        vz_alpha: 0.85,
        vz_max_dt_ms: 200,
        vz_leak: 0.02,
        vz_fuse_beta: 0.20,
        tilt_az_alpha: 0.90,
        tilt_az_min_tilt_deg: 2.0,
        safe_tapx_factor: 0.7,
        safe_zapx_factor: 0.8,
        tilt_max_deploy_deg: 20.0,
        sos_10kft_delta_k: 19.8,
        sos_min_floor_mps: 300.0,
    };

    pub const BENCH: Self = Self {
        zero_agl_after_ms: 1_500,
        vz_max_dt_ms: 100,
        ..Self::FLIGHT
    };
}

/// Flight-controller gates, thresholds and dwells.
#[derive(Clone, Copy, Debug)]
pub struct FcParams {
    /// Fixed conservative speed of sound for the Mach gate (m/s).
    pub sos_fixed_mps: f32,
    /// Mach gate ON threshold.
    pub mach_max_for_deploy: f32,
    /// Mach gate OFF hysteresis above the ON threshold.
    pub mach_hyst: f32,
    /// Sustained time below threshold before the Mach gate turns ON (ms).
    pub mach_dwell_ms: u32,
    /// Tilt at or above which the abort latch arms (deg).
    pub tilt_abort_deg: f32,
    /// Sustained over-tilt before the latch sets (ms).
    pub tilt_abort_dwell_ms: u32,
    /// Liftoff vertical-speed condition (m/s).
    pub vz_liftoff_mps: f32,
    /// Liftoff earth-frame acceleration condition (m/s^2).
    pub az_liftoff_mps2: f32,
    /// Liftoff fused-AGL condition (m).
    pub liftoff_min_agl_m: f32,
    /// Sustained liftoff condition before latching (ms).
    pub liftoff_dwell_ms: u32,
    /// Burnout earth-frame acceleration threshold (m/s^2).
    pub burnout_az_done_mps2: f32,
    /// Sustained burnout condition before latching (ms).
    pub burnout_dwell_ms: u32,
    /// Hold after burnout before the deploy window opens (ms).
    pub burnout_hold_ms: u32,
    /// Minimum fused AGL for deployment (m).
    pub min_deploy_agl_m: f32,
    /// Target apogee AGL (m).
    pub target_apogee_agl_m: f32,
    /// Margin above target required of the predicted apogee (m).
    pub apogee_high_margin_m: f32,
    /// Retract when predicted time to apogee falls to this (s).
    pub retract_before_apogee_s: f32,
    /// Expected time to apogee for the timeout fallback (s).
    pub expected_tta_s: f32,
    /// Timeout fires at expected_tta_s times this scale.
    pub expected_tta_scale_timeout: f32,
    /// Sustained invalid samples before a sensor goes not-OK (ms).
    pub sensor_invalid_ms: u32,
    /// Sustained valid samples before a sensor recovers to OK (ms).
    pub sensor_recovery_ms: u32,
    /// Baro-agreement magnitude threshold (m).
    pub baro_agree_m: f32,
    /// Baro-agreement dwell (ms).
    pub baro_agree_ms: u32,
    /// Airbrake command angle while deployed (deg).
    pub deploy_cmd_deg: f32,
}

impl FcParams {
    pub const FLIGHT: Self = Self {
        sos_fixed_mps: 300.0,
        mach_max_for_deploy: 0.50,
        mach_hyst: 0.02,
        mach_dwell_ms: 300,
        tilt_abort_deg: 30.0,
        tilt_abort_dwell_ms: 200,
        vz_liftoff_mps: 8.0,
        az_liftoff_mps2: 15.0,
        liftoff_min_agl_m: 5.0,
        liftoff_dwell_ms: 150,
        burnout_az_done_mps2: 1.0,
        burnout_dwell_ms: 200,
        burnout_hold_ms: 1_500,
        min_deploy_agl_m: 200.0,
        target_apogee_agl_m: 3_048.0,
        apogee_high_margin_m: 45.0,
        retract_before_apogee_s: 5.0,
        expected_tta_s: 18.0,
        expected_tta_scale_timeout: 1.2,
        sensor_invalid_ms: 150,
        sensor_recovery_ms: 1_500,
        baro_agree_m: 15.0,
        baro_agree_ms: 500,
        deploy_cmd_deg: 30.0,
    };

    pub const BENCH: Self = Self {
        tilt_abort_deg: 75.0,
        vz_liftoff_mps: 0.5,
        az_liftoff_mps2: 1.0,
        liftoff_min_agl_m: 0.20,
        liftoff_dwell_ms: 50,
        burnout_az_done_mps2: 0.3,
        burnout_dwell_ms: 120,
        burnout_hold_ms: 400,
        min_deploy_agl_m: 0.20,
        target_apogee_agl_m: 0.25,
        apogee_high_margin_m: 0.05,
        retract_before_apogee_s: 0.5,
        expected_tta_s: 3.0,
        expected_tta_scale_timeout: 1.1,
        sensor_invalid_ms: 80,
        sensor_recovery_ms: 200,
        mach_dwell_ms: 50,
        deploy_cmd_deg: 10.0,
        ..Self::FLIGHT
    };
}

/// Servo actuator endpoints and cadence.
#[derive(Clone, Copy, Debug)]
pub struct ServoParams {
    /// Pulse width fully retracted (us).
    pub min_us: u16,
    /// Pulse width fully open (us).
    pub max_us: u16,
    /// Control task period (ms).
    pub period_ms: u32,
}

impl ServoParams {
    pub const FLIGHT: Self = Self {
        min_us: 1_000,
        max_us: 1_400,
        period_ms: 20,
    };
}

/// One named configuration block for the whole core.
#[derive(Clone, Copy, Debug)]
pub struct Params {
    pub fusion: FusionParams,
    pub fc: FcParams,
    pub servo: ServoParams,
    /// Telemetry / fusion / FC cadence (ms).
    pub telem_period_ms: u32,
    /// Sea-level reference for barometric altitude (hPa).
    pub sea_level_hpa: f32,
    /// Append a CRC-32 to emitted telemetry records.
    pub telem_crc: bool,
}

impl Params {
    pub const FLIGHT: Self = Self {
        fusion: FusionParams::FLIGHT,
        fc: FcParams::FLIGHT,
        servo: ServoParams::FLIGHT,
        telem_period_ms: 20,
        sea_level_hpa: 1012.0,
        telem_crc: false,
    };

    pub const BENCH: Self = Self {
        fusion: FusionParams::BENCH,
        fc: FcParams::BENCH,
        ..Self::FLIGHT
    };
}
