use super::*;
use crate::config::FcParams;

const TICK_MS: u32 = 20;

/// Test bench: drives an [`FcContext`] with synthetic inputs at the
/// nominal 50 Hz cadence.
struct Bench {
    ctx: FcContext,
    now_ms: u32,
}

impl Bench {
    fn new() -> Self {
        Self {
            ctx: FcContext::new(FcParams::FLIGHT),
            now_ms: 0,
        }
    }

    fn tick(&mut self, shape: impl Fn(&mut FcInputs)) -> FcOutputs {
        self.now_ms += TICK_MS;
        let mut input = pad_inputs(self.now_ms);
        shape(&mut input);
        self.ctx.step(&input)
    }

    fn run(&mut self, duration_ms: u32, shape: impl Fn(&mut FcInputs)) -> FcOutputs {
        let mut out = FcOutputs::default();
        for _ in 0..duration_ms / TICK_MS {
            out = self.tick(&shape);
        }
        out
    }
}

/// Benign on-the-pad inputs: all sensors sampling, upright, at rest.
fn pad_inputs(now_ms: u32) -> FcInputs {
    FcInputs {
        dt_ms: TICK_MS,
        now_ms,
        tilt_deg: 0.5,
        agl_fused_m: 0.0,
        vz_fused_mps: 0.0,
        vz_baro_mps: 0.0,
        az_earth_mps2: 0.0,
        t_apogee_s: f32::NAN,
        apogee_agl_m: f32::NAN,
        agl_ready: true,
        baro_alt_m: 100.0,
        imu_alt_m: 102.0,
        imu_a_valid: true,
        baro_valid: true,
        imu_b_valid: true,
    }
}

/// Drive the bench from pad idle through liftoff and burnout into WINDOW.
/// Leaves the controller 20 ms into the window.
fn into_window(bench: &mut Bench) {
    // Pad idle long enough for sensor recovery (1.5 s) and the Mach dwell.
    let out = bench.run(2_000, |_| {});
    assert_eq!(out.state, FcState::Preflight);
    assert_ne!(out.flags & FCF_SENS_IMU_A_OK, 0);
    assert_ne!(out.flags & FCF_SENS_BARO_OK, 0);
    assert_ne!(out.flags & FCF_MACH_OK, 0);

    // Boost pulse: 40 m/s^2 for 250 ms latches liftoff.
    let out = bench.run(250, |i| {
        i.az_earth_mps2 = 40.0;
        i.vz_fused_mps = 10.0;
    });
    assert_eq!(out.state, FcState::Boost);
    assert_ne!(out.flags & FCF_LIFTOFF_DET, 0);

    // Thrust ends: accel at zero for 250 ms latches burnout.
    let out = bench.run(250, |i| {
        i.vz_fused_mps = 60.0;
        i.agl_fused_m = 300.0;
    });
    assert_eq!(out.state, FcState::PostBurnHold);
    assert_ne!(out.flags & FCF_BURNOUT_DET, 0);

    // Post-burn hold runs out after 1.5 s.
    let out = bench.run(1_500, |i| {
        i.vz_fused_mps = 70.0;
        i.agl_fused_m = 500.0;
    });
    assert_eq!(out.state, FcState::Window);
}

#[test]
fn test_initial_state_is_preflight() {
    let mut bench = Bench::new();
    assert_eq!(bench.ctx.state(), FcState::Preflight);
    let out = bench.tick(|_| {});
    assert_eq!(out.state, FcState::Preflight);
    assert_eq!(out.airbrake_cmd_deg, 0.0);
}

#[test]
fn test_clean_flight_reaches_deploy_and_locks() {
    let mut bench = Bench::new();
    into_window(&mut bench);

    // Coasting fast and high: apogee prediction clears the target plus
    // margin, every gate is green, so the brake deploys.
    let out = bench.tick(|i| {
        i.vz_fused_mps = 80.0;
        i.agl_fused_m = 800.0;
        i.apogee_agl_m = 3_200.0;
        i.t_apogee_s = 5.7;
    });
    assert_eq!(out.state, FcState::Deployed);
    assert_eq!(out.airbrake_cmd_deg, FcParams::FLIGHT.deploy_cmd_deg);

    // Holds while apogee is still far out.
    let out = bench.run(500, |i| {
        i.vz_fused_mps = 70.0;
        i.agl_fused_m = 1_500.0;
        i.apogee_agl_m = 3_200.0;
        i.t_apogee_s = 5.5;
    });
    assert_eq!(out.state, FcState::Deployed);

    // Apogee closes in: retract, then locked on the very next tick.
    let out = bench.tick(|i| {
        i.vz_fused_mps = 30.0;
        i.agl_fused_m = 2_900.0;
        i.apogee_agl_m = 3_150.0;
        i.t_apogee_s = 4.0;
    });
    assert_eq!(out.state, FcState::Retracting);
    assert_eq!(out.airbrake_cmd_deg, 0.0);

    let out = bench.tick(|i| {
        i.t_apogee_s = 3.0;
    });
    assert_eq!(out.state, FcState::Locked);

    // Locked is absorbing, even against deploy-perfect inputs.
    let out = bench.run(1_000, |i| {
        i.vz_fused_mps = 80.0;
        i.agl_fused_m = 800.0;
        i.apogee_agl_m = 3_200.0;
        i.t_apogee_s = 6.0;
    });
    assert_eq!(out.state, FcState::Locked);
    assert_eq!(out.airbrake_cmd_deg, 0.0);
}

#[test]
fn test_mission_progress_is_monotone() {
    let mut bench = Bench::new();
    let mut last = bench.ctx.state() as u8;
    let mut saw_deploy = false;

    for tick in 0..3_000u32 {
        let t = tick * TICK_MS;
        let out = bench.tick(|i| {
            // A compressed clean flight shaped purely by time.
            if (2_000..2_600).contains(&t) {
                i.az_earth_mps2 = 40.0;
                i.vz_fused_mps = 30.0;
            } else if t >= 2_600 {
                i.vz_fused_mps = 80.0;
                i.agl_fused_m = 900.0;
                i.apogee_agl_m = 3_200.0;
                i.t_apogee_s = if t > 8_000 { 4.0 } else { 5.7 };
            }
        });
        let s = out.state as u8;
        assert!(
            s >= last,
            "state regressed from {last} to {s} at t = {t} ms"
        );
        last = s;
        saw_deploy |= out.state == FcState::Deployed;
        if out.airbrake_cmd_deg > 0.0 {
            assert_eq!(out.state, FcState::Deployed);
        }
    }
    assert!(saw_deploy);
    assert_eq!(bench.ctx.state(), FcState::Locked);
}

#[test]
fn test_tilt_abort_during_boost() {
    let mut bench = Bench::new();
    bench.run(2_000, |_| {});
    let out = bench.run(250, |i| {
        i.az_earth_mps2 = 40.0;
        i.vz_fused_mps = 10.0;
    });
    assert_eq!(out.state, FcState::Boost);

    // 45 degrees of tilt for 250 ms: latch plus abort.
    let out = bench.run(250, |i| {
        i.tilt_deg = 45.0;
        i.vz_fused_mps = 40.0;
    });
    assert_ne!(out.flags & FCF_TILT_LATCH, 0);
    assert_eq!(out.state, FcState::AbortLockout);

    // Coming back upright clears nothing: the latch is absorbing.
    let out = bench.run(2_000, |i| {
        i.vz_fused_mps = 80.0;
        i.agl_fused_m = 800.0;
        i.apogee_agl_m = 3_200.0;
        i.t_apogee_s = 6.0;
    });
    assert_ne!(out.flags & FCF_TILT_LATCH, 0);
    assert_eq!(out.flags & FCF_TILT_OK, 0);
    assert_eq!(out.state, FcState::AbortLockout);
    assert_eq!(out.airbrake_cmd_deg, 0.0);
}

#[test]
fn test_tilt_latch_aborts_within_two_ticks() {
    let mut bench = Bench::new();
    bench.run(2_000, |_| {});
    // Hold over-tilt until the latch appears, then count ticks to abort.
    let mut latch_tick = None;
    for tick in 0..100u32 {
        let out = bench.tick(|i| i.tilt_deg = 50.0);
        if out.flags & FCF_TILT_LATCH != 0 && latch_tick.is_none() {
            latch_tick = Some(tick);
        }
        if let Some(l) = latch_tick {
            if tick >= l + 2 {
                assert_eq!(out.state, FcState::AbortLockout);
            }
        }
    }
    assert!(latch_tick.is_some());
}

#[test]
fn test_low_trajectory_never_deploys() {
    let mut bench = Bench::new();
    into_window(&mut bench);

    // Predicted apogee far below target: WINDOW never qualifies, and the
    // expected-flight-time fallback eventually closes the mission out.
    let mut deployed = false;
    let mut out = FcOutputs::default();
    for _ in 0..30_000 / TICK_MS {
        out = bench.tick(|i| {
            i.vz_fused_mps = 20.0;
            i.agl_fused_m = 30.0;
            i.apogee_agl_m = 36.0;
            i.t_apogee_s = 1.4;
        });
        deployed |= out.state == FcState::Deployed;
        assert_eq!(out.airbrake_cmd_deg, 0.0);
    }
    assert!(!deployed);
    assert_eq!(out.state, FcState::Locked);
}

#[test]
fn test_baro_loss_blocks_deploy_until_recovery() {
    let mut bench = Bench::new();
    into_window(&mut bench);

    let qualify = |i: &mut FcInputs| {
        i.vz_fused_mps = 80.0;
        i.agl_fused_m = 800.0;
        i.apogee_agl_m = 3_200.0;
        i.t_apogee_s = 6.0;
    };

    // Flags are debounced: 100 ms of bad samples is not yet a fault.
    let out = bench.run(100, |i| {
        qualify(i);
        i.baro_valid = false;
        i.apogee_agl_m = 2_000.0; // hold below target so WINDOW persists
    });
    assert_ne!(out.flags & FCF_SENS_BARO_OK, 0);

    // 150 ms total drops the gate and blocks the deploy path.
    let out = bench.run(100, |i| {
        qualify(i);
        i.baro_valid = false;
    });
    assert_eq!(out.flags & FCF_SENS_BARO_OK, 0);
    assert_eq!(out.state, FcState::Window);

    // Recovery is asymmetric: valid samples again, but still blocked
    // until 1.5 s have accumulated.
    let out = bench.run(1_400, qualify);
    assert_eq!(out.flags & FCF_SENS_BARO_OK, 0);
    assert_eq!(out.state, FcState::Window);

    let out = bench.run(200, qualify);
    assert_ne!(out.flags & FCF_SENS_BARO_OK, 0);
    assert_eq!(out.state, FcState::Deployed);
}

#[test]
fn test_sensor_debounce_is_asymmetric() {
    let mut d = Debounce::new();
    let p = FcParams::FLIGHT;
    assert!(!d.ok);

    // Just under the recovery dwell: still not OK.
    for _ in 0..(p.sensor_recovery_ms / TICK_MS - 1) {
        d.update(true, TICK_MS, p.sensor_invalid_ms, p.sensor_recovery_ms);
    }
    assert!(!d.ok);
    d.update(true, TICK_MS, p.sensor_invalid_ms, p.sensor_recovery_ms);
    assert!(d.ok);

    // One bad sample clears the good accumulator but not the flag.
    d.update(false, TICK_MS, p.sensor_invalid_ms, p.sensor_recovery_ms);
    assert!(d.ok);
    assert_eq!(d.good_ms, 0);

    // Sustained badness for the (much shorter) invalid dwell drops it.
    for _ in 0..p.sensor_invalid_ms / TICK_MS {
        d.update(false, TICK_MS, p.sensor_invalid_ms, p.sensor_recovery_ms);
    }
    assert!(!d.ok);
}

#[test]
fn test_mach_gate_dwell_and_hysteresis() {
    let p = FcParams::FLIGHT;
    let mut bench = Bench::new();
    // mach = vz / (cos(30 deg) * 300): 103.9 -> 0.40, 132.5 -> 0.51,
    // 155.9 -> 0.60.
    let slow = 103.9;
    let band = 132.5;
    let fast = 155.9;

    // Below threshold but shorter than the dwell: never ON.
    let out = bench.run(p.mach_dwell_ms - TICK_MS, |i| i.vz_fused_mps = slow);
    assert_eq!(out.flags & FCF_MACH_OK, 0);

    // Interrupt with a fast sample: accumulator resets.
    bench.tick(|i| i.vz_fused_mps = fast);
    let out = bench.run(p.mach_dwell_ms - TICK_MS, |i| i.vz_fused_mps = slow);
    assert_eq!(out.flags & FCF_MACH_OK, 0);

    // Full dwell turns it ON.
    let out = bench.run(p.mach_dwell_ms, |i| i.vz_fused_mps = slow);
    assert_ne!(out.flags & FCF_MACH_OK, 0);

    // Inside the hysteresis band: stays ON.
    let out = bench.tick(|i| i.vz_fused_mps = band);
    assert_ne!(out.flags & FCF_MACH_OK, 0);

    // Above threshold + hysteresis: OFF immediately, single tick.
    let out = bench.tick(|i| i.vz_fused_mps = fast);
    assert_eq!(out.flags & FCF_MACH_OK, 0);
}

#[test]
fn test_baro_agreement_gate() {
    let p = FcParams::FLIGHT;
    let mut bench = Bench::new();

    // Disagreement beyond 15 m never sets the flag.
    let out = bench.run(1_000, |i| {
        i.baro_alt_m = 100.0;
        i.imu_alt_m = 120.0;
    });
    assert_eq!(out.flags & FCF_BARO_AGREE, 0);

    // Agreement must be sustained for the dwell.
    let out = bench.run(p.baro_agree_ms - TICK_MS, |i| {
        i.imu_alt_m = 104.0;
    });
    assert_eq!(out.flags & FCF_BARO_AGREE, 0);
    let out = bench.tick(|i| i.imu_alt_m = 104.0);
    assert_ne!(out.flags & FCF_BARO_AGREE, 0);

    // A single violation drops it immediately.
    let out = bench.tick(|i| i.imu_alt_m = 130.0);
    assert_eq!(out.flags & FCF_BARO_AGREE, 0);
}

#[test]
fn test_soft_reset_restores_power_on_state() {
    let mut bench = Bench::new();
    into_window(&mut bench);
    let out = bench.tick(|i| {
        i.vz_fused_mps = 80.0;
        i.agl_fused_m = 800.0;
        i.apogee_agl_m = 3_200.0;
        i.t_apogee_s = 6.0;
    });
    assert_eq!(out.state, FcState::Deployed);

    bench.ctx.reset();
    assert_eq!(bench.ctx.state(), FcState::Preflight);
    // Idempotent: a second reset with no intervening tick is a no-op.
    bench.ctx.reset();
    assert_eq!(bench.ctx.state(), FcState::Preflight);

    // Mission one-shots were cleared with the context: liftoff must be
    // re-detected from scratch.
    let out = bench.tick(|_| {});
    assert_eq!(out.state, FcState::Preflight);
    assert_eq!(out.flags & FCF_LIFTOFF_DET, 0);
    assert_eq!(out.t_since_launch_s, 0.0);
    assert_eq!(out.airbrake_cmd_deg, 0.0);
}

#[test]
fn test_t_since_launch_counts_from_liftoff() {
    let mut bench = Bench::new();
    bench.run(2_000, |_| {});
    let out = bench.tick(|_| {});
    assert_eq!(out.t_since_launch_s, 0.0);

    bench.run(250, |i| i.az_earth_mps2 = 40.0);
    let launch_now = bench.now_ms;
    let out = bench.run(1_000, |i| i.vz_fused_mps = 60.0);
    let expect = (bench.now_ms - launch_now) as f32 * 0.001;
    assert!((out.t_since_launch_s - expect).abs() < 0.2);
}
