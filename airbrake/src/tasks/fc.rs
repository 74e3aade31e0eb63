use embassy_time::{Duration, Instant, Ticker};

use airbrake_core::blackboard::{FC_RESET, FLIGHT_DATA, TELEMETRY};
use airbrake_core::info;
use airbrake_core::{FcContext, FcInputs, FcStatus};

use crate::PARAMS;

/// Flight-controller tick. Consumes the latest aggregated telemetry
/// record (one tick behind fusion at worst, far inside every debounce
/// window) and publishes the FC status snapshot.
#[embassy_executor::task]
pub async fn fc_task() {
    let mut ctx = FcContext::new(PARAMS.fc);
    let mut ticker = Ticker::every(Duration::from_millis(PARAMS.telem_period_ms as u64));
    let mut prev_ms = Instant::now().as_millis() as u32;
    loop {
        if FC_RESET.take() {
            ctx.reset();
            info!("fc: soft reset applied");
        }

        let rec = TELEMETRY.read();
        let now_ms = Instant::now().as_millis() as u32;
        let dt_ms = now_ms.wrapping_sub(prev_ms).clamp(1, 1_000);
        prev_ms = now_ms;

        let fused = &rec.fused;
        let input = FcInputs {
            dt_ms,
            now_ms,
            tilt_deg: fused.tilt_deg,
            agl_fused_m: fused.agl_fused_m,
            vz_fused_mps: fused.vz_fused_mps,
            vz_baro_mps: fused.vz_baro_mps,
            az_earth_mps2: fused.az_earth_mps2,
            t_apogee_s: fused.t_apogee_s,
            apogee_agl_m: fused.apogee_agl_m,
            agl_ready: fused.agl_ready,
            baro_alt_m: rec.baro.altitude_m,
            imu_alt_m: rec.imu_a.altitude_m,
            imu_a_valid: rec.imu_a.valid,
            baro_valid: rec.baro.valid,
            imu_b_valid: rec.imu_b.valid,
        };
        let out = ctx.step(&input);

        FLIGHT_DATA.fc.update(FcStatus {
            stamp_ms: now_ms,
            state: out.state,
            flags: out.flags,
            mach_cons: out.mach_cons,
            tilt_deg: out.tilt_deg,
            t_since_launch_s: out.t_since_launch_s,
            t_to_apogee_s: out.t_to_apogee_s,
            airbrake_cmd_deg: out.airbrake_cmd_deg,
        });

        ticker.next().await;
    }
}
