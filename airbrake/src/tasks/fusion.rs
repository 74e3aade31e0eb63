use embassy_time::{Duration, Instant, Ticker};

use airbrake_core::blackboard::{FLIGHT_DATA, FUSION_RESET, SENSOR_DATA};
use airbrake_core::info;
use airbrake_core::FusionEngine;

use crate::PARAMS;

/// Fusion tick. Copies the sensor snapshots out, recomputes the fused
/// view and publishes it. Runs at the telemetry cadence.
#[embassy_executor::task]
pub async fn fusion_task() {
    let mut engine = FusionEngine::new(PARAMS.fusion);
    let mut ticker = Ticker::every(Duration::from_millis(PARAMS.telem_period_ms as u64));
    loop {
        if FUSION_RESET.take() {
            engine.reset();
            info!("fusion: soft reset applied");
        }

        let baro = SENSOR_DATA.baro.read();
        let imu_a = SENSOR_DATA.imu_a.read();
        let now_ms = Instant::now().as_millis() as u32;

        let fused = engine.step(now_ms, &baro, &imu_a);
        FLIGHT_DATA.fused.update(fused);

        ticker.next().await;
    }
}
