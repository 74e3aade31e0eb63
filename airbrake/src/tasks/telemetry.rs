use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Ticker};

use airbrake_core::blackboard::{FLIGHT_DATA, SENSOR_DATA, TELEMETRY};
use airbrake_core::TelemetryRecord;

use crate::sensors::SYSTEM_INPUTS;
use crate::PARAMS;

/// Bounded sink for the (out-of-scope) storage logger. The aggregator
/// coalesces here under pressure; the live snapshot is never dropped.
pub static TELEM_SINK: Channel<CriticalSectionRawMutex, TelemetryRecord, 64> = Channel::new();

/// Telemetry aggregation tick: compose a fresh record from the current
/// snapshots, publish it as the single live record, and offer a copy to
/// the sink with drop-oldest semantics.
#[embassy_executor::task]
pub async fn telemetry_task() {
    let mut ticker = Ticker::every(Duration::from_millis(PARAMS.telem_period_ms as u64));
    let mut seq = 0u32;
    loop {
        let baro = SENSOR_DATA.baro.read();
        let imu_a = SENSOR_DATA.imu_a.read();
        let imu_b = SENSOR_DATA.imu_b.read();
        let fc = FLIGHT_DATA.fc.read();
        let fused = FLIGHT_DATA.fused.read();
        let sys_in = SYSTEM_INPUTS.read();
        let now_ms = Instant::now().as_millis() as u32;

        let rec = TelemetryRecord::compose(
            seq,
            now_ms,
            &baro,
            &imu_a,
            &imu_b,
            &fc,
            &fused,
            &sys_in,
            PARAMS.telem_crc,
        );
        seq = seq.wrapping_add(1);

        TELEMETRY.update(rec);

        // Drop the oldest queued record rather than the newest.
        if TELEM_SINK.try_send(rec).is_err() {
            let _ = TELEM_SINK.try_receive();
            let _ = TELEM_SINK.try_send(rec);
        }

        ticker.next().await;
    }
}
