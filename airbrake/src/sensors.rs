//! Sensor producer tasks.
//!
//! Each producer owns its blackboard cell and refreshes it at the
//! device's cadence. The device transaction itself hides behind a
//! `*Source` trait: hardware drivers (external to this crate) implement
//! it over their bus handle, and the bench build substitutes synthetic
//! sources so the whole pipeline runs on a desk. The loops here are
//! generic over the source; `main.rs` wraps them in concrete tasks and
//! injects whichever source the build selects, e.g.:
//!
//! ```rust
//! #[embassy_executor::task]
//! async fn baro_task() -> ! {
//!     sensors::baro_task_driver(MyBmp390::new(i2c_dev)).await
//! }
//! ```
//!
//! Contract per producer: publish at the nominal cadence; on a read
//! error keep the previous value but count the miss; after
//! `INVALID_AFTER_ERRORS` consecutive misses clear `valid` so consumers
//! see the fault.

use embassy_time::{Duration, Ticker};

use airbrake_core::blackboard::SENSOR_DATA;
use airbrake_core::datacells::DataCell;
use airbrake_core::telemetry::SystemInputs;
use airbrake_core::warn;
use airbrake_core::{BaroReading, ImuAReading, ImuBReading, SensorError};

/// Battery voltage and bus-error counters, fed by the platform glue and
/// copied into every telemetry record.
pub static SYSTEM_INPUTS: DataCell<SystemInputs> = DataCell::new(SystemInputs {
    vbat_mv: 0,
    i2c_errs: 0,
    spi_errs: 0,
});

const BARO_PERIOD: Duration = Duration::from_hz(10);
const IMU_PERIOD: Duration = Duration::from_hz(50);

/// Consecutive failed reads before a producer clears `valid`.
const INVALID_AFTER_ERRORS: u8 = 3;

pub trait BaroSource {
    async fn read(&mut self) -> Result<BaroReading, SensorError>;
}

pub trait ImuASource {
    async fn read(&mut self) -> Result<ImuAReading, SensorError>;
}

pub trait ImuBSource {
    async fn read(&mut self) -> Result<ImuBReading, SensorError>;
}

pub async fn baro_task_driver(mut src: impl BaroSource) -> ! {
    let mut ticker = Ticker::every(BARO_PERIOD);
    let mut last = BaroReading::new();
    let mut errors = 0u8;
    loop {
        match src.read().await {
            Ok(reading) => {
                errors = 0;
                last = reading;
            }
            Err(e) => {
                errors = errors.saturating_add(1);
                if errors == INVALID_AFTER_ERRORS {
                    warn!("baro: persistent read failure: {:?}", e);
                    last.valid = false;
                }
            }
        }
        SENSOR_DATA.baro.update(last);
        ticker.next().await;
    }
}

pub async fn imu_a_task_driver(mut src: impl ImuASource) -> ! {
    let mut ticker = Ticker::every(IMU_PERIOD);
    let mut last = ImuAReading::new();
    let mut errors = 0u8;
    loop {
        match src.read().await {
            Ok(reading) => {
                errors = 0;
                last = reading;
            }
            Err(e) => {
                errors = errors.saturating_add(1);
                if errors == INVALID_AFTER_ERRORS {
                    warn!("imu-a: persistent read failure: {:?}", e);
                    last.valid = false;
                }
            }
        }
        SENSOR_DATA.imu_a.update(last);
        ticker.next().await;
    }
}

pub async fn imu_b_task_driver(mut src: impl ImuBSource) -> ! {
    let mut ticker = Ticker::every(IMU_PERIOD);
    let mut last = ImuBReading::new();
    let mut errors = 0u8;
    loop {
        match src.read().await {
            Ok(reading) => {
                errors = 0;
                last = reading;
            }
            Err(e) => {
                errors = errors.saturating_add(1);
                if errors == INVALID_AFTER_ERRORS {
                    warn!("imu-b: persistent read failure: {:?}", e);
                    last.valid = false;
                }
            }
        }
        SENSOR_DATA.imu_b.update(last);
        ticker.next().await;
    }
}

/// Synthetic desk sources: a motionless, upright airframe at a fixed
/// field elevation. Good enough to exercise warm-up, baselines and the
/// monitor end to end without a single bus transaction.
#[cfg(feature = "bench")]
pub mod bench {
    use super::*;
    use airbrake_core::readings::pressure_to_altitude_m;

    const FIELD_PRESSURE_PA: f32 = 99_800.0;
    const FIELD_TEMP_C: f32 = 18.0;

    pub struct BenchBaro {
        tick: u32,
    }

    impl BenchBaro {
        pub fn new() -> Self {
            Self { tick: 0 }
        }
    }

    impl BaroSource for BenchBaro {
        async fn read(&mut self) -> Result<BaroReading, SensorError> {
            self.tick = self.tick.wrapping_add(1);
            // A few pascal of deterministic jitter so the filters see a
            // live signal.
            let jitter = ((self.tick % 7) as f32 - 3.0) * 0.8;
            let pressure = FIELD_PRESSURE_PA + jitter;
            Ok(BaroReading {
                temperature_c: FIELD_TEMP_C,
                pressure_pa: pressure,
                altitude_m: pressure_to_altitude_m(pressure, crate::PARAMS.sea_level_hpa),
                valid: true,
            })
        }
    }

    pub struct BenchImuA {
        tick: u32,
    }

    impl BenchImuA {
        pub fn new() -> Self {
            Self { tick: 0 }
        }
    }

    impl ImuASource for BenchImuA {
        async fn read(&mut self) -> Result<ImuAReading, SensorError> {
            self.tick = self.tick.wrapping_add(1);
            let jitter = ((self.tick % 5) as f32 - 2.0) * 1.2;
            let pressure = FIELD_PRESSURE_PA + 30.0 + jitter;
            Ok(ImuAReading {
                quat: [1.0, 0.0, 0.0, 0.0],
                accel_g: [0.0, 0.0, 1.0],
                pressure_pa: pressure,
                altitude_m: pressure_to_altitude_m(pressure, crate::PARAMS.sea_level_hpa),
                valid: true,
            })
        }
    }

    pub struct BenchImuB {
        tick: u32,
    }

    impl BenchImuB {
        pub fn new() -> Self {
            Self { tick: 0 }
        }
    }

    impl ImuBSource for BenchImuB {
        async fn read(&mut self) -> Result<ImuBReading, SensorError> {
            self.tick = self.tick.wrapping_add(1);
            Ok(ImuBReading {
                accel_g: [0.0, 0.0, 1.0],
                gyro_dps: [0.0, 0.0, 0.0],
                temp_c: FIELD_TEMP_C + 4.0,
                valid: true,
            })
        }
    }
}
