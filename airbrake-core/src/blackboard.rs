use crate::datacells::{DataCell, ResetFlag};
use crate::fc::FcStatus;
use crate::fusion::FusedAlt;
use crate::readings::{BaroReading, ImuAReading, ImuBReading};
use crate::servo::ServoStatus;
use crate::telemetry::TelemetryRecord;

/// The global blackboard for sensor snapshots. Each producer task is the
/// sole writer of its cell.
pub struct SensorData {
    pub baro: DataCell<BaroReading>,
    pub imu_a: DataCell<ImuAReading>,
    pub imu_b: DataCell<ImuBReading>,
}

/// The global blackboard for derived flight state.
pub struct FlightData {
    /// Written only by the fusion task.
    pub fused: DataCell<FusedAlt>,
    /// Written only by the FC task.
    pub fc: DataCell<FcStatus>,
    /// Written only by the servo task.
    pub servo: DataCell<ServoStatus>,
}

pub static SENSOR_DATA: SensorData = SensorData {
    baro: DataCell::new(BaroReading::new()),
    imu_a: DataCell::new(ImuAReading::new()),
    imu_b: DataCell::new(ImuBReading::new()),
};

pub static FLIGHT_DATA: FlightData = FlightData {
    fused: DataCell::new(FusedAlt::new()),
    fc: DataCell::new(FcStatus::new()),
    servo: DataCell::new(ServoStatus {
        min_us: 0,
        max_us: 0,
        cmd_us: 0,
        open: false,
    }),
};

/// The live telemetry record. Written only by the aggregator task; every
/// consumer copies it out.
pub static TELEMETRY: DataCell<TelemetryRecord> = DataCell::new(TelemetryRecord::new());

/// Soft-reset plumbing: single-word requests consumed at the top of the
/// target task's next tick.
pub static FUSION_RESET: ResetFlag = ResetFlag::new();
pub static FC_RESET: ResetFlag = ResetFlag::new();
