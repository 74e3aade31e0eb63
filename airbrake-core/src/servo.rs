//! Airbrake servo control: the deploy decision over a telemetry
//! snapshot, the pulse-width endpoint mapping, and the stall watchdog.
//!
//! Actuation is bang-bang: fully open or fully retracted, transitions on
//! the boolean edge only. The PWM peripheral itself lives in the platform
//! glue.

use crate::config::ServoParams;
use crate::fc::FcState;
use crate::telemetry::TelemetryRecord;

/// Open only below this conservative Mach proxy.
const MACH_OPEN_LIMIT: f32 = 0.5;
/// Force-close this close to predicted apogee (s).
const NEAR_APOGEE_S: f32 = 1.0;

/// Decide whether the brake should be open for this telemetry snapshot.
///
/// Required: the mission is in its deploy window, every sensor gate is
/// healthy, the airframe is upright and slow. Disqualifiers force the
/// brake closed no matter what the requirements said.
pub fn should_open(rec: &TelemetryRecord) -> bool {
    let sys = &rec.sys;
    let fused = &rec.fused;
    let state = FcState::from_u8(sys.fc_state);

    let health_ok =
        sys.sens_imu_a_ok && sys.sens_baro_ok && sys.sens_imu_b_ok && fused.agl_ready;
    let tilt_ok = !sys.tilt_latch;
    let mach_ok = !fused.mach_cons.is_nan() && fused.mach_cons < MACH_OPEN_LIMIT;
    let in_window = state == FcState::Window;
    let post_burn = state != FcState::Boost;
    let abort_or_lock = matches!(state, FcState::AbortLockout | FcState::Locked);
    let near_apogee = !sys.t_to_apogee_s.is_nan() && sys.t_to_apogee_s <= NEAR_APOGEE_S;

    let mut open = !abort_or_lock && health_ok && tilt_ok && mach_ok && post_burn && in_window;
    if abort_or_lock || !health_ok || !tilt_ok || near_apogee {
        open = false;
    }
    open
}

/// Servo endpoint mapping: closed = minimum pulse, open = maximum pulse.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoRange {
    pub min_us: u16,
    pub max_us: u16,
}

impl ServoRange {
    pub const fn new(params: &ServoParams) -> Self {
        Self {
            min_us: params.min_us,
            max_us: params.max_us,
        }
    }

    pub fn clamp_us(&self, us: u16) -> u16 {
        us.clamp(self.min_us, self.max_us)
    }

    pub const fn closed_us(&self) -> u16 {
        self.min_us
    }

    pub const fn open_us(&self) -> u16 {
        self.max_us
    }

    pub const fn center_us(&self) -> u16 {
        (self.min_us + self.max_us) / 2
    }
}

/// Published actuator state for monitoring.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoStatus {
    pub min_us: u16,
    pub max_us: u16,
    pub cmd_us: u16,
    pub open: bool,
}

/// Telemetry stall watchdog: if the record timestamp has not advanced
/// since the previous tick, the feed is considered stalled and the servo
/// task retracts.
#[derive(Clone, Copy, Debug, Default)]
pub struct StallWatchdog {
    last_stamp_ms: u32,
}

impl StallWatchdog {
    pub const fn new() -> Self {
        Self { last_stamp_ms: 0 }
    }

    /// Feed one observed timestamp; returns true when the feed is stalled
    /// (never advanced, or identical to the previous observation).
    pub fn stalled(&mut self, stamp_ms: u32) -> bool {
        let stalled = stamp_ms == 0 || stamp_ms == self.last_stamp_ms;
        self.last_stamp_ms = stamp_ms;
        stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServoParams;

    /// A snapshot that satisfies every requirement for opening.
    fn window_record() -> TelemetryRecord {
        let mut rec = TelemetryRecord::new();
        rec.timestamp_ms = 1_000;
        rec.sys.fc_state = FcState::Window as u8;
        rec.sys.sens_imu_a_ok = true;
        rec.sys.sens_baro_ok = true;
        rec.sys.sens_imu_b_ok = true;
        rec.sys.tilt_latch = false;
        rec.sys.t_to_apogee_s = 6.0;
        rec.fused.agl_ready = true;
        rec.fused.mach_cons = 0.3;
        rec
    }

    #[test]
    fn test_opens_only_in_window_with_all_gates() {
        assert!(should_open(&window_record()));

        let mut rec = window_record();
        rec.sys.fc_state = FcState::Boost as u8;
        assert!(!should_open(&rec));

        let mut rec = window_record();
        rec.sys.fc_state = FcState::PostBurnHold as u8;
        assert!(!should_open(&rec));
    }

    #[test]
    fn test_disqualifiers_force_closed() {
        for break_it in [
            (|r: &mut TelemetryRecord| r.sys.sens_imu_a_ok = false) as fn(&mut TelemetryRecord),
            |r| r.sys.sens_baro_ok = false,
            |r| r.sys.sens_imu_b_ok = false,
            |r| r.fused.agl_ready = false,
            |r| r.sys.tilt_latch = true,
            |r| r.fused.mach_cons = 0.6,
            |r| r.fused.mach_cons = f32::NAN,
            |r| r.sys.t_to_apogee_s = 0.8,
            |r| r.sys.fc_state = FcState::AbortLockout as u8,
            |r| r.sys.fc_state = FcState::Locked as u8,
        ] {
            let mut rec = window_record();
            break_it(&mut rec);
            assert!(!should_open(&rec));
        }
    }

    #[test]
    fn test_pulse_mapping() {
        let range = ServoRange::new(&ServoParams::FLIGHT);
        assert_eq!(range.closed_us(), 1_000);
        assert_eq!(range.open_us(), 1_400);
        assert_eq!(range.center_us(), 1_200);
        assert_eq!(range.clamp_us(500), 1_000);
        assert_eq!(range.clamp_us(2_500), 1_400);
        assert_eq!(range.clamp_us(1_234), 1_234);
    }

    #[test]
    fn test_watchdog_flags_stalled_feed() {
        let mut wd = StallWatchdog::new();
        // Never-written telemetry (stamp 0) is stalled from the start.
        assert!(wd.stalled(0));
        assert!(!wd.stalled(20));
        assert!(!wd.stalled(40));
        // Same stamp twice: the aggregator died between our ticks.
        assert!(wd.stalled(40));
        // Fresh stamps recover.
        assert!(!wd.stalled(60));
    }
}
