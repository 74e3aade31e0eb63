//! Monitoring link: the Visualizer line format and the inbound command
//! surface. The transport (USB CDC on target, stdout in the SITL
//! harness) lives with the platform glue; everything here formats into a
//! fixed buffer and parses borrowed bytes.

use core::fmt::{self, Write};

use crate::fc::FcState;
use crate::servo::ServoStatus;
use crate::telemetry::TelemetryRecord;

/// A safe upper bound for one Visualizer line.
pub const MAX_LINE_LEN: usize = 512;

/// Commands accepted on the monitoring link, one per newline-terminated
/// ASCII line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `!cmd:soft_reset` — fusion + FC soft reset.
    SoftReset,
    /// `!cmd:hard_reset` — platform-defined process restart.
    HardReset,
}

pub const EVT_SOFT_RESET: &str = ">evt:soft_reset";
pub const EVT_HARD_RESET: &str = ">evt:hard_reset";

/// Parse one received line (without its terminator). Unknown input is
/// ignored, not an error.
pub fn parse_command(line: &str) -> Option<Command> {
    let cmd = line.strip_prefix("!cmd:")?;
    if cmd.eq_ignore_ascii_case("soft_reset") {
        Some(Command::SoftReset)
    } else if cmd.eq_ignore_ascii_case("hard_reset") {
        Some(Command::HardReset)
    } else {
        None
    }
}

/// Fixed-capacity formatting buffer for monitor output.
pub struct LineBuffer<const SIZE: usize> {
    buf: [u8; SIZE],
    pos: usize,
}

impl<const SIZE: usize> Write for LineBuffer<SIZE> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if SIZE - self.pos < bytes.len() {
            return Err(fmt::Error);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}

impl<const SIZE: usize> LineBuffer<SIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; SIZE],
            pos: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn as_str(&self) -> &str {
        // Only written through write_str, so always valid UTF-8.
        core::str::from_utf8(&self.buf[..self.pos]).unwrap_or("")
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

impl<const SIZE: usize> Default for LineBuffer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

fn kv_f<W: Write>(w: &mut W, key: &str, val: f32, prec: usize) -> fmt::Result {
    if val.is_nan() {
        write!(w, ", {key}:nan")
    } else {
        write!(w, ", {key}:{val:.prec$}")
    }
}

fn kv_i<W: Write>(w: &mut W, key: &str, val: i32) -> fmt::Result {
    write!(w, ", {key}:{val}")
}

fn kv_b<W: Write>(w: &mut W, key: &str, val: bool) -> fmt::Result {
    kv_i(w, key, val as i32)
}

/// Format one Visualizer line (`key:value, key:value, ...`, no
/// terminator) from the latest record.
pub fn visualizer_line<W: Write>(
    w: &mut W,
    rec: &TelemetryRecord,
    servo: Option<&ServoStatus>,
) -> fmt::Result {
    let sys = &rec.sys;
    let fu = &rec.fused;
    let state = FcState::from_u8(sys.fc_state);

    write!(w, "ts_ms:{}", rec.timestamp_ms)?;
    kv_f(w, "vbat_v", sys.vbat_mv as f32 / 1000.0, 3)?;
    kv_i(w, "i2c_errs", sys.i2c_errs as i32)?;
    kv_i(w, "spi_errs", sys.spi_errs as i32)?;
    write!(w, ", fc_state_str:{}", state.name())?;
    kv_i(w, "fc_state", sys.fc_state as i32)?;
    kv_i(w, "fc_flags", sys.fc_flags as i32)?;
    // Status lights
    kv_b(w, "sens_imu_a_ok", sys.sens_imu_a_ok)?;
    kv_b(w, "sens_baro_ok", sys.sens_baro_ok)?;
    kv_b(w, "sens_imu_b_ok", sys.sens_imu_b_ok)?;
    kv_b(w, "baro_agree", sys.baro_agree)?;
    kv_b(w, "mach_ok", sys.mach_ok)?;
    kv_b(w, "tilt_ok", sys.tilt_ok)?;
    kv_b(w, "tilt_latch", sys.tilt_latch)?;
    kv_b(w, "liftoff_det", sys.liftoff_det)?;
    kv_b(w, "burnout_det", sys.burnout_det)?;
    kv_b(w, "lockout", state == FcState::AbortLockout)?;
    // Times
    kv_f(w, "t_since_launch_s", sys.t_since_launch_s, 2)?;
    kv_f(w, "t_to_apogee_s", sys.t_to_apogee_s, 2)?;
    // Airbrake
    kv_f(w, "cmd_deg", rec.ctl.airbrake_cmd_deg, 2)?;
    kv_f(w, "act_deg", rec.ctl.airbrake_actual_deg, 2)?;
    // Fused core for graphs and gauges
    kv_b(w, "agl_ready", fu.agl_ready)?;
    kv_f(w, "temp_c", fu.temp_c, 2)?;
    kv_f(w, "agl_fused_m", fu.agl_fused_m, 3)?;
    kv_f(w, "vz_fused_mps", fu.vz_fused_mps, 3)?;
    kv_f(w, "az_earth_mps2", fu.az_earth_mps2, 3)?;
    kv_f(w, "tilt_deg", fu.tilt_deg, 2)?;
    kv_f(w, "tilt_az_deg360", fu.tilt_az_deg360, 1)?;
    kv_f(w, "mach_cons", fu.mach_cons, 4)?;
    // Fusion sub-values for verification
    kv_f(w, "agl_bmp_m", fu.agl_bmp_m, 3)?;
    kv_f(w, "agl_imu_m", fu.agl_imu_m, 3)?;
    kv_f(w, "vz_baro_mps", fu.vz_baro_mps, 3)?;
    kv_f(w, "vz_acc_mps", fu.vz_acc_mps, 3)?;
    if let Some(sv) = servo {
        kv_b(w, "servo_open", sv.open)?;
        kv_i(w, "servo_cmd_us", sv.cmd_us as i32)?;
        kv_i(w, "servo_min_us", sv.min_us as i32)?;
        kv_i(w, "servo_max_us", sv.max_us as i32)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fc::FcState;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("!cmd:soft_reset"), Some(Command::SoftReset));
        assert_eq!(parse_command("!cmd:SOFT_RESET"), Some(Command::SoftReset));
        assert_eq!(parse_command("!cmd:hard_reset"), Some(Command::HardReset));
        assert_eq!(parse_command("!cmd:bogus"), None);
        assert_eq!(parse_command("!servo:open"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_visualizer_line_contents() {
        let mut rec = TelemetryRecord::new();
        rec.timestamp_ms = 8_040;
        rec.sys.fc_state = FcState::Window as u8;
        rec.sys.vbat_mv = 4_100;
        rec.sys.mach_ok = true;
        rec.fused.agl_fused_m = 812.125;
        rec.fused.mach_cons = 0.3081;

        let mut line = LineBuffer::<MAX_LINE_LEN>::new();
        visualizer_line(&mut line, &rec, None).unwrap();
        let s = line.as_str();

        assert!(s.starts_with("ts_ms:8040"), "line = {s}");
        assert!(s.contains(", fc_state_str:WINDOW"));
        assert!(s.contains(", fc_state:5"));
        assert!(s.contains(", vbat_v:4.100"));
        assert!(s.contains(", mach_ok:1"));
        assert!(s.contains(", agl_fused_m:812.125"));
        assert!(s.contains(", mach_cons:0.3081"));
        // Unknown values print as nan, not as a number.
        assert!(s.contains(", vz_fused_mps:nan"));
        assert!(!s.contains("servo_open"));
    }

    #[test]
    fn test_visualizer_line_with_servo() {
        let rec = TelemetryRecord::new();
        let sv = ServoStatus {
            min_us: 1_000,
            max_us: 1_400,
            cmd_us: 1_400,
            open: true,
        };
        let mut line = LineBuffer::<MAX_LINE_LEN>::new();
        visualizer_line(&mut line, &rec, Some(&sv)).unwrap();
        let s = line.as_str();
        assert!(s.contains(", servo_open:1"));
        assert!(s.contains(", servo_cmd_us:1400"));
    }

    #[test]
    fn test_line_buffer_overflow_is_an_error() {
        let mut line = LineBuffer::<8>::new();
        assert!(write!(line, "0123456789").is_err());
    }
}
