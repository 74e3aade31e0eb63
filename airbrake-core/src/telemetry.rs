//! Telemetry aggregation and the packed wire record.
//!
//! The record is a fixed-layout snapshot with no padding surprises: it is
//! encoded field by field, explicitly little-endian (which is also the
//! byte order of the Cortex-M target, so on-wire and in-RAM layouts
//! agree). The optional trailing CRC-32 is the reflected IEEE polynomial
//! 0xEDB88320 computed over all preceding bytes.

use crate::fc::{
    FcStatus, FCF_BARO_AGREE, FCF_BURNOUT_DET, FCF_LIFTOFF_DET, FCF_MACH_OK, FCF_SENS_BARO_OK,
    FCF_SENS_IMU_A_OK, FCF_SENS_IMU_B_OK, FCF_TILT_LATCH, FCF_TILT_OK,
};
use crate::fusion::FusedAlt;
use crate::readings::{BaroReading, ImuAReading, ImuBReading};

pub const TELEM_MAGIC: [u8; 2] = [0xAB, 0xCD];
/// Full-record packet type.
pub const PACKET_TYPE_FULL: u8 = 0;

// Section presence bitmask.
pub const TP_BARO: u32 = 1 << 0;
pub const TP_IMU_A: u32 = 1 << 1;
pub const TP_SYSTEM: u32 = 1 << 2;
pub const TP_CONTROL: u32 = 1 << 3;
pub const TP_IMU_B: u32 = 1 << 4;

pub const HEADER_LEN: usize = 16;
pub const BARO_LEN: usize = 16;
pub const IMU_A_LEN: usize = 40;
pub const IMU_B_LEN: usize = 32;
pub const SYSTEM_LEN: usize = 32;
pub const CONTROL_LEN: usize = 8;
pub const FUSED_LEN: usize = 112;
/// Total encoded record size, CRC included.
pub const RECORD_LEN: usize =
    HEADER_LEN + BARO_LEN + IMU_A_LEN + IMU_B_LEN + SYSTEM_LEN + CONTROL_LEN + FUSED_LEN + 4;

/// Byte offset of the control section (start of `airbrake_cmd_deg`).
pub const CONTROL_OFFSET: usize = HEADER_LEN + BARO_LEN + IMU_A_LEN + IMU_B_LEN + SYSTEM_LEN;

/// System status metrics mirrored into every record.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemSection {
    pub vbat_mv: u16,
    pub i2c_errs: u16,
    pub spi_errs: u16,
    pub fc_state: u8,
    pub fc_flags: u32,
    // FC flags as explicit booleans (status lights)
    pub sens_imu_a_ok: bool,
    pub sens_baro_ok: bool,
    pub sens_imu_b_ok: bool,
    pub baro_agree: bool,
    pub mach_ok: bool,
    pub tilt_ok: bool,
    pub tilt_latch: bool,
    pub liftoff_det: bool,
    pub burnout_det: bool,
    pub t_since_launch_s: f32,
    pub t_to_apogee_s: f32,
}

/// Actuator telemetry. There is no position-feedback path, so
/// `airbrake_actual_deg` stays 0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlSection {
    pub airbrake_cmd_deg: f32,
    pub airbrake_actual_deg: f32,
}

/// Battery and bus counters, supplied by the platform glue.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemInputs {
    pub vbat_mv: u16,
    pub i2c_errs: u16,
    pub spi_errs: u16,
}

/// The full telemetry record.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryRecord {
    pub seq: u32,
    pub timestamp_ms: u32,
    pub present: u32,
    pub baro: BaroReading,
    pub imu_a: ImuAReading,
    pub imu_b: ImuBReading,
    pub sys: SystemSection,
    pub ctl: ControlSection,
    pub fused: FusedAlt,
    /// 0 when CRC is disabled.
    pub crc32: u32,
}

impl TelemetryRecord {
    pub const fn new() -> Self {
        Self {
            seq: 0,
            timestamp_ms: 0,
            present: 0,
            baro: BaroReading::new(),
            imu_a: ImuAReading::new(),
            imu_b: ImuBReading::new(),
            sys: SystemSection {
                vbat_mv: 0,
                i2c_errs: 0,
                spi_errs: 0,
                fc_state: 0,
                fc_flags: 0,
                sens_imu_a_ok: false,
                sens_baro_ok: false,
                sens_imu_b_ok: false,
                baro_agree: false,
                mach_ok: false,
                tilt_ok: false,
                tilt_latch: false,
                liftoff_det: false,
                burnout_det: false,
                t_since_launch_s: 0.0,
                t_to_apogee_s: 0.0,
            },
            ctl: ControlSection {
                airbrake_cmd_deg: 0.0,
                airbrake_actual_deg: 0.0,
            },
            fused: FusedAlt::new(),
            crc32: 0,
        }
    }

    /// Build a fresh record from the current snapshots. Invalid sensor
    /// readings are blanked so a stale value never leaves the board.
    pub fn compose(
        seq: u32,
        now_ms: u32,
        baro: &BaroReading,
        imu_a: &ImuAReading,
        imu_b: &ImuBReading,
        fc: &FcStatus,
        fused: &FusedAlt,
        sys_in: &SystemInputs,
        with_crc: bool,
    ) -> Self {
        let mut rec = Self::new();
        rec.seq = seq;
        rec.timestamp_ms = now_ms;
        rec.present = TP_BARO | TP_IMU_A | TP_IMU_B | TP_SYSTEM | TP_CONTROL;

        if baro.valid {
            rec.baro = *baro;
        }
        if imu_a.valid {
            rec.imu_a = *imu_a;
        }
        if imu_b.valid {
            rec.imu_b = *imu_b;
        }

        let ff = fc.flags;
        rec.sys = SystemSection {
            vbat_mv: sys_in.vbat_mv,
            i2c_errs: sys_in.i2c_errs,
            spi_errs: sys_in.spi_errs,
            fc_state: fc.state as u8,
            fc_flags: ff,
            sens_imu_a_ok: ff & FCF_SENS_IMU_A_OK != 0,
            sens_baro_ok: ff & FCF_SENS_BARO_OK != 0,
            sens_imu_b_ok: ff & FCF_SENS_IMU_B_OK != 0,
            baro_agree: ff & FCF_BARO_AGREE != 0,
            mach_ok: ff & FCF_MACH_OK != 0,
            tilt_ok: ff & FCF_TILT_OK != 0,
            tilt_latch: ff & FCF_TILT_LATCH != 0,
            liftoff_det: ff & FCF_LIFTOFF_DET != 0,
            burnout_det: ff & FCF_BURNOUT_DET != 0,
            t_since_launch_s: fc.t_since_launch_s,
            t_to_apogee_s: fc.t_to_apogee_s,
        };
        rec.ctl.airbrake_cmd_deg = fc.airbrake_cmd_deg;
        rec.ctl.airbrake_actual_deg = 0.0;
        rec.fused = *fused;

        if with_crc {
            let mut buf = [0u8; RECORD_LEN];
            rec.encode(&mut buf);
            rec.crc32 = crc32(&buf[..RECORD_LEN - 4]);
        }
        rec
    }

    /// Serialize into the packed wire layout (little-endian). The stored
    /// `crc32` is written verbatim.
    pub fn encode(&self, buf: &mut [u8; RECORD_LEN]) {
        let mut w = Writer { buf, pos: 0 };
        // Header
        w.put_u8(TELEM_MAGIC[0]);
        w.put_u8(TELEM_MAGIC[1]);
        w.put_u8(PACKET_TYPE_FULL);
        w.put_pad(1);
        w.put_u32(self.seq);
        w.put_u32(self.timestamp_ms);
        w.put_u32(self.present);
        // Baro
        w.put_f32(self.baro.temperature_c);
        w.put_f32(self.baro.pressure_pa);
        w.put_f32(self.baro.altitude_m);
        w.put_bool(!self.baro.valid); // status: 0 = ok
        w.put_bool(self.baro.valid);
        w.put_pad(2);
        // IMU-A
        for q in self.imu_a.quat {
            w.put_f32(q);
        }
        for a in self.imu_a.accel_g {
            w.put_f32(a);
        }
        w.put_f32(self.imu_a.pressure_pa);
        w.put_f32(self.imu_a.altitude_m);
        w.put_bool(!self.imu_a.valid);
        w.put_bool(self.imu_a.valid);
        w.put_pad(2);
        // IMU-B
        for a in self.imu_b.accel_g {
            w.put_f32(a);
        }
        for g in self.imu_b.gyro_dps {
            w.put_f32(g);
        }
        w.put_f32(self.imu_b.temp_c);
        w.put_bool(!self.imu_b.valid);
        w.put_bool(self.imu_b.valid);
        w.put_pad(2);
        // System
        w.put_u16(self.sys.vbat_mv);
        w.put_u16(self.sys.i2c_errs);
        w.put_u16(self.sys.spi_errs);
        w.put_u8(self.sys.fc_state);
        w.put_pad(1);
        w.put_u32(self.sys.fc_flags);
        w.put_bool(self.sys.sens_imu_a_ok);
        w.put_bool(self.sys.sens_baro_ok);
        w.put_bool(self.sys.sens_imu_b_ok);
        w.put_bool(self.sys.baro_agree);
        w.put_bool(self.sys.mach_ok);
        w.put_bool(self.sys.tilt_ok);
        w.put_bool(self.sys.tilt_latch);
        w.put_bool(self.sys.liftoff_det);
        w.put_bool(self.sys.burnout_det);
        w.put_pad(3);
        w.put_f32(self.sys.t_since_launch_s);
        w.put_f32(self.sys.t_to_apogee_s);
        // Control
        w.put_f32(self.ctl.airbrake_cmd_deg);
        w.put_f32(self.ctl.airbrake_actual_deg);
        // Fused
        let f = &self.fused;
        w.put_u32(f.stamp_ms);
        w.put_bool(f.agl_ready);
        w.put_pad(3);
        for v in [
            f.bmp_alt_m,
            f.imu_alt_m,
            f.agl_bmp_m,
            f.agl_imu_m,
            f.agl_fused_m,
            f.vz_baro_mps,
            f.vz_acc_mps,
            f.vz_fused_mps,
            f.az_earth_mps2,
            f.temp_c,
            f.press_hpa,
            f.sos_mps,
            f.mach_vz,
            f.sos_ground_mps,
            f.sos_10kft_mps,
            f.sos_min_mps,
            f.mach_cons,
            f.yaw_deg,
            f.pitch_deg,
            f.roll_deg,
            f.tilt_deg,
            f.tilt_az_deg,
            f.tilt_az_deg360,
            f.tilt_az_unwrapped_deg,
            f.t_apogee_s,
            f.apogee_agl_m,
        ] {
            w.put_f32(v);
        }
        w.put_u32(self.crc32);
        debug_assert_eq!(w.pos, RECORD_LEN);
    }

    /// Parse a wire record. Verifies length and magic; CRC checking is
    /// separate (see [`verify_crc`]) since the CRC is optional.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < RECORD_LEN {
            return Err(DecodeError::Truncated);
        }
        if buf[0] != TELEM_MAGIC[0] || buf[1] != TELEM_MAGIC[1] {
            return Err(DecodeError::BadMagic);
        }
        let mut r = Reader { buf, pos: 2 };
        let mut rec = Self::new();
        let _packet_type = r.get_u8();
        r.skip(1);
        rec.seq = r.get_u32();
        rec.timestamp_ms = r.get_u32();
        rec.present = r.get_u32();

        rec.baro.temperature_c = r.get_f32();
        rec.baro.pressure_pa = r.get_f32();
        rec.baro.altitude_m = r.get_f32();
        r.skip(1); // status mirrors !ok
        rec.baro.valid = r.get_bool();
        r.skip(2);

        for q in rec.imu_a.quat.iter_mut() {
            *q = r.get_f32();
        }
        for a in rec.imu_a.accel_g.iter_mut() {
            *a = r.get_f32();
        }
        rec.imu_a.pressure_pa = r.get_f32();
        rec.imu_a.altitude_m = r.get_f32();
        r.skip(1);
        rec.imu_a.valid = r.get_bool();
        r.skip(2);

        for a in rec.imu_b.accel_g.iter_mut() {
            *a = r.get_f32();
        }
        for g in rec.imu_b.gyro_dps.iter_mut() {
            *g = r.get_f32();
        }
        rec.imu_b.temp_c = r.get_f32();
        r.skip(1);
        rec.imu_b.valid = r.get_bool();
        r.skip(2);

        rec.sys.vbat_mv = r.get_u16();
        rec.sys.i2c_errs = r.get_u16();
        rec.sys.spi_errs = r.get_u16();
        rec.sys.fc_state = r.get_u8();
        r.skip(1);
        rec.sys.fc_flags = r.get_u32();
        rec.sys.sens_imu_a_ok = r.get_bool();
        rec.sys.sens_baro_ok = r.get_bool();
        rec.sys.sens_imu_b_ok = r.get_bool();
        rec.sys.baro_agree = r.get_bool();
        rec.sys.mach_ok = r.get_bool();
        rec.sys.tilt_ok = r.get_bool();
        rec.sys.tilt_latch = r.get_bool();
        rec.sys.liftoff_det = r.get_bool();
        rec.sys.burnout_det = r.get_bool();
        r.skip(3);
        rec.sys.t_since_launch_s = r.get_f32();
        rec.sys.t_to_apogee_s = r.get_f32();

        rec.ctl.airbrake_cmd_deg = r.get_f32();
        rec.ctl.airbrake_actual_deg = r.get_f32();

        rec.fused.stamp_ms = r.get_u32();
        rec.fused.agl_ready = r.get_bool();
        r.skip(3);
        let f = &mut rec.fused;
        for v in [
            &mut f.bmp_alt_m,
            &mut f.imu_alt_m,
            &mut f.agl_bmp_m,
            &mut f.agl_imu_m,
            &mut f.agl_fused_m,
            &mut f.vz_baro_mps,
            &mut f.vz_acc_mps,
            &mut f.vz_fused_mps,
            &mut f.az_earth_mps2,
            &mut f.temp_c,
            &mut f.press_hpa,
            &mut f.sos_mps,
            &mut f.mach_vz,
            &mut f.sos_ground_mps,
            &mut f.sos_10kft_mps,
            &mut f.sos_min_mps,
            &mut f.mach_cons,
            &mut f.yaw_deg,
            &mut f.pitch_deg,
            &mut f.roll_deg,
            &mut f.tilt_deg,
            &mut f.tilt_az_deg,
            &mut f.tilt_az_deg360,
            &mut f.tilt_az_unwrapped_deg,
            &mut f.t_apogee_s,
            &mut f.apogee_agl_m,
        ] {
            *v = r.get_f32();
        }
        rec.crc32 = r.get_u32();
        debug_assert_eq!(r.pos, RECORD_LEN);
        Ok(rec)
    }
}

impl Default for TelemetryRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    Truncated,
    BadMagic,
}

/// Check the trailing CRC of an encoded record. A zero CRC field means
/// "disabled" and always passes.
pub fn verify_crc(buf: &[u8; RECORD_LEN]) -> bool {
    let stored = u32::from_le_bytes([
        buf[RECORD_LEN - 4],
        buf[RECORD_LEN - 3],
        buf[RECORD_LEN - 2],
        buf[RECORD_LEN - 1],
    ]);
    stored == 0 || stored == crc32(&buf[..RECORD_LEN - 4])
}

/// Reflected IEEE CRC-32 (polynomial 0xEDB88320, init and final XOR
/// 0xFFFFFFFF).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    crc ^ 0xFFFF_FFFF
}

struct Writer<'a> {
    buf: &'a mut [u8; RECORD_LEN],
    pos: usize,
}

impl Writer<'_> {
    fn put_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn put_bool(&mut self, v: bool) {
        self.put_u8(v as u8);
    }

    fn put_pad(&mut self, n: usize) {
        for _ in 0..n {
            self.put_u8(0);
        }
    }

    fn put_u16(&mut self, v: u16) {
        self.buf[self.pos..self.pos + 2].copy_from_slice(&v.to_le_bytes());
        self.pos += 2;
    }

    fn put_u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn put_f32(&mut self, v: f32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn get_u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn get_bool(&mut self) -> bool {
        self.get_u8() != 0
    }

    fn get_u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn get_u32(&mut self) -> u32 {
        let v = u32::from_le_bytes([
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ]);
        self.pos += 4;
        v
    }

    fn get_f32(&mut self) -> f32 {
        let v = f32::from_le_bytes([
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ]);
        self.pos += 4;
        v
    }
}

#[cfg(test)]
mod tests;
