use super::*;
use crate::fc::FcState;

fn sample_record(with_crc: bool) -> TelemetryRecord {
    let baro = BaroReading {
        temperature_c: 14.5,
        pressure_pa: 101_180.0,
        altitude_m: 132.8,
        valid: true,
    };
    let imu_a = ImuAReading {
        quat: [0.98, 0.01, -0.17, 0.05],
        accel_g: [0.02, -0.01, 1.01],
        pressure_pa: 101_210.0,
        altitude_m: 130.1,
        valid: true,
    };
    let imu_b = ImuBReading {
        accel_g: [0.03, 0.0, 1.02],
        gyro_dps: [0.4, -1.2, 0.1],
        temp_c: 22.0,
        valid: true,
    };
    let mut fc = FcStatus::new();
    fc.state = FcState::Window;
    fc.flags = FCF_SENS_IMU_A_OK | FCF_SENS_BARO_OK | FCF_MACH_OK | FCF_TILT_OK;
    fc.t_since_launch_s = 7.3;
    fc.t_to_apogee_s = 5.9;
    fc.airbrake_cmd_deg = 0.0;
    let mut fused = FusedAlt::new();
    fused.stamp_ms = 123_456;
    fused.agl_ready = true;
    fused.agl_fused_m = 812.5;
    fused.vz_fused_mps = 74.0;
    fused.tilt_deg = 4.2;
    // Leave the remaining fused fields NaN: unknown values must survive
    // the wire byte-for-byte too.
    let sys_in = SystemInputs {
        vbat_mv: 4_012,
        i2c_errs: 3,
        spi_errs: 0,
    };
    TelemetryRecord::compose(42, 123_456, &baro, &imu_a, &imu_b, &fc, &fused, &sys_in, with_crc)
}

#[test]
fn test_record_len_and_header_layout() {
    let rec = sample_record(false);
    let mut buf = [0u8; RECORD_LEN];
    rec.encode(&mut buf);
    assert_eq!(RECORD_LEN, 260);
    assert_eq!(buf[0], 0xAB);
    assert_eq!(buf[1], 0xCD);
    assert_eq!(buf[2], PACKET_TYPE_FULL);
    assert_eq!(buf[3], 0);
    assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 42);
    assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 123_456);
}

#[test]
fn test_present_flag_values() {
    assert_eq!(TP_BARO, 1);
    assert_eq!(TP_IMU_A, 2);
    assert_eq!(TP_SYSTEM, 4);
    assert_eq!(TP_CONTROL, 8);
    assert_eq!(TP_IMU_B, 16);
    let rec = sample_record(false);
    assert_eq!(rec.present, TP_BARO | TP_IMU_A | TP_SYSTEM | TP_CONTROL | TP_IMU_B);
}

#[test]
fn test_round_trip_is_bit_exact() {
    let rec = sample_record(true);
    let mut buf = [0u8; RECORD_LEN];
    rec.encode(&mut buf);

    let back = TelemetryRecord::decode(&buf).unwrap();
    let mut buf2 = [0u8; RECORD_LEN];
    back.encode(&mut buf2);
    // Comparing re-encoded bytes covers every field, NaN payloads
    // included, without tripping over NaN != NaN.
    assert_eq!(buf[..], buf2[..]);

    assert_eq!(back.seq, 42);
    assert_eq!(back.sys.fc_state, FcState::Window as u8);
    assert!(back.sys.mach_ok);
    assert!(!back.sys.tilt_latch);
    assert!(back.fused.agl_bmp_m.is_nan());
    assert_eq!(back.ctl.airbrake_actual_deg, 0.0);
}

#[test]
fn test_decode_rejects_bad_input() {
    let rec = sample_record(false);
    let mut buf = [0u8; RECORD_LEN];
    rec.encode(&mut buf);

    assert_eq!(
        TelemetryRecord::decode(&buf[..RECORD_LEN - 1]),
        Err(DecodeError::Truncated)
    );
    buf[0] = 0xFF;
    assert_eq!(TelemetryRecord::decode(&buf), Err(DecodeError::BadMagic));
}

#[test]
fn test_crc_verifies_and_catches_corruption() {
    let rec = sample_record(true);
    assert_ne!(rec.crc32, 0);
    let mut buf = [0u8; RECORD_LEN];
    rec.encode(&mut buf);
    assert!(verify_crc(&buf));

    // Flip a single byte in the control section.
    buf[CONTROL_OFFSET + 1] ^= 0x40;
    assert!(!verify_crc(&buf));
}

#[test]
fn test_crc_disabled_reads_zero() {
    let rec = sample_record(false);
    assert_eq!(rec.crc32, 0);
    let mut buf = [0u8; RECORD_LEN];
    rec.encode(&mut buf);
    assert!(verify_crc(&buf));
}

#[test]
fn test_crc32_known_vector() {
    // The classic check value for the reflected IEEE polynomial.
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
}

#[test]
fn test_invalid_sensors_are_blanked() {
    let mut baro = BaroReading {
        temperature_c: 99.0,
        pressure_pa: 5.0,
        altitude_m: 7.0,
        valid: false,
    };
    let imu_a = ImuAReading::new();
    let imu_b = ImuBReading::new();
    let rec = TelemetryRecord::compose(
        0,
        0,
        &baro,
        &imu_a,
        &imu_b,
        &FcStatus::new(),
        &FusedAlt::new(),
        &SystemInputs::default(),
        false,
    );
    assert!(!rec.baro.valid);
    assert_eq!(rec.baro.altitude_m, 0.0);

    baro.valid = true;
    let rec = TelemetryRecord::compose(
        0,
        0,
        &baro,
        &imu_a,
        &imu_b,
        &FcStatus::new(),
        &FusedAlt::new(),
        &SystemInputs::default(),
        false,
    );
    assert_eq!(rec.baro.altitude_m, 7.0);
}
