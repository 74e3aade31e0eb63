//! Quaternion attitude math.
//!
//! All quaternions are (w, x, y, z), body -> earth. Euler output is for
//! display only; tilt is computed directly from the quaternion so it stays
//! well-conditioned near vertical.

use libm::{acosf, asinf, atan2f};

pub const DEG_PER_RAD: f32 = 57.295_78;
pub const RAD_PER_DEG: f32 = 0.017_453_293;

/// Rotate a body-frame vector into the earth frame.
pub fn rotate_vec(q: &[f32; 4], v: &[f32; 3]) -> [f32; 3] {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    let (xx, yy, zz) = (x * x, y * y, z * z);
    let r00 = 1.0 - 2.0 * (yy + zz);
    let r01 = 2.0 * (x * y - w * z);
    let r02 = 2.0 * (x * z + w * y);
    let r10 = 2.0 * (x * y + w * z);
    let r11 = 1.0 - 2.0 * (xx + zz);
    let r12 = 2.0 * (y * z - w * x);
    let r20 = 2.0 * (x * z - w * y);
    let r21 = 2.0 * (y * z + w * x);
    let r22 = 1.0 - 2.0 * (xx + yy);
    [
        r00 * v[0] + r01 * v[1] + r02 * v[2],
        r10 * v[0] + r11 * v[1] + r12 * v[2],
        r20 * v[0] + r21 * v[1] + r22 * v[2],
    ]
}

/// Display Euler angles (yaw, pitch, roll) in degrees.
pub fn to_euler(q: &[f32; 4]) -> (f32, f32, f32) {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    let yaw = atan2f(2.0 * (x * y + w * z), 1.0 - 2.0 * (y * y + z * z)) * DEG_PER_RAD;
    let pitch = asinf(2.0 * (w * y - z * x)) * DEG_PER_RAD;
    let roll = atan2f(2.0 * (w * x + y * z), 1.0 - 2.0 * (x * x + y * y)) * DEG_PER_RAD;
    (yaw, pitch, roll)
}

/// Angle between the rotated body +X (nose) axis and earth +Z, degrees.
/// Returns the earth-frame nose vector alongside so callers can reuse its
/// horizontal projection for the azimuth.
pub fn tilt_from_vertical(q: &[f32; 4]) -> (f32, [f32; 3]) {
    let nose = rotate_vec(q, &[1.0, 0.0, 0.0]);
    let cz = nose[2].clamp(-1.0, 1.0);
    (acosf(cz) * DEG_PER_RAD, nose)
}

/// Wrap an angle delta into (-180, 180] degrees.
pub fn wrap_delta_deg(mut delta: f32) -> f32 {
    while delta > 180.0 {
        delta -= 360.0;
    }
    while delta <= -180.0 {
        delta += 360.0;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use libm::sinf;

    const EPS: f32 = 1e-3;

    fn quat_about_y(angle_deg: f32) -> [f32; 4] {
        let half = angle_deg * RAD_PER_DEG * 0.5;
        [libm::cosf(half), 0.0, sinf(half), 0.0]
    }

    #[test]
    fn test_identity_rotation() {
        let v = rotate_vec(&[1.0, 0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]);
        assert!((v[0] - 1.0).abs() < EPS);
        assert!((v[1] - 2.0).abs() < EPS);
        assert!((v[2] - 3.0).abs() < EPS);
    }

    #[test]
    fn test_tilt_vertical_nose() {
        // Nose along +X: 90 deg from earth up.
        let (tilt, _) = tilt_from_vertical(&[1.0, 0.0, 0.0, 0.0]);
        assert!((tilt - 90.0).abs() < EPS, "tilt = {tilt}");

        // Pitch the nose up to vertical: -90 deg about Y maps +X onto +Z.
        let (tilt, nose) = tilt_from_vertical(&quat_about_y(-90.0));
        assert!(tilt.abs() < 0.1, "tilt = {tilt}");
        assert!((nose[2] - 1.0).abs() < EPS);
    }

    #[test]
    fn test_tilt_in_range() {
        for deg in (-180..=180).step_by(15) {
            let (tilt, _) = tilt_from_vertical(&quat_about_y(deg as f32));
            assert!((0.0..=180.0).contains(&tilt), "tilt = {tilt} at {deg}");
        }
    }

    #[test]
    fn test_euler_identity() {
        let (yaw, pitch, roll) = to_euler(&[1.0, 0.0, 0.0, 0.0]);
        assert!(yaw.abs() < EPS && pitch.abs() < EPS && roll.abs() < EPS);
    }

    #[test]
    fn test_wrap_delta() {
        assert!((wrap_delta_deg(190.0) + 170.0).abs() < EPS);
        assert!((wrap_delta_deg(-190.0) - 170.0).abs() < EPS);
        assert!((wrap_delta_deg(180.0) - 180.0).abs() < EPS);
        assert!((wrap_delta_deg(0.0)).abs() < EPS);
    }
}
