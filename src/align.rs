//! Coarse alignment from IMU data alone.
//!
//! Every routine returns `C_b^n`, body to NED.

use crate::attitude::{dcm_to_euler, quat_rotate, quat_to_dcm, rv_to_dcm, rv_to_quat, Quat};
use crate::earth::Earth;
use crate::error::{InsError, Result};
use crate::imu::ImuDataset;
use crate::linalg::{normalize, outer, svd, Mat3, Vec3};

/// Smallest accepted sine of the angle between the two observations.
pub const NEAR_PARALLEL_EPS: f64 = 1e-6;

/// Smallest accepted ratio of the second to the first singular value of the
/// Wahba attitude profile matrix.
pub const WAHBA_RANK_EPS: f64 = 1e-12;

fn triad(v1: &Vec3, v2: &Vec3) -> Result<Mat3> {
    let mut t1 = *v1;
    let n1 = normalize(&mut t1)?;
    let mut t2 = v1.cross(v2);
    let n2 = v2.norm();
    if !(n2 > 0.0) {
        return Err(InsError::DegenerateVector);
    }
    let sin_angle = t2.norm() / (n1 * n2);
    if !(sin_angle > NEAR_PARALLEL_EPS) {
        log::warn!("dual-vector observations are near-parallel, sin = {sin_angle:e}");
        return Err(InsError::NearParallel { sin_angle });
    }
    normalize(&mut t2)?;
    let t3 = t1.cross(&t2);
    Ok(Mat3::from_columns(&[t1, t2, t3]))
}

/// Attitude from two non-parallel vectors observed in both frames (TRIAD).
///
/// `vn1`/`vb1` is the primary pair and is matched exactly; the second pair
/// only fixes the rotation about it.
pub fn dual_vector_attitude(vn1: &Vec3, vn2: &Vec3, vb1: &Vec3, vb2: &Vec3) -> Result<Mat3> {
    let mn = triad(vn1, vn2)?;
    let mb = triad(vb1, vb2)?;
    Ok(mn * mb.transpose())
}

fn log_result(method: &str, cbn: &Mat3, samples: usize) {
    let e = dcm_to_euler(cbn);
    log::debug!(
        "{method} alignment over {samples} samples: roll {:.4} pitch {:.4} yaw {:.4} deg",
        e.x.to_degrees(),
        e.y.to_degrees(),
        e.z.to_degrees()
    );
}

/// Static-base alignment: mean specific force against gravity, mean angular
/// rate against earth rate.
pub fn align_coarse_static_base(earth: &Earth, imu: &ImuDataset, lat: f64) -> Result<Mat3> {
    if imu.is_empty() {
        return Err(InsError::InsufficientSamples {
            required: 1,
            available: 0,
        });
    }
    // only directions matter, so sums stand in for means
    let gyro_sum: Vec3 = imu.iter().map(|s| s.gyro).sum();
    let accel_sum: Vec3 = imu.iter().map(|s| s.accel).sum();

    let f_n = -earth.gravity_ned(lat, 0.0);
    let w_n = earth.wie_n(lat);

    let cbn = dual_vector_attitude(&f_n, &w_n, &accel_sum, &gyro_sum)?;
    log_result("static-base", &cbn, imu.len());
    Ok(cbn)
}

/// Integrated specific force in the body frame frozen at the start of the
/// window (`ib0`), together with `C_b^{ib0}` at the end of each sample.
struct BodyInertial {
    q: Quat,
    v: Vec3,
}

impl BodyInertial {
    fn new() -> Self {
        Self {
            q: Quat::identity(),
            v: Vec3::zeros(),
        }
    }

    fn update(&mut self, dtheta: &Vec3, dv: &Vec3) {
        let q_mid = self.q * rv_to_quat(&(dtheta * 0.5));
        self.v += quat_rotate(&q_mid, dv);
        self.q *= rv_to_quat(dtheta);
    }
}

/// `C_n^{n0}(t)`: NED at time `t` into the NED frame frozen at t = 0.
fn nav_to_nav0(w_n: &Vec3, t: f64) -> Mat3 {
    rv_to_dcm(&(w_n * t))
}

fn intervals(imu: &ImuDataset) -> Result<Vec<f64>> {
    let dt0 = imu.sample_interval()?;
    let s = imu.samples();
    Ok(std::iter::once(dt0)
        .chain(s.windows(2).map(|w| w[1].time.diff(&w[0].time)))
        .collect())
}

/// Inertial-frame alignment.
///
/// Gravity seen in the start-frozen NED frame turns with the earth, so the
/// integrated specific force at mid-window and at the end of the window gives
/// two distinct directions in both the frozen navigation frame and the frozen
/// body frame. Body rotation during the window is absorbed by the gyro
/// integration, so the platform may sway as long as it does not translate.
pub fn align_coarse_inertial(earth: &Earth, imu: &ImuDataset, lat: f64) -> Result<Mat3> {
    let dts = intervals(imu)?;
    let w_n = earth.wie_n(lat);
    let f_n = -earth.gravity_ned(lat, 0.0);

    let mid = imu.len() / 2;
    let mut body = BodyInertial::new();
    let mut v_n0 = Vec3::zeros();
    let mut at_mid = (Vec3::zeros(), Vec3::zeros());
    let mut t = 0.0;

    for (k, (s, dt)) in imu.iter().zip(&dts).enumerate() {
        body.update(&s.gyro, &s.accel);
        v_n0 += nav_to_nav0(&w_n, t + 0.5 * dt) * f_n * *dt;
        t += dt;
        if k + 1 == mid {
            at_mid = (v_n0, body.v);
        }
    }

    let c_ib0_n0 = dual_vector_attitude(&at_mid.0, &v_n0, &at_mid.1, &body.v)?;
    let cbn = nav_to_nav0(&w_n, t).transpose() * c_ib0_n0 * quat_to_dcm(&body.q);
    log_result("inertial-frame", &cbn, imu.len());
    Ok(cbn)
}

/// Solves Wahba's problem: the rotation `C` minimising
/// `sum w_i |nav_i - C body_i|^2`. Uniform weights when `weights` is `None`.
pub fn wahba(nav: &[Vec3], body: &[Vec3], weights: Option<&[f64]>) -> Result<Mat3> {
    if nav.len() != body.len() {
        return Err(InsError::LengthMismatch {
            expected: nav.len(),
            actual: body.len(),
        });
    }
    if let Some(w) = weights {
        if w.len() != nav.len() {
            return Err(InsError::LengthMismatch {
                expected: nav.len(),
                actual: w.len(),
            });
        }
    }
    if nav.len() < 2 {
        return Err(InsError::InsufficientSamples {
            required: 2,
            available: nav.len(),
        });
    }

    let b: Mat3 = nav
        .iter()
        .zip(body)
        .enumerate()
        .map(|(i, (n, b))| outer(n, b) * weights.map_or(1.0, |w| w[i]))
        .sum();

    let s = svd(&b)?;
    if !(s.d[0] > 0.0) || !(s.d[1] > WAHBA_RANK_EPS * s.d[0]) {
        log::warn!("Wahba observations do not span two directions: {:?}", s.d);
        return Err(InsError::DegenerateGeometry([s.d[0], s.d[1], s.d[2]]));
    }

    let d = crate::linalg::det(&s.u) * crate::linalg::det(&s.v);
    Ok(s.u * Mat3::from_diagonal(&Vec3::new(1.0, 1.0, d)) * s.v.transpose())
}

/// Optimal-estimation alignment from reference NED velocities.
///
/// `veb_n[k]` is the reference velocity at the time of sample `k`. The
/// specific-force integral from sample 0 to sample `k` is compared in the
/// start-frozen body and navigation frames for every `k`; the transport rate
/// of the navigation frame is neglected, which holds for slow platforms.
pub fn align_coarse_wahba(
    earth: &Earth,
    imu: &ImuDataset,
    lat: f64,
    veb_n: &[Vec3],
    weights: Option<&[f64]>,
) -> Result<Mat3> {
    if veb_n.len() != imu.len() {
        return Err(InsError::LengthMismatch {
            expected: imu.len(),
            actual: veb_n.len(),
        });
    }
    if let Some(w) = weights {
        if w.len() + 1 != imu.len() {
            return Err(InsError::LengthMismatch {
                expected: imu.len().saturating_sub(1),
                actual: w.len(),
            });
        }
    }
    let dts = intervals(imu)?;
    let w_n = earth.wie_n(lat);
    let g_n = earth.gravity_ned(lat, 0.0);

    let mut body = BodyInertial::new();
    // integral of C_n^{n0} (w_ie x v - g)
    let mut integral = Vec3::zeros();
    let mut t = 0.0;
    let mut nav_obs = Vec::with_capacity(imu.len());
    let mut body_obs = Vec::with_capacity(imu.len());

    for (k, s) in imu.samples().iter().enumerate().skip(1) {
        let dt = dts[k];
        body.update(&s.gyro, &s.accel);

        let v_mid = (veb_n[k - 1] + veb_n[k]) * 0.5;
        integral += nav_to_nav0(&w_n, t + 0.5 * dt) * (w_n.cross(&v_mid) - g_n) * dt;
        t += dt;

        nav_obs.push(nav_to_nav0(&w_n, t) * veb_n[k] - veb_n[0] + integral);
        body_obs.push(body.v);
    }

    let c_ib0_n0 = wahba(&nav_obs, &body_obs, weights)?;
    let cbn = nav_to_nav0(&w_n, t).transpose() * c_ib0_n0 * quat_to_dcm(&body.q);
    log_result("Wahba", &cbn, imu.len());
    Ok(cbn)
}
