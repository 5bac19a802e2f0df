//! NED <-> ECEF conversion of position, velocity and attitude.

use std::f64::consts::FRAC_PI_2;

use serde::Serialize;

use crate::earth::Earth;
use crate::error::{InsError, Result};
use crate::linalg::{Mat3, Vec3, ZERO_NORM_EPS};

/// Position, velocity and body attitude expressed in one frame.
///
/// In NED form `position` is (latitude, longitude, height), `velocity` is
/// north/east/down and `attitude` is `C_b^n`. In ECEF form they are the
/// Cartesian position, ECEF velocity and `C_b^e`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub attitude: Mat3,
}

/// `C_e^n`, ECEF to NED at the given latitude and longitude.
#[rustfmt::skip]
pub fn ctm_ecef_to_ned(lat: f64, lon: f64) -> Mat3 {
    let (sl, cl) = lat.sin_cos();
    let (so, co) = lon.sin_cos();
    Mat3::new(
        -sl * co, -sl * so, cl,
        -so, co, 0.0,
        -cl * co, -cl * so, -sl,
    )
}

/// Geodetic (latitude, longitude, height) to ECEF position.
pub fn llh_to_ecef(earth: &Earth, llh: &Vec3) -> Vec3 {
    let (lat, lon, h) = (llh.x, llh.y, llh.z);
    let re = earth.re(lat);
    let e2 = earth.e * earth.e;
    Vec3::new(
        (re + h) * lat.cos() * lon.cos(),
        (re + h) * lat.cos() * lon.sin(),
        ((1.0 - e2) * re + h) * lat.sin(),
    )
}

/// ECEF position to geodetic (latitude, longitude, height), closed form
/// (Borkowski).
pub fn ecef_to_llh(earth: &Earth, r: &Vec3) -> Result<Vec3> {
    if !(r.norm() > ZERO_NORM_EPS) {
        return Err(InsError::DegenerateVector);
    }
    let e2 = earth.e * earth.e;
    let sq = (1.0 - e2).sqrt();
    let beta = r.x.hypot(r.y);

    if !(beta > ZERO_NORM_EPS) {
        // on the polar axis
        let lat = FRAC_PI_2.copysign(r.z);
        return Ok(Vec3::new(lat, 0.0, r.z.abs() - earth.r0 * sq));
    }

    let lon = r.y.atan2(r.x);
    let sign_z = if r.z > 0.0 {
        1.0
    } else if r.z < 0.0 {
        -1.0
    } else {
        0.0
    };

    let k1 = sq * r.z.abs();
    let k2 = e2 * earth.r0;
    let e = (k1 - k2) / beta;
    let f = (k1 + k2) / beta;
    let p = 4.0 / 3.0 * (e * f + 1.0);
    let q = 2.0 * (e * e - f * f);
    let d = p.powi(3) + q * q;
    let v = (d.sqrt() - q).cbrt() - (d.sqrt() + q).cbrt();
    let g = 0.5 * ((e * e + v).sqrt() + e);
    let t = (g * g + (f - v * g) / (2.0 * g - e)).sqrt() - g;

    let lat = sign_z * ((1.0 - t * t) / (2.0 * t * sq)).atan();
    let h = (beta - earth.r0 * t) * lat.cos() + (r.z - sign_z * earth.r0 * sq) * lat.sin();
    Ok(Vec3::new(lat, lon, h))
}

/// Converts a NED state to ECEF. `C_e^n` is built once from the input
/// latitude and longitude and applied to velocity and attitude.
pub fn ned_to_ecef(earth: &Earth, ned: &FrameState) -> FrameState {
    let cne = ctm_ecef_to_ned(ned.position.x, ned.position.y).transpose();
    FrameState {
        position: llh_to_ecef(earth, &ned.position),
        velocity: cne * ned.velocity,
        attitude: cne * ned.attitude,
    }
}

/// Converts an ECEF state to NED, using the latitude and longitude of the
/// input position for velocity and attitude.
pub fn ecef_to_ned(earth: &Earth, ecef: &FrameState) -> Result<FrameState> {
    let llh = ecef_to_llh(earth, &ecef.position)?;
    let cen = ctm_ecef_to_ned(llh.x, llh.y);
    Ok(FrameState {
        position: llh,
        velocity: cen * ecef.velocity,
        attitude: cen * ecef.attitude,
    })
}
