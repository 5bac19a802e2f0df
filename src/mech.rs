//! Strapdown mechanization in the ECEF frame.
//!
//! [`nav_equations_ecef`] advances position, velocity and the body-to-ECEF
//! quaternion over one interval. [`multisample`] and [`multisample_previous`]
//! fold several raw increments into one coning/sculling compensated
//! increment first; [`run_ecef`] drives a whole dataset either way.

use serde::Serialize;

use crate::attitude::{quat_normalize, quat_rotate, quat_to_dcm, rv_to_quat, Quat};
use crate::earth::Earth;
use crate::error::{InsError, Result};
use crate::frame::{ecef_to_ned, ned_to_ecef, FrameState};
use crate::imu::{ImuDataset, ImuSample};
use crate::linalg::Vec3;
use crate::time::GpsTime;

pub const MAX_SUBSAMPLES: usize = 5;

/// Coning/sculling coefficients for N subsamples, applied as
/// `(sum k_i * x_i) x x_N` over the first N-1 subsamples.
const CONING: [&[f64]; MAX_SUBSAMPLES] = [
    &[],
    &[2.0 / 3.0],
    &[9.0 / 20.0, 27.0 / 20.0],
    &[54.0 / 105.0, 92.0 / 105.0, 214.0 / 105.0],
    &[250.0 / 504.0, 525.0 / 504.0, 650.0 / 504.0, 1375.0 / 504.0],
];

/// Coefficient of the single previous-cycle correction.
const PREVIOUS_CYCLE: f64 = 1.0 / 12.0;

/// Position, velocity and body-to-ECEF attitude, all in ECEF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NavState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub attitude: Quat,
}

impl NavState {
    pub fn from_ned(earth: &Earth, ned: &FrameState) -> Self {
        let ecef = ned_to_ecef(earth, ned);
        Self {
            position: ecef.position,
            velocity: ecef.velocity,
            attitude: crate::attitude::dcm_to_quat(&ecef.attitude),
        }
    }

    pub fn to_ned(&self, earth: &Earth) -> Result<FrameState> {
        ecef_to_ned(
            earth,
            &FrameState {
                position: self.position,
                velocity: self.velocity,
                attitude: quat_to_dcm(&self.attitude),
            },
        )
    }
}

/// Emitted after every processed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NavRecord {
    pub time: GpsTime,
    /// Latitude (rad), longitude (rad), height (m).
    pub position: Vec3,
    /// North, east, down (m/s).
    pub velocity: Vec3,
    /// Roll, pitch, yaw of `C_b^n` (rad).
    pub attitude: Vec3,
}

impl NavRecord {
    pub fn new(earth: &Earth, time: GpsTime, state: &NavState) -> Result<Self> {
        let ned = state.to_ned(earth)?;
        Ok(Self {
            time,
            position: ned.position,
            velocity: ned.velocity,
            attitude: crate::attitude::dcm_to_euler(&ned.attitude),
        })
    }
}

/// Advances `state` by one interval of length `dt` given the (compensated)
/// gyro increment `dtheta` and specific-force increment `dv`.
///
/// The state is written only if the whole update succeeds.
pub fn nav_equations_ecef(
    earth: &Earth,
    dt: f64,
    dtheta: &Vec3,
    dv: &Vec3,
    state: &mut NavState,
) -> Result<()> {
    let alpha = earth.wie * dt;
    // the ECEF frame turns by alpha about z during the interval
    let earth_turn = |a: f64| Quat::new((0.5 * a).cos(), 0.0, 0.0, -(0.5 * a).sin());

    let q = state.attitude;
    let q_new = earth_turn(alpha) * q * rv_to_quat(dtheta);
    let q_mid = earth_turn(0.5 * alpha) * q * rv_to_quat(&(dtheta * 0.5));

    let dv_e = quat_rotate(&q_mid, dv);
    let g = earth.gravity_ecef(&state.position)?;
    let coriolis = 2.0 * earth.wie_e().cross(&state.velocity);
    let v_new = state.velocity + dv_e + (g - coriolis) * dt;

    let r_new = state.position + (state.velocity + v_new) * (0.5 * dt);

    state.attitude = q_new;
    state.velocity = v_new;
    state.position = r_new;
    Ok(())
}

fn check_window(dtheta_list: &[Vec3], dv_list: &[Vec3], n: usize) -> Result<()> {
    if n == 0 || n > MAX_SUBSAMPLES {
        return Err(InsError::UnsupportedOrder(n));
    }
    if dtheta_list.len() != dv_list.len() {
        return Err(InsError::LengthMismatch {
            expected: dtheta_list.len(),
            actual: dv_list.len(),
        });
    }
    if dtheta_list.len() < n {
        return Err(InsError::InsufficientSamples {
            required: n,
            available: dtheta_list.len(),
        });
    }
    Ok(())
}

/// Combines the first `n` sub-interval increments into one rotation vector
/// and one velocity increment with coning and sculling compensation.
///
/// The rotation of the velocity increment (`dtheta x dv / 2`) is left to the
/// mechanization, which resolves `dv` with the mid-interval attitude; `n == 1`
/// therefore returns the input unchanged.
pub fn multisample(dtheta_list: &[Vec3], dv_list: &[Vec3], n: usize) -> Result<(Vec3, Vec3)> {
    check_window(dtheta_list, dv_list, n)?;
    let (th, dv) = (&dtheta_list[..n], &dv_list[..n]);

    let th_sum: Vec3 = th.iter().sum();
    let dv_sum: Vec3 = dv.iter().sum();
    if n == 1 {
        return Ok((th_sum, dv_sum));
    }

    let k = CONING[n - 1];
    let cm: Vec3 = k.iter().zip(th).map(|(k, t)| t * *k).sum();
    let sm: Vec3 = k.iter().zip(dv).map(|(k, v)| v * *k).sum();

    let (th_last, dv_last) = (&th[n - 1], &dv[n - 1]);
    let dtheta = th_sum + cm.cross(th_last);
    let dvel = dv_sum + cm.cross(dv_last) + sm.cross(th_last);
    Ok((dtheta, dvel))
}

/// Single-sample update compensated with the previous interval's increments.
pub fn multisample_previous(
    prev_dtheta: &Vec3,
    prev_dv: &Vec3,
    dtheta: &Vec3,
    dv: &Vec3,
) -> (Vec3, Vec3) {
    let cm = prev_dtheta * PREVIOUS_CYCLE;
    let sm = prev_dv * PREVIOUS_CYCLE;
    (dtheta + cm.cross(dtheta), dv + cm.cross(dv) + sm.cross(dtheta))
}

/// How raw samples are grouped before each mechanization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// Consecutive non-overlapping windows of N samples, one step per window.
    /// A trailing partial window is not processed.
    Subsamples(usize),
    /// One step per sample, compensated with the preceding sample.
    PreviousCycle,
}

/// Mechanizes the whole dataset from `init`, returning one record per step.
///
/// Every sample's interval is its distance to the preceding sample; the first
/// sample uses the interval of the first two.
pub fn run_ecef(
    earth: &Earth,
    imu: &ImuDataset,
    init: NavState,
    mode: Compensation,
) -> Result<Vec<NavRecord>> {
    let samples = imu.samples();
    let dt0 = imu.sample_interval()?;
    let interval = |k: usize| {
        if k == 0 {
            dt0
        } else {
            samples[k].time.diff(&samples[k - 1].time)
        }
    };

    let mut state = init;
    let mut records = vec![];
    let mut step = |dt: f64, dtheta: &Vec3, dv: &Vec3, last: &ImuSample| -> Result<()> {
        nav_equations_ecef(earth, dt, dtheta, dv, &mut state)?;
        quat_normalize(&mut state.attitude)?;
        records.push(NavRecord::new(earth, last.time, &state)?);
        Ok(())
    };

    match mode {
        Compensation::Subsamples(n) => {
            if n == 0 || n > MAX_SUBSAMPLES {
                return Err(InsError::UnsupportedOrder(n));
            }
            for (w, window) in samples.chunks_exact(n).enumerate() {
                let gyro: Vec<Vec3> = window.iter().map(|s| s.gyro).collect();
                let accel: Vec<Vec3> = window.iter().map(|s| s.accel).collect();
                let (dtheta, dv) = multisample(&gyro, &accel, n)?;
                let dt = (w * n..(w + 1) * n).map(&interval).sum();
                step(dt, &dtheta, &dv, &window[n - 1])?;
            }
            if samples.len() % n != 0 {
                log::debug!("{} trailing samples not mechanized", samples.len() % n);
            }
        }
        Compensation::PreviousCycle => {
            for (k, s) in samples.iter().enumerate() {
                let (dtheta, dv) = match k {
                    0 => (s.gyro, s.accel),
                    _ => {
                        let p = &samples[k - 1];
                        multisample_previous(&p.gyro, &p.accel, &s.gyro, &s.accel)
                    }
                };
                step(interval(k), &dtheta, &dv, s)?;
            }
        }
    }

    log::debug!("mechanized {} intervals ({:?})", records.len(), mode);
    Ok(records)
}
