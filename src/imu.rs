use serde::Serialize;

use crate::error::{InsError, Result};
use crate::linalg::Vec3;
use crate::time::GpsTime;

/// One IMU output: angle and velocity increments over the interval ending at
/// `time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImuSample {
    pub time: GpsTime,
    /// Gyro increment (rad).
    pub gyro: Vec3,
    /// Specific-force increment (m/s).
    pub accel: Vec3,
}

/// Sensor error model and initial uncertainties, carried with the data for
/// downstream error analysis. Mechanization does not read it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ImuErrorModel {
    /// Angular random walk.
    pub arw: Vec3,
    /// Gyro bias (rate) random walk.
    pub arrw: Vec3,
    /// Velocity random walk.
    pub vrw: Vec3,
    /// Accelerometer bias random walk.
    pub vrrw: Vec3,
    /// Accelerometer bias correlation time (s).
    pub ta: Vec3,
    /// Gyro bias correlation time (s).
    pub tg: Vec3,
    pub init_pos: Vec3,
    pub init_pos_var: Vec3,
    pub init_vel: Vec3,
    pub init_vel_var: Vec3,
    pub init_att: Vec3,
    pub init_att_var: Vec3,
    pub init_gyro_bias_var: Vec3,
    pub init_accel_bias_var: Vec3,
    /// Reference point in the IMU frame.
    pub lever_arm: Vec3,
}

/// Time-ordered IMU samples plus their error model.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImuDataset {
    samples: Vec<ImuSample>,
    pub model: ImuErrorModel,
}

impl ImuDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: ImuErrorModel) -> Self {
        Self {
            samples: vec![],
            model,
        }
    }

    /// Appends a sample. Its time must be strictly after the last one.
    pub fn push(&mut self, sample: ImuSample) -> Result<()> {
        if let Some(last) = self.samples.last() {
            if !(sample.time.diff(&last.time) > 0.0) {
                return Err(InsError::NonMonotonicTime);
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn samples(&self) -> &[ImuSample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImuSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Interval between the first two samples.
    pub fn sample_interval(&self) -> Result<f64> {
        match self.samples.as_slice() {
            [a, b, ..] => Ok(b.time.diff(&a.time)),
            _ => Err(InsError::InsufficientSamples {
                required: 2,
                available: self.samples.len(),
            }),
        }
    }

    /// Time from the first to the last sample.
    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(a), Some(b)) => b.time.diff(&a.time),
            _ => 0.0,
        }
    }
}

impl<'a> IntoIterator for &'a ImuDataset {
    type Item = &'a ImuSample;
    type IntoIter = std::slice::Iter<'a, ImuSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Samples of a platform at rest with attitude `cbn`, sensing earth rate
/// `w_n` and gravity `g_n` (both in the navigation frame).
#[cfg(test)]
pub(crate) fn stationary_dataset(
    cbn: &crate::linalg::Mat3,
    w_n: &Vec3,
    g_n: &Vec3,
    dt: f64,
    count: usize,
) -> ImuDataset {
    let w_b = cbn.transpose() * w_n;
    let f_b = -(cbn.transpose() * g_n);
    let t0 = GpsTime::from_gps_week(2060, 100.0);
    let mut imu = ImuDataset::new();
    for k in 1..=count {
        imu.push(ImuSample {
            time: t0.add(k as f64 * dt),
            gyro: w_b * dt,
            accel: f_b * dt,
        })
        .unwrap();
    }
    imu
}
