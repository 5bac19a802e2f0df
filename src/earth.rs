//! Earth ellipsoid and normal gravity.

use serde::Serialize;

use crate::error::{InsError, Result};
use crate::linalg::{Vec3, ZERO_NORM_EPS};

/// Fixed earth parameter set. Pass it explicitly to anything that needs it;
/// [`WGS84`] is the usual choice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Earth {
    /// Rotation rate (rad/s).
    pub wie: f64,
    /// Equatorial radius (m).
    pub r0: f64,
    /// Polar radius (m).
    pub rp: f64,
    /// Gravitational constant GM (m^3/s^2).
    pub mu: f64,
    /// Second zonal harmonic.
    pub j2: f64,
    /// Eccentricity.
    pub e: f64,
    /// Flattening.
    pub f: f64,
    /// Normal gravity on the equator (m/s^2).
    pub ge: f64,
    /// Somigliana coefficient.
    pub k: f64,
}

pub const WGS84: Earth = Earth {
    wie: 7.292115e-5,
    r0: 6378137.0,
    rp: 6356752.31425,
    mu: 3.986004418e14,
    j2: 1.082627e-3,
    e: 0.0818191908425,
    f: 1.0 / 298.257223563,
    ge: 9.7803253359,
    k: 0.001931853,
};

impl Default for Earth {
    fn default() -> Self {
        WGS84
    }
}

impl Earth {
    /// Earth rotation vector in ECEF.
    pub fn wie_e(&self) -> Vec3 {
        Vec3::new(0.0, 0.0, self.wie)
    }

    /// Earth rotation vector resolved in NED at latitude `lat`.
    pub fn wie_n(&self, lat: f64) -> Vec3 {
        Vec3::new(self.wie * lat.cos(), 0.0, -self.wie * lat.sin())
    }

    /// Meridian radius of curvature, north-south direction.
    pub fn rn(&self, lat: f64) -> f64 {
        let e2 = self.e * self.e;
        let s = 1.0 - e2 * lat.sin().powi(2);
        self.r0 * (1.0 - e2) / s.powf(1.5)
    }

    /// Transverse radius of curvature, east-west direction.
    pub fn re(&self, lat: f64) -> f64 {
        let e2 = self.e * self.e;
        self.r0 / (1.0 - e2 * lat.sin().powi(2)).sqrt()
    }

    /// Gravity (gravitation plus centrifugal) at ECEF position `r`, with the
    /// J2 correction.
    pub fn gravity_ecef(&self, r: &Vec3) -> Result<Vec3> {
        let mag_r = r.norm();
        if !(mag_r > ZERO_NORM_EPS) {
            return Err(InsError::DegenerateVector);
        }
        let z_scale = 5.0 * (r.z / mag_r).powi(2);
        let c = 1.5 * self.j2 * (self.r0 / mag_r).powi(2);
        let j2_term = Vec3::new(
            (1.0 - z_scale) * r.x,
            (1.0 - z_scale) * r.y,
            (3.0 - z_scale) * r.z,
        );
        let gamma = -self.mu / mag_r.powi(3) * (r + c * j2_term);

        let w2 = self.wie * self.wie;
        Ok(Vec3::new(gamma.x + w2 * r.x, gamma.y + w2 * r.y, gamma.z))
    }

    /// Gravity in NED at latitude `lat` and ellipsoidal height `hgt`
    /// (Somigliana, with the height correction).
    pub fn gravity_ned(&self, lat: f64, hgt: f64) -> Vec3 {
        let sin2 = lat.sin().powi(2);
        let e2 = self.e * self.e;
        let g0 = self.ge * (1.0 + self.k * sin2) / (1.0 - e2 * sin2).sqrt();

        let m = self.wie * self.wie * self.r0 * self.r0 * self.rp / self.mu;
        let down = g0
            * (1.0 - (2.0 / self.r0) * (1.0 + self.f * (1.0 - 2.0 * sin2) + m) * hgt
                + (3.0 / (self.r0 * self.r0)) * hgt * hgt);
        let north = -8.08e-9 * hgt * (2.0 * lat).sin();
        Vec3::new(north, 0.0, down)
    }
}
