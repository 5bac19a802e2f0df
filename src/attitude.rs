//! Attitude representations and the conversions between them.
//!
//! Convention used throughout the crate: every DCM and quaternion maps body
//! axes into the reference frame, `v_ref = C * v_body = q ⊗ v_body ⊗ q*`.
//! Quaternions are Hamilton, scalar first. Euler angles are
//! (roll, pitch, yaw) with `C = Rz(yaw) * Ry(pitch) * Rx(roll)`; every Euler
//! converter here uses that same order, which is what makes them mutual
//! inverses.

use nalgebra::Quaternion;

use crate::error::{InsError, Result};
use crate::linalg::{skew, Mat3, Vec3};

pub type Quat = Quaternion<f64>;

/// Below this angle the Rodrigues coefficients are evaluated by Taylor series.
const SMALL_ANGLE: f64 = 1e-4;

/// Largest accepted deviation of `C^T C` from identity.
pub const ORTHONORMAL_EPS: f64 = 1e-6;

/// Rotation vector to quaternion.
pub fn rv_to_quat(rv: &Vec3) -> Quat {
    let n2 = rv.norm_squared();
    let (c, s) = if n2.sqrt() < SMALL_ANGLE {
        (
            1.0 - n2 / 8.0 + n2 * n2 / 384.0,
            0.5 - n2 / 48.0 + n2 * n2 / 3840.0,
        )
    } else {
        let n = n2.sqrt();
        ((0.5 * n).cos(), (0.5 * n).sin() / n)
    };
    Quat::new(c, s * rv.x, s * rv.y, s * rv.z)
}

/// Rotation vector to DCM (Rodrigues).
pub fn rv_to_dcm(rv: &Vec3) -> Mat3 {
    let n2 = rv.norm_squared();
    let (a, b) = if n2.sqrt() < SMALL_ANGLE {
        (
            1.0 - n2 / 6.0 + n2 * n2 / 120.0,
            0.5 - n2 / 24.0 + n2 * n2 / 720.0,
        )
    } else {
        let n = n2.sqrt();
        (n.sin() / n, (1.0 - n.cos()) / n2)
    };
    let k = skew(rv);
    Mat3::identity() + a * k + b * k * k
}

/// Quaternion to rotation vector, choosing the rotation of at most pi.
pub fn quat_to_rv(q: &Quat) -> Vec3 {
    let (w, v) = if q.w < 0.0 {
        (-q.w, -q.imag())
    } else {
        (q.w, q.imag())
    };
    let s = v.norm();
    let k = if s < SMALL_ANGLE * w {
        let r2 = (s / w) * (s / w);
        2.0 / w * (1.0 - r2 / 3.0 + r2 * r2 / 5.0)
    } else {
        2.0 * s.atan2(w) / s
    };
    v * k
}

pub fn quat_to_dcm(q: &Quat) -> Mat3 {
    let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
    let (q00, q11, q22, q33) = (q0 * q0, q1 * q1, q2 * q2, q3 * q3);
    Mat3::new(
        q00 + q11 - q22 - q33,
        2.0 * (q1 * q2 - q0 * q3),
        2.0 * (q1 * q3 + q0 * q2),
        2.0 * (q1 * q2 + q0 * q3),
        q00 - q11 + q22 - q33,
        2.0 * (q2 * q3 - q0 * q1),
        2.0 * (q1 * q3 - q0 * q2),
        2.0 * (q2 * q3 + q0 * q1),
        q00 - q11 - q22 + q33,
    )
}

/// DCM to quaternion.
///
/// All four of `4*q0^2 = 1 + tr`, `4*qi^2 = 1 + 2*C_ii - tr` are evaluated and
/// the largest one is used as the divisor for the remaining components. The
/// result has a non-negative scalar part.
pub fn dcm_to_quat(c: &Mat3) -> Quat {
    let tr = c.trace();
    let cand = [
        1.0 + tr,
        1.0 + 2.0 * c[(0, 0)] - tr,
        1.0 + 2.0 * c[(1, 1)] - tr,
        1.0 + 2.0 * c[(2, 2)] - tr,
    ];
    let best = (1..4).fold(0, |b, i| if cand[i] > cand[b] { i } else { b });

    let h = 0.5 * cand[best].max(0.0).sqrt();
    let f = 0.25 / h;
    let q = match best {
        0 => Quat::new(
            h,
            (c[(2, 1)] - c[(1, 2)]) * f,
            (c[(0, 2)] - c[(2, 0)]) * f,
            (c[(1, 0)] - c[(0, 1)]) * f,
        ),
        1 => Quat::new(
            (c[(2, 1)] - c[(1, 2)]) * f,
            h,
            (c[(0, 1)] + c[(1, 0)]) * f,
            (c[(0, 2)] + c[(2, 0)]) * f,
        ),
        2 => Quat::new(
            (c[(0, 2)] - c[(2, 0)]) * f,
            (c[(0, 1)] + c[(1, 0)]) * f,
            h,
            (c[(1, 2)] + c[(2, 1)]) * f,
        ),
        _ => Quat::new(
            (c[(1, 0)] - c[(0, 1)]) * f,
            (c[(0, 2)] + c[(2, 0)]) * f,
            (c[(1, 2)] + c[(2, 1)]) * f,
            h,
        ),
    };
    if q.w < 0.0 {
        -q
    } else {
        q
    }
}

pub fn euler_to_dcm(e: &Vec3) -> Mat3 {
    let (sr, cr) = e.x.sin_cos();
    let (sp, cp) = e.y.sin_cos();
    let (sy, cy) = e.z.sin_cos();
    Mat3::new(
        cp * cy,
        sr * sp * cy - cr * sy,
        cr * sp * cy + sr * sy,
        cp * sy,
        sr * sp * sy + cr * cy,
        cr * sp * sy - sr * cy,
        -sp,
        sr * cp,
        cr * cp,
    )
}

/// DCM to Euler angles. Yaw and roll are not separable at pitch = +-90 deg.
pub fn dcm_to_euler(c: &Mat3) -> Vec3 {
    Vec3::new(
        c[(2, 1)].atan2(c[(2, 2)]),
        -c[(2, 0)].clamp(-1.0, 1.0).asin(),
        c[(1, 0)].atan2(c[(0, 0)]),
    )
}

pub fn euler_to_quat(e: &Vec3) -> Quat {
    let (sr, cr) = (0.5 * e.x).sin_cos();
    let (sp, cp) = (0.5 * e.y).sin_cos();
    let (sy, cy) = (0.5 * e.z).sin_cos();
    Quat::new(
        cr * cp * cy + sr * sp * sy,
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
    )
}

pub fn quat_to_euler(q: &Quat) -> Vec3 {
    let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
    Vec3::new(
        (2.0 * (q0 * q1 + q2 * q3)).atan2(1.0 - 2.0 * (q1 * q1 + q2 * q2)),
        (2.0 * (q0 * q2 - q1 * q3)).clamp(-1.0, 1.0).asin(),
        (2.0 * (q0 * q3 + q1 * q2)).atan2(1.0 - 2.0 * (q2 * q2 + q3 * q3)),
    )
}

/// Rotates `v` by `q`: `q ⊗ v ⊗ q*`. Same mapping as `quat_to_dcm(q) * v`.
pub fn quat_rotate(q: &Quat, v: &Vec3) -> Vec3 {
    (q * Quat::from_imag(*v) * q.conjugate()).imag()
}

/// Normalises in place, returning the previous norm.
pub fn quat_normalize(q: &mut Quat) -> Result<f64> {
    let n = q.norm();
    if !(n > crate::linalg::ZERO_NORM_EPS) {
        return Err(InsError::DegenerateVector);
    }
    *q /= n;
    Ok(n)
}

/// Inverts a unit quaternion in place. The norm is not checked.
pub fn quat_invert(q: &mut Quat) {
    q.conjugate_mut();
}

/// Largest element of `|C^T C - I|`.
pub fn orthonormality_error(c: &Mat3) -> f64 {
    (c.transpose() * c - Mat3::identity()).amax()
}

/// An attitude in one of the supported representations.
///
/// Build through the checked constructors; each one enforces the invariant of
/// its representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attitude {
    RotationVector(Vec3),
    Quaternion(Quat),
    Dcm(Mat3),
    Euler(Vec3),
}

impl Attitude {
    pub fn rotation_vector(rv: Vec3) -> Result<Self> {
        if !rv.iter().all(|x| x.is_finite()) {
            return Err(InsError::NonFinite);
        }
        Ok(Self::RotationVector(rv))
    }

    /// Normalises `q`; a zero quaternion is rejected.
    pub fn quaternion(mut q: Quat) -> Result<Self> {
        if !q.coords.iter().all(|x| x.is_finite()) {
            return Err(InsError::NonFinite);
        }
        quat_normalize(&mut q)?;
        Ok(Self::Quaternion(q))
    }

    /// Rejects matrices that are not a proper rotation within
    /// [`ORTHONORMAL_EPS`].
    pub fn dcm(c: Mat3) -> Result<Self> {
        let err = orthonormality_error(&c);
        if !(err <= ORTHONORMAL_EPS) || crate::linalg::det(&c) <= 0.0 {
            return Err(InsError::NotOrthonormal(err));
        }
        Ok(Self::Dcm(c))
    }

    pub fn euler(e: Vec3) -> Result<Self> {
        if !e.iter().all(|x| x.is_finite()) {
            return Err(InsError::NonFinite);
        }
        Ok(Self::Euler(e))
    }

    pub fn to_quat(&self) -> Quat {
        match self {
            Self::RotationVector(rv) => rv_to_quat(rv),
            Self::Quaternion(q) => *q,
            Self::Dcm(c) => dcm_to_quat(c),
            Self::Euler(e) => euler_to_quat(e),
        }
    }

    pub fn to_dcm(&self) -> Mat3 {
        match self {
            Self::RotationVector(rv) => rv_to_dcm(rv),
            Self::Quaternion(q) => quat_to_dcm(q),
            Self::Dcm(c) => *c,
            Self::Euler(e) => euler_to_dcm(e),
        }
    }

    pub fn to_euler(&self) -> Vec3 {
        match self {
            Self::Quaternion(q) => quat_to_euler(q),
            Self::Dcm(c) => dcm_to_euler(c),
            Self::Euler(e) => *e,
            Self::RotationVector(rv) => dcm_to_euler(&rv_to_dcm(rv)),
        }
    }

    pub fn to_rotation_vector(&self) -> Vec3 {
        match self {
            Self::RotationVector(rv) => *rv,
            other => quat_to_rv(&other.to_quat()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::linalg::approx_eq;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::{FRAC_PI_2, PI};

    fn random_euler(rng: &mut rand::rngs::StdRng) -> Vec3 {
        Vec3::new(
            rng.gen_range(-PI..PI),
            rng.gen_range(-1.4..1.4),
            rng.gen_range(-PI..PI),
        )
    }

    fn same_up_to_sign(p: &Quat, q: &Quat, eps: f64) -> bool {
        approx_eq(&p.coords, &q.coords, eps) || approx_eq(&p.coords, &(-q.coords), eps)
    }

    #[test]
    fn euler_axis_order() {
        // pure yaw of 90 deg turns body x (forward) onto reference y (east)
        let c = euler_to_dcm(&Vec3::new(0.0, 0.0, FRAC_PI_2));
        assert!(approx_eq(&(c * Vec3::x()), &Vec3::y(), 1e-15));

        let e = Vec3::new(0.1, 0.2, 0.3);
        let composed = rv_to_dcm(&(Vec3::z() * e.z))
            * rv_to_dcm(&(Vec3::y() * e.y))
            * rv_to_dcm(&(Vec3::x() * e.x));
        assert!(approx_eq(&euler_to_dcm(&e), &composed, 1e-14));
    }

    #[test]
    fn dcm_quat_round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(10);
        for _ in 0..200 {
            let c = euler_to_dcm(&random_euler(&mut rng));
            let q = dcm_to_quat(&c);
            assert!((q.norm() - 1.0).abs() < 1e-12);
            assert!(approx_eq(&quat_to_dcm(&q), &c, 1e-12));

            let q2 = dcm_to_quat(&quat_to_dcm(&q));
            assert!(same_up_to_sign(&q, &q2, 1e-12));
        }
    }

    #[test]
    fn dcm_to_quat_near_half_turn() {
        // trace close to -1 is where the scalar-part formula breaks down
        for axis in [Vec3::x(), Vec3::y(), Vec3::z(), Vec3::new(1.0, 1.0, 0.0).normalize()] {
            let rv = axis * (PI - 1e-9);
            let c = rv_to_dcm(&rv);
            let q = dcm_to_quat(&c);
            assert!(approx_eq(&quat_to_dcm(&q), &c, 1e-12));
            assert!(same_up_to_sign(&q, &rv_to_quat(&rv), 1e-9));
        }
    }

    #[test]
    fn euler_round_trips() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let e = random_euler(&mut rng);
            assert!(approx_eq(&dcm_to_euler(&euler_to_dcm(&e)), &e, 1e-10));
            assert!(approx_eq(&quat_to_euler(&euler_to_quat(&e)), &e, 1e-10));
            assert!(approx_eq(
                &quat_to_dcm(&euler_to_quat(&e)),
                &euler_to_dcm(&e),
                1e-12
            ));
        }
    }

    #[test]
    fn converters_produce_valid_attitudes() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(12);
        for _ in 0..100 {
            let rv = Vec3::from_fn(|_, _| rng.gen_range(-3.0..3.0));
            let e = random_euler(&mut rng);
            for q in [rv_to_quat(&rv), euler_to_quat(&e)] {
                assert!((q.norm() - 1.0).abs() < 1e-12);
            }
            for c in [rv_to_dcm(&rv), euler_to_dcm(&e), quat_to_dcm(&rv_to_quat(&rv))] {
                assert!(orthonormality_error(&c) < 1e-12);
            }
        }
    }

    #[test]
    fn rotation_vector_paths_agree() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(13);
        for scale in [1e-9, 1e-5, 1e-4, 1e-3, 1.0] {
            for _ in 0..20 {
                let rv = Vec3::from_fn(|_, _| rng.gen_range(-1.0..1.0)) * scale;
                let q = rv_to_quat(&rv);
                assert!(approx_eq(&quat_to_dcm(&q), &rv_to_dcm(&rv), 1e-14));
                assert!(approx_eq(&quat_to_rv(&q), &rv, 1e-12 * scale.max(1e-3)));
            }
        }
    }

    #[test]
    fn small_angle_branch_is_continuous() {
        let axis = Vec3::new(0.6, -0.8, 0.0);
        let below = rv_to_quat(&(axis * (SMALL_ANGLE * 0.999_999)));
        let above = rv_to_quat(&(axis * (SMALL_ANGLE * 1.000_001)));
        assert!((below.coords - above.coords).amax() < 1e-9);
        assert_eq!(rv_to_quat(&Vec3::zeros()), Quat::identity());
        assert_eq!(rv_to_dcm(&Vec3::zeros()), Mat3::identity());
    }

    #[test]
    fn product_and_rotation_match_dcm() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(14);
        for _ in 0..50 {
            let p = euler_to_quat(&random_euler(&mut rng));
            let q = euler_to_quat(&random_euler(&mut rng));
            let v = Vec3::from_fn(|_, _| rng.gen_range(-5.0..5.0));
            assert!(approx_eq(
                &quat_to_dcm(&(p * q)),
                &(quat_to_dcm(&p) * quat_to_dcm(&q)),
                1e-12
            ));
            assert!(approx_eq(&quat_rotate(&p, &v), &(quat_to_dcm(&p) * v), 1e-12));
        }
    }

    #[test]
    fn normalize_and_invert() {
        let mut q = Quat::new(2.0, 0.0, 0.0, 0.0);
        assert_eq!(quat_normalize(&mut q), Ok(2.0));
        assert_eq!(q, Quat::identity());

        let mut z = Quat::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(quat_normalize(&mut z), Err(InsError::DegenerateVector));

        let p = euler_to_quat(&Vec3::new(0.3, -0.2, 1.0));
        let mut inv = p;
        quat_invert(&mut inv);
        assert!(approx_eq(&(p * inv).coords, &Quat::identity().coords, 1e-15));
    }

    #[test]
    fn attitude_constructors_enforce_invariants() {
        assert!(matches!(
            Attitude::dcm(Mat3::identity() * 1.1),
            Err(InsError::NotOrthonormal(_))
        ));
        // reflection
        assert!(Attitude::dcm(Mat3::from_diagonal(&Vec3::new(1.0, 1.0, -1.0))).is_err());
        assert_eq!(
            Attitude::quaternion(Quat::new(0.0, 0.0, 0.0, 0.0)),
            Err(InsError::DegenerateVector)
        );
        assert_eq!(
            Attitude::euler(Vec3::new(f64::NAN, 0.0, 0.0)),
            Err(InsError::NonFinite)
        );

        let q = Attitude::quaternion(Quat::new(0.0, 0.0, 0.0, 3.0)).unwrap();
        assert!(approx_eq(&q.to_euler(), &Vec3::new(0.0, 0.0, PI), 1e-12)
            || approx_eq(&q.to_euler(), &Vec3::new(0.0, 0.0, -PI), 1e-12));
    }

    #[test]
    fn attitude_conversion_matrix() {
        let e = Vec3::new(0.2, -0.4, 2.5);
        let forms = [
            Attitude::euler(e).unwrap(),
            Attitude::dcm(euler_to_dcm(&e)).unwrap(),
            Attitude::quaternion(euler_to_quat(&e)).unwrap(),
            Attitude::rotation_vector(quat_to_rv(&euler_to_quat(&e))).unwrap(),
        ];
        for a in forms.iter() {
            assert!(approx_eq(&a.to_euler(), &e, 1e-10));
            assert!(approx_eq(&a.to_dcm(), &euler_to_dcm(&e), 1e-12));
            assert!(approx_eq(&rv_to_dcm(&a.to_rotation_vector()), &euler_to_dcm(&e), 1e-12));
            assert!(same_up_to_sign(&a.to_quat(), &euler_to_quat(&e), 1e-12));
        }
    }
}
