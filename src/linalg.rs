//! Fixed-size 3-vector and 3x3-matrix helpers on top of `nalgebra`.
//!
//! Plain arithmetic (add, sub, scale, products, transpose, cross/dot) is
//! done with the `nalgebra` operators directly. This module adds what the
//! navigation code needs beyond that: tolerance-checked normalisation and
//! inversion, a closed-form determinant, and LU/SVD factorisations with a
//! fixed ordering and sign convention.

use nalgebra::{Matrix3, SMatrix, Vector3};

use crate::error::{InsError, Result};

pub type Vec3 = Vector3<f64>;
pub type Mat3 = Matrix3<f64>;

/// Relative tolerance on pivots and determinants, scaled by the largest entry.
pub const SINGULAR_EPS: f64 = 1e-12;

/// Absolute norm below which a vector has no usable direction.
pub const ZERO_NORM_EPS: f64 = 1e-14;

/// Skew-symmetric (cross product) matrix, `skew(a) * b == a x b`.
#[inline]
#[rustfmt::skip]
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Row vector times column vector.
#[inline]
pub fn inner(a: &Vec3, b: &Vec3) -> f64 {
    a.dot(b)
}

/// Column vector times row vector.
#[inline]
pub fn outer(a: &Vec3, b: &Vec3) -> Mat3 {
    a * b.transpose()
}

/// Raises every element to `order`.
pub fn pow<const R: usize, const C: usize>(
    a: &SMatrix<f64, R, C>,
    order: f64,
) -> SMatrix<f64, R, C> {
    a.map(|x| x.powf(order))
}

/// Element-wise equality within `eps`.
pub fn approx_eq<const R: usize, const C: usize>(
    a: &SMatrix<f64, R, C>,
    b: &SMatrix<f64, R, C>,
    eps: f64,
) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= eps)
}

/// Normalises `v` in place and returns its previous norm.
///
/// A vector with a norm below [`ZERO_NORM_EPS`] is left untouched and
/// reported as [`InsError::DegenerateVector`].
pub fn normalize(v: &mut Vec3) -> Result<f64> {
    let n = v.norm();
    if !(n > ZERO_NORM_EPS) {
        return Err(InsError::DegenerateVector);
    }
    *v /= n;
    Ok(n)
}

/// Closed-form 3x3 determinant (rule of Sarrus).
pub fn det(a: &Mat3) -> f64 {
    a[(0, 0)] * (a[(1, 1)] * a[(2, 2)] - a[(1, 2)] * a[(2, 1)])
        - a[(0, 1)] * (a[(1, 0)] * a[(2, 2)] - a[(1, 2)] * a[(2, 0)])
        + a[(0, 2)] * (a[(1, 0)] * a[(2, 1)] - a[(1, 1)] * a[(2, 0)])
}

fn is_singular(det: f64, scale: f64) -> bool {
    scale == 0.0 || !(det.abs() > SINGULAR_EPS * scale * scale * scale)
}

/// Inverts `a` in place through its adjugate.
///
/// On failure `a` is not modified.
#[rustfmt::skip]
pub fn invert(a: &mut Mat3) -> Result<()> {
    let d = det(a);
    if is_singular(d, a.amax()) {
        return Err(InsError::SingularMatrix { det: d });
    }

    let m = *a;
    let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
        m[(r0, c0)] * m[(r1, c1)] - m[(r0, c1)] * m[(r1, c0)]
    };
    // transpose of the cofactor matrix
    let adj = Mat3::new(
        cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2),
        -cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2),
        cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1),
    );
    *a = adj / d;
    Ok(())
}

/// Returns the inverse of `a`, leaving `a` untouched.
pub fn inverse(a: &Mat3) -> Result<Mat3> {
    let mut inv = *a;
    invert(&mut inv)?;
    Ok(inv)
}

/// LU factorisation with partial pivoting, `p * a == l * u`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lu {
    /// Unit lower triangular.
    pub l: Mat3,
    /// Upper triangular.
    pub u: Mat3,
    /// Row permutation.
    pub p: Mat3,
}

/// Doolittle elimination choosing the largest remaining entry of the active
/// column as pivot.
pub fn lu(a: &Mat3) -> Result<Lu> {
    let scale = a.amax();
    let mut l = Mat3::identity();
    let mut u = *a;
    let mut p = Mat3::identity();

    for k in 0..3 {
        let (piv, max) = (k..3)
            .map(|r| (r, u[(r, k)].abs()))
            .fold((k, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });

        if scale == 0.0 || !(max > SINGULAR_EPS * scale) {
            return Err(InsError::SingularMatrix { det: det(a) });
        }

        if piv != k {
            u.swap_rows(k, piv);
            p.swap_rows(k, piv);
            for c in 0..k {
                l.swap((k, c), (piv, c));
            }
        }

        for r in (k + 1)..3 {
            let m = u[(r, k)] / u[(k, k)];
            l[(r, k)] = m;
            for c in k..3 {
                u[(r, c)] -= m * u[(k, c)];
            }
            // exact zero below the pivot
            u[(r, k)] = 0.0;
        }
    }

    Ok(Lu { l, u, p })
}

/// Singular value decomposition `a == u * diag(d) * v^T`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Svd {
    pub u: Mat3,
    /// Singular values, non-negative and sorted descending.
    pub d: Vec3,
    pub v: Mat3,
}

/// Sweeps of the Jacobi iteration before giving up.
const SVD_MAX_SWEEPS: usize = 30;

/// Column pairs count as orthogonal once `|ci . cj| <= SVD_ORTHO_EPS |ci| |cj|`.
const SVD_ORTHO_EPS: f64 = 4.0 * f64::EPSILON;

fn rotate_columns(m: &mut Mat3, i: usize, j: usize, c: f64, s: f64) {
    for k in 0..3 {
        let (x, y) = (m[(k, i)], m[(k, j)]);
        m[(k, i)] = c * x - s * y;
        m[(k, j)] = s * x + c * y;
    }
}

fn any_orthogonal(u: &Vec3) -> Vec3 {
    u.cross(&Vec3::ith(u.iamin(), 1.0)).normalize()
}

/// Computes the SVD of `a` by one-sided (Hestenes) Jacobi rotations.
///
/// Columns are rotated until every pair is orthogonal relative to its own
/// norms, so a small singular triplet is resolved to working precision of
/// the largest one rather than being swamped by it. Singular values come out
/// sorted descending. The third left singular vector completes `u` as an
/// orthonormal basis, which keeps `u` well defined when `a` is rank
/// deficient. Finally each left singular vector is flipped so that its
/// largest-magnitude component is positive (the paired right singular vector
/// is flipped with it).
pub fn svd(a: &Mat3) -> Result<Svd> {
    if !a.iter().all(|x| x.is_finite()) {
        return Err(InsError::SvdFailed);
    }

    let mut w = *a;
    let mut v = Mat3::identity();
    let mut converged = false;
    for _ in 0..SVD_MAX_SWEEPS {
        let mut rotated = false;
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let alpha = w.column(i).norm_squared();
            let beta = w.column(j).norm_squared();
            let gamma = w.column(i).dot(&w.column(j));
            if gamma.abs() <= SVD_ORTHO_EPS * (alpha * beta).sqrt() {
                continue;
            }
            rotated = true;

            let zeta = (beta - alpha) / (2.0 * gamma);
            let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
            let c = 1.0 / (1.0 + t * t).sqrt();
            rotate_columns(&mut w, i, j, c, c * t);
            rotate_columns(&mut v, i, j, c, c * t);
        }
        if !rotated {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(InsError::SvdFailed);
    }

    let norms = Vec3::from_fn(|j, _| w.column(j).norm());
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| norms[j].total_cmp(&norms[i]));

    let d = Vec3::from_fn(|k, _| norms[order[k]]);
    if d[0] == 0.0 {
        return Ok(Svd {
            u: Mat3::identity(),
            d,
            v: Mat3::identity(),
        });
    }

    let col = |k: usize| w.column(order[k]).into_owned();
    let mut v_sorted = Mat3::from_columns(&[
        v.column(order[0]).into_owned(),
        v.column(order[1]).into_owned(),
        v.column(order[2]).into_owned(),
    ]);

    let u0 = col(0) / d[0];
    let r = col(1) - u0 * u0.dot(&col(1));
    let u1 = if r.norm() > f64::EPSILON * d[0] {
        r.normalize()
    } else {
        any_orthogonal(&u0)
    };
    let u2 = u0.cross(&u1);
    if col(2).dot(&u2) < 0.0 {
        let flipped = -v_sorted.column(2);
        v_sorted.set_column(2, &flipped);
    }

    let mut u = Mat3::from_columns(&[u0, u1, u2]);
    for k in 0..3 {
        let lead = u
            .column(k)
            .iter()
            .fold(0.0_f64, |m, &x| if x.abs() > m.abs() { x } else { m });
        if lead < 0.0 {
            let (uc, vc) = (-u.column(k), -v_sorted.column(k));
            u.set_column(k, &uc);
            v_sorted.set_column(k, &vc);
        }
    }

    Ok(Svd { u, d, v: v_sorted })
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Rotation3;
    use rand::{Rng, SeedableRng};

    fn random_mat(rng: &mut rand::rngs::StdRng) -> Mat3 {
        Mat3::from_fn(|_, _| rng.gen_range(-10.0..10.0))
    }

    #[test]
    fn skew_is_cross_product() {
        let a = Vec3::new(1.0, -2.0, 0.5);
        let b = Vec3::new(0.3, 4.0, -1.0);
        assert!(approx_eq(&(skew(&a) * b), &a.cross(&b), 1e-12));
    }

    #[test]
    fn inner_and_outer_products() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(inner(&a, &b), 32.0);
        let m = outer(&a, &b);
        assert_eq!(m[(1, 2)], 12.0);
        assert_eq!(m[(2, 0)], 12.0);
        assert_eq!(pow(&a, 2.0), Vec3::new(1.0, 4.0, 9.0));
    }

    #[test]
    fn normalize_zero_vector_fails() {
        let mut v = Vec3::zeros();
        assert_eq!(normalize(&mut v), Err(InsError::DegenerateVector));
        assert_eq!(v, Vec3::zeros());

        let mut w = Vec3::new(3.0, 0.0, 4.0);
        assert_eq!(normalize(&mut w), Ok(5.0));
        assert!((w.norm() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn det_matches_nalgebra() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let a = random_mat(&mut rng);
            assert!((det(&a) - a.determinant()).abs() < 1e-9);
        }
    }

    #[test]
    fn inverse_gives_identity() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        for _ in 0..50 {
            let a = random_mat(&mut rng);
            let inv = inverse(&a).unwrap();
            assert!(approx_eq(&(a * inv), &Mat3::identity(), 1e-9));
        }
    }

    #[test]
    fn inverse_of_singular_fails() {
        let mut a = Mat3::new(1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 0.0, 1.0, 5.0);
        let before = a;
        assert!(matches!(invert(&mut a), Err(InsError::SingularMatrix { .. })));
        assert_eq!(a, before);
    }

    #[test]
    fn lu_reconstructs_permuted_matrix() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let a = random_mat(&mut rng);
            let f = lu(&a).unwrap();
            assert!(approx_eq(&(f.p * a), &(f.l * f.u), 1e-9));
            for r in 0..3 {
                assert_eq!(f.l[(r, r)], 1.0);
                for c in (r + 1)..3 {
                    assert_eq!(f.l[(r, c)], 0.0);
                    assert_eq!(f.u[(c, r)], 0.0);
                }
            }
        }
    }

    #[test]
    fn lu_pivots_on_largest_entry() {
        let a = Mat3::new(1.0, 2.0, 3.0, 8.0, 1.0, 0.0, -2.0, 4.0, 1.0);
        let f = lu(&a).unwrap();
        assert_eq!(f.u[(0, 0)], 8.0);
        assert!(f.l.iter().all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn lu_of_singular_fails() {
        let a = Mat3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 1.0, 0.0, 1.0);
        assert!(matches!(lu(&a), Err(InsError::SingularMatrix { .. })));
    }

    #[test]
    fn svd_reconstructs_and_sorts() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        for _ in 0..50 {
            let a = random_mat(&mut rng);
            let s = svd(&a).unwrap();
            let rebuilt = s.u * Mat3::from_diagonal(&s.d) * s.v.transpose();
            assert!(approx_eq(&a, &rebuilt, 1e-9));
            assert!(s.d[0] >= s.d[1] && s.d[1] >= s.d[2] && s.d[2] >= 0.0);
            assert!(approx_eq(&(s.u.transpose() * s.u), &Mat3::identity(), 1e-9));
            assert!(approx_eq(&(s.v.transpose() * s.v), &Mat3::identity(), 1e-9));
        }
    }

    #[test]
    fn svd_rank_deficient() {
        let x = Vec3::new(1.0, 2.0, -1.0);
        let y = Vec3::new(0.5, -1.0, 3.0);
        let a = outer(&x, &y);
        let s = svd(&a).unwrap();
        assert!((s.d[0] - x.norm() * y.norm()).abs() < 1e-9);
        assert!(s.d[1].abs() < 1e-9 && s.d[2].abs() < 1e-9);
        let rebuilt = s.u * Mat3::from_diagonal(&s.d) * s.v.transpose();
        assert!(approx_eq(&a, &rebuilt, 1e-9));
    }

    #[test]
    fn svd_sign_convention_is_deterministic() {
        let a = Mat3::new(2.0, 0.0, 0.0, 0.0, -3.0, 0.0, 0.0, 0.0, 1.0);
        let s = svd(&a).unwrap();
        assert!(approx_eq(&s.d, &Vec3::new(3.0, 2.0, 1.0), 1e-12));
        for c in 0..3 {
            let col = s.u.column(c);
            let lead = col.iter().fold(0.0_f64, |m, &x| if x.abs() > m.abs() { x } else { m });
            assert!(lead > 0.0);
        }
    }

    #[test]
    fn svd_resolves_small_singular_values() {
        let r1 = Rotation3::from_euler_angles(0.3, -1.1, 2.0).into_inner();
        let r2 = Rotation3::from_euler_angles(-0.7, 0.4, -2.5).into_inner();
        let d = Vec3::new(3.2e6, 1e-2, 1e-11);
        let a = r1 * Mat3::from_diagonal(&d) * r2.transpose();

        let s = svd(&a).unwrap();
        assert!((s.d[0] - d[0]).abs() < 1e-9 * d[0]);
        assert!((s.d[1] - d[1]).abs() < 1e-6 * d[1], "{}", s.d);
        assert!(s.d[2] < 1e-8);

        let m = s.u.transpose() * a * s.v;
        for (r, c) in [(0, 1), (1, 0), (0, 2), (2, 0), (1, 2), (2, 1)] {
            assert!(m[(r, c)].abs() < 1e-6 * s.d[1], "{m}");
        }
        assert!(approx_eq(&(s.u.transpose() * s.u), &Mat3::identity(), 1e-12));
    }

    #[test]
    fn svd_of_zero_and_non_finite() {
        let s = svd(&Mat3::zeros()).unwrap();
        assert_eq!(s.d, Vec3::zeros());
        assert_eq!(s.u, Mat3::identity());

        let mut a = Mat3::identity();
        a[(1, 2)] = f64::NAN;
        assert_eq!(svd(&a), Err(InsError::SvdFailed));
    }
}
