//! Scalar helpers and small 3x3 matrix decompositions.

use glam::{Mat3, Vec3};

/// Singular values below this are treated as collapsed directions.
const SINGULAR_EPS: f32 = 1.0e-6;

/// Cyclic Jacobi sweeps for the 3x3 symmetric eigen solver.
const JACOBI_SWEEPS: usize = 12;

/// GLSL-style `mix(a, b, t)` for scalars.
#[inline]
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// `select(0, 1/x, x > 0)`: reciprocal that yields zero for empty or
/// non-finite denominators instead of propagating inf/NaN.
#[inline]
pub fn safe_recip(x: f32) -> f32 {
    if x > 0.0 && x.is_finite() {
        1.0 / x
    } else {
        0.0
    }
}

/// Outer product of two `Vec3`: returns a `Mat3` where M = a * b^T.
#[inline]
pub fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// True when every entry of the matrix is finite.
#[inline]
pub fn mat3_is_finite(m: &Mat3) -> bool {
    m.x_axis.is_finite() && m.y_axis.is_finite() && m.z_axis.is_finite()
}

/// Iterative polar decomposition: extract rotation from A = R * S.
///
/// Uses 10 iterations of: R_{k+1} = 0.5 * (R_k + R_k^{-T})
///
/// If the matrix is singular, returns identity.
pub fn polar_rotation(a: Mat3) -> Mat3 {
    let mut r = a;
    for _ in 0..10 {
        let det = r.determinant();
        if det.abs() < 1e-10 {
            return Mat3::IDENTITY;
        }
        let r_inv_t = r.inverse().transpose();
        r = (r + r_inv_t) * 0.5;
    }
    r
}

/// Eigen-decomposition of a symmetric 3x3 matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues sorted in descending order and the matching unit
/// eigenvectors as the columns of the returned matrix.
pub fn symmetric_eigen(m: Mat3) -> (Vec3, Mat3) {
    // a[row][col]
    let mut a = [[0.0f32; 3]; 3];
    for (c, col) in [m.x_axis, m.y_axis, m.z_axis].iter().enumerate() {
        for r in 0..3 {
            a[r][c] = col[r];
        }
    }
    let mut v = [[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    let scale = a[0][0].abs() + a[1][1].abs() + a[2][2].abs() + 1.0e-30;
    for _ in 0..JACOBI_SWEEPS {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off <= 1.0e-14 * scale * scale {
            break;
        }
        for &(p, q) in &[(0usize, 1usize), (0, 2), (1, 2)] {
            let apq = a[p][q];
            if apq.abs() <= 1.0e-30 {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            for row in a.iter_mut() {
                let (kp, kq) = (row[p], row[q]);
                row[p] = c * kp - s * kq;
                row[q] = s * kp + c * kq;
            }
            for k in 0..3 {
                let (pk, qk) = (a[p][k], a[q][k]);
                a[p][k] = c * pk - s * qk;
                a[q][k] = s * pk + c * qk;
            }
            for row in v.iter_mut() {
                let (kp, kq) = (row[p], row[q]);
                row[p] = c * kp - s * kq;
                row[q] = s * kp + c * kq;
            }
        }
    }

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| a[j][j].total_cmp(&a[i][i]));
    let column = |c: usize| Vec3::new(v[0][c], v[1][c], v[2][c]);
    (
        Vec3::new(a[order[0]][order[0]], a[order[1]][order[1]], a[order[2]][order[2]]),
        Mat3::from_cols(column(order[0]), column(order[1]), column(order[2])),
    )
}

/// Singular value decomposition `F = U * diag(sigma) * V^T`.
#[derive(Clone, Copy, Debug)]
pub struct Svd3 {
    pub u: Mat3,
    pub sigma: Vec3,
    pub v: Mat3,
}

impl Svd3 {
    /// Rebuild `U * diag(sigma) * V^T`.
    pub fn recompose(&self, sigma: Vec3) -> Mat3 {
        self.u * Mat3::from_diagonal(sigma) * self.v.transpose()
    }
}

/// SVD of a 3x3 matrix through the eigen-decomposition of `F^T F`.
///
/// Singular values come out non-negative and descending. Collapsed
/// directions get an arbitrary orthonormal completion of `U`.
pub fn svd3(f: Mat3) -> Svd3 {
    let (eig, mut v) = symmetric_eigen(f.transpose() * f);
    if v.determinant() < 0.0 {
        v.z_axis = -v.z_axis;
    }
    let sigma = Vec3::new(
        eig.x.max(0.0).sqrt(),
        eig.y.max(0.0).sqrt(),
        eig.z.max(0.0).sqrt(),
    );

    let u0 = if sigma.x > SINGULAR_EPS {
        (f * v.x_axis / sigma.x).normalize_or(Vec3::X)
    } else {
        Vec3::X
    };
    let u1 = if sigma.y > SINGULAR_EPS {
        let raw = f * v.y_axis / sigma.y;
        (raw - u0 * raw.dot(u0)).normalize_or(u0.any_orthonormal_vector())
    } else {
        u0.any_orthonormal_vector()
    };
    let u2 = if sigma.z > SINGULAR_EPS {
        let raw = f * v.z_axis / sigma.z;
        let raw = raw - u0 * raw.dot(u0) - u1 * raw.dot(u1);
        raw.normalize_or(u0.cross(u1))
    } else {
        u0.cross(u1)
    };

    Svd3 {
        u: Mat3::from_cols(u0, u1, u2),
        sigma,
        v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mat_close(a: Mat3, b: Mat3, tol: f32) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for k in 0..9 {
            assert!((a[k] - b[k]).abs() < tol, "entry {k}: {} vs {}", a[k], b[k]);
        }
    }

    #[test]
    fn test_safe_recip_guards_zero_and_nan() {
        assert_eq!(safe_recip(0.0), 0.0);
        assert_eq!(safe_recip(-2.0), 0.0);
        assert_eq!(safe_recip(f32::NAN), 0.0);
        assert_eq!(safe_recip(4.0), 0.25);
    }

    #[test]
    fn test_symmetric_eigen_diagonalizes() {
        let m = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.5),
            Vec3::new(1.0, 3.0, 0.2),
            Vec3::new(0.5, 0.2, 1.0),
        );
        let (vals, vecs) = symmetric_eigen(m);
        assert!(vals.x >= vals.y && vals.y >= vals.z);
        let rebuilt = vecs * Mat3::from_diagonal(vals) * vecs.transpose();
        assert_mat_close(rebuilt, m, 1e-4);
    }

    #[test]
    fn test_svd_reconstructs_general_matrix() {
        let f = Mat3::from_cols(
            Vec3::new(1.2, 0.1, -0.3),
            Vec3::new(0.4, 0.9, 0.0),
            Vec3::new(0.0, 0.2, 1.1),
        );
        let svd = svd3(f);
        assert!(svd.sigma.x >= svd.sigma.y && svd.sigma.y >= svd.sigma.z);
        assert_mat_close(svd.recompose(svd.sigma), f, 1e-4);
    }

    #[test]
    fn test_svd_of_rank_deficient_matrix() {
        let f = Mat3::from_cols(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::ZERO);
        let svd = svd3(f);
        assert!((svd.sigma.x - 1.0).abs() < 1e-5);
        assert!(svd.sigma.y.abs() < 1e-5 && svd.sigma.z.abs() < 1e-5);
        assert_mat_close(svd.recompose(svd.sigma), f, 1e-4);
        assert!(mat3_is_finite(&svd.u));
    }

    #[test]
    fn test_polar_rotation_of_rotation_is_identity_op() {
        let r = Mat3::from_rotation_y(0.7) * Mat3::from_rotation_x(-0.3);
        assert_mat_close(polar_rotation(r), r, 1e-5);
        let stretched = r * Mat3::from_diagonal(Vec3::new(1.5, 0.8, 1.1));
        assert_mat_close(polar_rotation(stretched), r, 1e-4);
    }
}
