//! Planar pose decomposition from a homography (IPPE construction).
//!
//! A planar square target viewed near head-on admits two geometrically
//! valid poses. The decomposition works from the Jacobian of the
//! plane-to-image map at the model origin: after rotating the optical ray
//! through the origin's projection onto the z axis, the remaining 2×2
//! scale/rotation factor fixes the in-plane rotation, and the out-of-plane
//! component is determined up to the two-fold sign ambiguity. Both
//! candidates are returned; the caller disambiguates by reprojection error.

use nalgebra::{Matrix2, Matrix3, Rotation3, Unit, Vector3};

/// Compute the two candidate rotations implied by a plane-to-normalized-
/// image homography with `H[(2,2)] == 1`.
///
/// Returns `None` when the homography is too degenerate to decompose.
pub fn rotation_candidates(h: &Matrix3<f64>) -> Option<[Matrix3<f64>; 2]> {
    // Projection of the model origin in normalized coordinates.
    let p = h[(0, 2)];
    let q = h[(1, 2)];
    if !p.is_finite() || !q.is_finite() {
        return None;
    }

    // Jacobian of the homography-induced map at the origin.
    let j = Matrix2::new(
        h[(0, 0)] - p * h[(2, 0)],
        h[(0, 1)] - p * h[(2, 1)],
        h[(1, 0)] - q * h[(2, 0)],
        h[(1, 1)] - q * h[(2, 1)],
    );

    // Rotation taking the z axis onto the ray through (p, q, 1).
    let rv = ray_alignment_rotation(p, q);

    // With the ray aligned, the third column of the reduced projection
    // vanishes and the map factors through a 2×2 matrix B.
    let b = Matrix2::new(
        rv[(0, 0)] - p * rv[(2, 0)],
        rv[(0, 1)] - p * rv[(2, 1)],
        rv[(1, 0)] - q * rv[(2, 0)],
        rv[(1, 1)] - q * rv[(2, 1)],
    );
    let a = b.try_inverse()? * j;

    // Largest singular value of A sets the depth scale.
    let ata = a.transpose() * a;
    let trace = ata[(0, 0)] + ata[(1, 1)];
    let det = ata[(0, 0)] * ata[(1, 1)] - ata[(0, 1)] * ata[(1, 0)];
    let disc = (trace * trace - 4.0 * det).max(0.0);
    let gamma = (0.5 * (trace + disc.sqrt())).sqrt();
    if !gamma.is_finite() || gamma < 1e-12 {
        return None;
    }

    // Top-left 2×2 block of the residual rotation.
    let r = a / gamma;
    let (r00, r01, r10, r11) = (r[(0, 0)], r[(0, 1)], r[(1, 0)], r[(1, 1)]);

    // Out-of-plane components of the first two rotation columns, known up
    // to a common sign.
    let b0 = (1.0 - r00 * r00 - r10 * r10).max(0.0).sqrt();
    let b1 = if b0 > 1e-6 {
        -(r00 * r01 + r10 * r11) / b0
    } else {
        (1.0 - r01 * r01 - r11 * r11).max(0.0).sqrt()
    };

    let build = |s: f64| -> Matrix3<f64> {
        let c0 = Vector3::new(r00, r10, s * b0);
        let c1 = Vector3::new(r01, r11, s * b1);
        let c2 = c0.cross(&c1);
        rv * Matrix3::from_columns(&[c0, c1, c2])
    };

    Some([build(1.0), build(-1.0)])
}

/// Least-squares translation given a rotation: each observation constrains
/// `[[1, 0, -u], [0, 1, -v]] · (R·X + t) = 0`, linear in t.
pub fn solve_translation(
    model: &[Vector3<f64>],
    obs_normalized: &[[f64; 2]],
    rotation: &Matrix3<f64>,
) -> Option<Vector3<f64>> {
    if model.len() != obs_normalized.len() || model.len() < 3 {
        return None;
    }

    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();

    for (x, obs) in model.iter().zip(obs_normalized) {
        let (u, v) = (obs[0], obs[1]);
        let rx = rotation * x;

        // Rows of M = [[1, 0, -u], [0, 1, -v]]
        let m0 = Vector3::new(1.0, 0.0, -u);
        let m1 = Vector3::new(0.0, 1.0, -v);

        ata += m0 * m0.transpose() + m1 * m1.transpose();
        atb -= m0 * m0.dot(&rx) + m1 * m1.dot(&rx);
    }

    let t = ata.try_inverse()? * atb;
    if t.iter().all(|c| c.is_finite()) {
        Some(t)
    } else {
        None
    }
}

fn ray_alignment_rotation(p: f64, q: f64) -> Matrix3<f64> {
    let norm_pq = (p * p + q * q).sqrt();
    if norm_pq < 1e-12 {
        return Matrix3::identity();
    }
    let s = (p * p + q * q + 1.0).sqrt();
    let axis = Unit::new_normalize(Vector3::new(-q, p, 0.0));
    let angle = (1.0 / s).clamp(-1.0, 1.0).acos();
    *Rotation3::from_axis_angle(&axis, angle).matrix()
}
