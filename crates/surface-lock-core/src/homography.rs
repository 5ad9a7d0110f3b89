use crate::linalg::solve_fixed;
use log::{debug, warn};
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Accepted band for `|det|` of solved homographies and affine maps.
pub const DETERMINANT_BAND: (f64, f64) = (0.01, 100.0);

/// Row-major 3×3 planar transform `[m0 m1 m2; m3 m4 m5; m6 m7 m8]`.
///
/// Solved homographies are normalized so that `m8 == 1`. With a bottom row of
/// `[0, 0, 1]` the same layout is an affine map, which is how the renderer
/// consumes the matrices produced by [`crate::transform`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub m: [f32; 9],
}

impl Default for Homography {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Homography {
    pub const IDENTITY: Homography = Homography {
        m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };

    pub fn new(m: [f32; 9]) -> Self {
        Self { m }
    }

    /// Build from the eight free parameters `h1..h8` with `h9 = 1`.
    pub(crate) fn from_params(h: &[f64; 9]) -> Self {
        let mut m = [0.0_f32; 9];
        for (dst, src) in m.iter_mut().zip(h.iter()).take(8) {
            *dst = *src as f32;
        }
        m[8] = 1.0;
        Self { m }
    }

    pub fn from_matrix3(h: &Matrix3<f64>) -> Self {
        Self::new([
            h[(0, 0)] as f32,
            h[(0, 1)] as f32,
            h[(0, 2)] as f32,
            h[(1, 0)] as f32,
            h[(1, 1)] as f32,
            h[(1, 2)] as f32,
            h[(2, 0)] as f32,
            h[(2, 1)] as f32,
            h[(2, 2)] as f32,
        ])
    }

    pub fn to_matrix3(&self) -> Matrix3<f64> {
        Matrix3::from_row_slice(&self.m.map(f64::from))
    }

    /// Row-major values, in the layout expected by the renderer.
    pub fn values(&self) -> [f32; 9] {
        self.m
    }

    /// True when the bottom row is `[0, 0, 1]`.
    pub fn is_affine(&self) -> bool {
        self.m[6] == 0.0 && self.m[7] == 0.0 && self.m[8] == 1.0
    }

    pub fn determinant(&self) -> f64 {
        determinant3(&self.m.map(f64::from))
    }

    /// Map a point with perspective division.
    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.to_matrix3() * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    /// Like [`Homography::apply`], but `None` when the point maps to (near) infinity.
    #[inline]
    pub fn try_apply(&self, p: Point2<f32>) -> Option<Point2<f32>> {
        let m = &self.m;
        let w = m[6] * p.x + m[7] * p.y + m[8];
        if !w.is_finite() || w.abs() < 1e-6 {
            return None;
        }
        Some(Point2::new(
            (m[0] * p.x + m[1] * p.y + m[2]) / w,
            (m[3] * p.x + m[4] * p.y + m[5]) / w,
        ))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.to_matrix3()
            .try_inverse()
            .map(|inv| Self::from_matrix3(&inv))
    }
}

impl std::ops::Mul for Homography {
    type Output = Homography;

    fn mul(self, rhs: Homography) -> Homography {
        crate::transform::multiply(&self, &rhs)
    }
}

pub(crate) fn determinant3(h: &[f64; 9]) -> f64 {
    h[0] * (h[4] * h[8] - h[5] * h[7]) - h[1] * (h[3] * h[8] - h[5] * h[6])
        + h[2] * (h[3] * h[7] - h[4] * h[6])
}

fn in_determinant_band(det: f64) -> bool {
    let (lo, hi) = DETERMINANT_BAND;
    det.is_finite() && (lo..=hi).contains(&det.abs())
}

/// 4-point DLT in double precision; `None` on a singular system or an
/// out-of-band determinant.
pub(crate) fn homography_params_4pt(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
) -> Option<[f64; 9]> {
    if src.len() != 4 || dst.len() != 4 {
        warn!(
            "homography needs 4 correspondences, got {} -> {}",
            src.len(),
            dst.len()
        );
        return None;
    }

    // Unknowns: [h1 .. h8], with h9 = 1
    // For each correspondence (x,y)->(u,v):
    // h1 x + h2 y + h3 - u h7 x - u h8 y = u
    // h4 x + h5 y + h6 - v h7 x - v h8 y = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        let x = s.x as f64;
        let y = s.y as f64;
        let u = d.x as f64;
        let v = d.y as f64;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -x * u;
        a[(r0, 7)] = -y * u;
        b[r0] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -x * v;
        a[(r1, 7)] = -y * v;
        b[r1] = v;
    }

    let Some(x) = solve_fixed(&a, &b) else {
        debug!("homography system is singular");
        return None;
    };

    let h = [x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0];
    let det = determinant3(&h);
    if !in_determinant_band(det) {
        debug!("homography rejected: det = {det:.4e}");
        return None;
    }
    Some(h)
}

/// Compute `H` such that `dst ~ H * src` from exactly 4 correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Returns `None`
/// for the wrong number of points, a singular system (e.g. collinear points)
/// or a determinant outside [`DETERMINANT_BAND`].
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn solve_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    homography_params_4pt(src, dst).map(|h| Homography::from_params(&h))
}

/// Affine map `x' = a x + b y + c`, `y' = d x + e y + f` from exactly 3 correspondences.
///
/// The result has a bottom row of `[0, 0, 1]`. Rejected when the linear part's
/// determinant `ae - bd` falls outside [`DETERMINANT_BAND`].
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn solve_affine(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != 3 || dst.len() != 3 {
        warn!(
            "affine solve needs 3 correspondences, got {} -> {}",
            src.len(),
            dst.len()
        );
        return None;
    }

    let mut a = SMatrix::<f64, 6, 6>::zeros();
    let mut b = SVector::<f64, 6>::zeros();

    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        let x = s.x as f64;
        let y = s.y as f64;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        b[r0] = d.x as f64;

        let r1 = r0 + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        b[r1] = d.y as f64;
    }

    let Some(x) = solve_fixed(&a, &b) else {
        debug!("affine system is singular");
        return None;
    };

    let det = x[0] * x[4] - x[1] * x[3];
    if !in_determinant_band(det) {
        debug!("affine map rejected: det = {det:.4e}");
        return None;
    }

    Some(Homography::new([
        x[0] as f32,
        x[1] as f32,
        x[2] as f32,
        x[3] as f32,
        x[4] as f32,
        x[5] as f32,
        0.0,
        0.0,
        1.0,
    ]))
}
