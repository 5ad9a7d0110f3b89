//! Focal-length self-calibration from a planar rectangle and homographies
//! constrained by a known focal length.
//!
//! All routines assume the simplified intrinsics `K = [f 0 cx; 0 f cy; 0 0 1]`.
//! For a plane-to-image homography `H = K [r1 r2 t]`, the back-projected
//! columns `v1 = K⁻¹ h1` and `v2 = K⁻¹ h2` are scaled rotation columns: they
//! are orthogonal and have equal norms.

use crate::homography::{homography_params_4pt, Homography};
use crate::linalg::solve_fixed;
use crate::newton::{solve_2d, NewtonParams};
use log::{debug, warn};
use nalgebra::{Point2, SMatrix, SVector, Vector2, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Below this `|h7 h8|` the view is treated as fronto-parallel.
const FRONTO_PARALLEL_EPS: f64 = 1e-12;
/// Smallest plausible `f²` (f = 10 px).
const MIN_FOCAL_SQ: f64 = 100.0;
/// Perspective terms `h7`, `h8` larger than this mean the solver blew up.
const MAX_PERSPECTIVE_TERM: f64 = 0.1;
/// Plausible range for a corrected aspect ratio.
const ASPECT_RATIO_RANGE: (f32, f32) = (0.1, 10.0);

#[derive(Clone, Copy, Debug)]
struct PinholeK {
    f: f64,
    cx: f64,
    cy: f64,
}

impl PinholeK {
    fn new(f: f32, cx: f32, cy: f32) -> Self {
        Self {
            f: f as f64,
            cx: cx as f64,
            cy: cy as f64,
        }
    }

    /// `K⁻¹ h1` and `K⁻¹ h2` for the first two columns of `h`.
    fn back_project_columns(&self, h: &[f64; 9]) -> (Vector3<f64>, Vector3<f64>) {
        let v1 = Vector3::new(
            (h[0] - self.cx * h[6]) / self.f,
            (h[3] - self.cy * h[6]) / self.f,
            h[6],
        );
        let v2 = Vector3::new(
            (h[1] - self.cx * h[7]) / self.f,
            (h[4] - self.cy * h[7]) / self.f,
            h[7],
        );
        (v1, v2)
    }

    /// `(v1·v2, |v1|² − |v2|²)`; both vanish for a consistent homography.
    fn rotation_residuals(&self, h: &[f64; 9]) -> Vector2<f64> {
        let (v1, v2) = self.back_project_columns(h);
        Vector2::new(v1.dot(&v2), v1.norm_squared() - v2.norm_squared())
    }
}

/// Estimate the focal length (pixels) from a known rectangle seen in perspective.
///
/// `paper_coords` are the 4 rectangle corners in any metric unit, `frame_coords`
/// their image positions, `(cx, cy)` the principal point (typically the frame
/// center). Uses the orthogonality of the back-projected homography columns;
/// when the view is (near) fronto-parallel the equal-norm constraint is used
/// instead. Returns `None` for a degenerate homography or an implausible
/// result (`f² < 100`). A perspective-free view usually yields `None`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(paper_coords, frame_coords))
)]
pub fn estimate_focal_length(
    paper_coords: &[Point2<f32>],
    frame_coords: &[Point2<f32>],
    cx: f32,
    cy: f32,
) -> Option<f32> {
    let h = homography_params_4pt(paper_coords, frame_coords)?;
    let cx = cx as f64;
    let cy = cy as f64;

    let a1 = h[0] - cx * h[6];
    let a2 = h[1] - cx * h[7];
    let b1 = h[3] - cy * h[6];
    let b2 = h[4] - cy * h[7];

    let denominator = h[6] * h[7];
    let f2 = if denominator.abs() < FRONTO_PARALLEL_EPS {
        // |v1|² = |v2|²  ->  f² (h7² - h6²) = a1² + b1² - a2² - b2²
        let den = h[7] * h[7] - h[6] * h[6];
        if den.abs() < FRONTO_PARALLEL_EPS {
            debug!("focal estimate: no perspective to measure");
            return None;
        }
        (a1 * a1 + b1 * b1 - a2 * a2 - b2 * b2) / den
    } else {
        // v1 · v2 = 0  ->  (a1 a2 + b1 b2) / f² + h6 h7 = 0
        -(a1 * a2 + b1 * b2) / denominator
    };

    if f2.is_nan() || f2 < MIN_FOCAL_SQ {
        debug!("focal estimate rejected: f^2 = {f2:.3e}");
        return None;
    }
    Some(f2.sqrt() as f32)
}

/// Full perspective homography (paper → frame) from only 3 correspondences and
/// a known focal length.
///
/// The 3 correspondences fix `h1..h6` as affine functions of the perspective
/// terms `(h7, h8)`; the two rotation constraints of the pinhole model then
/// pin down `(h7, h8)` with a bounded Newton iteration started from the affine
/// solution `(0, 0)`. Returns `None` for degenerate input, a non-invertible
/// step, divergence (`|h7|` or `|h8| > 0.1`) or an unconverged solve.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(paper_coords, frame_coords))
)]
pub fn solve_constrained_homography(
    paper_coords: &[Point2<f32>],
    frame_coords: &[Point2<f32>],
    f: f32,
    cx: f32,
    cy: f32,
) -> Option<Homography> {
    if paper_coords.len() != 3 || frame_coords.len() != 3 {
        warn!(
            "constrained homography needs 3 correspondences, got {} -> {}",
            paper_coords.len(),
            frame_coords.len()
        );
        return None;
    }
    if f.is_nan() || f <= 0.0 {
        return None;
    }

    // A6 [h1..h6]^T = b6 + h7 c7 + h8 c8, from
    //   h1 x + h2 y + h3 = u + h7 x u + h8 y u
    //   h4 x + h5 y + h6 = v + h7 x v + h8 y v
    let mut a6 = SMatrix::<f64, 6, 6>::zeros();
    let mut b6 = SVector::<f64, 6>::zeros();
    let mut c7 = SVector::<f64, 6>::zeros();
    let mut c8 = SVector::<f64, 6>::zeros();

    for (k, (p, q)) in paper_coords.iter().zip(frame_coords).enumerate() {
        let x = p.x as f64;
        let y = p.y as f64;
        let u = q.x as f64;
        let v = q.y as f64;

        let r0 = 2 * k;
        a6[(r0, 0)] = x;
        a6[(r0, 1)] = y;
        a6[(r0, 2)] = 1.0;
        b6[r0] = u;
        c7[r0] = x * u;
        c8[r0] = y * u;

        let r1 = r0 + 1;
        a6[(r1, 3)] = x;
        a6[(r1, 4)] = y;
        a6[(r1, 5)] = 1.0;
        b6[r1] = v;
        c7[r1] = x * v;
        c8[r1] = y * v;
    }

    let Some(p0) = solve_fixed(&a6, &b6) else {
        debug!("constrained homography: 3-point system is singular");
        return None;
    };
    let d7 = solve_fixed(&a6, &c7)?;
    let d8 = solve_fixed(&a6, &c8)?;

    let params_at = |hp: Vector2<f64>| -> [f64; 9] {
        let lin = p0 + d7 * hp.x + d8 * hp.y;
        [
            lin[0], lin[1], lin[2], lin[3], lin[4], lin[5], hp.x, hp.y, 1.0,
        ]
    };

    let k = PinholeK::new(f, cx, cy);
    let newton = NewtonParams {
        max_abs: Some(MAX_PERSPECTIVE_TERM),
        ..NewtonParams::default()
    };

    match solve_2d(
        |hp| k.rotation_residuals(&params_at(hp)),
        Vector2::zeros(),
        &newton,
    ) {
        Ok(sol) => {
            debug!(
                "constrained homography converged in {} iterations (h7={:.3e}, h8={:.3e})",
                sol.iterations, sol.x.x, sol.x.y
            );
            Some(Homography::from_params(&params_at(sol.x)))
        }
        Err(err) => {
            debug!("constrained homography rejected: {err}");
            None
        }
    }
}

/// Recover the true width/height ratio of a rectangle whose aspect ratio was guessed.
///
/// `assumed_paper_coords` is a rectangle `[TL, TR, BR, BL]` with the guessed
/// ratio; `detected_corners` are the observed image corners. With a known focal
/// length the ratio of the back-projected column norms `|K⁻¹h1| / |K⁻¹h2|`
/// measures how far the guess is off, independent of the paper scale.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(assumed_paper_coords, detected_corners))
)]
pub fn correct_aspect_ratio(
    assumed_paper_coords: &[Point2<f32>],
    detected_corners: &[Point2<f32>],
    f: f32,
    cx: f32,
    cy: f32,
) -> Option<f32> {
    let h = homography_params_4pt(assumed_paper_coords, detected_corners)?;
    let (v1, v2) = PinholeK::new(f, cx, cy).back_project_columns(&h);

    let norm1 = v1.norm();
    let norm2 = v2.norm();
    if !(norm1 >= 1e-10 && norm2 >= 1e-10) {
        debug!("aspect correction: degenerate column norms ({norm1:.3e}, {norm2:.3e})");
        return None;
    }

    let assumed_w = assumed_paper_coords[1].x - assumed_paper_coords[0].x;
    let assumed_h = assumed_paper_coords[3].y - assumed_paper_coords[0].y;
    if assumed_w < 0.001 || assumed_h < 0.001 {
        return None;
    }
    let assumed_ar = (assumed_w / assumed_h) as f64;

    let corrected = (assumed_ar * norm1 / norm2) as f32;
    if !(ASPECT_RATIO_RANGE.0..=ASPECT_RATIO_RANGE.1).contains(&corrected) {
        debug!("aspect correction rejected: {corrected}");
        return None;
    }
    Some(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CX: f32 = 640.0;
    const CY: f32 = 360.0;

    fn a4_corners() -> [Point2<f32>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(210.0, 0.0),
            Point2::new(210.0, 297.0),
            Point2::new(0.0, 297.0),
        ]
    }

    /// A4 sheet centered in the image, tilted about the horizontal axis and
    /// seen through a pinhole with focal length `f`.
    fn project_a4(f: f32, tilt_deg: f32) -> [Point2<f32>; 4] {
        let (w, h) = (400.0_f32, 566.0_f32);
        let flat = [
            Point2::new(CX - w / 2.0, CY - h / 2.0),
            Point2::new(CX + w / 2.0, CY - h / 2.0),
            Point2::new(CX + w / 2.0, CY + h / 2.0),
            Point2::new(CX - w / 2.0, CY + h / 2.0),
        ];
        if tilt_deg == 0.0 {
            return flat;
        }
        let (sin_t, cos_t) = tilt_deg.to_radians().sin_cos();
        flat.map(|p| {
            let dx = p.x - CX;
            let dy = p.y - CY;
            let depth = f - dy * sin_t;
            Point2::new(CX + dx * f / depth, CY + dy * cos_t * f / depth)
        })
    }

    fn pixel_error(a: Point2<f32>, b: Point2<f32>) -> f32 {
        (a - b).norm()
    }

    fn hold_out_error(f: f32, tilt_deg: f32, hidden: usize) -> Option<f32> {
        let paper = a4_corners();
        let frame = project_a4(f, tilt_deg);
        let visible: Vec<usize> = (0..4).filter(|&i| i != hidden).collect();
        let paper3: Vec<_> = visible.iter().map(|&i| paper[i]).collect();
        let frame3: Vec<_> = visible.iter().map(|&i| frame[i]).collect();
        let h = solve_constrained_homography(&paper3, &frame3, f, CX, CY)?;
        let est = h.try_apply(paper[hidden])?;
        Some(pixel_error(est, frame[hidden]))
    }

    #[test]
    fn focal_length_recovered_at_moderate_tilt() {
        let f = 800.0;
        let est = estimate_focal_length(&a4_corners(), &project_a4(f, 15.0), CX, CY)
            .expect("tilted view constrains f");
        let rel = (est - f).abs() / f;
        assert!(rel < 0.15, "estimated {est}, expected {f} (rel {rel})");
    }

    #[test]
    fn focal_length_recovered_at_strong_tilt() {
        let f = 800.0;
        let est = estimate_focal_length(&a4_corners(), &project_a4(f, 25.0), CX, CY)
            .expect("tilted view constrains f");
        let rel = (est - f).abs() / f;
        assert!(rel < 0.10, "estimated {est}, expected {f} (rel {rel})");
    }

    #[test]
    fn fronto_parallel_focal_is_none_or_large() {
        let frame = project_a4(800.0, 0.0);
        if let Some(est) = estimate_focal_length(&a4_corners(), &frame, CX, CY) {
            assert!(est > 100.0, "fronto-parallel estimate: {est}");
        }
    }

    /// A 100 x 100 square seen through `[1, h2, 0; 0, 1, 0; 1e-3, 1e-3, 1]`.
    /// With the principal point at the origin, orthogonality of the
    /// back-projected columns gives `f^2 = -h2 / 1e-6`.
    fn skewed_square(h2: f32) -> ([Point2<f32>; 4], [Point2<f32>; 4]) {
        let h = Homography::new([1.0, h2, 0.0, 0.0, 1.0, 0.0, 1e-3, 1e-3, 1.0]);
        let paper = [
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(100.0, 100.0),
            Point2::new(0.0, 100.0),
        ];
        (paper, paper.map(|p| h.apply(p)))
    }

    #[test]
    fn implausibly_short_focal_is_rejected() {
        // f^2 = 5000: plausible, f ~ 70.7px
        let (paper, frame) = skewed_square(-5e-3);
        let f = estimate_focal_length(&paper, &frame, 0.0, 0.0).expect("f^2 above 100");
        assert!((f - 5000.0_f32.sqrt()).abs() < 1.0, "estimated {f}");

        // f^2 = 50
        let (paper, frame) = skewed_square(-5e-5);
        assert!(estimate_focal_length(&paper, &frame, 0.0, 0.0).is_none());

        // f^2 < 0
        let (paper, frame) = skewed_square(5e-3);
        assert!(estimate_focal_length(&paper, &frame, 0.0, 0.0).is_none());
    }

    #[test]
    fn focal_estimate_needs_four_points() {
        let paper = a4_corners();
        let frame = project_a4(800.0, 20.0);
        assert!(estimate_focal_length(&paper[..3], &frame[..3], CX, CY).is_none());
    }

    #[test]
    fn constrained_recovers_hidden_corner_without_tilt() {
        for hidden in 0..4 {
            let err = hold_out_error(800.0, 0.0, hidden)
                .unwrap_or_else(|| panic!("no solution for hidden={hidden} at 0 deg"));
            assert!(err < 2.0, "hidden={hidden}: error {err}px");
        }
    }

    #[test]
    fn constrained_recovers_hidden_corner_at_20_degrees() {
        for hidden in 0..4 {
            let err = hold_out_error(800.0, 20.0, hidden)
                .unwrap_or_else(|| panic!("no solution for hidden={hidden} at 20 deg"));
            assert!(err < 5.0, "hidden={hidden}: error {err}px");
        }
    }

    #[test]
    fn constrained_at_30_degrees_is_accurate_when_it_succeeds() {
        for hidden in 0..4 {
            if let Some(err) = hold_out_error(800.0, 30.0, hidden) {
                assert!(err < 10.0, "hidden={hidden}: error {err}px");
            }
        }
    }

    #[test]
    fn constrained_rejects_bad_input() {
        let paper = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(200.0, 0.0),
        ];
        let frame = [
            Point2::new(100.0_f32, 100.0),
            Point2::new(200.0, 100.0),
            Point2::new(300.0, 100.0),
        ];
        assert!(solve_constrained_homography(&paper, &frame, 800.0, CX, CY).is_none());

        let paper = a4_corners();
        let frame = project_a4(800.0, 10.0);
        assert!(solve_constrained_homography(&paper[..3], &frame[..3], 0.0, CX, CY).is_none());
        assert!(solve_constrained_homography(&paper, &frame, 800.0, CX, CY).is_none());
    }

    #[test]
    fn aspect_ratio_corrected_from_square_guess() {
        let f = 800.0;
        let frame = project_a4(f, 20.0);
        // Guess a square of the right width centered on the detection.
        let side = 400.0;
        let guess = [
            Point2::new(CX - side / 2.0, CY - side / 2.0),
            Point2::new(CX + side / 2.0, CY - side / 2.0),
            Point2::new(CX + side / 2.0, CY + side / 2.0),
            Point2::new(CX - side / 2.0, CY + side / 2.0),
        ];
        let ar = correct_aspect_ratio(&guess, &frame, f, CX, CY).expect("corrected ratio");
        let truth = 210.0 / 297.0;
        let err = (ar - truth).abs();
        assert!(err < 0.02, "corrected {ar}, expected {truth}");
    }

    #[test]
    fn aspect_ratio_rejects_degenerate_guess() {
        let frame = project_a4(800.0, 20.0);
        let flat = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        assert!(correct_aspect_ratio(&flat, &frame, 800.0, CX, CY).is_none());
    }
}
