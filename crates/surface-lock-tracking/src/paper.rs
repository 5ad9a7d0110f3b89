//! Occlusion-tolerant tracking of a sheet of paper marked by four corner markers.
//!
//! Markers `0..=3` sit at the paper corners in `[TL, TR, BR, BL]` order, and
//! corner `i` of marker `i` is the physical paper corner. The first frame with
//! all four visible latches a reference. From then on visible corners are
//! smoothed and hidden ones are carried along by the motion of the visible ones:
//!
//! | visible | hidden corners follow                                  |
//! |---------|--------------------------------------------------------|
//! | 3       | focal-constrained homography, else 3-point affine delta |
//! | 2       | similarity delta                                       |
//! | 1       | translation delta                                      |
//! | 0       | nothing; last positions are held                       |

use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use surface_lock_core::{
    correct_aspect_ratio, estimate_focal_length, solve_affine, solve_constrained_homography,
    transform, Homography,
};

use crate::error::ParamsError;
use crate::marker::MarkerResult;
use crate::params::PaperTrackerParams;

/// Number of paper corners, and the ids of the markers that mark them.
pub const PAPER_CORNERS: usize = 4;

/// Smoothed paper outline in frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaperQuad {
    /// `[TL, TR, BR, BL]`.
    pub corners: [Point2<f32>; PAPER_CORNERS],
    /// Width / height of the physical sheet as far as it is known.
    pub aspect_ratio: f32,
}

#[derive(Clone, Debug, PartialEq)]
struct PaperReference {
    /// Corners observed when the reference latched.
    observed: [Point2<f32>; PAPER_CORNERS],
    /// Planar model of the sheet; a true rectangle once the focal length is known.
    paper: [Point2<f32>; PAPER_CORNERS],
    aspect_ratio: f32,
    /// Opposite edges were nearly equal, so `paper` approximates the real shape.
    rectangular: bool,
    smoothed: [Point2<f32>; PAPER_CORNERS],
    previous: Option<[Point2<f32>; PAPER_CORNERS]>,
}

impl PaperReference {
    fn quad(&self) -> PaperQuad {
        PaperQuad {
            corners: self.smoothed,
            aspect_ratio: self.aspect_ratio,
        }
    }
}

/// Caller-owned state for [`PaperTracker`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaperTrackState {
    reference: Option<PaperReference>,
    focal_length: Option<f32>,
    focal_is_external: bool,
    needs_rebuild: bool,
}

impl PaperTrackState {
    /// Use a known focal length (pixels of the analysed frame) instead of estimating one.
    pub fn set_focal_length(&mut self, focal_length: f32) {
        if focal_length.is_finite() && focal_length > 0.0 {
            self.focal_length = Some(focal_length);
            self.focal_is_external = true;
            self.needs_rebuild = true;
        }
    }

    pub fn focal_length(&self) -> Option<f32> {
        self.focal_length
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn is_reference_rectangular(&self) -> bool {
        self.reference.as_ref().is_some_and(|r| r.rectangular)
    }

    /// Current paper model `[TL, TR, BR, BL]` used for constrained estimation.
    pub fn paper_model(&self) -> Option<[Point2<f32>; PAPER_CORNERS]> {
        self.reference.as_ref().map(|r| r.paper)
    }

    /// Last output, if a reference exists.
    pub fn quad(&self) -> Option<PaperQuad> {
        self.reference.as_ref().map(PaperReference::quad)
    }

    /// Forget the reference and any estimated focal length. A focal length
    /// supplied through [`set_focal_length`](Self::set_focal_length) survives.
    pub fn reset(&mut self) {
        self.reference = None;
        if !self.focal_is_external {
            self.focal_length = None;
        }
        self.needs_rebuild = self.focal_length.is_some();
    }
}

fn dist(a: Point2<f32>, b: Point2<f32>) -> f32 {
    (b - a).norm()
}

fn lerp_point(from: Point2<f32>, to: Point2<f32>, t: f32) -> Point2<f32> {
    from + (to - from) * t
}

/// Mean of the horizontal and vertical edge lengths of `[TL, TR, BR, BL]`.
fn mean_edges(c: &[Point2<f32>; PAPER_CORNERS]) -> (f32, f32) {
    let w = (dist(c[0], c[1]) + dist(c[3], c[2])) / 2.0;
    let h = (dist(c[0], c[3]) + dist(c[1], c[2])) / 2.0;
    (w, h)
}

fn is_rectangular(c: &[Point2<f32>; PAPER_CORNERS], tolerance: f32) -> bool {
    let ratio = |a: f32, b: f32| if b > 0.1 { a / b } else { 1.0 };
    let horizontal = ratio(dist(c[0], c[1]), dist(c[3], c[2]));
    let vertical = ratio(dist(c[0], c[3]), dist(c[1], c[2]));
    (horizontal - 1.0).abs() < tolerance && (vertical - 1.0).abs() < tolerance
}

fn centered_rect(center: Point2<f32>, w: f32, h: f32) -> [Point2<f32>; PAPER_CORNERS] {
    [
        Point2::new(center.x - w / 2.0, center.y - h / 2.0),
        Point2::new(center.x + w / 2.0, center.y - h / 2.0),
        Point2::new(center.x + w / 2.0, center.y + h / 2.0),
        Point2::new(center.x - w / 2.0, center.y + h / 2.0),
    ]
}

/// Rotation + uniform scale + translation taking segment `(r0, r1)` onto `(c0, c1)`.
fn similarity_from_pairs(
    r0: Point2<f32>,
    r1: Point2<f32>,
    c0: Point2<f32>,
    c1: Point2<f32>,
) -> Option<Homography> {
    let rd = r1 - r0;
    let cd = c1 - c0;
    let ref_len = rd.norm();
    if ref_len < 0.001 {
        return None;
    }
    let s = cd.norm() / ref_len;
    let angle = cd.y.atan2(cd.x) - rd.y.atan2(rd.x);
    let (sin_a, cos_a) = angle.sin_cos();

    let ref_mid = nalgebra::center(&r0, &r1);
    let cur_mid = nalgebra::center(&c0, &c1);
    let tx = cur_mid.x - s * (cos_a * ref_mid.x - sin_a * ref_mid.y);
    let ty = cur_mid.y - s * (sin_a * ref_mid.x + cos_a * ref_mid.y);

    Some(Homography::new([
        s * cos_a,
        -s * sin_a,
        tx,
        s * sin_a,
        s * cos_a,
        ty,
        0.0,
        0.0,
        1.0,
    ]))
}

/// Per-frame driver; all mutable state lives in [`PaperTrackState`].
#[derive(Clone, Debug, Default)]
pub struct PaperTracker {
    params: PaperTrackerParams,
}

impl PaperTracker {
    pub fn new(params: PaperTrackerParams) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &PaperTrackerParams {
        &self.params
    }

    /// Update `state` with one frame and return the smoothed paper outline.
    ///
    /// `None` until a frame with all four corner markers latches the reference.
    /// Frames without any markers return the previous outline unchanged.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(markers = result.marker_count()))
    )]
    pub fn update(
        &self,
        state: &mut PaperTrackState,
        result: &MarkerResult,
        frame_width: f32,
        frame_height: f32,
    ) -> Option<PaperQuad> {
        if !result.is_tracking() {
            return state.quad();
        }

        let detected = outer_corners(result);
        let visible: Vec<usize> = (0..PAPER_CORNERS)
            .filter(|&i| detected[i].is_some())
            .collect();

        if state.reference.is_none() {
            let all: Option<Vec<Point2<f32>>> = detected.iter().copied().collect();
            let corners: [Point2<f32>; PAPER_CORNERS] = all?.try_into().ok()?;
            state.reference = Some(self.latch_reference(corners));
            state.needs_rebuild = state.focal_length.is_some();
        }

        if state.focal_length.is_none() && visible.len() == PAPER_CORNERS {
            self.try_estimate_focal(state, &detected, frame_width, frame_height);
        }
        if state.needs_rebuild && frame_width > 0.0 && frame_height > 0.0 {
            rebuild_paper_model(state, frame_width, frame_height);
        }

        let focal = state.focal_length;
        let reference = state.reference.as_mut()?;
        let alpha = self.params.smoothing_factor.min(1.0);
        let previous = reference.previous.unwrap_or(reference.smoothed);

        for &i in &visible {
            if let Some(corner) = detected[i] {
                reference.smoothed[i] = lerp_point(reference.smoothed[i], corner, alpha);
            }
        }

        if !visible.is_empty() && visible.len() < PAPER_CORNERS {
            let has_size = frame_width > 0.0 && frame_height > 0.0;
            let principal = has_size.then_some((frame_width / 2.0, frame_height / 2.0));
            let estimated = estimate_hidden(reference, &previous, &visible, focal, principal);
            if let Some(corners) = estimated {
                reference.smoothed = corners;
            }
        }

        reference.previous = Some(reference.smoothed);
        Some(reference.quad())
    }

    fn latch_reference(&self, corners: [Point2<f32>; PAPER_CORNERS]) -> PaperReference {
        let (w, h) = mean_edges(&corners);
        let aspect_ratio = if h > 0.001 { w / h } else { 1.0 };
        let rectangular = is_rectangular(&corners, self.params.rectangular_tolerance);
        info!("paper reference latched: aspect={aspect_ratio:.3} rectangular={rectangular}");
        PaperReference {
            observed: corners,
            paper: corners,
            aspect_ratio,
            rectangular,
            smoothed: corners,
            previous: None,
        }
    }

    fn try_estimate_focal(
        &self,
        state: &mut PaperTrackState,
        detected: &[Option<Point2<f32>>; PAPER_CORNERS],
        frame_width: f32,
        frame_height: f32,
    ) {
        let Some(reference) = state.reference.as_ref().filter(|r| r.rectangular) else {
            return;
        };
        let Some(frame): Option<Vec<Point2<f32>>> = detected.iter().copied().collect() else {
            return;
        };
        let (cx, cy) = (frame_width / 2.0, frame_height / 2.0);
        if let Some(f) = estimate_focal_length(&reference.paper, &frame, cx, cy) {
            info!("focal length estimated from paper: {f:.1}px");
            state.focal_length = Some(f);
            state.needs_rebuild = true;
        }
    }
}

fn outer_corners(result: &MarkerResult) -> [Option<Point2<f32>>; PAPER_CORNERS] {
    std::array::from_fn(|i| result.marker(i as i32).and_then(|m| m.corner(i)))
}

/// Replace the observed reference shape with a true rectangle using the focal length.
fn rebuild_paper_model(state: &mut PaperTrackState, frame_width: f32, frame_height: f32) {
    state.needs_rebuild = false;
    let (Some(f), Some(reference)) = (state.focal_length, state.reference.as_mut()) else {
        return;
    };

    let observed = reference.observed;
    let (w, h) = mean_edges(&observed);
    if w < 1.0 || h < 1.0 {
        return;
    }
    let sum: nalgebra::Vector2<f32> = observed.iter().map(|p| p.coords).sum();
    let center = Point2::from(sum / 4.0);
    let edge_rect = centered_rect(center, w, h);
    let (cx, cy) = (frame_width / 2.0, frame_height / 2.0);

    match correct_aspect_ratio(&edge_rect, &observed, f, cx, cy) {
        Some(ar) => {
            reference.paper = centered_rect(center, w, w / ar);
            reference.aspect_ratio = ar;
            info!("paper model rebuilt with f={f:.1}px: aspect={ar:.3}");
        }
        None => debug!("paper model kept: aspect correction failed"),
    }
}

/// Positions for all corners with the hidden ones carried along; `None` when
/// any hidden corner could not be placed.
fn estimate_hidden(
    reference: &PaperReference,
    previous: &[Point2<f32>; PAPER_CORNERS],
    visible: &[usize],
    focal: Option<f32>,
    principal: Option<(f32, f32)>,
) -> Option<[Point2<f32>; PAPER_CORNERS]> {
    let current = &reference.smoothed;
    let hidden: Vec<usize> = (0..PAPER_CORNERS)
        .filter(|i| !visible.contains(i))
        .collect();

    let place = |h: &Homography, from: &[Point2<f32>; PAPER_CORNERS]| {
        let mut out = *current;
        for &i in &hidden {
            out[i] = h.try_apply(from[i])?;
        }
        Some(out)
    };

    match visible {
        [a, b, c] => {
            if let (Some(f), Some((cx, cy))) = (focal, principal) {
                let paper = &reference.paper;
                let paper3 = [paper[*a], paper[*b], paper[*c]];
                let frame3 = [current[*a], current[*b], current[*c]];
                let solved = solve_constrained_homography(&paper3, &frame3, f, cx, cy);
                if let Some(out) = solved.and_then(|h| place(&h, paper)) {
                    return Some(out);
                }
                debug!("constrained estimate failed; falling back to affine delta");
            }
            let src = [previous[*a], previous[*b], previous[*c]];
            let dst = [current[*a], current[*b], current[*c]];
            let affine = solve_affine(&src, &dst)?;
            place(&affine, previous)
        }
        [a, b] => {
            let sim = similarity_from_pairs(previous[*a], previous[*b], current[*a], current[*b])?;
            place(&sim, previous)
        }
        [a] => {
            let d = current[*a] - previous[*a];
            place(&transform::translate(d.x, d.y), previous)
        }
        _ => None,
    }
}
