//! Row-major 3×3 matrices for drawing the overlay image into a view.
//!
//! The overlay image is assumed to be laid out to fill a `view_width ×
//! view_height` view; the camera frame is shown center-cropped to fill the
//! same view. All returned matrices map overlay view pixels to screen pixels.

use log::debug;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use surface_lock_core::{solve_homography, transform, Homography};
use surface_lock_tracking::{OverlayTransform, PaperQuad};

use crate::session::FrameOutput;

/// Size of the view the overlay is drawn into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.width / 2.0, self.height / 2.0)
    }

    fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// User adjustments on top of tracking (drag, pinch, twist).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualAdjustment {
    /// Screen-space offset in view pixels.
    pub offset: Vector2<f32>,
    pub scale: f32,
    /// Degrees.
    pub rotation: f32,
}

impl Default for ManualAdjustment {
    fn default() -> Self {
        Self {
            offset: Vector2::zeros(),
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

/// Scale factor that makes a `frame_width × frame_height` frame fill `view`.
pub fn fill_scale(frame_width: f32, frame_height: f32, view: &Viewport) -> Option<f32> {
    if !(frame_width > 0.0 && frame_height > 0.0 && view.is_valid()) {
        return None;
    }
    Some((view.width / frame_width).max(view.height / frame_height))
}

/// Frame pixels → view pixels for a center-cropped fill.
pub fn frame_to_view_matrix(
    frame_width: f32,
    frame_height: f32,
    view: &Viewport,
) -> Option<Homography> {
    let s = fill_scale(frame_width, frame_height, view)?;
    let ox = (view.width - frame_width * s) / 2.0;
    let oy = (view.height - frame_height * s) / 2.0;
    Some(transform::compose(&[transform::translate(ox, oy), transform::scale(s)]))
}

/// Offset / scale / rotation about the view center.
///
/// `view_scale` converts frame-pixel offsets into view pixels (see [`fill_scale`]).
pub fn affine_render_matrix(
    overlay: &OverlayTransform,
    adjust: &ManualAdjustment,
    view: &Viewport,
    view_scale: f32,
) -> Homography {
    let c = view.center();
    let tx = overlay.offset_x * view_scale + adjust.offset.x;
    let ty = overlay.offset_y * view_scale + adjust.offset.y;
    transform::compose(&[
        transform::translate(tx, ty),
        transform::translate(c.x, c.y),
        transform::rotate(overlay.rotation + adjust.rotation),
        transform::scale(overlay.scale * adjust.scale),
        transform::translate(-c.x, -c.y),
    ])
}

/// Largest rectangle with the paper's aspect ratio centered in `view`,
/// as `[TL, TR, BR, BL]`. A non-positive ratio uses the whole view.
pub fn fitted_paper_rect(aspect_ratio: f32, view: &Viewport) -> [Point2<f32>; 4] {
    let (w, h) = if aspect_ratio <= 0.0 || !aspect_ratio.is_finite() {
        (view.width, view.height)
    } else if aspect_ratio > view.width / view.height {
        (view.width, view.width / aspect_ratio)
    } else {
        (view.height * aspect_ratio, view.height)
    };
    let x = (view.width - w) / 2.0;
    let y = (view.height - h) / 2.0;
    [
        Point2::new(x, y),
        Point2::new(x + w, y),
        Point2::new(x + w, y + h),
        Point2::new(x, y + h),
    ]
}

/// Perspective mapping of the overlay onto the tracked paper.
///
/// Manual rotation and scale act in overlay space about the view center, so
/// the image turns within the sheet; the manual offset is applied on screen.
pub fn paper_render_matrix(
    quad: &PaperQuad,
    frame_to_view: &Homography,
    adjust: &ManualAdjustment,
    view: &Viewport,
) -> Option<Homography> {
    let src = fitted_paper_rect(quad.aspect_ratio, view);
    let dst = quad.corners.map(|p| frame_to_view.apply(p));
    let h = solve_homography(&src, &dst)?;

    let c = view.center();
    let in_paper = transform::compose(&[
        transform::translate(c.x, c.y),
        transform::rotate(adjust.rotation),
        transform::scale(adjust.scale),
        transform::translate(-c.x, -c.y),
    ]);
    Some(transform::compose(&[
        transform::translate(adjust.offset.x, adjust.offset.y),
        h,
        in_paper,
    ]))
}

/// Render matrix for one frame: the paper mapping when a quad is available and
/// `perspective` is enabled, the affine transform otherwise.
pub fn render_matrix(
    output: &FrameOutput,
    adjust: &ManualAdjustment,
    view: &Viewport,
    perspective: bool,
) -> Homography {
    let frame_w = output.frame_width as f32;
    let frame_h = output.frame_height as f32;
    let view_scale = fill_scale(frame_w, frame_h, view).unwrap_or(1.0);

    let f2v = frame_to_view_matrix(frame_w, frame_h, view);
    if perspective {
        if let (Some(quad), Some(f2v)) = (&output.paper, f2v) {
            match paper_render_matrix(quad, &f2v, adjust, view) {
                Some(m) => return m,
                None => debug!("paper mapping failed; using affine overlay"),
            }
        }
    }
    affine_render_matrix(&output.transform, adjust, view, view_scale)
}
