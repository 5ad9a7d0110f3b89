//! Offset / scale / rotation alignment from marker centers.
//!
//! The first frame with at least two markers fixes the reference spacing and
//! bearing; later frames are expressed relative to it. The reference lives in
//! a caller-owned [`OverlayReference`] so one calculator can serve several
//! overlays.

use log::info;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::ParamsError;
use crate::marker::{DetectedMarker, MarkerResult};
use crate::params::OverlayParams;

/// Below this reference spacing the scale is pinned to 1.
const MIN_REFERENCE_SPACING: f32 = 0.001;

/// Overlay placement relative to the frame center.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayTransform {
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale: f32,
    /// Degrees, counter-clockwise in image coordinates.
    pub rotation: f32,
}

impl OverlayTransform {
    pub const IDENTITY: OverlayTransform = OverlayTransform {
        offset_x: 0.0,
        offset_y: 0.0,
        scale: 1.0,
        rotation: 0.0,
    };

    /// Component-wise blend; `t = 0` keeps `self`, `t = 1` yields `target`.
    pub fn lerp(&self, target: &OverlayTransform, t: f32) -> OverlayTransform {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        OverlayTransform {
            offset_x: mix(self.offset_x, target.offset_x),
            offset_y: mix(self.offset_y, target.offset_y),
            scale: mix(self.scale, target.scale),
            rotation: mix(self.rotation, target.rotation),
        }
    }
}

impl Default for OverlayTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Baselines latched on the first multi-marker frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayReference {
    pub reference_spacing: Option<f32>,
    /// Degrees.
    pub reference_bearing: Option<f32>,
}

impl OverlayReference {
    pub fn is_latched(&self) -> bool {
        self.reference_spacing.is_some()
    }

    pub fn reset(&mut self) {
        self.reference_spacing = None;
        self.reference_bearing = None;
    }
}

/// Largest center-to-center distance over all marker pairs.
fn max_pairwise_spacing(markers: &[DetectedMarker]) -> f32 {
    let mut best = 0.0_f32;
    for (i, a) in markers.iter().enumerate() {
        for b in &markers[i + 1..] {
            best = best.max((b.center - a.center).norm());
        }
    }
    best
}

/// Bearing in degrees from the lowest-id center to the second-lowest-id center.
fn bearing_degrees(markers: &[DetectedMarker]) -> Option<f32> {
    let mut by_id: Vec<&DetectedMarker> = markers.iter().collect();
    by_id.sort_by_key(|m| m.id);
    let (a, b) = (by_id.first()?, by_id.get(1)?);
    let d = b.center - a.center;
    Some((d.y as f64).atan2(d.x as f64).to_degrees() as f32)
}

fn centroid(markers: &[DetectedMarker]) -> Point2<f32> {
    let n = markers.len() as f32;
    let sum = markers
        .iter()
        .fold(nalgebra::Vector2::zeros(), |acc, m| acc + m.center.coords);
    Point2::from(sum / n)
}

/// Stateless calculator; reference state is passed in explicitly.
#[derive(Clone, Debug, Default)]
pub struct OverlayTransformCalculator {
    params: OverlayParams,
}

impl OverlayTransformCalculator {
    pub fn new(params: OverlayParams) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &OverlayParams {
        &self.params
    }

    /// Raw transform for one frame.
    ///
    /// Returns [`OverlayTransform::IDENTITY`] when no markers are visible. A
    /// single marker only contributes an offset.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(markers = result.marker_count()))
    )]
    pub fn compute(
        &self,
        reference: &mut OverlayReference,
        result: &MarkerResult,
        frame_width: f32,
        frame_height: f32,
    ) -> OverlayTransform {
        let markers = &result.markers;
        if markers.is_empty() {
            return OverlayTransform::IDENTITY;
        }

        let center = centroid(markers);
        let offset_x = center.x - frame_width / 2.0;
        let offset_y = center.y - frame_height / 2.0;

        if markers.len() < 2 {
            return OverlayTransform {
                offset_x,
                offset_y,
                scale: 1.0,
                rotation: 0.0,
            };
        }

        let spacing = max_pairwise_spacing(markers);
        let bearing = bearing_degrees(markers).unwrap_or(0.0);

        if !reference.is_latched() {
            info!(
                "overlay reference latched: spacing={spacing:.2} bearing={bearing:.2} ({} markers)",
                markers.len()
            );
        }
        let ref_spacing = *reference.reference_spacing.get_or_insert(spacing);
        let ref_bearing = *reference.reference_bearing.get_or_insert(bearing);

        let scale = if ref_spacing > MIN_REFERENCE_SPACING {
            spacing / ref_spacing
        } else {
            1.0
        };

        OverlayTransform {
            offset_x,
            offset_y,
            scale,
            rotation: bearing - ref_bearing,
        }
    }

    /// [`compute`](Self::compute), blended from `previous` by the smoothing factor.
    pub fn compute_smoothed(
        &self,
        reference: &mut OverlayReference,
        result: &MarkerResult,
        frame_width: f32,
        frame_height: f32,
        previous: &OverlayTransform,
    ) -> OverlayTransform {
        let target = self.compute(reference, result, frame_width, frame_height);
        let alpha = self.params.smoothing_factor;
        if alpha >= 1.0 {
            return target;
        }
        previous.lerp(&target, alpha)
    }
}
