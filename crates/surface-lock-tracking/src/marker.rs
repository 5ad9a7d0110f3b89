//! Detector boundary: per-frame fiducial marker observations.
//!
//! Marker detection itself happens outside this workspace; anything that can
//! turn a frame buffer into a [`MarkerResult`] plugs in via [`MarkerDetector`].

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One fiducial marker found in a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: i32,
    /// Marker center in frame pixels.
    pub center: Point2<f32>,
    /// The 4 marker corners in detector order, or empty when unavailable.
    #[serde(default)]
    pub corners: Vec<Point2<f32>>,
    /// Detector confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f32,
}

impl DetectedMarker {
    pub fn new(id: i32, center: Point2<f32>) -> Self {
        Self {
            id,
            center,
            corners: Vec::new(),
            confidence: 1.0,
        }
    }

    pub fn with_corners(mut self, corners: [Point2<f32>; 4]) -> Self {
        self.corners = corners.to_vec();
        self
    }

    /// Corner `index` if the detector reported a full quad.
    pub fn corner(&self, index: usize) -> Option<Point2<f32>> {
        if self.corners.len() < 4 {
            return None;
        }
        self.corners.get(index).copied()
    }
}

/// All markers found in one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerResult {
    #[serde(default)]
    pub markers: Vec<DetectedMarker>,
    #[serde(default)]
    pub detection_time_ms: i64,
    /// Frame size in pixels; `0` when the detector did not report it.
    #[serde(default)]
    pub frame_width: u32,
    #[serde(default)]
    pub frame_height: u32,
}

impl MarkerResult {
    pub fn new(markers: Vec<DetectedMarker>) -> Self {
        Self {
            markers,
            ..Self::default()
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }

    /// A frame with no markers.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        !self.markers.is_empty()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker(&self, id: i32) -> Option<&DetectedMarker> {
        self.markers.iter().find(|m| m.id == id)
    }
}

/// Source of per-frame marker detections.
///
/// `frame` holds `height` rows of `row_stride` bytes; `rotation_degrees` is
/// the clockwise rotation needed to bring the buffer upright.
pub trait MarkerDetector {
    fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        row_stride: u32,
        rotation_degrees: i32,
    ) -> MarkerResult;
}

impl<D: MarkerDetector + ?Sized> MarkerDetector for Box<D> {
    fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        row_stride: u32,
        rotation_degrees: i32,
    ) -> MarkerResult {
        (**self).detect(frame, width, height, row_stride, rotation_degrees)
    }
}
