//! Per-frame consumers of fiducial marker detections.
//!
//! Each frame's [`MarkerResult`] feeds three independent components:
//!
//! - [`OverlayTransformCalculator`] turns marker centers into an offset /
//!   scale / rotation relative to the first multi-marker frame,
//! - [`TrackingStateManager`] applies visibility hysteresis
//!   (`Inactive → Tracking ⇄ Lost`),
//! - [`PaperTracker`] follows the four corners of a sheet through partial
//!   occlusion.
//!
//! The components themselves are immutable; everything that evolves across
//! frames lives in caller-owned state structs ([`OverlayReference`],
//! [`TrackingState`], [`PaperTrackState`]).

mod error;
pub mod marker;
pub mod overlay;
pub mod paper;
mod params;
pub mod tracking_state;

pub use error::ParamsError;
pub use marker::{DetectedMarker, MarkerDetector, MarkerResult};
pub use overlay::{OverlayReference, OverlayTransform, OverlayTransformCalculator};
pub use paper::{PaperQuad, PaperTrackState, PaperTracker, PAPER_CORNERS};
pub use params::{OverlayParams, PaperTrackerParams, TrackingParams};
pub use tracking_state::{
    Clock, MonotonicClock, TrackingState, TrackingStateManager, TrackingStatus,
};
