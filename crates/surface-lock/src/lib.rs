//! High-level facade for the `surface-lock-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of the geometry core and the per-frame trackers,
//! - [`OverlaySession`], which runs the overlay calculator, visibility
//!   hysteresis and paper tracker on each [`MarkerResult`],
//! - [`render`], which turns a frame's output into a row-major 3×3 matrix for
//!   drawing the overlay image.
//!
//! ## Quickstart
//!
//! ```no_run
//! use surface_lock::{MarkerResult, OverlaySession, SessionParams};
//! use surface_lock::render::{render_matrix, ManualAdjustment, Viewport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = OverlaySession::new(SessionParams::default())?;
//! let view = Viewport::new(1080.0, 1920.0);
//!
//! // One detector result per camera frame.
//! let result = MarkerResult::empty().with_frame_size(1280, 720);
//! let out = session.process(&result);
//! let matrix = render_matrix(&out, &ManualAdjustment::default(), &view, true);
//! println!("{:?} {:?}", out.status, matrix.values());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `surface_lock::core`: linear solving, transforms, homographies, focal-length calibration.
//! - `surface_lock::tracking`: marker types, overlay calculator, tracking state, paper tracker.
//! - `surface_lock::session`: the per-frame pipeline.
//! - `surface_lock::render`: renderer matrices.

pub use surface_lock_core as core;
pub use surface_lock_tracking as tracking;

pub mod render;
pub mod session;

pub use session::{FrameOutput, OverlaySession, SessionError, SessionParams};
pub use surface_lock_core::{focal_length_pixels, Homography};
pub use surface_lock_tracking::{
    DetectedMarker, MarkerDetector, MarkerResult, OverlayTransform, PaperQuad, TrackingStatus,
};

/// Install a `tracing` subscriber that also captures `log` records.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    // Another logger may already be installed when several tools share a process.
    let _ = tracing_log::LogTracer::init();
    surface_lock_core::init_tracing(json);
}
