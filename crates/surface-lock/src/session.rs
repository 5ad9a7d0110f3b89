//! One-stop per-frame pipeline bundling all trackers and their state.

use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use surface_lock_tracking::{
    Clock, MarkerResult, MonotonicClock, OverlayParams, OverlayReference, OverlayTransform,
    OverlayTransformCalculator, PaperQuad, PaperTrackState, PaperTracker, PaperTrackerParams,
    ParamsError, TrackingParams, TrackingState, TrackingStateManager, TrackingStatus,
};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("invalid parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("invalid focal length {0}")]
    FocalLength(f32),
    #[error("failed to read session config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse session config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Full session configuration; every section is optional in JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    pub overlay: OverlayParams,
    pub tracking: TrackingParams,
    pub paper: PaperTrackerParams,
    /// Run the paper-corner tracker alongside the overlay calculator.
    pub track_paper: bool,
    /// Known focal length in pixels of the analysed frame.
    pub focal_length: Option<f32>,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            overlay: OverlayParams::default(),
            tracking: TrackingParams::default(),
            paper: PaperTrackerParams::default(),
            track_paper: true,
            focal_length: None,
        }
    }
}

impl SessionParams {
    pub fn validate(&self) -> Result<(), SessionError> {
        self.overlay.validate()?;
        self.tracking.validate()?;
        self.paper.validate()?;
        if let Some(f) = self.focal_length {
            if !(f.is_finite() && f > 0.0) {
                return Err(SessionError::FocalLength(f));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, SessionError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Everything produced for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameOutput {
    pub status: TrackingStatus,
    /// Smoothed marker-center transform.
    pub transform: OverlayTransform,
    /// Smoothed paper outline, once the four corner markers have been seen.
    pub paper: Option<PaperQuad>,
    /// Frame size the outputs refer to; `0` until a size has been reported.
    pub frame_width: u32,
    pub frame_height: u32,
}

pub struct OverlaySession<C: Clock = MonotonicClock> {
    calculator: OverlayTransformCalculator,
    tracking: TrackingStateManager<C>,
    paper: Option<PaperTracker>,
    reference: OverlayReference,
    tracking_state: TrackingState,
    paper_state: PaperTrackState,
    previous: OverlayTransform,
    frame_size: Option<(u32, u32)>,
}

impl OverlaySession<MonotonicClock> {
    pub fn new(params: SessionParams) -> Result<Self, SessionError> {
        Self::with_clock(params, MonotonicClock::new())
    }
}

impl<C: Clock> OverlaySession<C> {
    pub fn with_clock(params: SessionParams, clock: C) -> Result<Self, SessionError> {
        params.validate()?;
        let paper = if params.track_paper {
            Some(PaperTracker::new(params.paper.clone())?)
        } else {
            None
        };
        let mut paper_state = PaperTrackState::default();
        if let Some(f) = params.focal_length {
            paper_state.set_focal_length(f);
        }
        Ok(Self {
            calculator: OverlayTransformCalculator::new(params.overlay.clone())?,
            tracking: TrackingStateManager::with_clock(params.tracking.clone(), clock)?,
            paper,
            reference: OverlayReference::default(),
            tracking_state: TrackingState::default(),
            paper_state,
            previous: OverlayTransform::IDENTITY,
            frame_size: None,
        })
    }

    /// Feed one frame of detections.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(markers = result.marker_count()))
    )]
    pub fn process(&mut self, result: &MarkerResult) -> FrameOutput {
        if result.frame_width > 0 && result.frame_height > 0 {
            let size = (result.frame_width, result.frame_height);
            if self.frame_size != Some(size) {
                info!("frame size {}x{}", size.0, size.1);
            }
            self.frame_size = Some(size);
        } else if self.frame_size.is_none() {
            debug!("frame size unknown; offsets are relative to the origin");
        }
        let (fw, fh) = self.frame_size.unwrap_or((0, 0));
        let (w, h) = (fw as f32, fh as f32);

        let status = self.tracking.on_marker_result(&mut self.tracking_state, result);
        let calc = &self.calculator;
        let transform = calc.compute_smoothed(&mut self.reference, result, w, h, &self.previous);
        self.previous = transform;

        let paper = self
            .paper
            .as_ref()
            .and_then(|tracker| tracker.update(&mut self.paper_state, result, w, h));

        FrameOutput {
            status,
            transform,
            paper,
            frame_width: fw,
            frame_height: fh,
        }
    }

    /// Provide a focal length (pixels of the analysed frame), e.g. from lens metadata.
    pub fn set_focal_length(&mut self, focal_length: f32) -> Result<(), SessionError> {
        if !(focal_length.is_finite() && focal_length > 0.0) {
            return Err(SessionError::FocalLength(focal_length));
        }
        self.paper_state.set_focal_length(focal_length);
        Ok(())
    }

    pub fn focal_length(&self) -> Option<f32> {
        self.paper_state.focal_length()
    }

    pub fn status(&self) -> TrackingStatus {
        self.tracking_state.status
    }

    pub fn previous_transform(&self) -> OverlayTransform {
        self.previous
    }

    /// Drop all latched references and return to `Inactive`. The frame size
    /// and a supplied focal length are kept.
    pub fn reset(&mut self) {
        info!("session reset");
        self.reference.reset();
        self.tracking_state.reset();
        self.paper_state.reset();
        self.previous = OverlayTransform::IDENTITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Point2;
    use std::cell::Cell;
    use surface_lock_tracking::DetectedMarker;

    fn pair(dx: f32) -> MarkerResult {
        MarkerResult::new(vec![
            DetectedMarker::new(0, Point2::new(640.0 - dx, 360.0)),
            DetectedMarker::new(1, Point2::new(640.0 + dx, 360.0)),
        ])
    }

    #[test]
    fn frame_size_falls_back_to_last_reported() {
        let now = Cell::new(0);
        let mut session =
            OverlaySession::with_clock(SessionParams::default(), || now.get()).expect("session");

        let out = session.process(&pair(100.0));
        assert_eq!((out.frame_width, out.frame_height), (0, 0));

        let out = session.process(&pair(100.0).with_frame_size(1280, 720));
        assert_eq!((out.frame_width, out.frame_height), (1280, 720));

        let out = session.process(&pair(100.0));
        assert_eq!((out.frame_width, out.frame_height), (1280, 720));
    }

    #[test]
    fn unit_smoothing_exposes_raw_transform() {
        let params = SessionParams {
            overlay: OverlayParams {
                smoothing_factor: 1.0,
            },
            ..SessionParams::default()
        };
        let now = Cell::new(0);
        let mut session = OverlaySession::with_clock(params, || now.get()).expect("session");
        session.process(&pair(100.0).with_frame_size(1280, 720));
        let out = session.process(&pair(200.0).with_frame_size(1280, 720));
        assert_eq!(out.status, TrackingStatus::Tracking);
        assert_abs_diff_eq!(out.transform.scale, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out.transform.offset_x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn reset_returns_to_inactive_and_relatches() {
        let now = Cell::new(0);
        let params = SessionParams {
            overlay: OverlayParams {
                smoothing_factor: 1.0,
            },
            ..SessionParams::default()
        };
        let mut session = OverlaySession::with_clock(params, || now.get()).expect("session");
        session.process(&pair(100.0).with_frame_size(1280, 720));
        session.reset();
        assert_eq!(session.status(), TrackingStatus::Inactive);
        assert_eq!(session.previous_transform(), OverlayTransform::IDENTITY);

        let out = session.process(&pair(200.0));
        assert_abs_diff_eq!(out.transform.scale, 1.0);
        assert_eq!(out.frame_width, 1280);
    }

    #[test]
    fn config_validation_and_json() {
        let params = SessionParams::from_json_str(r#"{"tracking": {"lost_timeout_ms": 250}}"#)
            .expect("partial config");
        assert_eq!(params.tracking.lost_timeout_ms, 250);
        assert!(params.track_paper);

        let err = SessionParams::from_json_str(r#"{"overlay": {"smoothing_factor": 2.0}}"#)
            .unwrap_err();
        assert!(matches!(err, SessionError::Params(_)), "{err}");

        let err = SessionParams::from_json_str(r#"{"focal_length": -3.0}"#).unwrap_err();
        assert!(matches!(err, SessionError::FocalLength(_)));

        assert!(matches!(
            SessionParams::from_json_str("{not json"),
            Err(SessionError::Json(_))
        ));
    }

    #[test]
    fn focal_length_is_validated() {
        let mut session = OverlaySession::new(SessionParams::default()).expect("session");
        assert!(session.set_focal_length(0.0).is_err());
        session.set_focal_length(930.7).expect("valid focal");
        assert_eq!(session.focal_length(), Some(930.7));
    }
}
