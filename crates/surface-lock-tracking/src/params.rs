//! Tunables for the per-frame consumers.
//!
//! Every struct deserializes from partial JSON (missing fields take their
//! defaults) and is checked with `validate()` before use.

use serde::{Deserialize, Serialize};

use crate::error::ParamsError;

fn check_smoothing(name: &'static str, value: f32) -> Result<(), ParamsError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ParamsError::SmoothingOutOfRange { name, value })
    }
}

/// Settings for [`crate::OverlayTransformCalculator`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayParams {
    /// Blend weight of the new target in `compute_smoothed`; `1.0` disables smoothing.
    pub smoothing_factor: f32,
}

impl Default for OverlayParams {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.3,
        }
    }
}

impl OverlayParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        check_smoothing("smoothing_factor", self.smoothing_factor)
    }
}

/// Settings for [`crate::TrackingStateManager`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingParams {
    /// How long markers may be absent before the status becomes `Lost`.
    pub lost_timeout_ms: i64,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            lost_timeout_ms: 500,
        }
    }
}

impl TrackingParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.lost_timeout_ms < 0 {
            return Err(ParamsError::Negative {
                name: "lost_timeout_ms",
                value: self.lost_timeout_ms,
            });
        }
        Ok(())
    }
}

/// Settings for [`crate::PaperTracker`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperTrackerParams {
    /// Per-frame blend weight for visible corners.
    pub smoothing_factor: f32,
    /// Max deviation from 1 of the opposite-edge ratios for the reference
    /// to count as seen head-on.
    pub rectangular_tolerance: f32,
}

impl Default for PaperTrackerParams {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.12,
            rectangular_tolerance: 0.08,
        }
    }
}

impl PaperTrackerParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        check_smoothing("smoothing_factor", self.smoothing_factor)?;
        if !(self.rectangular_tolerance.is_finite() && self.rectangular_tolerance >= 0.0) {
            return Err(ParamsError::InvalidTolerance {
                name: "rectangular_tolerance",
                value: self.rectangular_tolerance,
            });
        }
        Ok(())
    }
}
