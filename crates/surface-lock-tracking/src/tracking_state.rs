//! Marker visibility hysteresis: `Inactive → Tracking ⇄ Lost`.

use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ParamsError;
use crate::marker::MarkerResult;
use crate::params::TrackingParams;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingStatus {
    /// Markers have never been seen since the last reset.
    #[default]
    Inactive,
    Tracking,
    /// Markers were seen but have been absent for at least the timeout.
    Lost,
}

/// Monotonic millisecond time source.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

impl<F: Fn() -> i64> Clock for F {
    fn now_ms(&self) -> i64 {
        self()
    }
}

/// Milliseconds since the clock was created.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Caller-owned state for [`TrackingStateManager`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingState {
    pub status: TrackingStatus,
    pub last_tracking_ms: i64,
    pub has_ever_tracked: bool,
}

impl TrackingState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub struct TrackingStateManager<C: Clock = MonotonicClock> {
    params: TrackingParams,
    clock: C,
}

impl TrackingStateManager<MonotonicClock> {
    pub fn new(params: TrackingParams) -> Result<Self, ParamsError> {
        Self::with_clock(params, MonotonicClock::new())
    }
}

impl<C: Clock> TrackingStateManager<C> {
    pub fn with_clock(params: TrackingParams, clock: C) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self { params, clock })
    }

    pub fn params(&self) -> &TrackingParams {
        &self.params
    }

    /// Advance `state` with one frame's detections and return the new status.
    pub fn on_marker_result(
        &self,
        state: &mut TrackingState,
        result: &MarkerResult,
    ) -> TrackingStatus {
        let now = self.clock.now_ms();
        let before = state.status;

        if result.is_tracking() {
            state.last_tracking_ms = now;
            state.has_ever_tracked = true;
            state.status = TrackingStatus::Tracking;
        } else if state.has_ever_tracked {
            let elapsed = now.saturating_sub(state.last_tracking_ms);
            state.status = if elapsed >= self.params.lost_timeout_ms {
                TrackingStatus::Lost
            } else {
                TrackingStatus::Tracking
            };
        }

        if state.status != before {
            info!("tracking status {before:?} -> {:?}", state.status);
        }
        state.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::DetectedMarker;
    use nalgebra::Point2;
    use std::cell::Cell;

    fn seen() -> MarkerResult {
        MarkerResult::new(vec![DetectedMarker::new(0, Point2::new(10.0, 10.0))])
    }

    fn manager(now: &Cell<i64>) -> TrackingStateManager<impl Clock + '_> {
        TrackingStateManager::with_clock(TrackingParams::default(), move || now.get())
            .expect("params")
    }

    #[test]
    fn starts_inactive_and_stays_inactive_without_markers() {
        let now = Cell::new(0);
        let mgr = manager(&now);
        let mut state = TrackingState::default();
        assert_eq!(state.status, TrackingStatus::Inactive);
        now.set(10_000);
        let status = mgr.on_marker_result(&mut state, &MarkerResult::empty());
        assert_eq!(status, TrackingStatus::Inactive);
    }

    #[test]
    fn loses_after_timeout_and_recovers() {
        let now = Cell::new(1_000);
        let mgr = manager(&now);
        let mut state = TrackingState::default();
        let empty = MarkerResult::empty();

        let status = mgr.on_marker_result(&mut state, &seen());
        assert_eq!(status, TrackingStatus::Tracking);

        now.set(1_499);
        let status = mgr.on_marker_result(&mut state, &empty);
        assert_eq!(status, TrackingStatus::Tracking);

        now.set(1_500);
        let status = mgr.on_marker_result(&mut state, &empty);
        assert_eq!(status, TrackingStatus::Lost);

        now.set(1_600);
        let status = mgr.on_marker_result(&mut state, &seen());
        assert_eq!(status, TrackingStatus::Tracking);
        assert_eq!(state.last_tracking_ms, 1_600);
    }

    #[test]
    fn reset_returns_to_inactive() {
        let now = Cell::new(0);
        let mgr = manager(&now);
        let mut state = TrackingState::default();
        mgr.on_marker_result(&mut state, &seen());
        state.reset();
        assert_eq!(state, TrackingState::default());

        now.set(5_000);
        let status = mgr.on_marker_result(&mut state, &MarkerResult::empty());
        assert_eq!(status, TrackingStatus::Inactive);
    }

    #[test]
    fn zero_timeout_loses_immediately() {
        let now = Cell::new(0);
        let params = TrackingParams { lost_timeout_ms: 0 };
        let mgr = TrackingStateManager::with_clock(params, || now.get()).expect("params");
        let mut state = TrackingState::default();
        mgr.on_marker_result(&mut state, &seen());
        let status = mgr.on_marker_result(&mut state, &MarkerResult::empty());
        assert_eq!(status, TrackingStatus::Lost);
    }

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a && a >= 0);
    }

    #[test]
    fn extreme_clock_values_do_not_overflow() {
        let now = Cell::new(i64::MIN);
        let mgr = manager(&now);
        let mut state = TrackingState::default();
        mgr.on_marker_result(&mut state, &seen());

        now.set(i64::MAX);
        let status = mgr.on_marker_result(&mut state, &MarkerResult::empty());
        assert_eq!(status, TrackingStatus::Lost);

        mgr.on_marker_result(&mut state, &seen());
        now.set(i64::MIN);
        let status = mgr.on_marker_result(&mut state, &MarkerResult::empty());
        assert_eq!(status, TrackingStatus::Tracking);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        assert!(TrackingStateManager::new(TrackingParams { lost_timeout_ms: -5 }).is_err());
    }
}
