// src/analysis/lane_tracker.rs
//
// Lane position tracking on top of raw per-frame boundary estimates.
//
// Three small state machines live here:
//
//   LaneTracker           per-side exponential smoothing with persistence,
//                         so a dashed marking gap or a passing truck does not
//                         drop the lane lock immediately
//   LaneChangeDetector    edge-trigger on the smoothed lane center jumping
//                         by more than a pixel threshold (whole-lane change)
//   LaneDepartureMonitor  edge-trigger on the ego column crossing a boundary
//                         (drifting over a line without finishing a change)
//
// The two detectors are independent; callers pick the semantics they need.

use crate::analysis::boundary_estimator::RawBoundaries;
use crate::types::{LaneChangeDirection, LaneConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// PER-SIDE ESTIMATE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SideEstimate {
    x: Option<f32>,
    /// Frames since the last direct observation
    age: u32,
}

impl SideEstimate {
    fn update(&mut self, detection: Option<f32>, alpha: f32, horizon: u32) {
        match detection {
            Some(d) => {
                self.x = Some(match self.x {
                    Some(prev) => alpha * d + (1.0 - alpha) * prev,
                    None => d,
                });
                self.age = 0;
            }
            None => {
                self.age = self.age.saturating_add(1);
                if self.age > horizon {
                    self.x = None;
                }
            }
        }
    }
}

// ============================================================================
// LANE TRACKER
// ============================================================================

/// Snapshot of both sides after a frame update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LaneTrackerState {
    pub left_x: Option<f32>,
    pub right_x: Option<f32>,
    pub left_age: u32,
    pub right_age: u32,
}

impl LaneTrackerState {
    /// Midpoint of the two boundaries, only when both are known.
    pub fn center(&self) -> Option<f32> {
        match (self.left_x, self.right_x) {
            (Some(l), Some(r)) => Some((l + r) * 0.5),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaneTracker {
    left: SideEstimate,
    right: SideEstimate,
    alpha: f32,
    persistence_frames: u32,
    confident_age: u32,
}

impl LaneTracker {
    pub fn new(config: &LaneConfig) -> Self {
        Self {
            left: SideEstimate::default(),
            right: SideEstimate::default(),
            alpha: config.smooth_alpha,
            persistence_frames: config.persistence_frames,
            confident_age: config.confident_age,
        }
    }

    pub fn update(&mut self, raw: RawBoundaries) -> LaneTrackerState {
        self.left.update(raw.left, self.alpha, self.persistence_frames);
        self.right.update(raw.right, self.alpha, self.persistence_frames);
        self.state()
    }

    pub fn state(&self) -> LaneTrackerState {
        LaneTrackerState {
            left_x: self.left.x,
            right_x: self.right.x,
            left_age: self.left.age,
            right_age: self.right.age,
        }
    }

    /// Visualization hint only; lane-change decisions ignore it.
    pub fn left_confident(&self) -> bool {
        self.left.x.is_some() && self.left.age < self.confident_age
    }

    pub fn right_confident(&self) -> bool {
        self.right.x.is_some() && self.right.age < self.confident_age
    }
}

// ============================================================================
// LANE CHANGE (center shift)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LaneChangeEvent {
    pub frame_index: u64,
    pub direction: LaneChangeDirection,
    pub shift_px: f32,
    pub center_x: f32,
}

#[derive(Debug, Clone)]
pub struct LaneChangeDetector {
    threshold_px: f32,
    prev_center: Option<f32>,
}

impl LaneChangeDetector {
    pub fn new(threshold_px: f32) -> Self {
        Self {
            threshold_px,
            prev_center: None,
        }
    }

    /// Compare `center` with the previous known center. Frames without a
    /// center leave the reference untouched.
    pub fn update(&mut self, frame_index: u64, center: Option<f32>) -> Option<LaneChangeEvent> {
        let cur = center?;
        let Some(prev) = self.prev_center.replace(cur) else {
            return None;
        };

        let shift = cur - prev;
        if shift.abs() <= self.threshold_px {
            return None;
        }

        let direction = LaneChangeDirection::from_center_shift(shift);
        debug!(
            "🔀 Lane change {} at frame {}: center {:.1} → {:.1} ({:+.1}px)",
            direction.as_str(),
            frame_index,
            prev,
            cur,
            shift
        );
        Some(LaneChangeEvent {
            frame_index,
            direction,
            shift_px: shift,
            center_x: cur,
        })
    }

    pub fn prev_center(&self) -> Option<f32> {
        self.prev_center
    }
}

// ============================================================================
// LANE DEPARTURE (boundary crossing)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartureSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartureState {
    #[default]
    Normal,
    CrossingLeft,
    CrossingRight,
}

#[derive(Debug, Clone, Default)]
pub struct LaneDepartureMonitor {
    state: DepartureState,
}

impl LaneDepartureMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the side only on the frame the crossing starts.
    pub fn update(
        &mut self,
        vehicle_x: f32,
        left_x: Option<f32>,
        right_x: Option<f32>,
    ) -> Option<DepartureSide> {
        let (Some(left), Some(right)) = (left_x, right_x) else {
            return None;
        };

        let (next, side) = if vehicle_x <= left {
            (DepartureState::CrossingLeft, DepartureSide::Left)
        } else if vehicle_x >= right {
            (DepartureState::CrossingRight, DepartureSide::Right)
        } else {
            self.state = DepartureState::Normal;
            return None;
        };

        let entered = self.state != next;
        self.state = next;
        entered.then_some(side)
    }

    pub fn state(&self) -> DepartureState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both(l: f32, r: f32) -> RawBoundaries {
        RawBoundaries {
            left: Some(l),
            right: Some(r),
        }
    }

    fn left_only(l: Option<f32>) -> RawBoundaries {
        RawBoundaries {
            left: l,
            right: None,
        }
    }

    #[test]
    fn test_first_detection_is_taken_verbatim() {
        let mut t = LaneTracker::new(&LaneConfig::default());
        let s = t.update(both(100.0, 300.0));
        assert_eq!(s.left_x, Some(100.0));
        assert_eq!(s.right_x, Some(300.0));
        assert_eq!(s.center(), Some(200.0));
    }

    #[test]
    fn test_exponential_smoothing() {
        let mut t = LaneTracker::new(&LaneConfig::default());
        t.update(both(100.0, 300.0));
        let s = t.update(both(200.0, 300.0));
        // 0.9 * 200 + 0.1 * 100
        assert!((s.left_x.unwrap() - 190.0).abs() < 1e-3);
    }

    #[test]
    fn test_persistence_boundary() {
        let mut t = LaneTracker::new(&LaneConfig::default());
        t.update(left_only(Some(120.0)));
        for _ in 0..15 {
            t.update(left_only(None));
        }
        let s = t.state();
        assert_eq!(s.left_age, 15);
        assert_eq!(s.left_x, Some(120.0), "age == horizon is still present");

        let s = t.update(left_only(None));
        assert_eq!(s.left_age, 16);
        assert_eq!(s.left_x, None, "age == horizon + 1 is cleared");
    }

    #[test]
    fn test_gap_bridged_and_age_reset_on_detection() {
        let mut t = LaneTracker::new(&LaneConfig::default());
        for _ in 0..=5 {
            t.update(left_only(Some(120.0)));
        }
        for frame in 6..=19 {
            let s = t.update(left_only(None));
            assert!(s.left_x.is_some(), "lost lock at frame {frame}");
        }
        let s = t.update(left_only(Some(130.0)));
        assert_eq!(s.left_age, 0);
        assert!((s.left_x.unwrap() - 129.0).abs() < 1e-3);
    }

    #[test]
    fn test_confidence_is_age_gated() {
        let mut t = LaneTracker::new(&LaneConfig::default());
        t.update(left_only(Some(120.0)));
        assert!(t.left_confident());
        assert!(!t.right_confident());
        for _ in 0..4 {
            t.update(left_only(None));
        }
        assert!(t.left_confident());
        t.update(left_only(None));
        assert!(!t.left_confident());
        assert!(t.state().left_x.is_some());
    }

    #[test]
    fn test_center_shift_right_is_to_right() {
        let mut d = LaneChangeDetector::new(40.0);
        assert!(d.update(0, Some(200.0)).is_none(), "first center only seeds");
        let event = d.update(1, Some(250.0)).unwrap();
        assert_eq!(event.direction, LaneChangeDirection::ToRight);
        assert_eq!(event.shift_px, 50.0);
    }

    #[test]
    fn test_center_shift_left_is_to_left() {
        let mut d = LaneChangeDetector::new(40.0);
        d.update(0, Some(250.0));
        let event = d.update(1, Some(200.0)).unwrap();
        assert_eq!(event.direction, LaneChangeDirection::ToLeft);
    }

    #[test]
    fn test_small_shift_ignored() {
        let mut d = LaneChangeDetector::new(40.0);
        d.update(0, Some(200.0));
        assert!(d.update(1, Some(220.0)).is_none());
        // Reference moved to 220, so 220 → 250 is still below threshold.
        assert!(d.update(2, Some(250.0)).is_none());
        assert_eq!(d.prev_center(), Some(250.0));
    }

    #[test]
    fn test_missing_center_keeps_reference() {
        let mut d = LaneChangeDetector::new(40.0);
        d.update(0, Some(200.0));
        assert!(d.update(1, None).is_none());
        assert!(d.update(2, Some(260.0)).is_some());
    }

    #[test]
    fn test_departure_is_edge_triggered() {
        let mut m = LaneDepartureMonitor::new();
        assert_eq!(m.update(320.0, Some(200.0), Some(440.0)), None);

        let events: Vec<_> = (0..10)
            .filter_map(|_| m.update(190.0, Some(200.0), Some(440.0)))
            .collect();
        assert_eq!(events, vec![DepartureSide::Left]);
        assert_eq!(m.state(), DepartureState::CrossingLeft);

        // Back to normal, then a right-side crossing.
        assert_eq!(m.update(320.0, Some(200.0), Some(440.0)), None);
        assert_eq!(m.state(), DepartureState::Normal);
        assert_eq!(
            m.update(440.0, Some(200.0), Some(440.0)),
            Some(DepartureSide::Right)
        );
    }

    #[test]
    fn test_departure_holds_state_without_both_boundaries() {
        let mut m = LaneDepartureMonitor::new();
        assert_eq!(
            m.update(190.0, Some(200.0), Some(440.0)),
            Some(DepartureSide::Left)
        );
        assert_eq!(m.update(320.0, None, Some(440.0)), None);
        assert_eq!(m.state(), DepartureState::CrossingLeft);
        // Still crossing once both return: no new event.
        assert_eq!(m.update(195.0, Some(200.0), Some(440.0)), None);
    }
}
