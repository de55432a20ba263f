// src/analysis/threat_tracker.rs
//
// Emergency-braking threat detection for vehicles in the ego lane.
//
// Each tracked vehicle keeps a short ring of (frame_index, forward distance)
// samples. Once enough samples exist, the distance lost over the last few
// samples is the closing velocity. A fast approach raises a warning, which is
// debounced per track by a cooldown so one sustained closing event fires once
// per cooldown window instead of every frame.
//
// Track IDs are volatile: any ID missing from a frame is forgotten together
// with its cooldown, so a re-used numeric ID starts from scratch.
//
// Also here: the sudden-stop latch that keeps a fired warning visible across
// the gaps between sampled frames, and the tailgating counter.

use crate::types::{ClassConfig, ProjectedObject, ThreatConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

// ============================================================================
// HISTORY RING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    pub frame_index: u64,
    pub distance_forward_m: f32,
}

/// Fixed-capacity, frame-ordered distance history for one track.
#[derive(Debug, Clone)]
pub struct ThreatHistory {
    samples: VecDeque<DistanceSample>,
    window_frames: u64,
}

impl ThreatHistory {
    pub fn new(window_frames: u64) -> Self {
        Self {
            samples: VecDeque::with_capacity(window_frames as usize + 1),
            window_frames,
        }
    }

    /// Appends a sample and ages out everything more than `window_frames`
    /// older than it. Out-of-order samples are rejected.
    pub fn push(&mut self, frame_index: u64, distance_forward_m: f32) -> bool {
        if let Some(last) = self.samples.back() {
            if frame_index <= last.frame_index {
                return false;
            }
        }
        self.samples.push_back(DistanceSample {
            frame_index,
            distance_forward_m,
        });
        while let Some(front) = self.samples.front() {
            if frame_index - front.frame_index > self.window_frames {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&DistanceSample> {
        self.samples.back()
    }

    /// Distance `lookback` samples ago (counting the latest as 1) minus the
    /// latest distance. Positive means the vehicle is getting closer.
    pub fn closing_velocity(&self, lookback: usize) -> Option<f32> {
        if lookback == 0 || self.samples.len() < lookback {
            return None;
        }
        let latest = self.samples.back()?;
        let earlier = self.samples.get(self.samples.len() - lookback)?;
        Some(earlier.distance_forward_m - latest.distance_forward_m)
    }
}

// ============================================================================
// THREAT TRACKER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ThreatWarning {
    pub track_id: u32,
    pub frame_index: u64,
    pub distance_forward_m: f32,
    pub closing_velocity_m: f32,
}

pub struct ThreatTracker {
    config: ThreatConfig,
    classes: ClassConfig,
    histories: HashMap<u32, ThreatHistory>,
    last_warning: HashMap<u32, u64>,
    last_warnings: Vec<ThreatWarning>,
}

impl ThreatTracker {
    pub fn new(config: ThreatConfig, classes: ClassConfig) -> Self {
        Self {
            config,
            classes,
            histories: HashMap::new(),
            last_warning: HashMap::new(),
            last_warnings: Vec::new(),
        }
    }

    /// Same-lane vehicle test shared with the tailgating check.
    pub fn in_ego_lane(&self, obj: &ProjectedObject) -> bool {
        self.classes.is_vehicle(&obj.object.class_name)
            && obj.distance_lateral_m.abs() < self.config.lane_gate_m
    }

    /// Feed one frame. Returns true if any ego-lane vehicle is an emergency
    /// threat on this frame (after per-track cooldown).
    ///
    /// `frame_index` is the clock every window here is measured in, so it
    /// must advance by one per frame actually fed to the tracker.
    pub fn update(&mut self, frame_index: u64, objects: &[ProjectedObject]) -> bool {
        self.last_warnings.clear();

        let present: HashSet<u32> = objects.iter().filter_map(|o| o.object.track_id).collect();
        self.evict_absent(&present);

        for obj in objects {
            let Some(track_id) = obj.object.track_id else {
                continue;
            };
            if !self.in_ego_lane(obj) {
                continue;
            }

            let window = self.config.history_frames;
            let history = self
                .histories
                .entry(track_id)
                .or_insert_with(|| ThreatHistory::new(window));
            if !history.push(frame_index, obj.distance_forward_m) {
                debug!(
                    "Track {} sample at frame {} is not newer than its history, skipped",
                    track_id, frame_index
                );
                continue;
            }
            if history.len() < self.config.min_samples {
                continue;
            }
            let Some(velocity) = history.closing_velocity(self.config.velocity_lookback) else {
                continue;
            };

            let distance = obj.distance_forward_m;
            let candidate = (velocity >= self.config.closing_velocity_m
                && distance <= self.config.emergency_distance_m)
                || velocity >= self.config.critical_velocity_m;
            if !candidate {
                continue;
            }

            let cooled_down = match self.last_warning.get(&track_id) {
                Some(&last) => frame_index - last >= self.config.cooldown_frames,
                None => true,
            };
            if !cooled_down {
                continue;
            }

            self.last_warning.insert(track_id, frame_index);
            debug!(
                "⚠️ Threat: track {} closing {:.2}m over {} samples at {:.2}m (frame {})",
                track_id, velocity, self.config.velocity_lookback, distance, frame_index
            );
            self.last_warnings.push(ThreatWarning {
                track_id,
                frame_index,
                distance_forward_m: distance,
                closing_velocity_m: velocity,
            });
        }

        !self.last_warnings.is_empty()
    }

    /// Single auditable eviction step: every known ID not in this frame's
    /// object set loses its history and its cooldown.
    fn evict_absent(&mut self, present: &HashSet<u32>) {
        let before = self.histories.len();
        self.histories.retain(|id, _| present.contains(id));
        self.last_warning.retain(|id, _| present.contains(id));
        let evicted = before - self.histories.len();
        if evicted > 0 {
            debug!("Evicted {} track histories", evicted);
        }
    }

    pub fn warnings(&self) -> &[ThreatWarning] {
        &self.last_warnings
    }

    pub fn history(&self, track_id: u32) -> Option<&ThreatHistory> {
        self.histories.get(&track_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.histories.len()
    }
}

// ============================================================================
// SUDDEN-STOP LATCH
// ============================================================================

/// Holds a fired warning high for `sustain_frames` frames.
#[derive(Debug, Clone)]
pub struct SuddenStopLatch {
    sustain_frames: u32,
    remaining: u32,
}

impl SuddenStopLatch {
    pub fn new(sustain_frames: u32) -> Self {
        Self {
            sustain_frames,
            remaining: 0,
        }
    }

    pub fn update(&mut self, raw_warning: bool) -> bool {
        if raw_warning {
            self.remaining = self.remaining.max(self.sustain_frames);
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

// ============================================================================
// TAILGATING
// ============================================================================

/// Up/down counter over "close vehicle in my lane" frames.
#[derive(Debug, Clone)]
pub struct TailgatingCounter {
    threshold: u32,
    count: u32,
}

impl TailgatingCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            count: 0,
        }
    }

    pub fn update(&mut self, close_vehicle: bool) -> bool {
        if close_vehicle {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = self.count.saturating_sub(1);
        }
        self.is_tailgating()
    }

    pub fn is_tailgating(&self) -> bool {
        self.count >= self.threshold
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, TrackedObject};

    fn vehicle(track_id: u32, forward: f32, lateral: f32) -> ProjectedObject {
        ProjectedObject {
            object: TrackedObject {
                track_id: Some(track_id),
                class_name: "car".to_string(),
                bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            },
            distance_forward_m: forward,
            distance_lateral_m: lateral,
        }
    }

    fn tracker() -> ThreatTracker {
        let classes = ClassConfig {
            vehicles: vec!["car".to_string(), "truck".to_string()],
            ..Default::default()
        };
        ThreatTracker::new(ThreatConfig::default(), classes)
    }

    #[test]
    fn test_history_ages_out_by_frame_index() {
        let mut h = ThreatHistory::new(15);
        for f in 1..=30 {
            h.push(f, 50.0);
        }
        assert_eq!(h.len(), 16);
        // A gap in frame indices drops everything older than the window.
        h.push(60, 40.0);
        assert_eq!(h.len(), 1);
        assert!(!h.push(60, 39.0), "duplicate frame index rejected");
    }

    #[test]
    fn test_closing_velocity_uses_lookback() {
        let mut h = ThreatHistory::new(15);
        for (i, d) in [20.0, 19.0, 17.0, 14.0, 10.0].iter().enumerate() {
            h.push(i as u64 + 1, *d);
        }
        assert_eq!(h.closing_velocity(5), Some(10.0));
        assert_eq!(h.closing_velocity(2), Some(4.0));
        assert_eq!(h.closing_velocity(6), None);
    }

    #[test]
    fn test_one_warning_per_cooldown_window() {
        let mut t = tracker();
        let mut fired = Vec::new();
        // Closing 1 m per frame: 4 m over the lookback, above the critical rate.
        for frame in 1..=60u64 {
            let distance = 100.0 - frame as f32;
            if t.update(frame, &[vehicle(3, distance, 0.2)]) {
                fired.push(frame);
            }
        }
        assert_eq!(fired, vec![10, 30, 50]);
        for window_start in [10u64, 30, 50] {
            let in_window = fired
                .iter()
                .filter(|&&f| f >= window_start && f < window_start + 20)
                .count();
            assert_eq!(in_window, 1);
        }
    }

    #[test]
    fn test_slow_approach_needs_emergency_distance() {
        let mut t = tracker();
        let mut any = false;
        // 0.5 m/frame → 2.0 m over lookback: candidate only at/past the ego boundary.
        for frame in 1..=12u64 {
            let distance = 8.0 - 0.5 * frame as f32;
            any |= t.update(frame, &[vehicle(1, distance.max(0.0), 0.0)]);
        }
        assert!(!any, "distance still positive, no warning");

        let mut t = tracker();
        let mut fired = false;
        for frame in 1..=20u64 {
            let distance = (10.0 - 0.5 * frame as f32).max(0.0);
            fired |= t.update(frame, &[vehicle(1, distance, 0.0)]);
        }
        assert!(fired, "closing at 2.0 m with distance at 0 m fires");
    }

    #[test]
    fn test_absent_track_is_purged_and_restarts_fresh() {
        let mut t = tracker();
        for frame in 1..=12u64 {
            t.update(frame, &[vehicle(5, 60.0, 0.0)]);
        }
        assert_eq!(t.history(5).unwrap().len(), 12);

        // Absent for one frame → gone.
        t.update(13, &[]);
        assert!(t.history(5).is_none());
        assert_eq!(t.tracked_count(), 0);

        // Same numeric ID reappears much closer: no memory of the old range.
        let fired = t.update(14, &[vehicle(5, 1.0, 0.0)]);
        assert!(!fired);
        assert_eq!(t.history(5).unwrap().len(), 1);
    }

    #[test]
    fn test_cooldown_forgotten_with_track() {
        let mut t = tracker();
        let mut first = None;
        for frame in 1..=12u64 {
            if t.update(frame, &[vehicle(2, 100.0 - 3.0 * frame as f32, 0.0)]) {
                first.get_or_insert(frame);
            }
        }
        assert_eq!(first, Some(10));
        t.update(13, &[]);
        // Rebuild a history from scratch; the old cooldown must not block it.
        let mut second = None;
        for frame in 14..=23u64 {
            let d = 100.0 - 3.0 * (frame - 13) as f32;
            if t.update(frame, &[vehicle(2, d, 0.0)]) {
                second.get_or_insert(frame);
            }
        }
        assert_eq!(second, Some(23));
    }

    #[test]
    fn test_other_lane_and_other_classes_ignored() {
        let mut t = tracker();
        let mut ped = vehicle(9, 0.0, 0.0);
        ped.object.class_name = "pedestrian".to_string();
        let mut fired = false;
        for frame in 1..=20u64 {
            let d = 100.0 - 5.0 * frame as f32;
            fired |= t.update(frame, &[vehicle(4, d, 2.5), ped.clone()]);
        }
        assert!(!fired);
        assert!(t.history(4).is_none());
        assert!(t.history(9).is_none());
    }

    #[test]
    fn test_vehicle_classes_come_from_config() {
        let mut bus = vehicle(3, 40.0, 0.0);
        bus.object.class_name = "bus".to_string();

        let mut t = tracker();
        t.update(1, &[bus.clone()]);
        assert!(t.history(3).is_none());

        let mut t = ThreatTracker::new(ThreatConfig::default(), ClassConfig::default());
        t.update(1, &[bus]);
        assert_eq!(t.history(3).map(|h| h.len()), Some(1));
    }

    #[test]
    fn test_sudden_stop_latch_sustains() {
        let mut latch = SuddenStopLatch::new(40);
        assert!(latch.update(true));
        for _ in 0..39 {
            assert!(latch.update(false));
        }
        assert!(!latch.update(false));
    }

    #[test]
    fn test_tailgating_counter_up_down() {
        let mut c = TailgatingCounter::new(7);
        for _ in 0..6 {
            assert!(!c.update(true));
        }
        assert!(c.update(true));
        // One clear frame drops below the threshold again.
        assert!(!c.update(false));
        assert_eq!(c.count(), 6);
        for _ in 0..10 {
            c.update(false);
        }
        assert_eq!(c.count(), 0);
    }
}
