// src/analysis/mod.rs
//
// Per-frame state machines feeding the chunk features.
//
// Signal flow:
//   Tracked objects → projection → threat_tracker ───────────────┐
//   Lane mask → boundary_estimator → lane_tracker ───────────────┼→ ChunkFeatures
//   Light probe hits → signal_debouncer ─────────────────────────┘

pub mod boundary_estimator;
pub mod lane_tracker;
pub mod signal_debouncer;
pub mod threat_tracker;

pub use boundary_estimator::{
    build_estimator, BoundaryEstimator, BoundaryStrategy, RawBoundaries,
};
pub use lane_tracker::{
    DepartureSide, DepartureState, LaneChangeDetector, LaneChangeEvent, LaneDepartureMonitor,
    LaneTracker, LaneTrackerState,
};
pub use signal_debouncer::{IndicatorStatus, SignalDebouncer, TrafficLightDebouncer};
pub use threat_tracker::{SuddenStopLatch, TailgatingCounter, ThreatTracker, ThreatWarning};
