// src/pipeline/frame_context.rs
//
// Everything the pipeline derived from one sampled frame. Kept for the
// last chunk so overlay renderers and debugging tools read the same values
// the decision was made on.

use crate::analysis::{DepartureSide, LaneTrackerState, RawBoundaries};
use crate::types::{LightColor, ProjectedObject};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameContext {
    pub frame_index: u64,
    pub timestamp_ms: f64,

    // Objects
    pub objects: Vec<ProjectedObject>,
    pub threat_warning: bool,
    pub close_vehicle: bool,

    // Lanes
    #[serde(skip)]
    pub raw_boundaries: RawBoundaries,
    pub lane_state: LaneTrackerState,
    pub vehicle_x: Option<f32>,
    pub departure: Option<DepartureSide>,

    // Lights
    pub left_indicator: bool,
    pub right_indicator: bool,
    pub traffic_light: Option<LightColor>,
}

impl FrameContext {
    pub fn new(frame_index: u64, timestamp_ms: f64) -> Self {
        Self {
            frame_index,
            timestamp_ms,
            ..Default::default()
        }
    }

    pub fn lane_center(&self) -> Option<f32> {
        self.lane_state.center()
    }
}
