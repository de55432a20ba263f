// src/types.rs

use crate::analysis::boundary_estimator::BoundaryStrategy;
use crate::analysis::lane_tracker::DepartureSide;
use crate::scenario::ScenarioKind;
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub projection: ProjectionConfig,
    pub threat: ThreatConfig,
    pub lane: LaneConfig,
    pub signal: SignalConfig,
    pub scenario: ScenarioConfig,
    pub pipeline: PipelineConfig,
    pub classes: ClassConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

/// Image plane → bird's-eye-view calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Row-major 3x3 projective matrix, image pixels → BEV pixels
    pub homography: [[f64; 3]; 3],
    pub pixels_per_meter_x: f64,
    pub pixels_per_meter_y: f64,
    /// Ego vehicle reference point in the BEV frame
    pub ego_bev_x: f64,
    pub ego_bev_y: f64,
    /// Farthest image row that still lies on the calibrated ground plane.
    /// Anchors above the road (traffic lights) are re-mapped against it.
    pub calibration_y_far: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            homography: [
                [-3.97727273e-02, -3.24810606e-01, 1.00492424e02],
                [4.37257068e-16, -2.54829545e00, 7.89971591e02],
                [1.16574774e-18, -3.69318182e-03, 1.0],
            ],
            pixels_per_meter_x: 20.0,
            pixels_per_meter_y: 20.0,
            ego_bev_x: 105.0,
            ego_bev_y: 400.0,
            calibration_y_far: 310.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    /// |lateral| below this puts a vehicle in the ego lane
    pub lane_gate_m: f32,
    /// Samples older than this many frames are aged out
    pub history_frames: u64,
    /// Samples required before a velocity estimate is trusted
    pub min_samples: usize,
    /// velocity = distance `velocity_lookback` samples ago − current distance
    pub velocity_lookback: usize,
    pub closing_velocity_m: f32,
    /// Closing faster than this fires regardless of distance
    pub critical_velocity_m: f32,
    pub emergency_distance_m: f32,
    /// Minimum frames between two warnings for the same track
    pub cooldown_frames: u64,
    /// Frames a fired warning stays visible
    pub sustain_frames: u32,
    pub tailgating_distance_m: f32,
    pub tailgating_frames: u32,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            lane_gate_m: 1.8,
            history_frames: 15,
            min_samples: 10,
            velocity_lookback: 5,
            closing_velocity_m: 2.0,
            critical_velocity_m: 2.5,
            emergency_distance_m: 0.0,
            cooldown_frames: 20,
            sustain_frames: 40,
            tailgating_distance_m: 3.0,
            tailgating_frames: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub estimator: BoundaryStrategy,
    /// Frames a boundary survives without a direct detection
    pub persistence_frames: u32,
    /// A boundary is "confident" while its age is below this
    pub confident_age: u32,
    /// Weight of the new observation in the exponential smoother
    pub smooth_alpha: f32,
    pub change_threshold_px: f32,
    /// Mask values above this count as lane pixels
    pub mask_threshold: f32,
    /// Ego column in mask coordinates. Defaults to the mask center.
    pub vehicle_x: Option<f32>,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            estimator: BoundaryStrategy::ColumnCluster,
            persistence_frames: 15,
            confident_age: 5,
            smooth_alpha: 0.9,
            change_threshold_px: 40.0,
            mask_threshold: 0.5,
            vehicle_x: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// ON frames needed within a chunk for the chunk to count as ON
    pub count_threshold: u32,
    pub left_roi: Roi,
    pub right_roi: Roi,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            count_threshold: 3,
            left_roi: Roi::new(170, 390, 25, 25),
            right_roi: Roi::new(240, 390, 25, 25),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// A second wiper+hazard within this many chunks is "repeated misuse"
    pub wiper_repeat_window: u64,
    /// Chunks after a lane change during which a lingering blinker is watched
    pub blinker_stuck_window: u64,
    /// Consecutive post-change chunks with the blinker ON that trigger the event
    pub blinker_stuck_chunks: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            wiper_repeat_window: 3,
            blinker_stuck_window: 2,
            blinker_stuck_chunks: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunk_seconds: f32,
    /// Frames handed to the collaborators per chunk, spread evenly
    pub sampled_frames: usize,
    pub audio_threshold: f32,
    pub audio_sample_rate: u32,
    pub collaborator_timeout_ms: u64,
    pub event_bus_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: 2.0,
            sampled_frames: 20,
            audio_threshold: 0.7,
            audio_sample_rate: 16_000,
            collaborator_timeout_ms: 2_000,
            event_bus_capacity: 256,
        }
    }
}

/// Detector class names the core reacts to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfig {
    pub vehicles: Vec<String>,
    pub pedestrian: String,
    pub crosswalk_sign: String,
    pub traffic_light: String,
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            vehicles: ["car", "truck", "bus", "motorcycle"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pedestrian: "pedestrian".to_string(),
            crosswalk_sign: "crosswalk sign".to_string(),
            traffic_light: "traffic light".to_string(),
        }
    }
}

impl ClassConfig {
    pub fn is_vehicle(&self, class_name: &str) -> bool {
        self.vehicles.iter().any(|v| v == class_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub input_dir: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input_dir: "recordings".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit a progress line every N chunks (0 disables it)
    pub status_every_chunks: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            status_every_chunks: 10,
        }
    }
}

// ============================================================================
// PERCEPTION INPUTS
// ============================================================================

/// A decoded video frame, packed RGB (HWC).
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp_ms: f64,
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

/// Traffic-light state, as far as the driving rules care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightColor {
    Red,
    Green,
}

impl LightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightColor::Red => "red",
            LightColor::Green => "green",
        }
    }
}

/// Fixed pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Where the object touches the road.
    pub fn bottom_center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, self.y2)
    }

    pub fn to_roi(&self, frame_width: usize, frame_height: usize) -> Roi {
        let clamp_x = |v: f32| v.clamp(0.0, frame_width as f32) as u32;
        let clamp_y = |v: f32| v.clamp(0.0, frame_height as f32) as u32;
        let (x1, x2) = (clamp_x(self.x1.min(self.x2)), clamp_x(self.x1.max(self.x2)));
        let (y1, y2) = (clamp_y(self.y1.min(self.y2)), clamp_y(self.y1.max(self.y2)));
        Roi::new(x1, y1, x2 - x1, y2 - y1)
    }
}

/// One detector/tracker output box. `track_id` is `None` when the tracker
/// has not assigned an identity yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    #[serde(default)]
    pub track_id: Option<u32>,
    pub class_name: String,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedObject {
    pub object: TrackedObject,
    pub distance_forward_m: f32,
    pub distance_lateral_m: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioLabel {
    Horn,
    Blinker,
    Wiper,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioDetection {
    pub label: AudioLabel,
    pub confidence: f32,
}

/// Direction of a completed lane change.
///
/// The lane center moving right in the image means the lane the camera is
/// locked onto now lies to the right of the old one: the vehicle moved into
/// the lane on its right (`ToRight`). A leftward center shift is `ToLeft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneChangeDirection {
    ToLeft,
    ToRight,
}

impl LaneChangeDirection {
    pub fn from_center_shift(shift_px: f32) -> Self {
        if shift_px > 0.0 {
            Self::ToRight
        } else {
            Self::ToLeft
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToLeft => "to_left",
            Self::ToRight => "to_right",
        }
    }
}

// ============================================================================
// CHUNK OUTPUTS
// ============================================================================

/// Fused per-chunk feature record consumed by the scenario rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkFeatures {
    pub chunk_id: u64,
    pub horn: bool,
    pub blinker_audio: bool,
    pub wiper_audio: bool,
    pub left_signal_on: bool,
    pub right_signal_on: bool,
    pub hazard_on: bool,
    pub lane_change: bool,
    pub lane_change_direction: Option<LaneChangeDirection>,
    pub lane_offset: f32,
    pub lane_departure: Option<DepartureSide>,
    pub tailgating: bool,
    pub sudden_stop: bool,
    pub pedestrian_present: bool,
    pub crosswalk_sign_present: bool,
    pub traffic_light: Option<LightColor>,
    pub traffic_light_distance_m: Option<f32>,
}

impl ChunkFeatures {
    pub fn new(chunk_id: u64) -> Self {
        Self {
            chunk_id,
            ..Default::default()
        }
    }

    /// A turn signal was seen or heard in this chunk.
    pub fn blinker_used(&self) -> bool {
        self.left_signal_on || self.right_signal_on || self.blinker_audio
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResult {
    pub chunk_id: u64,
    pub scenario_id: u8,
    pub scenario: ScenarioKind,
    pub message: String,
    pub features: ChunkFeatures,
}
