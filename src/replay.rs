// src/replay.rs
//
// Offline replay of recorded perception outputs.
//
// A recording is a JSONL file, one chunk per line:
//
//   {"chunk_id": 1,
//    "frame_width": 1280, "frame_height": 720,
//    "audio": {"label": "horn", "confidence": 0.91},
//    "frames": [
//      {"index": 0, "timestamp_ms": 0.0,
//       "objects": [{"track_id": 3, "class_name": "car", "bbox": {...}}],
//       "lane_mask": [[0.0, 1.0, ...], ...],
//       "left_indicator": false, "right_indicator": true,
//       "traffic_light": "red"}]}
//
// The recording stands in for all four collaborators: each handle below
// answers from the same loaded `Recording`.

use crate::error::CollaboratorError;
use crate::interface::{AudioClassifier, LaneMask, LaneSegmenter, LightProbe, ObjectTracker};
use crate::pipeline::{ChunkInput, Collaborators};
use crate::types::{AudioDetection, BoundingBox, Frame, LightColor, Roi, TrackedObject};
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

// ============================================================================
// RECORDING FORMAT
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedChunk {
    pub chunk_id: u64,
    #[serde(default = "default_width")]
    pub frame_width: usize,
    #[serde(default = "default_height")]
    pub frame_height: usize,
    #[serde(default)]
    pub audio: Option<AudioDetection>,
    #[serde(default)]
    pub frames: Vec<RecordedFrame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedFrame {
    pub index: u64,
    #[serde(default)]
    pub timestamp_ms: f64,
    #[serde(default)]
    pub objects: Vec<TrackedObject>,
    #[serde(default)]
    pub lane_mask: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub left_indicator: bool,
    #[serde(default)]
    pub right_indicator: bool,
    #[serde(default)]
    pub traffic_light: Option<LightColor>,
}

fn default_width() -> usize {
    1280
}

fn default_height() -> usize {
    720
}

#[derive(Debug, Default)]
struct FrameRecord {
    objects: Vec<TrackedObject>,
    lane_mask: Option<LaneMask>,
    left_indicator: bool,
    right_indicator: bool,
    traffic_light: Option<LightColor>,
}

/// A fully loaded recording, indexed for the collaborator handles.
#[derive(Debug, Default)]
pub struct Recording {
    chunks: Vec<ChunkInput>,
    frames: HashMap<u64, FrameRecord>,
    audio: HashMap<u64, AudioDetection>,
    left_roi: Option<Roi>,
}

impl Recording {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        Self::from_jsonl(&contents)
            .with_context(|| format!("Malformed recording {}", path.display()))
    }

    pub fn from_jsonl(contents: &str) -> Result<Self> {
        let mut recording = Recording::default();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let chunk: RecordedChunk = serde_json::from_str(line)
                .with_context(|| format!("line {}: not a recorded chunk", line_no + 1))?;
            recording.push_chunk(chunk)?;
        }
        recording.chunks.sort_by_key(|c| c.chunk_id);
        debug!(
            "Loaded recording: {} chunks, {} frames",
            recording.chunks.len(),
            recording.frames.len()
        );
        Ok(recording)
    }

    fn push_chunk(&mut self, chunk: RecordedChunk) -> Result<()> {
        let mut frames = Vec::with_capacity(chunk.frames.len());
        for f in chunk.frames {
            let lane_mask = match f.lane_mask {
                Some(rows) => Some(mask_from_rows(rows).with_context(|| {
                    format!("chunk {} frame {}: bad lane mask", chunk.chunk_id, f.index)
                })?),
                None => None,
            };
            let record = FrameRecord {
                objects: f.objects,
                lane_mask,
                left_indicator: f.left_indicator,
                right_indicator: f.right_indicator,
                traffic_light: f.traffic_light,
            };
            if self.frames.insert(f.index, record).is_some() {
                bail!("frame {} appears twice", f.index);
            }
            frames.push(Frame {
                index: f.index,
                timestamp_ms: f.timestamp_ms,
                width: chunk.frame_width,
                height: chunk.frame_height,
                data: Vec::new(),
            });
        }
        if let Some(audio) = chunk.audio {
            self.audio.insert(chunk.chunk_id, audio);
        }
        self.chunks.push(ChunkInput {
            chunk_id: chunk.chunk_id,
            frames,
            audio: Vec::new(),
        });
        Ok(())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Splits the recording into the pipeline inputs (in chunk order) and
    /// the four collaborator handles answering from it.
    pub fn into_parts(
        mut self,
        left_roi: Roi,
    ) -> (
        Vec<ChunkInput>,
        Collaborators<ReplayTracker, ReplaySegmenter, ReplayAudio, ReplayLights>,
    ) {
        let chunks = std::mem::take(&mut self.chunks);
        self.left_roi = Some(left_roi);
        let shared = Arc::new(self);
        let collaborators = Collaborators {
            tracker: ReplayTracker(Arc::clone(&shared)),
            lanes: ReplaySegmenter(Arc::clone(&shared)),
            audio: ReplayAudio(Arc::clone(&shared)),
            lights: ReplayLights(shared),
        };
        (chunks, collaborators)
    }
}

fn mask_from_rows(rows: Vec<Vec<f32>>) -> Result<LaneMask> {
    let height = rows.len();
    let width = rows.first().map_or(0, |r| r.len());
    if rows.iter().any(|r| r.len() != width) {
        bail!("rows have different lengths");
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((height, width), flat)?)
}

// ============================================================================
// COLLABORATOR HANDLES
// ============================================================================

pub struct ReplayTracker(Arc<Recording>);
pub struct ReplaySegmenter(Arc<Recording>);
pub struct ReplayAudio(Arc<Recording>);
pub struct ReplayLights(Arc<Recording>);

impl ObjectTracker for ReplayTracker {
    async fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedObject>, CollaboratorError> {
        Ok(self
            .0
            .frames
            .get(&frame.index)
            .map(|f| f.objects.clone())
            .unwrap_or_default())
    }
}

impl LaneSegmenter for ReplaySegmenter {
    async fn segment(&mut self, frame: &Frame) -> Result<Option<LaneMask>, CollaboratorError> {
        Ok(self
            .0
            .frames
            .get(&frame.index)
            .and_then(|f| f.lane_mask.clone()))
    }
}

impl AudioClassifier for ReplayAudio {
    async fn classify(
        &mut self,
        chunk_id: u64,
        _samples: &[f32],
    ) -> Result<Option<AudioDetection>, CollaboratorError> {
        Ok(self.0.audio.get(&chunk_id).copied())
    }
}

impl LightProbe for ReplayLights {
    /// The recording stores the indicator state directly; the ROI only
    /// tells which side is being asked for.
    fn indicator_lit(&self, frame: &Frame, roi: &Roi) -> bool {
        let Some(f) = self.0.frames.get(&frame.index) else {
            return false;
        };
        if Some(*roi) == self.0.left_roi {
            f.left_indicator
        } else {
            f.right_indicator
        }
    }

    fn light_color(&self, frame: &Frame, _bbox: &BoundingBox) -> Option<LightColor> {
        self.0.frames.get(&frame.index).and_then(|f| f.traffic_light)
    }
}

// ============================================================================
// DISCOVERY
// ============================================================================

/// All `*.jsonl` files under `dir`, sorted by path.
pub fn find_recordings(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        bail!("Input directory {} does not exist", dir.display());
    }

    let mut recordings: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"))
        })
        .collect();
    recordings.sort();

    info!("Found {} recording(s) in {}", recordings.len(), dir.display());
    Ok(recordings)
}
