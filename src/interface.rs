// src/interface.rs
//
// Seams to the perception components that live outside this crate.
//
// Object tracking, lane segmentation and audio classification are model
// inference and are only consumed here through these traits. Returning
// `Ok(None)` / an empty vec means "nothing detected"; `Err` means the
// collaborator itself broke.

use crate::error::CollaboratorError;
use crate::types::{AudioDetection, BoundingBox, Frame, LightColor, Roi, TrackedObject};
use ndarray::Array2;

/// Per-pixel lane probability (or 0/1) mask, rows × cols.
pub type LaneMask = Array2<f32>;

#[allow(async_fn_in_trait)]
pub trait ObjectTracker {
    async fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedObject>, CollaboratorError>;
}

#[allow(async_fn_in_trait)]
pub trait LaneSegmenter {
    async fn segment(&mut self, frame: &Frame) -> Result<Option<LaneMask>, CollaboratorError>;
}

#[allow(async_fn_in_trait)]
pub trait AudioClassifier {
    /// `samples` is the mono audio slice aligned with chunk `chunk_id`.
    async fn classify(
        &mut self,
        chunk_id: u64,
        samples: &[f32],
    ) -> Result<Option<AudioDetection>, CollaboratorError>;
}

/// Per-frame color-threshold primitive. Debouncing is done by the caller.
pub trait LightProbe {
    fn indicator_lit(&self, frame: &Frame, roi: &Roi) -> bool;
    fn light_color(&self, frame: &Frame, bbox: &BoundingBox) -> Option<LightColor>;
}
