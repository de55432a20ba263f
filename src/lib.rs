// src/lib.rs
//
// Driving-event fusion core: turns per-chunk dashcam perception outputs
// (tracked objects, lane masks, indicator pixels, audio labels) into one
// debounced driving-event classification per chunk.

pub mod analysis;
pub mod config;
pub mod error;
pub mod interface;
pub mod pipeline;
pub mod projection;
pub mod replay;
pub mod scenario;
pub mod types;

pub use error::{ChunkError, Collaborator, CollaboratorError, ConfigError};
pub use pipeline::{ChunkInput, ChunkPipeline, Collaborators};
pub use scenario::{ScenarioEvaluator, ScenarioKind, ScenarioState};
pub use types::{ChunkFeatures, ChunkResult, Config};
