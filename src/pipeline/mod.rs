// src/pipeline/mod.rs

pub mod chunk_pipeline;
pub mod event_bus;
pub mod frame_context;
pub mod metrics;

pub use chunk_pipeline::{sample_indices, slice_audio, ChunkInput, ChunkPipeline, Collaborators};
pub use event_bus::{DrivingEvent, EventBus};
pub use frame_context::FrameContext;
pub use metrics::{MetricsSummary, PipelineMetrics};
