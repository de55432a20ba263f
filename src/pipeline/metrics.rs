// src/pipeline/metrics.rs
//
// Counters and timings for one pipeline. Shared handles so a status task
// can read them while chunks are processed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub chunks_processed: Arc<AtomicU64>,
    pub frames_processed: Arc<AtomicU64>,
    pub frames_with_lanes: Arc<AtomicU64>,
    pub threat_warnings: Arc<AtomicU64>,
    pub lane_changes: Arc<AtomicU64>,
    pub lane_departures: Arc<AtomicU64>,
    pub scenario_events: Arc<AtomicU64>,
    pub collaborator_timeouts: Arc<AtomicU64>,
    pub chunk_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            chunks_processed: Arc::new(AtomicU64::new(0)),
            frames_processed: Arc::new(AtomicU64::new(0)),
            frames_with_lanes: Arc::new(AtomicU64::new(0)),
            threat_warnings: Arc::new(AtomicU64::new(0)),
            lane_changes: Arc::new(AtomicU64::new(0)),
            lane_departures: Arc::new(AtomicU64::new(0)),
            scenario_events: Arc::new(AtomicU64::new(0)),
            collaborator_timeouts: Arc::new(AtomicU64::new(0)),
            chunk_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_with_lanes: self.frames_with_lanes.load(Ordering::Relaxed),
            threat_warnings: self.threat_warnings.load(Ordering::Relaxed),
            lane_changes: self.lane_changes.load(Ordering::Relaxed),
            lane_departures: self.lane_departures.load(Ordering::Relaxed),
            scenario_events: self.scenario_events.load(Ordering::Relaxed),
            collaborator_timeouts: self.collaborator_timeouts.load(Ordering::Relaxed),
            last_chunk_us: self.chunk_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub chunks_processed: u64,
    pub frames_processed: u64,
    pub frames_with_lanes: u64,
    pub threat_warnings: u64,
    pub lane_changes: u64,
    pub lane_departures: u64,
    pub scenario_events: u64,
    pub collaborator_timeouts: u64,
    pub last_chunk_us: u64,
    pub elapsed_secs: f64,
}
