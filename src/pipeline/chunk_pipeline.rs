// src/pipeline/chunk_pipeline.rs
//
// Per-chunk fusion loop.
//
// For every chunk: classify the aligned audio slice once, then walk the
// evenly sampled frames in order. Each frame goes through the tracker,
// projection, threat/tailgating state, lane segmentation, boundary
// estimation, the lane tracker, the departure monitor and the light probes.
// After the last frame the debounced signals are read out into
// `ChunkFeatures`, the lane center of the middle sampled frame is compared
// with the previous chunk's, and the scenario rules turn everything into
// exactly one `ChunkResult`.
//
// Frame-count windows (threat history, cooldown, sustain, tailgating, lane
// persistence) count sampled frames, not video frames.
//
// Chunks are strictly ordered: every tracker here carries state into the
// next chunk. A collaborator that times out counts as "no detection" for
// that call; one that fails aborts the chunk with `ChunkError`.

use crate::analysis::{
    build_estimator, BoundaryEstimator, LaneChangeDetector, LaneDepartureMonitor, LaneTracker,
    RawBoundaries, SignalDebouncer, SuddenStopLatch, TailgatingCounter, ThreatTracker,
    TrafficLightDebouncer,
};
use crate::error::{ChunkError, Collaborator, CollaboratorError, ConfigError};
use crate::interface::{AudioClassifier, LaneSegmenter, LightProbe, ObjectTracker};
use crate::pipeline::event_bus::{DrivingEvent, EventBus};
use crate::pipeline::frame_context::FrameContext;
use crate::pipeline::metrics::PipelineMetrics;
use crate::projection::GeometricProjector;
use crate::scenario::{ScenarioEvaluator, ScenarioState};
use crate::types::{AudioLabel, ChunkFeatures, ChunkResult, Config, Frame, ProjectedObject};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ============================================================================
// INPUTS
// ============================================================================

/// The four perception components one pipeline talks to.
pub struct Collaborators<T, L, A, P> {
    pub tracker: T,
    pub lanes: L,
    pub audio: A,
    pub lights: P,
}

/// One fixed-duration slice of video plus its aligned audio.
#[derive(Debug, Clone)]
pub struct ChunkInput {
    pub chunk_id: u64,
    /// Every decoded frame of the chunk; the pipeline samples from these.
    pub frames: Vec<Frame>,
    pub audio: Vec<f32>,
}

/// `min(n, k)` indices spread evenly over `0..n`, first and last included.
pub fn sample_indices(n: usize, k: usize) -> Vec<usize> {
    let m = n.min(k);
    match m {
        0 => Vec::new(),
        1 => vec![0],
        _ => (0..m).map(|i| i * (n - 1) / (m - 1)).collect(),
    }
}

/// Audio samples belonging to chunk `chunk_id` (ids start at 1) of a
/// continuous mono track. Empty past the end of the track.
pub fn slice_audio(audio: &[f32], chunk_id: u64, chunk_seconds: f32, sample_rate: u32) -> &[f32] {
    let len = (chunk_seconds * sample_rate as f32) as usize;
    let start = (chunk_id.saturating_sub(1) as usize).saturating_mul(len);
    let end = start.saturating_add(len).min(audio.len());
    audio.get(start..end).unwrap_or(&[])
}

/// Runs one collaborator call under the configured timeout. A timeout,
/// whether ours or reported by the collaborator, becomes `Ok(None)`.
async fn guarded<T>(
    collaborator: Collaborator,
    timeout: Duration,
    call: impl Future<Output = Result<T, CollaboratorError>>,
) -> Result<Option<T>, CollaboratorError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(Some(value)),
        Ok(Err(e)) if e.is_timeout() => {
            warn!("{}, treating as no detection", e);
            Ok(None)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(
                "{} timed out after {}ms, treating as no detection",
                collaborator,
                timeout.as_millis()
            );
            Ok(None)
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct ChunkPipeline<T, L, A, P> {
    config: Config,
    collaborators: Collaborators<T, L, A, P>,
    timeout: Duration,

    projector: GeometricProjector,
    threat: ThreatTracker,
    /// Sampled frames processed so far; the threat tracker's clock
    frames_seen: u64,
    sudden_stop: SuddenStopLatch,
    tailgating: TailgatingCounter,

    estimator: Box<dyn BoundaryEstimator>,
    lane_tracker: LaneTracker,
    lane_change: LaneChangeDetector,
    departure: LaneDepartureMonitor,
    vehicle_x: Option<f32>,

    signals: SignalDebouncer,
    traffic_lights: TrafficLightDebouncer,

    scenario: ScenarioEvaluator,
    events: EventBus,
    metrics: PipelineMetrics,

    last_chunk_id: Option<u64>,
    last_frames: Vec<FrameContext>,
}

impl<T, L, A, P> ChunkPipeline<T, L, A, P>
where
    T: ObjectTracker,
    L: LaneSegmenter,
    A: AudioClassifier,
    P: LightProbe,
{
    pub fn new(
        config: Config,
        collaborators: Collaborators<T, L, A, P>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let projector = GeometricProjector::new(&config.projection)?;
        let estimator = build_estimator(config.lane.estimator, config.lane.mask_threshold);
        info!(
            "Chunk pipeline ready: {}s chunks, {} sampled frames, {} boundary estimator",
            config.pipeline.chunk_seconds,
            config.pipeline.sampled_frames,
            estimator.name()
        );

        Ok(Self {
            timeout: Duration::from_millis(config.pipeline.collaborator_timeout_ms),
            projector,
            threat: ThreatTracker::new(config.threat.clone(), config.classes.clone()),
            frames_seen: 0,
            sudden_stop: SuddenStopLatch::new(config.threat.sustain_frames),
            tailgating: TailgatingCounter::new(config.threat.tailgating_frames),
            estimator,
            lane_tracker: LaneTracker::new(&config.lane),
            lane_change: LaneChangeDetector::new(config.lane.change_threshold_px),
            departure: LaneDepartureMonitor::new(),
            vehicle_x: config.lane.vehicle_x,
            signals: SignalDebouncer::new(config.signal.count_threshold),
            traffic_lights: TrafficLightDebouncer::new(config.signal.count_threshold),
            scenario: ScenarioEvaluator::new(config.scenario.clone()),
            events: EventBus::new(config.pipeline.event_bus_capacity),
            metrics: PipelineMetrics::new(),
            last_chunk_id: None,
            last_frames: Vec::new(),
            collaborators,
            config,
        })
    }

    pub async fn process_chunk(&mut self, input: ChunkInput) -> Result<ChunkResult, ChunkError> {
        let chunk_id = input.chunk_id;
        if let Some(last) = self.last_chunk_id {
            if chunk_id <= last {
                return Err(ChunkError::OutOfOrder {
                    last,
                    got: chunk_id,
                });
            }
        }
        self.last_chunk_id = Some(chunk_id);
        let started = Instant::now();

        let mut features = ChunkFeatures::new(chunk_id);
        self.classify_audio(chunk_id, &input.audio, &mut features)
            .await?;

        let indices = sample_indices(input.frames.len(), self.config.pipeline.sampled_frames);
        let mut contexts = Vec::with_capacity(indices.len());
        for &i in &indices {
            let ctx = self
                .process_frame(chunk_id, &input.frames[i], &mut features)
                .await?;
            contexts.push(ctx);
        }

        let status = self.signals.finish();
        features.left_signal_on = status.left_on;
        features.right_signal_on = status.right_on;
        features.hazard_on = status.hazard_on;
        features.traffic_light = self.traffic_lights.finish();
        features.tailgating = self.tailgating.is_tailgating();
        self.detect_lane_change(chunk_id, &contexts, &mut features);
        let last_center = contexts.iter().rev().find_map(|c| c.lane_center());
        features.lane_offset = match (last_center, self.vehicle_x) {
            (Some(center), Some(vx)) => center - vx,
            _ => 0.0,
        };
        debug!(
            "Chunk {}: {} frames sampled, indicator hits L={} R={}",
            chunk_id, status.frames, status.left_hits, status.right_hits
        );

        let kind = self.scenario.evaluate(&features);
        if kind.is_event() {
            info!("🚨 Chunk {}: [{}] {}", chunk_id, kind.id(), kind.message());
            self.metrics.inc(&self.metrics.scenario_events);
            self.events
                .publish(DrivingEvent::ScenarioDetected { chunk_id, kind });
        }

        self.metrics.inc(&self.metrics.chunks_processed);
        self.metrics.add(&self.metrics.frames_processed, contexts.len() as u64);
        self.metrics
            .set_timing(&self.metrics.chunk_time_us, started.elapsed().as_micros() as u64);
        let every = self.config.logging.status_every_chunks;
        if every > 0 && chunk_id % every == 0 {
            let s = self.metrics.summary();
            info!(
                "📊 Progress: {} chunks, {} frames, {} events, {} timeouts",
                s.chunks_processed, s.frames_processed, s.scenario_events, s.collaborator_timeouts
            );
        }
        self.last_frames = contexts;

        Ok(ChunkResult {
            chunk_id,
            scenario_id: kind.id(),
            scenario: kind,
            message: kind.message().to_string(),
            features,
        })
    }

    async fn classify_audio(
        &mut self,
        chunk_id: u64,
        samples: &[f32],
        features: &mut ChunkFeatures,
    ) -> Result<(), ChunkError> {
        let detection = guarded(
            Collaborator::AudioClassifier,
            self.timeout,
            self.collaborators.audio.classify(chunk_id, samples),
        )
        .await
        .map_err(|source| ChunkError::Collaborator { chunk_id, source })?;

        let detection = match detection {
            Some(d) => d,
            None => {
                self.record_timeout(chunk_id, Collaborator::AudioClassifier);
                None
            }
        };
        let Some(d) = detection else {
            return Ok(());
        };
        if d.confidence < self.config.pipeline.audio_threshold {
            debug!(
                "Chunk {}: audio {:?} at {:.2} below threshold",
                chunk_id, d.label, d.confidence
            );
            return Ok(());
        }
        match d.label {
            AudioLabel::Horn => features.horn = true,
            AudioLabel::Blinker => features.blinker_audio = true,
            AudioLabel::Wiper => features.wiper_audio = true,
            AudioLabel::Normal => {}
        }
        Ok(())
    }

    async fn process_frame(
        &mut self,
        chunk_id: u64,
        frame: &Frame,
        features: &mut ChunkFeatures,
    ) -> Result<FrameContext, ChunkError> {
        let mut ctx = FrameContext::new(frame.index, frame.timestamp_ms);
        self.frames_seen += 1;

        // ── Objects ──────────────────────────────────────────────
        let tracked = guarded(
            Collaborator::ObjectTracker,
            self.timeout,
            self.collaborators.tracker.track(frame),
        )
        .await
        .map_err(|source| ChunkError::Collaborator { chunk_id, source })?;
        let tracked = match tracked {
            Some(objects) => objects,
            None => {
                self.record_timeout(chunk_id, Collaborator::ObjectTracker);
                Vec::new()
            }
        };

        let classes = &self.config.classes;
        let mut nearest_light: Option<ProjectedObject> = None;
        for obj in &tracked {
            if obj.class_name == classes.pedestrian {
                features.pedestrian_present = true;
            } else if obj.class_name == classes.crosswalk_sign {
                features.crosswalk_sign_present = true;
            }

            if obj.class_name == classes.traffic_light {
                if let Some(p) = self.projector.project_elevated_object(obj, frame.height) {
                    let closer = nearest_light
                        .as_ref()
                        .map_or(true, |n| p.distance_forward_m < n.distance_forward_m);
                    if closer {
                        nearest_light = Some(p.clone());
                    }
                    ctx.objects.push(p);
                }
            } else if let Some(p) = self.projector.project_object(obj) {
                ctx.objects.push(p);
            }
        }

        ctx.threat_warning = self.threat.update(self.frames_seen, &ctx.objects);
        for warning in self.threat.warnings() {
            self.metrics.inc(&self.metrics.threat_warnings);
            self.events.publish(DrivingEvent::ThreatWarning {
                chunk_id,
                warning: warning.clone(),
            });
        }
        if self.sudden_stop.update(ctx.threat_warning) {
            features.sudden_stop = true;
        }

        let gate = self.config.threat.tailgating_distance_m;
        ctx.close_vehicle = ctx
            .objects
            .iter()
            .any(|o| self.threat.in_ego_lane(o) && o.distance_forward_m <= gate);
        self.tailgating.update(ctx.close_vehicle);

        // ── Lanes ────────────────────────────────────────────────
        let mask = guarded(
            Collaborator::LaneSegmenter,
            self.timeout,
            self.collaborators.lanes.segment(frame),
        )
        .await
        .map_err(|source| ChunkError::Collaborator { chunk_id, source })?;
        let mask = match mask {
            Some(m) => m,
            None => {
                self.record_timeout(chunk_id, Collaborator::LaneSegmenter);
                None
            }
        };

        ctx.raw_boundaries = match &mask {
            Some(m) => {
                let vx = self
                    .config
                    .lane
                    .vehicle_x
                    .unwrap_or(m.ncols() as f32 / 2.0);
                self.vehicle_x = Some(vx);
                self.estimator.estimate(m, vx)
            }
            None => RawBoundaries::NONE,
        };
        if ctx.raw_boundaries != RawBoundaries::NONE {
            self.metrics.inc(&self.metrics.frames_with_lanes);
        }
        ctx.vehicle_x = self.vehicle_x;
        ctx.lane_state = self.lane_tracker.update(ctx.raw_boundaries);

        if let Some(vx) = self.vehicle_x {
            ctx.departure =
                self.departure
                    .update(vx, ctx.lane_state.left_x, ctx.lane_state.right_x);
            if let Some(side) = ctx.departure {
                features.lane_departure.get_or_insert(side);
                self.metrics.inc(&self.metrics.lane_departures);
                self.events.publish(DrivingEvent::LaneDeparture {
                    chunk_id,
                    frame_index: frame.index,
                    side,
                });
            }
        }

        // ── Lights ───────────────────────────────────────────────
        let lights = &self.collaborators.lights;
        ctx.left_indicator = lights.indicator_lit(frame, &self.config.signal.left_roi);
        ctx.right_indicator = lights.indicator_lit(frame, &self.config.signal.right_roi);
        self.signals.record(ctx.left_indicator, ctx.right_indicator);

        ctx.traffic_light = nearest_light
            .as_ref()
            .and_then(|l| lights.light_color(frame, &l.object.bbox));
        self.traffic_lights.record(ctx.traffic_light);
        if let Some(light) = &nearest_light {
            let d = light.distance_forward_m;
            features.traffic_light_distance_m =
                Some(features.traffic_light_distance_m.map_or(d, |prev| prev.min(d)));
        }

        Ok(ctx)
    }

    /// One center comparison per chunk: the middle sampled frame against
    /// the previous chunk's middle frame.
    fn detect_lane_change(
        &mut self,
        chunk_id: u64,
        contexts: &[FrameContext],
        features: &mut ChunkFeatures,
    ) {
        let Some(mid) = contexts.get(contexts.len() / 2) else {
            return;
        };
        let Some(event) = self.lane_change.update(mid.frame_index, mid.lane_center()) else {
            return;
        };
        features.lane_change = true;
        features.lane_change_direction = Some(event.direction);
        self.metrics.inc(&self.metrics.lane_changes);
        self.events
            .publish(DrivingEvent::LaneChange { chunk_id, event });
    }

    fn record_timeout(&mut self, chunk_id: u64, collaborator: Collaborator) {
        self.metrics.inc(&self.metrics.collaborator_timeouts);
        self.events.publish(DrivingEvent::CollaboratorTimeout {
            chunk_id,
            collaborator,
        });
    }

    /// Per-frame details behind the most recent chunk result.
    pub fn last_chunk_frames(&self) -> &[FrameContext] {
        &self.last_frames
    }

    pub fn drain_events(&mut self) -> Vec<DrivingEvent> {
        self.events.drain()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn scenario_state(&self) -> &ScenarioState {
        self.scenario.state()
    }

    pub fn last_chunk_id(&self) -> Option<u64> {
        self.last_chunk_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
