// src/scenario.rs
//
// Chunk-level driving-event rules.
//
// One fixed priority table, first match wins:
//
//   10  horn + sudden stop, not tailgating     threatening sudden braking
//   12  horn + tailgating                      tailgating with horn
//    9  horn + pedestrian                      pedestrian-threat horn
//    8  horn + crosswalk sign + no pedestrian
//       + right signal                         horn at an empty crossing
//    5  lane change without a blinker          unsignaled lane change
//    4  blinker still on after a lane change   indicator left on
//
// The wiper + hazard check runs after the table and only replaces the
// "normal" result (7 the first time, 11 when repeated within the window).
//
// Cross-chunk memory is a plain `ScenarioState` value. `transition` is a
// pure function of (state, features); `ScenarioEvaluator` just owns the
// state between calls.

use crate::types::{ChunkFeatures, ScenarioConfig};
use serde::Serialize;
use tracing::debug;

// ============================================================================
// EVENT KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Normal,
    IndicatorLeftOn,
    UnsignaledLaneChange,
    SuggestHeadlights,
    HornAtEmptyCrossing,
    PedestrianThreatHorn,
    ThreateningSuddenBraking,
    HazardMisuseInRain,
    TailgatingWithHorn,
}

impl ScenarioKind {
    pub fn id(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::IndicatorLeftOn => 4,
            Self::UnsignaledLaneChange => 5,
            Self::SuggestHeadlights => 7,
            Self::HornAtEmptyCrossing => 8,
            Self::PedestrianThreatHorn => 9,
            Self::ThreateningSuddenBraking => 10,
            Self::HazardMisuseInRain => 11,
            Self::TailgatingWithHorn => 12,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Normal => "normal driving",
            Self::IndicatorLeftOn => "turn signal left on after the lane change",
            Self::UnsignaledLaneChange => "lane changed without a turn signal",
            Self::SuggestHeadlights => "wipers and hazard lights on: turn on headlights or fog lights",
            Self::HornAtEmptyCrossing => "horn used at a pedestrian crossing with no pedestrian while turning right",
            Self::PedestrianThreatHorn => "horn used near a pedestrian",
            Self::ThreateningSuddenBraking => "horn during sudden braking: threatening driving",
            Self::HazardMisuseInRain => "hazard lights repeatedly misused in the rain",
            Self::TailgatingWithHorn => "horn while tailgating: threatening driving",
        }
    }

    pub fn is_event(&self) -> bool {
        *self != Self::Normal
    }
}

// ============================================================================
// STATE
// ============================================================================

/// Memory carried from chunk to chunk for one video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioState {
    pub last_lane_change_chunk: Option<u64>,
    pub last_lane_change_used_blinker: bool,
    /// Consecutive post-change chunks with the blinker still on
    pub blinker_still_on_chunks: u32,
    pub last_wiper_hazard_chunk: Option<u64>,
    pub last_blinker_chunk: Option<u64>,
}

impl ScenarioState {
    fn forget_lane_change(&mut self) {
        self.last_lane_change_chunk = None;
        self.blinker_still_on_chunks = 0;
    }
}

// ============================================================================
// TRANSITION
// ============================================================================

/// `(state, features) → (state', event)`. Bookkeeping runs for every chunk;
/// only the choice of event is first-match.
pub fn transition(
    mut state: ScenarioState,
    features: &ChunkFeatures,
    config: &ScenarioConfig,
) -> (ScenarioState, ScenarioKind) {
    let chunk = features.chunk_id;
    let blinker_now = features.blinker_used();
    // A blinker in the chunk right before the change still counts as signaling.
    let blinker_before = chunk > 0 && state.last_blinker_chunk == Some(chunk - 1);
    let signaled = blinker_now || blinker_before;

    let blinker_stuck = if features.lane_change {
        state.last_lane_change_chunk = Some(chunk);
        state.last_lane_change_used_blinker = signaled;
        state.blinker_still_on_chunks = 0;
        false
    } else {
        blinker_stuck_step(&mut state, chunk, blinker_now, config)
    };
    if blinker_now {
        state.last_blinker_chunk = Some(chunk);
    }

    let f = features;
    let mut kind = if f.horn && f.sudden_stop && !f.tailgating {
        ScenarioKind::ThreateningSuddenBraking
    } else if f.horn && f.tailgating {
        ScenarioKind::TailgatingWithHorn
    } else if f.horn && f.pedestrian_present {
        ScenarioKind::PedestrianThreatHorn
    } else if f.horn && f.crosswalk_sign_present && !f.pedestrian_present && f.right_signal_on {
        ScenarioKind::HornAtEmptyCrossing
    } else if f.lane_change && !signaled {
        ScenarioKind::UnsignaledLaneChange
    } else if blinker_stuck {
        ScenarioKind::IndicatorLeftOn
    } else {
        ScenarioKind::Normal
    };

    if f.wiper_audio && f.hazard_on {
        let repeated = state
            .last_wiper_hazard_chunk
            .is_some_and(|last| chunk.saturating_sub(last) <= config.wiper_repeat_window);
        if kind == ScenarioKind::Normal {
            kind = if repeated {
                ScenarioKind::HazardMisuseInRain
            } else {
                ScenarioKind::SuggestHeadlights
            };
        }
        state.last_wiper_hazard_chunk = Some(chunk);
    }

    (state, kind)
}

/// Watches a blinker-signaled lane change for a blinker that stays on.
/// The change chunk itself is not counted. Any chunk with the blinker off,
/// or leaving the watch window, ends the watch for that change.
fn blinker_stuck_step(
    state: &mut ScenarioState,
    chunk: u64,
    blinker_now: bool,
    config: &ScenarioConfig,
) -> bool {
    let Some(change_chunk) = state.last_lane_change_chunk else {
        return false;
    };
    if !state.last_lane_change_used_blinker {
        return false;
    }
    if chunk.saturating_sub(change_chunk) > config.blinker_stuck_window || !blinker_now {
        state.forget_lane_change();
        return false;
    }

    state.blinker_still_on_chunks += 1;
    if state.blinker_still_on_chunks >= config.blinker_stuck_chunks {
        state.forget_lane_change();
        return true;
    }
    false
}

// ============================================================================
// EVALUATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScenarioEvaluator {
    config: ScenarioConfig,
    state: ScenarioState,
}

impl ScenarioEvaluator {
    pub fn new(config: ScenarioConfig) -> Self {
        Self {
            config,
            state: ScenarioState::default(),
        }
    }

    pub fn evaluate(&mut self, features: &ChunkFeatures) -> ScenarioKind {
        let (next, kind) = transition(self.state, features, &self.config);
        if next != self.state {
            debug!("Scenario state after chunk {}: {:?}", features.chunk_id, next);
        }
        self.state = next;
        kind
    }

    pub fn state(&self) -> &ScenarioState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(chunk_id: u64) -> ChunkFeatures {
        ChunkFeatures::new(chunk_id)
    }

    fn with_blinker(chunk_id: u64, on: bool) -> ChunkFeatures {
        ChunkFeatures {
            left_signal_on: on,
            ..features(chunk_id)
        }
    }

    fn evaluator() -> ScenarioEvaluator {
        ScenarioEvaluator::new(ScenarioConfig::default())
    }

    #[test]
    fn test_tailgating_beats_sudden_stop() {
        let mut e = evaluator();
        let f = ChunkFeatures {
            horn: true,
            tailgating: true,
            sudden_stop: true,
            ..features(1)
        };
        let kind = e.evaluate(&f);
        assert_eq!(kind, ScenarioKind::TailgatingWithHorn);
        assert_eq!(kind.id(), 12);
    }

    #[test]
    fn test_sudden_stop_with_horn() {
        let mut e = evaluator();
        let f = ChunkFeatures {
            horn: true,
            sudden_stop: true,
            pedestrian_present: true,
            ..features(1)
        };
        assert_eq!(e.evaluate(&f), ScenarioKind::ThreateningSuddenBraking);
    }

    #[test]
    fn test_horn_rules() {
        let mut e = evaluator();
        let ped = ChunkFeatures {
            horn: true,
            pedestrian_present: true,
            crosswalk_sign_present: true,
            right_signal_on: true,
            ..features(1)
        };
        assert_eq!(e.evaluate(&ped), ScenarioKind::PedestrianThreatHorn);

        let empty_crossing = ChunkFeatures {
            horn: true,
            crosswalk_sign_present: true,
            right_signal_on: true,
            ..features(2)
        };
        assert_eq!(e.evaluate(&empty_crossing), ScenarioKind::HornAtEmptyCrossing);

        let no_turn = ChunkFeatures {
            horn: true,
            crosswalk_sign_present: true,
            ..features(3)
        };
        assert_eq!(e.evaluate(&no_turn), ScenarioKind::Normal);
    }

    #[test]
    fn test_unsignaled_lane_change() {
        let mut e = evaluator();
        let f = ChunkFeatures {
            lane_change: true,
            ..features(3)
        };
        assert_eq!(e.evaluate(&f), ScenarioKind::UnsignaledLaneChange);

        let heard = ChunkFeatures {
            lane_change: true,
            blinker_audio: true,
            ..features(4)
        };
        assert_eq!(e.evaluate(&heard), ScenarioKind::Normal);
    }

    #[test]
    fn test_blinker_in_previous_chunk_counts() {
        let mut e = evaluator();
        e.evaluate(&with_blinker(2, true));
        let f = ChunkFeatures {
            lane_change: true,
            ..features(3)
        };
        assert_eq!(e.evaluate(&f), ScenarioKind::Normal);
        assert!(e.state().last_lane_change_used_blinker);
    }

    #[test]
    fn test_blinker_stuck_fires_on_second_chunk_after_change() {
        let mut e = evaluator();
        let change = ChunkFeatures {
            lane_change: true,
            ..with_blinker(5, true)
        };
        assert_eq!(e.evaluate(&change), ScenarioKind::Normal);
        assert_eq!(e.evaluate(&with_blinker(6, true)), ScenarioKind::Normal);
        let kind = e.evaluate(&with_blinker(7, true));
        assert_eq!(kind, ScenarioKind::IndicatorLeftOn);
        assert_eq!(kind.id(), 4);
        // Fires once per lane change.
        assert_eq!(e.evaluate(&with_blinker(8, true)), ScenarioKind::Normal);
    }

    #[test]
    fn test_blinker_off_cancels_stuck_watch() {
        let mut e = evaluator();
        let change = ChunkFeatures {
            lane_change: true,
            ..with_blinker(5, true)
        };
        e.evaluate(&change);
        assert_eq!(e.evaluate(&with_blinker(6, false)), ScenarioKind::Normal);
        for chunk in 7..12 {
            assert_eq!(e.evaluate(&with_blinker(chunk, true)), ScenarioKind::Normal);
        }
        assert_eq!(e.state().last_lane_change_chunk, None);
    }

    #[test]
    fn test_unsignaled_change_never_reports_stuck() {
        let mut e = evaluator();
        let change = ChunkFeatures {
            lane_change: true,
            ..features(5)
        };
        assert_eq!(e.evaluate(&change), ScenarioKind::UnsignaledLaneChange);
        // Blinker turned on only after the change.
        assert_eq!(e.evaluate(&with_blinker(6, true)), ScenarioKind::Normal);
        assert_eq!(e.evaluate(&with_blinker(7, true)), ScenarioKind::Normal);
    }

    #[test]
    fn test_wiper_hazard_first_then_repeated() {
        let mut e = evaluator();
        let wiper = |chunk| ChunkFeatures {
            wiper_audio: true,
            hazard_on: true,
            left_signal_on: true,
            right_signal_on: true,
            ..features(chunk)
        };
        assert_eq!(e.evaluate(&wiper(1)), ScenarioKind::SuggestHeadlights);
        assert_eq!(e.evaluate(&wiper(3)), ScenarioKind::HazardMisuseInRain);
        // Outside the 3-chunk window again.
        assert_eq!(e.evaluate(&wiper(7)), ScenarioKind::SuggestHeadlights);
    }

    #[test]
    fn test_wiper_never_overrides_a_rule_event() {
        let mut e = evaluator();
        let f = ChunkFeatures {
            wiper_audio: true,
            hazard_on: true,
            horn: true,
            pedestrian_present: true,
            ..features(1)
        };
        assert_eq!(e.evaluate(&f), ScenarioKind::PedestrianThreatHorn);
        // The occurrence is still remembered.
        assert_eq!(e.state().last_wiper_hazard_chunk, Some(1));
    }

    #[test]
    fn test_transition_is_pure() {
        let state = ScenarioState::default();
        let f = ChunkFeatures {
            lane_change: true,
            ..features(9)
        };
        let config = ScenarioConfig::default();
        let a = transition(state, &f, &config);
        let b = transition(state, &f, &config);
        assert_eq!(a, b);
        assert_eq!(state, ScenarioState::default());
    }
}
