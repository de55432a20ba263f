// src/pipeline/event_bus.rs
//
// Bounded queue of notable per-frame and per-chunk happenings. The chunk
// result is the contract; these events are for logs, overlays and alerting
// hooks that want the finer-grained story.

use crate::analysis::{DepartureSide, LaneChangeEvent, ThreatWarning};
use crate::error::Collaborator;
use crate::scenario::ScenarioKind;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum DrivingEvent {
    ThreatWarning {
        chunk_id: u64,
        warning: ThreatWarning,
    },

    LaneChange {
        chunk_id: u64,
        event: LaneChangeEvent,
    },

    LaneDeparture {
        chunk_id: u64,
        frame_index: u64,
        side: DepartureSide,
    },

    ScenarioDetected {
        chunk_id: u64,
        kind: ScenarioKind,
    },

    CollaboratorTimeout {
        chunk_id: u64,
        collaborator: Collaborator,
    },
}

pub struct EventBus {
    events: VecDeque<DrivingEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: DrivingEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<DrivingEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_bus_drops_oldest() {
        let mut bus = EventBus::new(2);
        for chunk_id in 1..=3 {
            bus.publish(DrivingEvent::ScenarioDetected {
                chunk_id,
                kind: ScenarioKind::UnsignaledLaneChange,
            });
        }
        assert_eq!(bus.pending_count(), 2);
        let drained = bus.drain();
        assert!(matches!(
            drained[0],
            DrivingEvent::ScenarioDetected { chunk_id: 2, .. }
        ));
        assert_eq!(bus.pending_count(), 0);
    }
}
