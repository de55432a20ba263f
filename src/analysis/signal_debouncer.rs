// src/analysis/signal_debouncer.rs
//
// Per-chunk ON/OFF decisions from per-frame color-threshold hits.
//
// A blinking indicator is dark for roughly half of its cycle, and a single
// frame can light up from a reflection. Counting hits over the whole chunk
// and requiring `count_threshold` of them handles both.

use crate::types::LightColor;
use serde::Serialize;

/// Counts ON samples within one sampling window.
#[derive(Debug, Clone, Copy)]
pub struct WindowCounter {
    threshold: u32,
    on: u32,
    total: u32,
}

impl WindowCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            on: 0,
            total: 0,
        }
    }

    pub fn record(&mut self, hit: bool) {
        self.total += 1;
        if hit {
            self.on += 1;
        }
    }

    pub fn is_on(&self) -> bool {
        self.on >= self.threshold
    }

    pub fn on_count(&self) -> u32 {
        self.on
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn reset(&mut self) {
        self.on = 0;
        self.total = 0;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndicatorStatus {
    pub left_on: bool,
    pub right_on: bool,
    pub hazard_on: bool,
    pub left_hits: u32,
    pub right_hits: u32,
    pub frames: u32,
}

/// Left/right indicator debouncing for one chunk at a time.
#[derive(Debug, Clone)]
pub struct SignalDebouncer {
    left: WindowCounter,
    right: WindowCounter,
}

impl SignalDebouncer {
    pub fn new(count_threshold: u32) -> Self {
        Self {
            left: WindowCounter::new(count_threshold),
            right: WindowCounter::new(count_threshold),
        }
    }

    pub fn record(&mut self, left_hit: bool, right_hit: bool) {
        self.left.record(left_hit);
        self.right.record(right_hit);
    }

    /// Closes the window and starts a new one.
    pub fn finish(&mut self) -> IndicatorStatus {
        let left_on = self.left.is_on();
        let right_on = self.right.is_on();
        let status = IndicatorStatus {
            left_on,
            right_on,
            hazard_on: left_on && right_on,
            left_hits: self.left.on_count(),
            right_hits: self.right.on_count(),
            frames: self.left.total(),
        };
        self.left.reset();
        self.right.reset();
        status
    }
}

/// Same counting applied to the color of a detected traffic light.
#[derive(Debug, Clone)]
pub struct TrafficLightDebouncer {
    red: WindowCounter,
    green: WindowCounter,
}

impl TrafficLightDebouncer {
    pub fn new(count_threshold: u32) -> Self {
        Self {
            red: WindowCounter::new(count_threshold),
            green: WindowCounter::new(count_threshold),
        }
    }

    pub fn record(&mut self, color: Option<LightColor>) {
        self.red.record(color == Some(LightColor::Red));
        self.green.record(color == Some(LightColor::Green));
    }

    /// Red is reported if both colors pass the threshold.
    pub fn finish(&mut self) -> Option<LightColor> {
        let color = if self.red.is_on() {
            Some(LightColor::Red)
        } else if self.green.is_on() {
            Some(LightColor::Green)
        } else {
            None
        };
        self.red.reset();
        self.green.reset();
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_hits(debouncer: &mut SignalDebouncer, left_hits: usize) -> IndicatorStatus {
        for i in 0..20 {
            debouncer.record(i < left_hits, false);
        }
        debouncer.finish()
    }

    #[test]
    fn test_two_of_twenty_is_off() {
        let mut d = SignalDebouncer::new(3);
        let status = chunk_with_hits(&mut d, 2);
        assert!(!status.left_on);
        assert_eq!(status.left_hits, 2);
        assert_eq!(status.frames, 20);
    }

    #[test]
    fn test_three_of_twenty_is_on() {
        let mut d = SignalDebouncer::new(3);
        assert!(chunk_with_hits(&mut d, 3).left_on);
    }

    #[test]
    fn test_window_resets_between_chunks() {
        let mut d = SignalDebouncer::new(3);
        assert!(chunk_with_hits(&mut d, 2).left_hits == 2);
        // Hits from the previous chunk must not carry over.
        let status = chunk_with_hits(&mut d, 2);
        assert!(!status.left_on);
    }

    #[test]
    fn test_hazard_requires_both_sides() {
        let mut d = SignalDebouncer::new(3);
        for i in 0..20 {
            d.record(i % 2 == 0, i % 4 == 0);
        }
        let status = d.finish();
        assert!(status.left_on && status.right_on);
        assert!(status.hazard_on);

        for _ in 0..20 {
            d.record(true, false);
        }
        let status = d.finish();
        assert!(status.left_on);
        assert!(!status.hazard_on);
    }

    #[test]
    fn test_traffic_light_prefers_red() {
        let mut d = TrafficLightDebouncer::new(3);
        for _ in 0..3 {
            d.record(Some(LightColor::Green));
            d.record(Some(LightColor::Red));
        }
        assert_eq!(d.finish(), Some(LightColor::Red));

        d.record(Some(LightColor::Green));
        d.record(None);
        assert_eq!(d.finish(), None);
    }
}
