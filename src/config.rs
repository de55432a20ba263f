// src/config.rs

use crate::error::ConfigError;
use crate::projection::GeometricProjector;
use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast checks for every window, threshold and calibration value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Builds the projector once so a singular matrix is rejected here.
        GeometricProjector::new(&self.projection)?;

        let t = &self.threat;
        positive_f32("threat.lane_gate_m", t.lane_gate_m)?;
        at_least("threat.history_frames", t.history_frames, 1)?;
        at_least("threat.velocity_lookback", t.velocity_lookback as u64, 2)?;
        if t.min_samples < t.velocity_lookback {
            return Err(ConfigError::invalid(
                "threat.min_samples",
                format!(
                    "must be >= velocity_lookback ({}), got {}",
                    t.velocity_lookback, t.min_samples
                ),
            ));
        }
        // A track seen on every sampled frame holds at most history_frames + 1 samples.
        if t.min_samples as u64 > t.history_frames + 1 {
            return Err(ConfigError::invalid(
                "threat.min_samples",
                format!(
                    "can never be reached with history_frames = {}",
                    t.history_frames
                ),
            ));
        }
        positive_f32("threat.closing_velocity_m", t.closing_velocity_m)?;
        positive_f32("threat.critical_velocity_m", t.critical_velocity_m)?;
        if !t.emergency_distance_m.is_finite() || t.emergency_distance_m < 0.0 {
            return Err(ConfigError::invalid(
                "threat.emergency_distance_m",
                "must be a finite, non-negative distance",
            ));
        }
        at_least("threat.cooldown_frames", t.cooldown_frames, 1)?;
        at_least("threat.sustain_frames", t.sustain_frames as u64, 1)?;
        positive_f32("threat.tailgating_distance_m", t.tailgating_distance_m)?;
        at_least("threat.tailgating_frames", t.tailgating_frames as u64, 1)?;

        let l = &self.lane;
        at_least("lane.persistence_frames", l.persistence_frames as u64, 1)?;
        at_least("lane.confident_age", l.confident_age as u64, 1)?;
        if !(l.smooth_alpha > 0.0 && l.smooth_alpha <= 1.0) {
            return Err(ConfigError::invalid(
                "lane.smooth_alpha",
                format!("must be in (0, 1], got {}", l.smooth_alpha),
            ));
        }
        positive_f32("lane.change_threshold_px", l.change_threshold_px)?;
        unit_interval("lane.mask_threshold", l.mask_threshold)?;
        if let Some(x) = l.vehicle_x {
            if !x.is_finite() || x < 0.0 {
                return Err(ConfigError::invalid(
                    "lane.vehicle_x",
                    "must be a non-negative pixel column",
                ));
            }
        }

        let s = &self.signal;
        at_least("signal.count_threshold", s.count_threshold as u64, 1)?;
        for (field, roi) in [("signal.left_roi", &s.left_roi), ("signal.right_roi", &s.right_roi)] {
            if roi.width == 0 || roi.height == 0 {
                return Err(ConfigError::invalid(field, "roi must have a non-zero area"));
            }
        }
        // Indicator sides are told apart by their ROI.
        if s.left_roi == s.right_roi {
            return Err(ConfigError::invalid(
                "signal.right_roi",
                "must differ from signal.left_roi",
            ));
        }

        let sc = &self.scenario;
        at_least("scenario.wiper_repeat_window", sc.wiper_repeat_window, 1)?;
        at_least("scenario.blinker_stuck_window", sc.blinker_stuck_window, 1)?;
        at_least("scenario.blinker_stuck_chunks", sc.blinker_stuck_chunks as u64, 1)?;

        let p = &self.pipeline;
        positive_f32("pipeline.chunk_seconds", p.chunk_seconds)?;
        at_least("pipeline.sampled_frames", p.sampled_frames as u64, 1)?;
        unit_interval("pipeline.audio_threshold", p.audio_threshold)?;
        at_least("pipeline.audio_sample_rate", p.audio_sample_rate as u64, 1)?;
        at_least("pipeline.collaborator_timeout_ms", p.collaborator_timeout_ms, 1)?;
        at_least("pipeline.event_bus_capacity", p.event_bus_capacity as u64, 1)?;

        if self.classes.vehicles.is_empty() {
            return Err(ConfigError::invalid(
                "classes.vehicles",
                "at least one vehicle class is required",
            ));
        }

        Ok(())
    }
}

fn positive_f32(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a positive number, got {value}"),
        ))
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be within [0, 1], got {value}"),
        ))
    }
}

fn at_least(field: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be >= {min}, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml_str("threat:\n  cooldown_frames: 30\n").unwrap();
        assert_eq!(config.threat.cooldown_frames, 30);
        assert_eq!(config.threat.history_frames, 15);
        assert_eq!(config.lane.persistence_frames, 15);
        assert_eq!(config.scenario.wiper_repeat_window, 3);
    }

    #[test]
    fn test_shipped_config_file_parses() {
        let yaml = include_str!("../config.yaml");
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.signal.count_threshold, 3);
        assert_eq!(config.classes.vehicles.len(), 4);
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut config = Config::default();
        config.lane.persistence_frames = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "lane.persistence_frames",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_alpha_out_of_range() {
        let mut config = Config::default();
        config.lane.smooth_alpha = 1.5;
        assert!(config.validate().is_err());
        config.lane.smooth_alpha = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unreachable_min_samples() {
        let mut config = Config::default();
        config.threat.history_frames = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_identical_indicator_rois() {
        let mut config = Config::default();
        config.signal.right_roi = config.signal.left_roi;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "signal.right_roi",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_singular_homography() {
        let mut config = Config::default();
        config.projection.homography = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SingularHomography { .. })
        ));
    }

    #[test]
    fn test_invalid_yaml_fails_fast() {
        let result = Config::from_yaml_str("signal:\n  count_threshold: 0\n");
        assert!(result.is_err());
    }
}
