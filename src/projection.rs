// src/projection.rs
//
// Image plane → bird's-eye-view projection and metric distances.
//
// Ground-plane objects are anchored at their bbox bottom-center. Objects
// hanging above the road (traffic lights) never touch the ground, so their
// anchor row is first pulled onto the calibrated part of the ground plane by
// linear interpolation between the far calibration row (image top) and the
// frame bottom.

use crate::error::ConfigError;
use crate::types::{ProjectedObject, ProjectionConfig, TrackedObject};
use nalgebra::{Matrix3, Vector3};

const EPS: f64 = 1e-9;
const MIN_DETERMINANT: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct GeometricProjector {
    h: Matrix3<f64>,
    pixels_per_meter_x: f64,
    pixels_per_meter_y: f64,
    ego_bev_x: f64,
    ego_bev_y: f64,
    calibration_y_far: f64,
}

impl GeometricProjector {
    pub fn new(config: &ProjectionConfig) -> Result<Self, ConfigError> {
        let rows = &config.homography;
        let h = Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2], //
            rows[1][0], rows[1][1], rows[1][2], //
            rows[2][0], rows[2][1], rows[2][2],
        );
        if h.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::NonFiniteHomography);
        }
        let determinant = h.determinant();
        if determinant.abs() < MIN_DETERMINANT {
            return Err(ConfigError::SingularHomography { determinant });
        }
        for (field, v) in [
            ("projection.pixels_per_meter_x", config.pixels_per_meter_x),
            ("projection.pixels_per_meter_y", config.pixels_per_meter_y),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(ConfigError::invalid(field, "must be a positive scale"));
            }
        }
        if !(config.calibration_y_far.is_finite() && config.calibration_y_far >= 0.0) {
            return Err(ConfigError::invalid(
                "projection.calibration_y_far",
                "must be a non-negative image row",
            ));
        }

        Ok(Self {
            h,
            pixels_per_meter_x: config.pixels_per_meter_x,
            pixels_per_meter_y: config.pixels_per_meter_y,
            ego_bev_x: config.ego_bev_x,
            ego_bev_y: config.ego_bev_y,
            calibration_y_far: config.calibration_y_far,
        })
    }

    /// `[bx, by, w] = H · [x, y, 1]`, then divide by `w`. Points on the
    /// horizon line (`w ≈ 0`) have no BEV position.
    pub fn project_point(&self, x: f32, y: f32) -> Option<(f64, f64)> {
        let v = self.h * Vector3::new(x as f64, y as f64, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= EPS || !v[0].is_finite() || !v[1].is_finite() {
            return None;
        }
        Some((v[0] / w, v[1] / w))
    }

    /// Forward (clamped ≥ 0) and signed lateral distance in meters for a
    /// point on the ground plane. Positive lateral is to the right.
    pub fn ground_distance(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let (bx, by) = self.project_point(x, y)?;
        let forward = ((self.ego_bev_y - by) / self.pixels_per_meter_y).max(0.0);
        let lateral = (bx - self.ego_bev_x) / self.pixels_per_meter_x;
        Some((forward as f32, lateral as f32))
    }

    /// Distance for an anchor that sits above the ground plane.
    pub fn elevated_distance(&self, x: f32, y: f32, frame_height: usize) -> Option<(f32, f32)> {
        let remapped = self.remap_elevated_row(y, frame_height);
        self.ground_distance(x, remapped)
    }

    fn remap_elevated_row(&self, y: f32, frame_height: usize) -> f32 {
        let height = frame_height as f64;
        if height <= 0.0 {
            return y;
        }
        let t = (y as f64 / height).clamp(0.0, 1.0);
        (self.calibration_y_far + t * (height - self.calibration_y_far)) as f32
    }

    pub fn project_object(&self, object: &TrackedObject) -> Option<ProjectedObject> {
        let (x, y) = object.bbox.bottom_center();
        let (forward, lateral) = self.ground_distance(x, y)?;
        Some(ProjectedObject {
            object: object.clone(),
            distance_forward_m: forward,
            distance_lateral_m: lateral,
        })
    }

    pub fn project_elevated_object(
        &self,
        object: &TrackedObject,
        frame_height: usize,
    ) -> Option<ProjectedObject> {
        let (x, y) = object.bbox.bottom_center();
        let (forward, lateral) = self.elevated_distance(x, y, frame_height)?;
        Some(ProjectedObject {
            object: object.clone(),
            distance_forward_m: forward,
            distance_lateral_m: lateral,
        })
    }
}
