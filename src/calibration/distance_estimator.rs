// src/calibration/distance_estimator.rs
//
// Real-world distances and speeds between image points, through a solved
// image → geo homography.

use nalgebra::{Matrix3, Vector2};

use super::homography_solver::{matrix_from_rows, project, HomographyResult};
use super::CalibrationError;
use crate::geometry::{haversine_distance, GeoPoint};

/// Meters per second → miles per hour
pub const MPS_TO_MPH: f64 = 2.23694;

#[derive(Debug, Clone)]
pub struct DistanceEstimator {
    matrix: Matrix3<f64>,
}

impl DistanceEstimator {
    pub fn new(matrix: &[[f64; 3]; 3]) -> Self {
        Self {
            matrix: matrix_from_rows(matrix),
        }
    }

    pub fn from_result(result: &HomographyResult) -> Self {
        Self::new(&result.matrix)
    }

    /// Normalized image coordinates (0..1) to latitude/longitude.
    pub fn image_to_geo(&self, x_norm: f64, y_norm: f64) -> Result<GeoPoint, CalibrationError> {
        let p = project(&self.matrix, &Vector2::new(x_norm, y_norm))
            .ok_or(CalibrationError::Projection { x_norm, y_norm })?;
        Ok(GeoPoint::new(p.y, p.x))
    }

    /// Ground distance in meters between two normalized image points.
    pub fn estimate_distance(
        &self,
        p1: (f64, f64),
        p2: (f64, f64),
    ) -> Result<f64, CalibrationError> {
        let g1 = self.image_to_geo(p1.0, p1.1)?;
        let g2 = self.image_to_geo(p2.0, p2.1)?;
        Ok(haversine_distance(&g1, &g2))
    }

    /// Speed in mph for a move from `p1` to `p2` over `time_delta_s` seconds.
    /// A non-positive time delta gives 0.0.
    pub fn calculate_speed(
        &self,
        p1: (f64, f64),
        p2: (f64, f64),
        time_delta_s: f64,
    ) -> Result<f64, CalibrationError> {
        if time_delta_s <= 0.0 {
            return Ok(0.0);
        }
        let meters = self.estimate_distance(p1, p2)?;
        Ok(meters / time_delta_s * MPS_TO_MPH)
    }
}
