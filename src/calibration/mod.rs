// src/calibration/mod.rs
//
// Image ↔ geo calibration from user-picked point correspondences.
//
//   HomographyPair[] → homography_solver  → HomographyResult (3x3, lng=x, lat=y)
//   HomographyResult → distance_estimator → meters / mph between image points
//   Detections       → speed_annotator    → world_x / world_y / speed_mph

pub mod distance_estimator;
pub mod homography_solver;
pub mod speed_annotator;

pub use distance_estimator::{DistanceEstimator, MPS_TO_MPH};
pub use homography_solver::{
    solve_homography, solve_homography_with, transform_point, HomographyPair, HomographyResult,
    RansacConfig, MIN_PAIRS,
};
pub use speed_annotator::{annotate_speeds, SpeedAnnotationStats, SpeedConfig};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("at least {required} point pairs required for homography, got {provided}")]
    InsufficientData { required: usize, provided: usize },

    #[error("failed to calculate homography matrix: {0}")]
    Solver(String),

    #[error("point ({x_norm:.4}, {y_norm:.4}) projects to infinity")]
    Projection { x_norm: f64, y_norm: f64 },
}
