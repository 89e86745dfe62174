// src/lib.rs
//
// Collision detection over tracked vehicle detections, plus image → geo
// calibration for distances and speeds.

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod geometry;
pub mod pipeline;
pub mod types;

pub use analysis::{
    analyze, merge_fragmented_tracks, select_key_frames, track_trajectory,
    CollisionAnalysisResult, CollisionEvent, CollisionParams, KeyFrames, NearMiss, Severity,
};
pub use calibration::{
    annotate_speeds, solve_homography, solve_homography_with, transform_point, CalibrationError,
    DistanceEstimator, HomographyPair, HomographyResult,
};
pub use geometry::{euclidean_distance, haversine_distance, iou, GeoPoint};
pub use types::{BoundingBox, Config, Detection};
