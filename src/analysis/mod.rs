// src/analysis/mod.rs
//
// Collision analysis over a complete detection set for one video.
//
// Signal flow:
//   Tracked detections → track_merger (optional clean-up)
//                      → collision_analyzer → CollisionEvent / NearMiss
//                      → key_frames         → KeyFrames per collision
//   trajectory provides per-track position history for reports.

pub mod collision_analyzer;
pub mod key_frames;
pub mod track_merger;
pub mod trajectory;

pub use collision_analyzer::{
    analyze, pair_key, select_significant, AnalysisSummary, CollisionAnalysisResult,
    CollisionEvent, CollisionParams, InteractionHistory, InteractionRecord, NearMiss, Severity,
};
pub use key_frames::{select_key_frames, KeyFrames, DEFAULT_PADDING_FRAMES};
pub use track_merger::{merge_fragmented_tracks, TrackMerge, TrackMergeConfig};
pub use trajectory::{track_trajectory, TrajectoryPoint};
