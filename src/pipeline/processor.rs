// src/pipeline/processor.rs
//
// Per-file driver used by the binary:
//   load detections → merge fragments → annotate speeds → analyze → report

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::metrics::AnalysisMetrics;
use super::report::{CollisionReport, VideoReport};
use crate::analysis::{analyze, merge_fragmented_tracks, select_key_frames, track_trajectory};
use crate::calibration::{
    annotate_speeds, solve_homography_with, DistanceEstimator, HomographyPair,
};
use crate::types::{Config, Detection};

pub struct DetectionProcessor {
    config: Config,
    estimator: Option<DistanceEstimator>,
}

impl DetectionProcessor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            estimator: None,
        }
    }

    /// Solve the calibration in `calibration.pairs_path`, when configured.
    pub fn with_calibration(mut self) -> Result<Self> {
        let Some(path) = self.config.calibration.pairs_path.clone() else {
            info!("No calibration configured, speeds will not be annotated");
            return Ok(self);
        };

        let pairs = load_calibration_pairs(Path::new(&path))?;
        let result = solve_homography_with(&pairs, &self.config.calibration.ransac)
            .with_context(|| format!("Calibration from {} failed", path))?;
        if result.inlier_count < pairs.len() {
            warn!(
                "Calibration: {} of {} point pairs rejected as outliers",
                pairs.len() - result.inlier_count,
                pairs.len()
            );
        }
        self.estimator = Some(DistanceEstimator::from_result(&result));
        Ok(self)
    }

    pub fn is_calibrated(&self) -> bool {
        self.estimator.is_some()
    }

    /// Every `*.json` file under `io.input_dir`, sorted.
    pub fn find_detection_files(&self) -> Result<Vec<PathBuf>> {
        let input_dir = &self.config.io.input_dir;
        if !Path::new(input_dir).is_dir() {
            anyhow::bail!("Input directory {} does not exist", input_dir);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(input_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if entry.file_type().is_file() && is_json {
                files.push(path.to_path_buf());
            }
        }
        files.sort();

        info!("Found {} detection files", files.len());
        Ok(files)
    }

    pub fn process_file(&self, path: &Path, metrics: &AnalysisMetrics) -> Result<VideoReport> {
        let detections = load_detections(path)?;
        metrics.add(&metrics.detections_loaded, detections.len() as u64);
        let report = self.process_detections(&path.display().to_string(), detections, metrics);
        metrics.inc(&metrics.files_processed);
        Ok(report)
    }

    pub fn process_detections(
        &self,
        source: &str,
        mut detections: Vec<Detection>,
        metrics: &AnalysisMetrics,
    ) -> VideoReport {
        let started = Instant::now();

        let tracks_merged = if self.config.tracking.merge_tracks {
            merge_fragmented_tracks(&mut detections, &self.config.tracking.merge).len()
        } else {
            0
        };

        let speeds_annotated = match &self.estimator {
            Some(estimator) => {
                let calibration = &self.config.calibration;
                annotate_speeds(
                    &mut detections,
                    estimator,
                    calibration.frame_width,
                    calibration.frame_height,
                    &calibration.speed,
                )
                .speed_annotated
            }
            None => 0,
        };

        let result = analyze(&detections, &self.config.analysis);
        let padding = self.config.key_frames.padding_frames;

        let collisions: Vec<CollisionReport> = result
            .collisions
            .iter()
            .map(|c| {
                debug!(
                    "{}: tracks {}/{} collide at frame {} ({})",
                    source,
                    c.track_id_1,
                    c.track_id_2,
                    c.first_contact_frame,
                    c.severity.as_str()
                );
                CollisionReport {
                    event: c.clone(),
                    key_frames: select_key_frames(&detections, c, padding),
                    trajectory_1: track_trajectory(&detections, c.track_id_1),
                    trajectory_2: track_trajectory(&detections, c.track_id_2),
                }
            })
            .collect();

        metrics.add(&metrics.tracks_merged, tracks_merged as u64);
        metrics.add(&metrics.speeds_annotated, speeds_annotated as u64);
        metrics.add(&metrics.collisions_found, collisions.len() as u64);
        metrics.add(&metrics.near_misses_found, result.near_misses.len() as u64);
        metrics.add(
            &metrics.analysis_time_us,
            started.elapsed().as_micros() as u64,
        );

        VideoReport {
            source: source.to_string(),
            tracks_merged,
            speeds_annotated,
            summary: result.summary,
            collisions,
            near_misses: result.near_misses,
        }
    }
}

/// A detection file is a JSON array of detections.
pub fn load_detections(path: &Path) -> Result<Vec<Detection>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse detections in {}", path.display()))
}

/// A calibration file is a JSON array of point pairs.
pub fn load_calibration_pairs(path: &Path) -> Result<Vec<HomographyPair>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse calibration pairs in {}", path.display()))
}
