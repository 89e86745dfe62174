// src/main.rs

use anyhow::Result;
use collision_detection::pipeline::{AnalysisMetrics, DetectionProcessor, ReportWriter};
use collision_detection::types::Config;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config_path =
        std::env::var("COLLISION_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("collision_detection={}", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Collision Detection Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Analysis thresholds: iou={:.2}, distance={:.1}px, persistence={} frames, min_frames={}",
        config.analysis.iou_threshold,
        config.analysis.distance_threshold,
        config.analysis.persistence_frames,
        config.analysis.min_collision_frames
    );

    let processor = DetectionProcessor::new(config.clone()).with_calibration()?;
    if processor.is_calibrated() {
        info!("✓ Calibration ready, speeds will be annotated");
    }

    let files = processor.find_detection_files()?;
    if files.is_empty() {
        warn!("No detection files found in {}", config.io.input_dir);
        return Ok(());
    }

    let mut writer = ReportWriter::create(&config.io.output_dir)?;
    let metrics = AnalysisMetrics::new();

    for (idx, path) in files.iter().enumerate() {
        info!("Processing {}/{}: {}", idx + 1, files.len(), path.display());

        match processor.process_file(path, &metrics) {
            Ok(report) => {
                info!(
                    "  {} detections, {} tracks, {} collisions, {} near misses",
                    report.summary.total_detections,
                    report.summary.unique_tracks,
                    report.collisions.len(),
                    report.near_misses.len()
                );
                if let Err(e) = writer.write(&report) {
                    error!("Failed to write report for {}: {:#}", path.display(), e);
                    metrics.inc(&metrics.reports_failed);
                }
            }
            Err(e) => {
                error!("Failed to process {}: {:#}", path.display(), e);
                metrics.inc(&metrics.files_failed);
            }
        }
    }

    let summary = metrics.summary();
    info!("========================================");
    info!(
        "✓ Done: {} files processed, {} failed, {} reports not written in {:.1}s",
        summary.files_processed,
        summary.files_failed,
        summary.reports_failed,
        summary.elapsed_secs
    );
    info!(
        "  {} collisions, {} near misses, {} tracks merged, {} speeds annotated",
        summary.collisions_found,
        summary.near_misses_found,
        summary.tracks_merged,
        summary.speeds_annotated
    );
    info!("  Report: {} ({} lines)", writer.path().display(), writer.lines_written());
    info!("Metrics: {}", serde_json::to_string(&summary)?);

    Ok(())
}
