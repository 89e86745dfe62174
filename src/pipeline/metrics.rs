// src/pipeline/metrics.rs
//
// Run counters for a batch of detection files. Logged at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AnalysisMetrics {
    pub files_processed: Arc<AtomicU64>,
    pub files_failed: Arc<AtomicU64>,
    /// Files analysed but whose report line could not be written
    pub reports_failed: Arc<AtomicU64>,
    pub detections_loaded: Arc<AtomicU64>,
    pub tracks_merged: Arc<AtomicU64>,
    pub speeds_annotated: Arc<AtomicU64>,
    pub collisions_found: Arc<AtomicU64>,
    pub near_misses_found: Arc<AtomicU64>,
    pub analysis_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for AnalysisMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        Self {
            files_processed: Arc::new(AtomicU64::new(0)),
            files_failed: Arc::new(AtomicU64::new(0)),
            reports_failed: Arc::new(AtomicU64::new(0)),
            detections_loaded: Arc::new(AtomicU64::new(0)),
            tracks_merged: Arc::new(AtomicU64::new(0)),
            speeds_annotated: Arc::new(AtomicU64::new(0)),
            collisions_found: Arc::new(AtomicU64::new(0)),
            near_misses_found: Arc::new(AtomicU64::new(0)),
            analysis_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn files_per_sec(&self) -> f64 {
        let files = self.files_processed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            files as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let processed = self.files_processed.load(Ordering::Relaxed);
        let total_us = self.analysis_time_us.load(Ordering::Relaxed);
        MetricsSummary {
            files_processed: processed,
            files_failed: self.files_failed.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            detections_loaded: self.detections_loaded.load(Ordering::Relaxed),
            tracks_merged: self.tracks_merged.load(Ordering::Relaxed),
            speeds_annotated: self.speeds_annotated.load(Ordering::Relaxed),
            collisions_found: self.collisions_found.load(Ordering::Relaxed),
            near_misses_found: self.near_misses_found.load(Ordering::Relaxed),
            avg_analysis_us: if processed > 0 { total_us / processed } else { 0 },
            files_per_sec: self.files_per_sec(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub files_processed: u64,
    pub files_failed: u64,
    pub reports_failed: u64,
    pub detections_loaded: u64,
    pub tracks_merged: u64,
    pub speeds_annotated: u64,
    pub collisions_found: u64,
    pub near_misses_found: u64,
    pub avg_analysis_us: u64,
    pub files_per_sec: f64,
    pub elapsed_secs: f64,
}
