// src/pipeline/mod.rs

pub mod metrics;
pub mod processor;
pub mod report;

pub use metrics::{AnalysisMetrics, MetricsSummary};
pub use processor::{load_calibration_pairs, load_detections, DetectionProcessor};
pub use report::{CollisionReport, ReportWriter, VideoReport};
