// src/pipeline/report.rs
//
// JSONL output: one line per analysed detection file.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::{AnalysisSummary, CollisionEvent, KeyFrames, NearMiss, TrajectoryPoint};

#[derive(Debug, Clone, Serialize)]
pub struct CollisionReport {
    #[serde(flatten)]
    pub event: CollisionEvent,
    pub key_frames: KeyFrames,
    pub trajectory_1: Vec<TrajectoryPoint>,
    pub trajectory_2: Vec<TrajectoryPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    pub source: String,
    pub tracks_merged: usize,
    pub speeds_annotated: usize,
    pub summary: AnalysisSummary,
    pub collisions: Vec<CollisionReport>,
    pub near_misses: Vec<NearMiss>,
}

pub struct ReportWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl ReportWriter {
    /// Create `<output_dir>/collisions_<YYYYmmdd_HHMMSS>.jsonl`.
    pub fn create(output_dir: &str) -> Result<Self> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output dir {}", output_dir))?;
        let path = Path::new(output_dir).join(format!(
            "collisions_{}.jsonl",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        info!("💾 Results will be written to: {}", path.display());

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn write(&mut self, report: &VideoReport) -> Result<()> {
        let json_line = serde_json::to_string(report)?;
        writeln!(self.writer, "{}", json_line)?;
        self.writer.flush()?;
        self.lines += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }
}
