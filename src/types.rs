use serde::{Deserialize, Serialize};

use crate::analysis::collision_analyzer::CollisionParams;
use crate::analysis::track_merger::TrackMergeConfig;
use crate::calibration::homography_solver::RansacConfig;
use crate::calibration::speed_annotator::SpeedConfig;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: CollisionParams,
    pub key_frames: KeyFrameConfig,
    pub tracking: TrackingConfig,
    pub calibration: CalibrationConfig,
    pub io: IoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyFrameConfig {
    pub padding_frames: u64,
}

impl Default for KeyFrameConfig {
    fn default() -> Self {
        Self { padding_frames: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Re-link fragmented track ids before analysis
    pub merge_tracks: bool,
    pub merge: TrackMergeConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            merge_tracks: true,
            merge: TrackMergeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// JSON file holding a list of homography pairs. No calibration when unset.
    pub pairs_path: Option<String>,
    /// Source video size, used to normalize pixel centers into [0,1]
    pub frame_width: f64,
    pub frame_height: f64,
    pub speed: SpeedConfig,
    pub ransac: RansacConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            pairs_path: None,
            frame_width: 1920.0,
            frame_height: 1080.0,
            speed: SpeedConfig::default(),
            ransac: RansacConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub input_dir: String,
    pub output_dir: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_dir: "detections".to_string(),
            output_dir: "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// DETECTIONS
// ============================================================================

/// Axis-aligned box in pixel space, top-left corner plus size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }
}

/// One detected object in one frame, as produced by the external detector + tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub frame_idx: u64,
    pub timestamp_ms: i64,
    /// None when the tracker did not assign an identity; such detections never pair
    pub track_id: Option<u32>,
    pub class_name: String,
    #[serde(default)]
    pub class_id: u32,
    pub confidence: f32,
    pub bbox_x: f64,
    pub bbox_y: f64,
    pub bbox_w: f64,
    pub bbox_h: f64,
    pub center_x: f64,
    pub center_y: f64,
    #[serde(default)]
    pub speed_mph: Option<f64>,
    /// Longitude, when calibrated
    #[serde(default)]
    pub world_x: Option<f64>,
    /// Latitude, when calibrated
    #[serde(default)]
    pub world_y: Option<f64>,
}

impl Detection {
    pub fn new(
        frame_idx: u64,
        timestamp_ms: i64,
        track_id: Option<u32>,
        class_name: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
    ) -> Self {
        let (center_x, center_y) = bbox.center();
        Self {
            frame_idx,
            timestamp_ms,
            track_id,
            class_name: class_name.into(),
            class_id: 0,
            confidence,
            bbox_x: bbox.x,
            bbox_y: bbox.y,
            bbox_w: bbox.w,
            bbox_h: bbox.h,
            center_x,
            center_y,
            speed_mph: None,
            world_x: None,
            world_y: None,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.bbox_x, self.bbox_y, self.bbox_w, self.bbox_h)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.center_x, self.center_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_center_is_derived_from_bbox() {
        let det = Detection::new(3, 100, Some(7), "car", 0.9, BoundingBox::new(10.0, 20.0, 40.0, 30.0));
        assert_eq!(det.center(), (30.0, 35.0));
        assert_eq!(det.bbox(), BoundingBox::new(10.0, 20.0, 40.0, 30.0));
    }

    #[test]
    fn test_detection_deserializes_without_optional_fields() {
        let json = r#"{
            "frame_idx": 12,
            "timestamp_ms": 400,
            "track_id": null,
            "class_name": "truck",
            "confidence": 0.55,
            "bbox_x": 1.0, "bbox_y": 2.0, "bbox_w": 3.0, "bbox_h": 4.0,
            "center_x": 2.5, "center_y": 4.0
        }"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.track_id, None);
        assert_eq!(det.class_id, 0);
        assert!(det.speed_mph.is_none());
        assert!(det.world_x.is_none() && det.world_y.is_none());
    }
}
