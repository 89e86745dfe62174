// src/calibration/speed_annotator.rs
//
// Fills world position and speed on tracked detections once a calibration
// is available.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::distance_estimator::DistanceEstimator;
use crate::types::Detection;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Speed is measured against the detection this many positions earlier
    pub lookback_frames: usize,
    pub max_speed_mph: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            lookback_frames: 5,
            max_speed_mph: 150.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedAnnotationStats {
    pub geo_located: usize,
    pub speed_annotated: usize,
    pub projection_failures: usize,
}

pub fn annotate_speeds(
    detections: &mut [Detection],
    estimator: &DistanceEstimator,
    frame_width: f64,
    frame_height: f64,
    config: &SpeedConfig,
) -> SpeedAnnotationStats {
    let mut stats = SpeedAnnotationStats::default();
    if frame_width <= 0.0 || frame_height <= 0.0 {
        return stats;
    }
    let (fw, fh) = (frame_width, frame_height);

    let mut tracks: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, det) in detections.iter().enumerate() {
        if let Some(id) = det.track_id {
            tracks.entry(id).or_default().push(i);
        }
    }

    for (track_id, mut indices) in tracks {
        indices.sort_by_key(|&i| detections[i].frame_idx);

        for (pos, &i) in indices.iter().enumerate() {
            let current = (detections[i].center_x / fw, detections[i].center_y / fh);

            match estimator.image_to_geo(current.0, current.1) {
                Ok(geo) => {
                    detections[i].world_x = Some(geo.lng);
                    detections[i].world_y = Some(geo.lat);
                    stats.geo_located += 1;
                }
                Err(e) => {
                    debug!("Track {} frame {}: {}", track_id, detections[i].frame_idx, e);
                    stats.projection_failures += 1;
                    continue;
                }
            }

            if config.lookback_frames == 0 || pos < config.lookback_frames {
                continue;
            }
            let prev = &detections[indices[pos - config.lookback_frames]];
            let dt = (detections[i].timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
            if dt <= 0.0 {
                continue;
            }
            let previous = (prev.center_x / fw, prev.center_y / fh);

            match estimator.calculate_speed(previous, current, dt) {
                Ok(mph) => {
                    detections[i].speed_mph = Some(mph.min(config.max_speed_mph).max(0.0));
                    stats.speed_annotated += 1;
                }
                Err(e) => {
                    debug!("Track {} frame {}: {}", track_id, detections[i].frame_idx, e);
                }
            }
        }
    }

    info!(
        "Speed annotation: {} geo-located, {} with speed, {} projection failures",
        stats.geo_located, stats.speed_annotated, stats.projection_failures
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::distance_estimator::MPS_TO_MPH;
    use crate::geometry::{haversine_distance, GeoPoint};
    use crate::types::BoundingBox;
    use approx::assert_relative_eq;

    fn estimator() -> DistanceEstimator {
        DistanceEstimator::new(&[
            [0.001, 0.0, -122.4194],
            [0.0, 0.001, 37.7749],
            [0.0, 0.0, 1.0],
        ])
    }

    /// Track moving right by `step_px` per frame at 10 fps on a 1000x1000 frame
    fn moving_track(track: u32, frames: u64, step_px: f64) -> Vec<Detection> {
        (0..frames)
            .map(|f| {
                Detection::new(
                    f,
                    f as i64 * 100,
                    Some(track),
                    "car",
                    0.9,
                    BoundingBox::new(f as f64 * step_px, 500.0, 0.0, 0.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_lookback_and_world_position() {
        let mut dets = moving_track(1, 8, 10.0);
        // unordered input must not matter
        dets.reverse();
        let stats = annotate_speeds(&mut dets, &estimator(), 1000.0, 1000.0, &SpeedConfig::default());

        assert_eq!(stats.geo_located, 8);
        assert_eq!(stats.speed_annotated, 3);
        assert_eq!(stats.projection_failures, 0);

        dets.sort_by_key(|d| d.frame_idx);
        assert!(dets[..5].iter().all(|d| d.speed_mph.is_none()));
        assert!(dets[5..].iter().all(|d| d.speed_mph.is_some()));
        assert_relative_eq!(dets[0].world_x.unwrap(), -122.4194, epsilon = 1e-12);
        assert_relative_eq!(dets[0].world_y.unwrap(), 37.7754, epsilon = 1e-12);

        // 5 frames * 10 px = 0.05 of the frame in 0.5 s
        let meters = haversine_distance(
            &GeoPoint::new(37.7754, -122.4194),
            &GeoPoint::new(37.7754, -122.4194 + 0.00005),
        );
        assert_relative_eq!(dets[5].speed_mph.unwrap(), meters / 0.5 * MPS_TO_MPH, epsilon = 1e-6);
    }

    #[test]
    fn test_speed_is_clamped() {
        let mut dets = moving_track(3, 6, 200.0);
        let config = SpeedConfig {
            lookback_frames: 5,
            max_speed_mph: 20.0,
        };
        annotate_speeds(&mut dets, &estimator(), 1000.0, 1000.0, &config);
        assert_eq!(dets[5].speed_mph, Some(20.0));
    }

    #[test]
    fn test_untracked_and_zero_dt_skipped() {
        let mut dets = moving_track(2, 6, 10.0);
        for d in dets.iter_mut() {
            d.timestamp_ms = 0;
        }
        dets.push(Detection::new(3, 300, None, "car", 0.9, BoundingBox::new(0.0, 0.0, 1.0, 1.0)));

        let stats = annotate_speeds(&mut dets, &estimator(), 1000.0, 1000.0, &SpeedConfig::default());
        assert_eq!(stats.geo_located, 6);
        assert_eq!(stats.speed_annotated, 0);
        assert!(dets[6].world_x.is_none());
    }

    #[test]
    fn test_projection_failure_skips_detection() {
        // w = 1 - x vanishes on the right edge
        let est = DistanceEstimator::new(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-1.0, 0.0, 1.0]]);
        let mut dets = vec![
            Detection::new(0, 0, Some(1), "car", 0.9, BoundingBox::new(990.0, 0.0, 20.0, 0.0)),
            Detection::new(1, 100, Some(1), "car", 0.9, BoundingBox::new(100.0, 0.0, 0.0, 0.0)),
        ];
        let stats = annotate_speeds(&mut dets, &est, 1000.0, 1000.0, &SpeedConfig::default());
        assert_eq!(stats.projection_failures, 1);
        assert_eq!(stats.geo_located, 1);
        assert!(dets[0].world_x.is_none());
        assert!(dets[1].world_x.is_some());
    }
}
