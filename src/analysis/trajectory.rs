// src/analysis/trajectory.rs

use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, Detection};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub frame: u64,
    pub timestamp_ms: i64,
    pub center_x: f64,
    pub center_y: f64,
    pub bbox: BoundingBox,
    pub speed_mph: Option<f64>,
    pub world_x: Option<f64>,
    pub world_y: Option<f64>,
}

impl From<&Detection> for TrajectoryPoint {
    fn from(det: &Detection) -> Self {
        Self {
            frame: det.frame_idx,
            timestamp_ms: det.timestamp_ms,
            center_x: det.center_x,
            center_y: det.center_y,
            bbox: det.bbox(),
            speed_mph: det.speed_mph,
            world_x: det.world_x,
            world_y: det.world_y,
        }
    }
}

/// All positions of one track, ordered by frame.
pub fn track_trajectory(detections: &[Detection], track_id: u32) -> Vec<TrajectoryPoint> {
    let mut track: Vec<&Detection> = detections
        .iter()
        .filter(|d| d.track_id == Some(track_id))
        .collect();
    track.sort_by_key(|d| d.frame_idx);
    track.into_iter().map(TrajectoryPoint::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trajectory_is_filtered_and_ordered() {
        let mut dets = Vec::new();
        for f in [5u64, 1, 3] {
            let mut d = Detection::new(
                f,
                f as i64 * 40,
                Some(9),
                "bus",
                0.7,
                BoundingBox::new(f as f64, 0.0, 10.0, 10.0),
            );
            d.speed_mph = Some(f as f64);
            dets.push(d);
        }
        dets.push(Detection::new(2, 80, Some(4), "car", 0.7, BoundingBox::new(0.0, 0.0, 5.0, 5.0)));
        dets.push(Detection::new(2, 80, None, "car", 0.7, BoundingBox::new(0.0, 0.0, 5.0, 5.0)));

        let traj = track_trajectory(&dets, 9);
        let frames: Vec<u64> = traj.iter().map(|p| p.frame).collect();
        assert_eq!(frames, vec![1, 3, 5]);
        assert_eq!(traj[1].timestamp_ms, 120);
        assert_eq!(traj[1].center_x, 8.0);
        assert_eq!(traj[2].speed_mph, Some(5.0));
    }

    #[test]
    fn test_unknown_track_is_empty() {
        let dets = vec![Detection::new(0, 0, Some(1), "car", 0.7, BoundingBox::new(0.0, 0.0, 5.0, 5.0))];
        assert!(track_trajectory(&dets, 2).is_empty());
    }
}
