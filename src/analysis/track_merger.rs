// src/analysis/track_merger.rs
//
// Re-links track ids that the upstream tracker split for one vehicle.
//
// Two tracks are merged when:
//   - the later one starts after the earlier one ends (no temporal overlap)
//   - the frame gap between them is small
//   - the earlier track's last center is close to the later track's first center
//   - both carry the same class name

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::geometry::euclidean_distance;
use crate::types::Detection;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMergeConfig {
    /// Largest frame gap between the end of one track and the start of the next
    pub max_gap_frames: u64,
    /// Largest hand-over distance in pixels
    pub max_distance_px: f64,
}

impl Default for TrackMergeConfig {
    fn default() -> Self {
        Self {
            max_gap_frames: 10,
            max_distance_px: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackMerge {
    /// Id that disappears
    pub from: u32,
    /// Id it is folded into
    pub into: u32,
    pub gap_frames: u64,
    pub distance_px: f64,
}

struct TrackSpan<'a> {
    start_frame: u64,
    end_frame: u64,
    first: &'a Detection,
    last: &'a Detection,
}

fn track_spans(detections: &[Detection]) -> BTreeMap<u32, TrackSpan<'_>> {
    let mut spans: BTreeMap<u32, TrackSpan<'_>> = BTreeMap::new();
    for det in detections {
        let Some(id) = det.track_id else { continue };
        spans
            .entry(id)
            .and_modify(|span| {
                if det.frame_idx < span.start_frame {
                    span.start_frame = det.frame_idx;
                    span.first = det;
                }
                if det.frame_idx > span.end_frame {
                    span.end_frame = det.frame_idx;
                    span.last = det;
                }
            })
            .or_insert(TrackSpan {
                start_frame: det.frame_idx,
                end_frame: det.frame_idx,
                first: det,
                last: det,
            });
    }
    spans
}

/// Merge fragmented tracks in place and return the merges applied.
///
/// Candidates are visited in ascending id order; a track that has been merged
/// away is never used as a merge target, and the target's end frame is not
/// extended by what it absorbs.
pub fn merge_fragmented_tracks(
    detections: &mut [Detection],
    config: &TrackMergeConfig,
) -> Vec<TrackMerge> {
    let merges = {
        let spans = track_spans(detections);
        let ids: Vec<u32> = spans.keys().copied().collect();
        let mut merged_away: HashMap<u32, u32> = HashMap::new();
        let mut merges = Vec::new();

        for (i, &id1) in ids.iter().enumerate() {
            if merged_away.contains_key(&id1) {
                continue;
            }
            let track1 = &spans[&id1];

            for &id2 in &ids[i + 1..] {
                if merged_away.contains_key(&id2) {
                    continue;
                }
                let track2 = &spans[&id2];

                if track2.start_frame < track1.end_frame {
                    continue;
                }
                let gap = track2.start_frame - track1.end_frame;
                if gap > config.max_gap_frames {
                    continue;
                }

                let distance = euclidean_distance(track1.last.center(), track2.first.center());
                if distance > config.max_distance_px {
                    continue;
                }
                if track1.first.class_name != track2.first.class_name {
                    continue;
                }

                info!(
                    "Merging track {} into {} (gap: {} frames, distance: {:.1}px)",
                    id2, id1, gap, distance
                );
                merged_away.insert(id2, id1);
                merges.push(TrackMerge {
                    from: id2,
                    into: id1,
                    gap_frames: gap,
                    distance_px: distance,
                });
            }
        }
        merges
    };

    if !merges.is_empty() {
        let remap: HashMap<u32, u32> = merges.iter().map(|m| (m.from, m.into)).collect();
        for det in detections.iter_mut() {
            if let Some(id) = det.track_id {
                if let Some(&target) = remap.get(&id) {
                    det.track_id = Some(target);
                }
            }
        }
    }

    merges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn det(frame: u64, track: u32, x: f64, class: &str) -> Detection {
        Detection::new(frame, 0, Some(track), class, 0.8, BoundingBox::new(x, 100.0, 50.0, 50.0))
    }

    #[test]
    fn test_adjacent_fragment_is_merged() {
        let mut dets: Vec<Detection> = (0..10).map(|f| det(f, 1, f as f64 * 5.0, "car")).collect();
        dets.extend((15..25).map(|f| det(f, 2, f as f64 * 5.0, "car")));

        let merges = merge_fragmented_tracks(&mut dets, &TrackMergeConfig::default());
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].from, 2);
        assert_eq!(merges[0].into, 1);
        assert_eq!(merges[0].gap_frames, 6);
        assert!((merges[0].distance_px - 30.0).abs() < 1e-9);
        assert!(dets.iter().all(|d| d.track_id == Some(1)));
    }

    #[test]
    fn test_overlapping_tracks_not_merged() {
        let mut dets: Vec<Detection> = (0..10).map(|f| det(f, 1, 0.0, "car")).collect();
        dets.extend((5..15).map(|f| det(f, 2, 10.0, "car")));
        assert!(merge_fragmented_tracks(&mut dets, &TrackMergeConfig::default()).is_empty());
    }

    #[test]
    fn test_large_gap_not_merged() {
        let mut dets = vec![det(0, 1, 0.0, "car"), det(11, 2, 0.0, "car")];
        assert!(merge_fragmented_tracks(&mut dets, &TrackMergeConfig::default()).is_empty());

        let mut dets = vec![det(0, 1, 0.0, "car"), det(10, 2, 0.0, "car")];
        assert_eq!(merge_fragmented_tracks(&mut dets, &TrackMergeConfig::default()).len(), 1);
    }

    #[test]
    fn test_distant_or_other_class_not_merged() {
        let mut far = vec![det(0, 1, 0.0, "car"), det(2, 2, 150.0, "car")];
        assert!(merge_fragmented_tracks(&mut far, &TrackMergeConfig::default()).is_empty());

        let mut other_class = vec![det(0, 1, 0.0, "car"), det(2, 2, 0.0, "truck")];
        assert!(merge_fragmented_tracks(&mut other_class, &TrackMergeConfig::default()).is_empty());
        assert_eq!(other_class[1].track_id, Some(2));
    }

    #[test]
    fn test_several_fragments_fold_into_first() {
        let mut dets = vec![
            det(0, 1, 0.0, "car"),
            det(3, 2, 10.0, "car"),
            det(5, 3, 20.0, "car"),
            det(4, 7, 0.0, "car"),
        ];
        dets.push(Detection {
            track_id: None,
            ..det(4, 0, 0.0, "car")
        });

        let merges = merge_fragmented_tracks(&mut dets, &TrackMergeConfig::default());
        let pairs: Vec<(u32, u32)> = merges.iter().map(|m| (m.from, m.into)).collect();
        assert_eq!(pairs, vec![(2, 1), (3, 1), (7, 1)]);
        assert_eq!(dets[4].track_id, None);
    }
}
