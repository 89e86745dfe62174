// src/analysis/collision_analyzer.rs
//
// Finds vehicle collisions in one video's worth of tracked detections.
//
// Pipeline:
//   Detections → per-frame pairwise IoU / center distance
//              → per-pair interaction history (keyed by sorted track ids)
//              → temporal segmentation (gap ≤ persistence_frames)
//              → CollisionEvent per surviving segment, NearMiss otherwise
//              → significance filter (earliest impact first, max 3)
//
// The earliest collision is treated as the actual impact; later segments for
// the same vehicles are usually aftermath (cars resting against each other).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::geometry::{euclidean_distance, iou};
use crate::types::Detection;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionParams {
    /// A pair interacts when IoU is strictly above this
    pub iou_threshold: f64,
    /// ...or when the center distance (pixels) is strictly below this
    pub distance_threshold: f64,
    /// Largest frame gap that still continues a segment
    pub persistence_frames: u64,
    /// Minimum interacting frames for a segment to become a collision
    pub min_collision_frames: usize,
}

impl Default for CollisionParams {
    fn default() -> Self {
        Self {
            iou_threshold: 0.1,
            distance_threshold: 50.0,
            persistence_frames: 3,
            min_collision_frames: 2,
        }
    }
}

const SEVERE_IOU: f64 = 0.3;
const MODERATE_IOU: f64 = 0.15;

const SIGNIFICANT_IOU: f64 = 0.15;
const SIGNIFICANT_MIN_FRAMES: usize = 2;
const MAX_SIGNIFICANT_COLLISIONS: usize = 3;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    pub fn from_max_iou(max_iou: f64) -> Self {
        if max_iou > SEVERE_IOU {
            Self::Severe
        } else if max_iou > MODERATE_IOU {
            Self::Moderate
        } else {
            Self::Minor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    /// Always the smaller id of the pair
    pub track_id_1: u32,
    pub track_id_2: u32,
    pub first_contact_frame: u64,
    pub last_overlap_frame: u64,
    pub peak_overlap_frame: u64,
    pub max_iou: f64,
    pub min_distance: f64,
    pub duration_frames: usize,
    pub collision_frames: Vec<u64>,
    pub severity: Severity,
}

impl CollisionEvent {
    pub fn is_significant(&self) -> bool {
        self.max_iou > SIGNIFICANT_IOU && self.duration_frames >= SIGNIFICANT_MIN_FRAMES
    }
}

/// A pair that came close but never sustained a qualifying segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearMiss {
    pub track_id_1: u32,
    pub track_id_2: u32,
    pub closest_frame: u64,
    pub min_distance: f64,
    pub max_iou: f64,
    pub total_overlap_frames: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_detections: usize,
    /// Distinct frames holding at least one tracked detection
    pub total_frames: usize,
    pub unique_tracks: usize,
    /// Distinct colliding pairs before significance filtering
    pub collision_pairs: usize,
    pub collisions_before_filter: usize,
    pub parameters: CollisionParams,
}

impl AnalysisSummary {
    fn empty(params: &CollisionParams) -> Self {
        Self {
            total_detections: 0,
            total_frames: 0,
            unique_tracks: 0,
            collision_pairs: 0,
            collisions_before_filter: 0,
            parameters: *params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionAnalysisResult {
    pub collisions: Vec<CollisionEvent>,
    pub near_misses: Vec<NearMiss>,
    pub total_collisions: usize,
    pub total_near_misses: usize,
    pub summary: AnalysisSummary,
}

/// One frame in which a track pair was overlapping or close
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionRecord {
    pub frame: u64,
    pub iou: f64,
    pub distance: f64,
}

// ============================================================================
// INTERACTION HISTORY
// ============================================================================

/// Canonical key for an unordered track pair.
pub fn pair_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

/// Interaction records per track pair.
///
/// Histories built over disjoint frame ranges can be combined with
/// [`InteractionHistory::merge`] before segmentation, which must see each
/// pair's complete record list.
#[derive(Debug, Clone, Default)]
pub struct InteractionHistory {
    pairs: BTreeMap<(u32, u32), Vec<InteractionRecord>>,
}

impl InteractionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every frame of `detections` for interacting track pairs.
    /// Detections without a track id are ignored.
    pub fn from_detections(detections: &[Detection], params: &CollisionParams) -> Self {
        let mut history = Self::new();
        for (frame_idx, frame_dets) in group_by_frame(detections) {
            history.scan_frame(frame_idx, &frame_dets, params);
        }
        history
    }

    fn scan_frame(&mut self, frame_idx: u64, frame_dets: &[&Detection], params: &CollisionParams) {
        for (i, det1) in frame_dets.iter().enumerate() {
            for det2 in &frame_dets[i + 1..] {
                let (Some(t1), Some(t2)) = (det1.track_id, det2.track_id) else {
                    continue;
                };
                if t1 == t2 {
                    continue;
                }

                let overlap = iou(&det1.bbox(), &det2.bbox());
                let distance = euclidean_distance(det1.center(), det2.center());

                if overlap > params.iou_threshold || distance < params.distance_threshold {
                    self.record(
                        t1,
                        t2,
                        InteractionRecord {
                            frame: frame_idx,
                            iou: overlap,
                            distance,
                        },
                    );
                }
            }
        }
    }

    pub fn record(&mut self, track_a: u32, track_b: u32, record: InteractionRecord) {
        self.pairs
            .entry(pair_key(track_a, track_b))
            .or_default()
            .push(record);
    }

    pub fn merge(&mut self, other: InteractionHistory) {
        for (key, records) in other.pairs {
            self.pairs.entry(key).or_default().extend(records);
        }
    }

    pub fn records(&self, track_a: u32, track_b: u32) -> Option<&[InteractionRecord]> {
        self.pairs
            .get(&pair_key(track_a, track_b))
            .map(|v| v.as_slice())
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Segment every pair's history into collisions, collecting near misses
    /// for pairs that never formed a qualifying segment. Collisions are
    /// returned unfiltered, in pair order.
    pub fn into_events(self, params: &CollisionParams) -> (Vec<CollisionEvent>, Vec<NearMiss>) {
        let mut collisions = Vec::new();
        let mut near_misses = Vec::new();

        for ((t1, t2), mut records) in self.pairs {
            if records.len() < params.min_collision_frames {
                continue;
            }

            records.sort_by_key(|r| r.frame);

            let segments = segment_records(
                &records,
                params.persistence_frames,
                params.min_collision_frames,
            );

            for segment in &segments {
                let event = build_collision(t1, t2, segment);
                debug!(
                    "Collision T{}↔T{} frames {}..{} peak={} iou={:.3} ({})",
                    t1,
                    t2,
                    event.first_contact_frame,
                    event.last_overlap_frame,
                    event.peak_overlap_frame,
                    event.max_iou,
                    event.severity.as_str()
                );
                collisions.push(event);
            }

            if segments.is_empty() && records.len() >= 2 {
                near_misses.push(build_near_miss(t1, t2, &records));
            }
        }

        (collisions, near_misses)
    }
}

fn group_by_frame(detections: &[Detection]) -> BTreeMap<u64, Vec<&Detection>> {
    let mut frames: BTreeMap<u64, Vec<&Detection>> = BTreeMap::new();
    for det in detections.iter().filter(|d| d.track_id.is_some()) {
        frames.entry(det.frame_idx).or_default().push(det);
    }
    frames
}

// ============================================================================
// SEGMENTATION
// ============================================================================

/// Split frame-sorted records into runs whose consecutive frames are at most
/// `persistence_frames` apart, keeping runs of at least `min_frames` records.
fn segment_records(
    records: &[InteractionRecord],
    persistence_frames: u64,
    min_frames: usize,
) -> Vec<&[InteractionRecord]> {
    let mut segments = Vec::new();
    if records.is_empty() {
        return segments;
    }

    let mut start = 0;
    for i in 1..records.len() {
        let gap = records[i].frame - records[i - 1].frame;
        if gap > persistence_frames {
            if i - start >= min_frames {
                segments.push(&records[start..i]);
            }
            start = i;
        }
    }
    if records.len() - start >= min_frames {
        segments.push(&records[start..]);
    }

    segments
}

fn build_collision(track_id_1: u32, track_id_2: u32, segment: &[InteractionRecord]) -> CollisionEvent {
    let first = segment[0];
    let last = segment[segment.len() - 1];

    // strict comparison keeps the first frame on ties
    let mut peak = first;
    let mut min_distance = first.distance;
    for r in &segment[1..] {
        if r.iou > peak.iou {
            peak = *r;
        }
        min_distance = min_distance.min(r.distance);
    }

    CollisionEvent {
        track_id_1,
        track_id_2,
        first_contact_frame: first.frame,
        last_overlap_frame: last.frame,
        peak_overlap_frame: peak.frame,
        max_iou: peak.iou,
        min_distance,
        duration_frames: segment.len(),
        collision_frames: segment.iter().map(|r| r.frame).collect(),
        severity: Severity::from_max_iou(peak.iou),
    }
}

fn build_near_miss(track_id_1: u32, track_id_2: u32, records: &[InteractionRecord]) -> NearMiss {
    let mut closest = records[0];
    let mut max_iou = records[0].iou;
    for r in &records[1..] {
        if r.distance < closest.distance {
            closest = *r;
        }
        max_iou = max_iou.max(r.iou);
    }

    NearMiss {
        track_id_1,
        track_id_2,
        closest_frame: closest.frame,
        min_distance: closest.distance,
        max_iou,
        total_overlap_frames: records.len(),
    }
}

// ============================================================================
// SIGNIFICANCE FILTER
// ============================================================================

/// Order collisions earliest-first (higher IoU first on equal frames) and keep
/// up to three significant ones. Falls back to the single earliest collision
/// when none qualify.
pub fn select_significant(mut collisions: Vec<CollisionEvent>) -> Vec<CollisionEvent> {
    if collisions.is_empty() {
        return collisions;
    }

    collisions.sort_by(|a, b| {
        a.first_contact_frame
            .cmp(&b.first_contact_frame)
            .then_with(|| b.max_iou.total_cmp(&a.max_iou))
    });

    let significant: Vec<CollisionEvent> = collisions
        .iter()
        .filter(|c| c.is_significant())
        .take(MAX_SIGNIFICANT_COLLISIONS)
        .cloned()
        .collect();

    if significant.is_empty() {
        collisions.truncate(1);
        collisions
    } else {
        significant
    }
}

// ============================================================================
// ENTRY POINT
// ============================================================================

pub fn analyze(detections: &[Detection], params: &CollisionParams) -> CollisionAnalysisResult {
    if detections.is_empty() {
        return CollisionAnalysisResult {
            collisions: Vec::new(),
            near_misses: Vec::new(),
            total_collisions: 0,
            total_near_misses: 0,
            summary: AnalysisSummary::empty(params),
        };
    }

    let total_frames = detections
        .iter()
        .filter(|d| d.track_id.is_some())
        .map(|d| d.frame_idx)
        .collect::<BTreeSet<_>>()
        .len();
    let unique_tracks = detections
        .iter()
        .filter_map(|d| d.track_id)
        .collect::<BTreeSet<_>>()
        .len();

    let history = InteractionHistory::from_detections(detections, params);
    if history.is_empty() {
        info!(
            "Collision analysis complete: no interacting pairs across {} frames",
            total_frames
        );
        return CollisionAnalysisResult {
            collisions: Vec::new(),
            near_misses: Vec::new(),
            total_collisions: 0,
            total_near_misses: 0,
            summary: AnalysisSummary {
                total_detections: detections.len(),
                total_frames,
                unique_tracks,
                ..AnalysisSummary::empty(params)
            },
        };
    }
    let interacting_pairs = history.pair_count();
    let (all_collisions, near_misses) = history.into_events(params);

    let collision_pairs = all_collisions
        .iter()
        .map(|c| (c.track_id_1, c.track_id_2))
        .collect::<BTreeSet<_>>()
        .len();
    let collisions_before_filter = all_collisions.len();

    let collisions = select_significant(all_collisions);

    info!(
        "Collision analysis complete: {} significant collisions ({} before filtering), \
         {} near-misses, {} interacting pairs across {} frames",
        collisions.len(),
        collisions_before_filter,
        near_misses.len(),
        interacting_pairs,
        total_frames
    );

    CollisionAnalysisResult {
        total_collisions: collisions.len(),
        total_near_misses: near_misses.len(),
        collisions,
        near_misses,
        summary: AnalysisSummary {
            total_detections: detections.len(),
            total_frames,
            unique_tracks,
            collision_pairs,
            collisions_before_filter,
            parameters: *params,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
