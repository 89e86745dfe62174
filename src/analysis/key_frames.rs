// src/analysis/key_frames.rs
//
// Picks the frames that best illustrate a collision for downstream
// screenshotting: approach, first contact, peak overlap, separation.

use serde::{Deserialize, Serialize};

use super::collision_analyzer::CollisionEvent;
use crate::types::Detection;

pub const DEFAULT_PADDING_FRAMES: u64 = 5;

/// Each unit of padding widens the look-around window by this many frames.
const PADDING_MULTIPLIER: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFrames {
    pub approach: u64,
    pub contact: u64,
    pub peak: u64,
    pub separation: u64,
}

/// Approach and separation are clamped to the frame range of the whole
/// detection set, not just the collision's own frames.
pub fn select_key_frames(
    detections: &[Detection],
    collision: &CollisionEvent,
    padding_frames: u64,
) -> KeyFrames {
    let first_frame = detections.iter().map(|d| d.frame_idx).min().unwrap_or(0);
    let last_frame = detections.iter().map(|d| d.frame_idx).max().unwrap_or(0);
    let window = padding_frames.saturating_mul(PADDING_MULTIPLIER);

    KeyFrames {
        approach: first_frame.max(collision.first_contact_frame.saturating_sub(window)),
        contact: collision.first_contact_frame,
        peak: collision.peak_overlap_frame,
        separation: last_frame.min(collision.last_overlap_frame.saturating_add(window)),
    }
}
