// src/geometry.rs
//
// Stateless geometry shared by the collision analyzer and the calibration
// layer: box overlap, pixel distance and great-circle distance.

use serde::{Deserialize, Serialize};

use crate::types::BoundingBox;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

// ============================================================================
// IoU COMPUTATION
// ============================================================================

/// Intersection over union of two `(x, y, w, h)` boxes, always in `[0, 1]`.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let inter_x1 = a.x.max(b.x);
    let inter_y1 = a.y.max(b.y);
    let inter_x2 = (a.x + a.w).min(b.x + b.w);
    let inter_y2 = (a.y + a.h).min(b.y + b.h);

    if inter_x2 <= inter_x1 || inter_y2 <= inter_y1 {
        return 0.0;
    }

    let inter = (inter_x2 - inter_x1) * (inter_y2 - inter_y1);
    let union = a.area() + b.area() - inter;

    if union > 0.0 {
        (inter / union).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn euclidean_distance(p1: (f64, f64), p2: (f64, f64)) -> f64 {
    let dx = p1.0 - p2.0;
    let dy = p1.1 - p2.1;
    (dx * dx + dy * dy).sqrt()
}

/// Great-circle distance in meters.
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}
