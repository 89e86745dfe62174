// src/calibration/homography_solver.rs
//
// Fits the projective transform from normalized image coordinates to
// geographic coordinates (lng as x, lat as y).
//
// Algorithm:
//   1. Order pairs by order_idx.
//   2. Exactly four pairs: direct normalized DLT.
//      More pairs: RANSAC over minimal 4-point samples, seeded StdRng,
//      adaptive iteration count, then a DLT refit on the best inlier set.
//   3. Inlier mask and mean reprojection error over inliers.
//
// Samples with three collinear points (in either space) are rejected; a point
// set where every sample is degenerate fails with CalibrationError::Solver.

use nalgebra::{DMatrix, Matrix3, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;
use tracing::{debug, info};

use super::CalibrationError;

pub const MIN_PAIRS: usize = 4;

const EPS: f64 = 1e-12;
/// Minimum |sin| of the angle spanned by three sample points
const COLLINEAR_TOL: f64 = 1e-6;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Inlier gate, in destination (geo) units
    pub reproj_threshold: f64,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            reproj_threshold: 5.0,
            confidence: 0.995,
            seed: 0x00C0_FFEE,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// One calibration correspondence: a point clicked on the video frame and the
/// same point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomographyPair {
    pub x_norm: f64,
    pub y_norm: f64,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub order_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomographyResult {
    /// Row-major, normalized so that matrix[2][2] == 1
    pub matrix: [[f64; 3]; 3],
    /// Mean error over inliers; infinite when there are none
    pub reprojection_error: f64,
    pub inlier_count: usize,
    /// One flag per pair, in order_idx order
    pub inlier_mask: Vec<bool>,
}

// ============================================================================
// SOLVER
// ============================================================================

pub fn solve_homography(pairs: &[HomographyPair]) -> Result<HomographyResult, CalibrationError> {
    solve_homography_with(pairs, &RansacConfig::default())
}

pub fn solve_homography_with(
    pairs: &[HomographyPair],
    config: &RansacConfig,
) -> Result<HomographyResult, CalibrationError> {
    if pairs.len() < MIN_PAIRS {
        return Err(CalibrationError::InsufficientData {
            required: MIN_PAIRS,
            provided: pairs.len(),
        });
    }

    let mut ordered: Vec<&HomographyPair> = pairs.iter().collect();
    ordered.sort_by_key(|p| p.order_idx);

    let src: Vec<Vector2<f64>> = ordered
        .iter()
        .map(|p| Vector2::new(p.x_norm, p.y_norm))
        .collect();
    let dst: Vec<Vector2<f64>> = ordered.iter().map(|p| Vector2::new(p.lng, p.lat)).collect();

    let h = if src.len() == MIN_PAIRS {
        let all: Vec<usize> = (0..MIN_PAIRS).collect();
        if is_degenerate_sample(&src, &dst, &all) {
            return Err(CalibrationError::Solver(
                "calibration points are collinear".to_string(),
            ));
        }
        fit_dlt(&src, &dst, &all)
            .ok_or_else(|| CalibrationError::Solver("DLT fit failed".to_string()))?
    } else {
        ransac(&src, &dst, config).ok_or_else(|| {
            CalibrationError::Solver("no non-degenerate sample found".to_string())
        })?
    };

    let errors = reprojection_errors(&h, &src, &dst);
    let inlier_mask: Vec<bool> = errors.iter().map(|&e| e <= config.reproj_threshold).collect();
    let inlier_count = inlier_mask.iter().filter(|&&m| m).count();

    let reprojection_error = if inlier_count == 0 {
        f64::INFINITY
    } else {
        errors
            .iter()
            .zip(&inlier_mask)
            .filter_map(|(e, inlier)| inlier.then_some(*e))
            .sum::<f64>()
            / inlier_count as f64
    };

    info!(
        "Homography solved: {}/{} inliers, reprojection error {:.3e}",
        inlier_count,
        src.len(),
        reprojection_error
    );

    Ok(HomographyResult {
        matrix: matrix_to_rows(&h),
        reprojection_error,
        inlier_count,
        inlier_mask,
    })
}

/// Map one normalized image point through a solved matrix, returning `(lng, lat)`.
pub fn transform_point(
    matrix: &[[f64; 3]; 3],
    x_norm: f64,
    y_norm: f64,
) -> Result<(f64, f64), CalibrationError> {
    let h = matrix_from_rows(matrix);
    project(&h, &Vector2::new(x_norm, y_norm))
        .map(|p| (p.x, p.y))
        .ok_or(CalibrationError::Projection { x_norm, y_norm })
}

fn ransac(src: &[Vector2<f64>], dst: &[Vector2<f64>], config: &RansacConfig) -> Option<Matrix3<f64>> {
    let n = src.len();
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best: Option<(Matrix3<f64>, usize, f64)> = None;
    let mut iters_needed = config.max_iters;
    let mut iter = 0;

    while iter < iters_needed {
        iter += 1;

        let idx = sample(&mut rng, n, MIN_PAIRS).into_vec();
        if is_degenerate_sample(src, dst, &idx) {
            continue;
        }
        let Some(h) = fit_dlt(src, dst, &idx) else {
            continue;
        };

        let (count, err_sum) = score(&h, src, dst, config.reproj_threshold);
        let better = match &best {
            None => true,
            Some((_, best_count, best_err)) => {
                count > *best_count || (count == *best_count && err_sum < *best_err)
            }
        };
        if better {
            best = Some((h, count, err_sum));
            iters_needed = iters_needed.min(adaptive_iterations(
                count,
                n,
                config.confidence,
                config.max_iters,
            ));
        }
    }

    let (h, count, _) = best?;
    debug!("RANSAC: {} iterations, best sample has {} inliers", iter, count);

    let errors = reprojection_errors(&h, src, dst);
    let inliers: Vec<usize> = (0..n)
        .filter(|&i| errors[i] <= config.reproj_threshold)
        .collect();
    if inliers.len() <= MIN_PAIRS {
        return Some(h);
    }

    // keep the refit only if it does not lose support
    match fit_dlt(src, dst, &inliers) {
        Some(refit) if score(&refit, src, dst, config.reproj_threshold).0 >= count => Some(refit),
        _ => Some(h),
    }
}

fn adaptive_iterations(inliers: usize, total: usize, confidence: f64, max_iters: usize) -> usize {
    let w = inliers as f64 / total as f64;
    let p_good = w.powi(MIN_PAIRS as i32);
    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let denom = (1.0 - p_good).max(f64::MIN_POSITIVE).ln();
    if denom >= 0.0 {
        return max_iters;
    }
    let needed = (num / denom).ceil();
    if needed.is_finite() && needed < max_iters as f64 {
        needed.max(1.0) as usize
    } else {
        max_iters
    }
}

fn score(h: &Matrix3<f64>, src: &[Vector2<f64>], dst: &[Vector2<f64>], threshold: f64) -> (usize, f64) {
    reprojection_errors(h, src, dst)
        .into_iter()
        .filter(|&e| e <= threshold)
        .fold((0, 0.0), |(count, sum), e| (count + 1, sum + e))
}

fn reprojection_errors(h: &Matrix3<f64>, src: &[Vector2<f64>], dst: &[Vector2<f64>]) -> Vec<f64> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| match project(h, s) {
            Some(p) => (p - d).norm(),
            None => f64::INFINITY,
        })
        .collect()
}

// ============================================================================
// DLT
// ============================================================================

/// Apply a homography to a point. None when the point maps to infinity.
pub(crate) fn project(h: &Matrix3<f64>, p: &Vector2<f64>) -> Option<Vector2<f64>> {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    let w = v.z;
    if !w.is_finite() || w.abs() <= EPS || !v.x.is_finite() || !v.y.is_finite() {
        return None;
    }
    Some(Vector2::new(v.x / w, v.y / w))
}

/// Hartley normalization: centroid to origin, mean distance sqrt(2).
fn normalization(points: &[Vector2<f64>], idx: &[usize]) -> Option<Matrix3<f64>> {
    let n = idx.len() as f64;
    let centroid = idx
        .iter()
        .fold(Vector2::zeros(), |acc: Vector2<f64>, &i| acc + points[i])
        / n;
    let mean_dist = idx.iter().map(|&i| (points[i] - centroid).norm()).sum::<f64>() / n;
    if !mean_dist.is_finite() || mean_dist <= EPS {
        return None;
    }
    let s = SQRT_2 / mean_dist;
    Some(Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

fn fit_dlt(src: &[Vector2<f64>], dst: &[Vector2<f64>], idx: &[usize]) -> Option<Matrix3<f64>> {
    let t_src = normalization(src, idx)?;
    let t_dst = normalization(dst, idx)?;

    // pad to at least 9 rows so the SVD exposes the full right null space
    let rows = (2 * idx.len()).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (k, &i) in idx.iter().enumerate() {
        let p = (t_src * Vector3::new(src[i].x, src[i].y, 1.0)).xy();
        let q = (t_dst * Vector3::new(dst[i].x, dst[i].y, 1.0)).xy();
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);
        a.row_mut(2 * k)
            .copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]);
        a.row_mut(2 * k + 1)
            .copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = v_t.row(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let h = t_dst.try_inverse()? * h_norm * t_src;
    let scale = h[(2, 2)];
    if !scale.is_finite() || scale.abs() <= EPS * h.amax() {
        return None;
    }
    let h = h / scale;
    h.iter().all(|v| v.is_finite()).then_some(h)
}

fn is_degenerate_sample(src: &[Vector2<f64>], dst: &[Vector2<f64>], idx: &[usize]) -> bool {
    has_collinear_triple(src, idx) || has_collinear_triple(dst, idx)
}

fn has_collinear_triple(points: &[Vector2<f64>], idx: &[usize]) -> bool {
    for a in 0..idx.len() {
        for b in a + 1..idx.len() {
            for c in b + 1..idx.len() {
                let u = points[idx[b]] - points[idx[a]];
                let v = points[idx[c]] - points[idx[a]];
                let scale = u.norm() * v.norm();
                let cross = u.x * v.y - u.y * v.x;
                if scale <= f64::MIN_POSITIVE || cross.abs() <= COLLINEAR_TOL * scale {
                    return true;
                }
            }
        }
    }
    false
}

fn matrix_to_rows(h: &Matrix3<f64>) -> [[f64; 3]; 3] {
    let mut rows = [[0.0; 3]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = h[(r, c)];
        }
    }
    rows
}

pub(crate) fn matrix_from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|r, c| rows[r][c])
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Plausible street-corner calibration around San Francisco
    fn geo_truth() -> Matrix3<f64> {
        Matrix3::new(
            0.0020, 0.0004, -122.4194, //
            -0.0001, -0.0015, 37.7749, //
            0.05, 0.3, 1.0,
        )
    }

    fn pairs_from(h: &Matrix3<f64>, image: &[(f64, f64)]) -> Vec<HomographyPair> {
        image
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                let p = project(h, &Vector2::new(x, y)).unwrap();
                HomographyPair {
                    x_norm: x,
                    y_norm: y,
                    lat: p.y,
                    lng: p.x,
                    order_idx: i as u32,
                }
            })
            .collect()
    }

    const CORNERS: [(f64, f64); 4] = [(0.1, 0.1), (0.9, 0.1), (0.9, 0.9), (0.1, 0.9)];

    #[test]
    fn test_four_exact_pairs_reproduce_points() {
        let pairs = pairs_from(&geo_truth(), &CORNERS);
        let result = solve_homography(&pairs).unwrap();

        assert_eq!(result.inlier_count, 4);
        assert_eq!(result.inlier_mask, vec![true; 4]);
        assert!(result.reprojection_error < 1e-8, "{}", result.reprojection_error);
        assert_eq!(result.matrix[2][2], 1.0);

        let solved = matrix_from_rows(&result.matrix);
        assert_relative_eq!(solved, geo_truth(), epsilon = 1e-6);

        for pair in &pairs {
            let (lng, lat) = transform_point(&result.matrix, pair.x_norm, pair.y_norm).unwrap();
            assert_relative_eq!(lng, pair.lng, epsilon = 1e-8);
            assert_relative_eq!(lat, pair.lat, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_too_few_pairs() {
        let pairs = pairs_from(&geo_truth(), &CORNERS[..3]);
        assert_eq!(
            solve_homography(&pairs),
            Err(CalibrationError::InsufficientData {
                required: 4,
                provided: 3
            })
        );
    }

    #[test]
    fn test_collinear_pairs_fail() {
        let line = [(0.1, 0.1), (0.2, 0.2), (0.3, 0.3), (0.4, 0.4)];
        let pairs = pairs_from(&geo_truth(), &line);
        assert!(matches!(solve_homography(&pairs), Err(CalibrationError::Solver(_))));

        let longer = [(0.1, 0.1), (0.2, 0.2), (0.3, 0.3), (0.4, 0.4), (0.6, 0.6)];
        let pairs = pairs_from(&geo_truth(), &longer);
        assert!(matches!(solve_homography(&pairs), Err(CalibrationError::Solver(_))));
    }

    #[test]
    fn test_ransac_rejects_outlier() {
        // local planar frame in meters so the 5-unit gate is meaningful
        let truth = Matrix3::new(80.0, 10.0, 5.0, -5.0, 60.0, 2.0, 0.1, 0.2, 1.0);
        let image = [
            (0.1, 0.1),
            (0.9, 0.1),
            (0.9, 0.9),
            (0.1, 0.9),
            (0.5, 0.4),
            (0.3, 0.6),
        ];
        let mut pairs = pairs_from(&truth, &image);
        pairs[4].lng += 40.0;
        pairs[4].lat -= 35.0;

        let result = solve_homography(&pairs).unwrap();
        assert_eq!(result.inlier_count, 5);
        assert_eq!(result.inlier_mask, vec![true, true, true, true, false, true]);
        assert!(result.reprojection_error < 1e-6, "{}", result.reprojection_error);
        assert_relative_eq!(matrix_from_rows(&result.matrix), truth, epsilon = 1e-6);
    }

    #[test]
    fn test_pairs_are_solved_in_order_idx_order() {
        let truth = Matrix3::new(80.0, 10.0, 5.0, -5.0, 60.0, 2.0, 0.1, 0.2, 1.0);
        let image = [
            (0.1, 0.1),
            (0.9, 0.1),
            (0.9, 0.9),
            (0.1, 0.9),
            (0.5, 0.4),
            (0.3, 0.6),
        ];
        let mut pairs = pairs_from(&truth, &image);
        pairs[4].lng += 40.0;
        pairs[4].lat -= 35.0;
        // the outlier is listed last but ordered first
        pairs[4].order_idx = 0;
        for p in pairs.iter_mut().take(4) {
            p.order_idx += 1;
        }
        pairs.swap(4, 5);

        let result = solve_homography(&pairs).unwrap();
        assert!(!result.inlier_mask[0]);
        assert_eq!(result.inlier_count, 5);
    }

    #[test]
    fn test_solver_is_deterministic() {
        let image = [
            (0.05, 0.2),
            (0.95, 0.15),
            (0.8, 0.85),
            (0.2, 0.9),
            (0.5, 0.5),
            (0.6, 0.3),
            (0.35, 0.65),
        ];
        let pairs = pairs_from(&geo_truth(), &image);
        let a = solve_homography(&pairs).unwrap();
        let b = solve_homography(&pairs).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.inlier_count, 7);
    }

    #[test]
    fn test_transform_point_at_infinity() {
        // third row zeroes w for every point
        let matrix = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        assert_eq!(
            transform_point(&matrix, 0.5, 0.5),
            Err(CalibrationError::Projection {
                x_norm: 0.5,
                y_norm: 0.5
            })
        );
    }

    #[test]
    fn test_adaptive_iterations() {
        assert_eq!(adaptive_iterations(0, 10, 0.995, 2000), 2000);
        assert_eq!(adaptive_iterations(10, 10, 0.995, 2000), 1);
        let half = adaptive_iterations(5, 10, 0.995, 2000);
        assert!(half > 50 && half < 2000, "{}", half);
    }
}
