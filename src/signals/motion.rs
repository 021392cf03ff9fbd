//! Pointer motion analysis
//!
//! Derives motion features from a short window of pointer samples: direction
//! corrections, path efficiency, jitter, smoothness and average speed.

use crate::config::CollectorConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of points for a meaningful analysis
const MIN_POINTS: usize = 3;

/// One pointer position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub x: f64,
    pub y: f64,
    pub timestamp: DateTime<Utc>,
}

/// Motion features over the analysis window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionFeatures {
    pub smoothness: f64,
    pub jitter: f64,
    pub corrections: u32,
    /// Pixels per millisecond
    pub speed: f64,
    pub path_efficiency: f64,
}

impl Default for MotionFeatures {
    fn default() -> Self {
        Self {
            smoothness: 1.0,
            jitter: 0.0,
            corrections: 0,
            speed: 0.0,
            path_efficiency: 1.0,
        }
    }
}

/// Analyze the points inside the sliding window ending at the newest sample.
///
/// Fewer than three points yields the neutral defaults.
pub fn analyze_window(points: &[TrajectorySample], config: &CollectorConfig) -> MotionFeatures {
    let Some(newest) = points.last() else {
        return MotionFeatures::default();
    };
    let window_ms = config.analysis_window_ms();
    let window: Vec<TrajectorySample> = points
        .iter()
        .filter(|p| elapsed_ms(p.timestamp, newest.timestamp) <= window_ms)
        .copied()
        .collect();

    if window.len() < MIN_POINTS {
        return MotionFeatures::default();
    }

    let distances = segment_lengths(&window);
    let jitter = compute_jitter(&distances, config.jitter_ceiling_px);
    let path_length: f64 = distances.iter().sum();

    MotionFeatures {
        smoothness: 1.0 - jitter,
        jitter,
        corrections: count_corrections(&window, config.correction_tolerance_deg),
        speed: compute_average_speed(&window, path_length),
        path_efficiency: compute_path_efficiency(&window, path_length),
    }
}

/// Count direction reversals.
///
/// A reversal is a turn between three consecutive points whose angle exceeds
/// `180 - tolerance` degrees. Stationary segments are skipped.
fn count_corrections(points: &[TrajectorySample], tolerance_deg: f64) -> u32 {
    let threshold = 180.0 - tolerance_deg;
    points
        .windows(3)
        .filter(|w| {
            let (ax, ay) = (w[1].x - w[0].x, w[1].y - w[0].y);
            let (bx, by) = (w[2].x - w[1].x, w[2].y - w[1].y);
            let norm_a = ax.hypot(ay);
            let norm_b = bx.hypot(by);
            if norm_a == 0.0 || norm_b == 0.0 {
                return false;
            }
            let cos = ((ax * bx + ay * by) / (norm_a * norm_b)).clamp(-1.0, 1.0);
            cos.acos().to_degrees() > threshold
        })
        .count() as u32
}

/// Straight-line distance first→last over cumulative path length, capped at 1
fn compute_path_efficiency(points: &[TrajectorySample], path_length: f64) -> f64 {
    if path_length <= 0.0 {
        return 1.0;
    }
    let (first, last) = (points[0], points[points.len() - 1]);
    let straight = (last.x - first.x).hypot(last.y - first.y);
    (straight / path_length).min(1.0)
}

/// Standard deviation of inter-point distances over an empirical ceiling, in [0, 1]
fn compute_jitter(distances: &[f64], ceiling_px: f64) -> f64 {
    if distances.is_empty() || ceiling_px <= 0.0 {
        return 0.0;
    }
    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    (variance.sqrt() / ceiling_px).clamp(0.0, 1.0)
}

/// Path length over elapsed time in the window (px/ms)
fn compute_average_speed(points: &[TrajectorySample], path_length: f64) -> f64 {
    let elapsed = elapsed_ms(points[0].timestamp, points[points.len() - 1].timestamp);
    if elapsed <= 0.0 {
        return 0.0;
    }
    path_length / elapsed
}

fn segment_lengths(points: &[TrajectorySample]) -> Vec<f64> {
    points
        .windows(2)
        .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
        .collect()
}

/// Milliseconds from `from` to `to`, with sub-millisecond precision
pub(crate) fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn path(coords: &[(f64, f64)], step_ms: i64) -> Vec<TrajectorySample> {
        coords
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| TrajectorySample {
                x,
                y,
                timestamp: start() + Duration::milliseconds(step_ms * i as i64),
            })
            .collect()
    }

    #[test]
    fn test_too_few_points_is_neutral() {
        let config = CollectorConfig::default();
        let features = analyze_window(&path(&[(0.0, 0.0), (10.0, 0.0)], 50), &config);
        assert_eq!(features, MotionFeatures::default());
        assert_eq!(analyze_window(&[], &config), MotionFeatures::default());
    }

    #[test]
    fn test_straight_uniform_line() {
        let config = CollectorConfig::default();
        let points = path(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)], 100);
        let features = analyze_window(&points, &config);

        assert_eq!(features.corrections, 0);
        assert!((features.path_efficiency - 1.0).abs() < 1e-9);
        assert!(features.jitter.abs() < 1e-9);
        assert!((features.smoothness - 1.0).abs() < 1e-9);
        // 30 px over 300 ms
        assert!((features.speed - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_reversal_counts_as_correction() {
        let config = CollectorConfig::default();
        let points = path(&[(0.0, 0.0), (20.0, 0.0), (0.0, 1.0), (20.0, 1.0)], 50);
        let features = analyze_window(&points, &config);

        assert_eq!(features.corrections, 2);
        assert!(features.path_efficiency < 0.5);
    }

    #[test]
    fn test_right_angle_is_not_correction() {
        assert_eq!(
            count_corrections(&path(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)], 10), 15.0),
            0
        );
    }

    #[test]
    fn test_irregular_steps_raise_jitter() {
        let config = CollectorConfig::default();
        let points = path(&[(0.0, 0.0), (2.0, 0.0), (102.0, 0.0), (104.0, 0.0)], 50);
        let features = analyze_window(&points, &config);

        assert!(features.jitter > 0.5);
        assert!((features.smoothness + features.jitter - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_points_outside_window_ignored() {
        let config = CollectorConfig::default();
        // Only the last two points fall inside the 500 ms window
        let points = path(&[(0.0, 0.0), (50.0, 0.0), (0.0, 0.0), (1.0, 0.0)], 400);
        let features = analyze_window(&points, &config);
        assert_eq!(features, MotionFeatures::default());
    }

    #[test]
    fn test_stationary_pointer() {
        let config = CollectorConfig::default();
        let points = path(&[(5.0, 5.0), (5.0, 5.0), (5.0, 5.0)], 50);
        let features = analyze_window(&points, &config);
        assert_eq!(features.corrections, 0);
        assert_eq!(features.path_efficiency, 1.0);
        assert_eq!(features.speed, 0.0);
    }
}
