//! Normalization library
//!
//! Pure functions that turn noisy raw counters into bounded scores. None of
//! them keep state and all of them are total: NaN inputs count as zero and
//! infinities saturate at the relevant cap.

use crate::{Level, Trend, ALERT_SCALE_DIVISOR, EARTH_RADIUS_KM, MAX_ALERT_SCORE, MAX_SCORE};

/// Replace NaN with zero so downstream arithmetic stays total
#[inline]
pub fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// Clamp a value into `[0, cap]`
#[inline]
pub fn capped(value: f64, cap: f64) -> f64 {
    sanitize(value).clamp(0.0, cap)
}

/// Clamp a composite into `[0, 100]`
#[inline]
pub fn clamp_score(value: f64) -> f64 {
    capped(value, MAX_SCORE)
}

/// Sum of `(score, weight)` pairs, clamped to the composite range
pub fn weighted_sum(parts: &[(f64, f64)]) -> f64 {
    clamp_score(parts.iter().map(|(score, weight)| sanitize(*score) * weight).sum())
}

/// Blend a slow baseline with live signal: `baseline*w + live*(1-w)`
pub fn blend(baseline: f64, live: f64, baseline_weight: f64) -> f64 {
    let w = capped(baseline_weight, 1.0);
    clamp_score(sanitize(baseline) * w + sanitize(live) * (1.0 - w))
}

/// Log-scale dampening for structurally noisy sources: `log2(count+1) * dampener`
pub fn log_dampened(count: f64, dampener: f64) -> f64 {
    (sanitize(count).max(0.0) + 1.0).log2() * sanitize(dampener).max(0.0)
}

/// Map a 0-100 composite to its level band
pub fn level_for_score(score: f64) -> Level {
    Level::from_score(score)
}

/// Compare against a previous value with a symmetric deadband
pub fn trend_from_delta(current: f64, previous: Option<f64>, deadband: f64) -> Trend {
    let Some(previous) = previous else {
        return Trend::Stable;
    };
    let delta = sanitize(current) - sanitize(previous);
    if delta >= deadband {
        Trend::Rising
    } else if delta <= -deadband {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

/// Least-squares slope of `values` against their index
///
/// Returns 0.0 for fewer than two points.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().map(|v| sanitize(*v)).sum::<f64>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, v) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (sanitize(*v) - mean_y);
        den += dx * dx;
    }

    // den > 0 whenever n >= 2
    num / den
}

/// Great-circle distance in kilometres
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (sanitize(value) * factor).round() / factor
}

/// Project a 0-100 composite onto the 0-5 alert scale
pub fn to_alert_scale(score: f64) -> f64 {
    capped(score / ALERT_SCALE_DIVISOR, MAX_ALERT_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capped_handles_nan_and_infinity() {
        assert_eq!(capped(f64::NAN, 50.0), 0.0);
        assert_eq!(capped(f64::INFINITY, 50.0), 50.0);
        assert_eq!(capped(-3.0, 50.0), 0.0);
        assert_eq!(capped(12.5, 50.0), 12.5);
    }

    #[test]
    fn test_blend() {
        assert!((blend(20.0, 12.5, 0.4) - 15.5).abs() < 1e-9);
        assert_eq!(blend(100.0, 100.0, 0.3), 100.0);
    }

    #[test]
    fn test_log_dampened() {
        // log2(8) = 3
        assert!((log_dampened(7.0, 4.0) - 12.0).abs() < 1e-9);
        assert_eq!(log_dampened(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_trend_deadband() {
        assert_eq!(trend_from_delta(54.9, Some(50.0), 5.0), Trend::Stable);
        assert_eq!(trend_from_delta(45.1, Some(50.0), 5.0), Trend::Stable);
        assert_eq!(trend_from_delta(55.0, Some(50.0), 5.0), Trend::Rising);
        assert_eq!(trend_from_delta(44.0, Some(50.0), 5.0), Trend::Falling);
        assert_eq!(trend_from_delta(90.0, None, 5.0), Trend::Stable);
    }

    #[test]
    fn test_linear_slope() {
        assert_eq!(linear_slope(&[]), 0.0);
        assert_eq!(linear_slope(&[3.0]), 0.0);
        assert!((linear_slope(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-9);
        assert!((linear_slope(&[4.0, 4.0, 4.0]) - 0.0).abs() < 1e-9);
        assert!(linear_slope(&[5.0, 3.0, 1.0]) < 0.0);
    }

    #[test]
    fn test_haversine() {
        assert!(haversine_km(10.0, 10.0, 10.0, 10.0).abs() < 1e-9);
        // One degree of latitude is ~111 km
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.1);
    }

    #[test]
    fn test_alert_scale() {
        assert_eq!(to_alert_scale(90.0), 4.5);
        assert_eq!(to_alert_scale(40.0), 2.0);
        assert_eq!(to_alert_scale(150.0), 5.0);
    }

    #[test]
    fn test_level_cutoffs_monotonic() {
        let mut last = Level::Low;
        for s in 0..=100 {
            let level = level_for_score(s as f64);
            assert!(level >= last);
            last = level;
        }
        assert_eq!(level_for_score(81.0), Level::Critical);
        assert_eq!(level_for_score(80.9), Level::High);
        assert_eq!(level_for_score(66.0), Level::High);
        assert_eq!(level_for_score(51.0), Level::Elevated);
        assert_eq!(level_for_score(31.0), Level::Normal);
        assert_eq!(level_for_score(30.9), Level::Low);
    }
}
