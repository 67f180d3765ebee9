//! Statistical utility functions shared across modules
//!
//! Quantiles use linear interpolation between order statistics
//! (Hyndman & Fan type 7), the convention of most statistics packages.

use std::cmp::Ordering;

/// Quantile of already sorted values (type 7).
///
/// Returns NaN for an empty slice.
pub fn quantile_sorted(sorted: &[f64], prob: f64) -> f64 {
    let n = sorted.len();
    match n {
        0 => f64::NAN,
        1 => sorted[0],
        _ => {
            let h = prob.clamp(0.0, 1.0) * (n - 1) as f64;
            let low = h.floor() as usize;
            let high = (low + 1).min(n - 1);
            let frac = h - low as f64;
            sorted[low] + frac * (sorted[high] - sorted[low])
        }
    }
}

/// Quantile of unsorted values (type 7)
pub fn quantile(values: &[f64], prob: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, prob)
}

/// Median of unsorted values
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Indices that sort `values` ascending.
///
/// The sort is stable, so tied values keep their input order. Rank positions
/// derived from this order are therefore ordinal and deterministic.
pub fn sort_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));
    order
}

/// Arithmetic mean; NaN for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
