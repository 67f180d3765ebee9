//! Robust locally weighted regression (lowess)
//!
//! Local linear fits with tricube neighbourhood weights, followed by
//! bisquare re-weighting passes that down-weight large residuals
//! (Cleveland, 1979).

use serde::{Deserialize, Serialize};

use crate::error::{EdaseqError, Result};
use crate::stats::{median, sort_order};

/// Smoothing settings for the local regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoessParams {
    /// Fraction of points in each local neighbourhood, in (0, 1]
    pub span: f64,
    /// Number of robustness re-weighting passes after the initial fit
    pub iterations: usize,
    /// Fraction of the covariate range within which fits are linearly
    /// interpolated instead of recomputed. 0 fits every point.
    pub delta: f64,
}

impl Default for LoessParams {
    fn default() -> Self {
        Self {
            span: 0.3,
            iterations: 3,
            delta: 0.01,
        }
    }
}

impl LoessParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.span > 0.0 && self.span <= 1.0) {
            return Err(EdaseqError::InvalidInput {
                reason: format!("loess span must be in (0, 1], got {}", self.span),
            });
        }
        if !(self.delta >= 0.0 && self.delta.is_finite()) {
            return Err(EdaseqError::InvalidInput {
                reason: format!("loess delta must be a non-negative fraction, got {}", self.delta),
            });
        }
        Ok(())
    }
}

/// Fit `y ~ x` by robust local linear regression.
///
/// Returns the fitted value for every point, in input order. `x` and `y`
/// must have the same length and hold finite values.
pub fn lowess(x: &[f64], y: &[f64], params: &LoessParams) -> Vec<f64> {
    assert_eq!(x.len(), y.len());
    let n = x.len();
    if n < 2 {
        return y.to_vec();
    }

    let order = sort_order(x);
    let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

    let window = ((params.span * n as f64).round() as usize).clamp(2, n);
    let delta = params.delta * (xs[n - 1] - xs[0]);

    let mut fitted = vec![0.0; n];
    let mut robustness = vec![1.0; n];
    let mut residuals = vec![0.0; n];

    for iteration in 0..=params.iterations {
        fit_pass(&xs, &ys, window, delta, &robustness, &mut fitted);
        if iteration == params.iterations {
            break;
        }
        for i in 0..n {
            residuals[i] = ys[i] - fitted[i];
        }
        if !update_robustness(&residuals, &mut robustness) {
            log::debug!("lowess: residuals negligible after pass {}", iteration + 1);
            break;
        }
    }

    let mut out = vec![0.0; n];
    for (k, &i) in order.iter().enumerate() {
        out[i] = fitted[k];
    }
    out
}

/// One smoothing pass over x-sorted data
fn fit_pass(
    xs: &[f64],
    ys: &[f64],
    window: usize,
    delta: f64,
    robustness: &[f64],
    fitted: &mut [f64],
) {
    let n = xs.len();
    let mut left = 0;
    let mut right = window - 1;
    let mut last: Option<usize> = None;
    let mut i = 0;

    loop {
        // Slide the neighbourhood so it stays centred on xs[i]
        while right < n - 1 && xs[i] - xs[left] > xs[right + 1] - xs[i] {
            left += 1;
            right += 1;
        }

        fitted[i] = local_fit(xs, ys, xs[i], left, right, robustness).unwrap_or(ys[i]);

        if let Some(prev) = last {
            let span = xs[i] - xs[prev];
            for k in prev + 1..i {
                let alpha = (xs[k] - xs[prev]) / span;
                fitted[k] = alpha * fitted[i] + (1.0 - alpha) * fitted[prev];
            }
        }

        let mut prev = i;
        let cut = xs[prev] + delta;
        let mut next = prev + 1;
        while next < n && xs[next] <= cut {
            if xs[next] == xs[prev] {
                fitted[next] = fitted[prev];
                prev = next;
            }
            next += 1;
        }
        last = Some(prev);

        i = (prev + 1).max(next - 1);
        if i >= n {
            break;
        }
    }
}

/// Weighted linear fit at `x0` using neighbours `left..=right`.
///
/// Returns `None` when every neighbour carries zero weight.
fn local_fit(
    xs: &[f64],
    ys: &[f64],
    x0: f64,
    left: usize,
    right: usize,
    robustness: &[f64],
) -> Option<f64> {
    let n = xs.len();
    let range = xs[n - 1] - xs[0];
    let h = (x0 - xs[left]).max(xs[right] - x0);
    let h_inner = 0.001 * h;
    let h_outer = 0.999 * h;

    let mut weights: Vec<(usize, f64)> = Vec::with_capacity(right - left + 1);
    let mut total = 0.0;
    for j in left..n {
        let r = (xs[j] - x0).abs();
        if r <= h_outer {
            let kernel = if r <= h_inner {
                1.0
            } else {
                let u = r / h;
                let t = 1.0 - u * u * u;
                t * t * t
            };
            let w = kernel * robustness[j];
            total += w;
            weights.push((j, w));
        } else if xs[j] > x0 {
            // Ties with the right edge are included above; anything further is out
            break;
        }
    }

    if total <= 0.0 {
        return None;
    }
    for (_, w) in weights.iter_mut() {
        *w /= total;
    }

    if h > 0.0 {
        let x_bar: f64 = weights.iter().map(|&(j, w)| w * xs[j]).sum();
        let spread: f64 = weights
            .iter()
            .map(|&(j, w)| w * (xs[j] - x_bar) * (xs[j] - x_bar))
            .sum();
        if spread.sqrt() > 0.001 * range {
            let slope = (x0 - x_bar) / spread;
            for (j, w) in weights.iter_mut() {
                *w *= slope * (xs[*j] - x_bar) + 1.0;
            }
        }
    }

    Some(weights.iter().map(|&(j, w)| w * ys[j]).sum())
}

/// Bisquare robustness weights from residuals.
///
/// Returns false when residuals are already negligible, ending the iteration.
fn update_robustness(residuals: &[f64], robustness: &mut [f64]) -> bool {
    let abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
    let scale = abs.iter().sum::<f64>() / abs.len() as f64;
    let cmad = 6.0 * median(&abs);
    if cmad < 1e-7 * scale || cmad == 0.0 {
        return false;
    }

    let c_inner = 0.001 * cmad;
    let c_outer = 0.999 * cmad;
    for (w, &r) in robustness.iter_mut().zip(&abs) {
        *w = if r <= c_inner {
            1.0
        } else if r <= c_outer {
            let u = r / cmad;
            let t = 1.0 - u * u;
            t * t
        } else {
            0.0
        };
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_data_reproduced() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let fitted = lowess(&x, &y, &LoessParams::default());
        for (f, t) in fitted.iter().zip(&y) {
            assert!((f - t).abs() < 1e-8, "fitted {} vs true {}", f, t);
        }
    }

    #[test]
    fn test_outlier_is_downweighted() {
        let x: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let mut y: Vec<f64> = (0..40)
            .map(|i| 0.5 * i as f64 + 0.3 * (1.7 * i as f64).sin())
            .collect();
        y[20] = 20.0;
        let robust = lowess(&x, &y, &LoessParams { span: 0.5, iterations: 3, delta: 0.0 });
        let plain = lowess(&x, &y, &LoessParams { span: 0.5, iterations: 0, delta: 0.0 });
        assert!((robust[20] - 10.0).abs() < 0.5, "fitted {}", robust[20]);
        assert!((robust[20] - 10.0).abs() < (plain[20] - 10.0).abs());
    }

    #[test]
    fn test_input_order_preserved() {
        let x = vec![3.0, 1.0, 2.0, 0.0, 4.0];
        let y = vec![6.0, 2.0, 4.0, 0.0, 8.0];
        let fitted = lowess(&x, &y, &LoessParams { span: 1.0, ..Default::default() });
        for (f, t) in fitted.iter().zip(&y) {
            assert!((f - t).abs() < 1e-8);
        }
    }

    #[test]
    fn test_tied_covariates_share_fit() {
        let x = vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0];
        let y = vec![1.0, 3.0, 2.0, 4.0, 3.0, 5.0, 4.0, 6.0];
        let fitted = lowess(&x, &y, &LoessParams { span: 0.75, iterations: 0, delta: 0.0 });
        assert!((fitted[0] - fitted[1]).abs() < 1e-12);
        assert!((fitted[6] - fitted[7]).abs() < 1e-12);
    }

    #[test]
    fn test_single_point_and_params() {
        assert_eq!(lowess(&[0.3], &[1.5], &LoessParams::default()), vec![1.5]);
        assert!(LoessParams { span: 0.0, ..Default::default() }.validate().is_err());
        assert!(LoessParams { span: 1.5, ..Default::default() }.validate().is_err());
        assert!(LoessParams { delta: -1.0, ..Default::default() }.validate().is_err());
    }
}
