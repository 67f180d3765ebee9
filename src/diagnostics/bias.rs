//! Covariate bias curves (e.g. GC-content or length vs. expression)

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::{EdaseqError, Result};
use crate::normalization::{compute_strata, validate_counts, validate_pseudo_count};
use crate::stats::median;

/// One covariate stratum of a bias curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasStratum {
    pub n_features: usize,
    pub covariate_median: f64,
    /// Median `log(count + c)` of the stratum in each lane
    pub lane_medians: Vec<f64>,
}

/// Stratum medians in increasing covariate order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasCurve {
    pub strata: Vec<BiasStratum>,
    /// Features left out for lack of covariate data
    pub n_missing: usize,
}

impl BiasCurve {
    /// Max minus min of the stratum medians in one lane; zero for a flat curve
    pub fn spread(&self, lane: usize) -> f64 {
        let (lo, hi) = self
            .strata
            .iter()
            .filter_map(|s| s.lane_medians.get(lane))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &m| (lo.min(m), hi.max(m)));
        if lo.is_finite() {
            hi - lo
        } else {
            f64::NAN
        }
    }
}

/// Median log-count per covariate stratum and lane.
///
/// Strata are built the same way within-lane normalization builds them, so
/// a curve computed after normalization shows what the step flattened.
pub fn bias_curve(
    counts: ArrayView2<f64>,
    covariate: &[f64],
    num_bins: usize,
    pseudo_count: f64,
) -> Result<BiasCurve> {
    validate_counts(counts, "counts")?;
    validate_pseudo_count(counts, pseudo_count)?;
    let (n_features, n_lanes) = counts.dim();
    if covariate.len() != n_features {
        return Err(EdaseqError::DimensionMismatch {
            expected: format!("{} covariate values", n_features),
            got: format!("{} covariate values", covariate.len()),
        });
    }

    let usable: Vec<usize> = (0..n_features).filter(|&i| covariate[i].is_finite()).collect();
    let values: Vec<f64> = usable.iter().map(|&i| covariate[i]).collect();
    let strata = compute_strata(&values, num_bins)?;

    let curve = strata
        .members()
        .into_iter()
        .map(|members| {
            let features: Vec<usize> = members.iter().map(|&k| usable[k]).collect();
            let values: Vec<f64> = features.iter().map(|&i| covariate[i]).collect();
            let covariate_median = median(&values);
            let lane_medians = (0..n_lanes)
                .map(|j| {
                    let logs: Vec<f64> = features
                        .iter()
                        .map(|&i| (counts[[i, j]] + pseudo_count).ln())
                        .collect();
                    median(&logs)
                })
                .collect();
            BiasStratum {
                n_features: features.len(),
                covariate_median,
                lane_medians,
            }
        })
        .collect();

    Ok(BiasCurve {
        strata: curve,
        n_missing: n_features - usable.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::{within_lane_normalization, NormalizationParams, WithinLaneMethod};
    use ndarray::{array, Array2};

    #[test]
    fn test_bias_curve_shape() {
        let counts = array![[10.0, 20.0], [12.0, 25.0], [100.0, 210.0], [120.0, 260.0], [5.0, 7.0]];
        let covariate = vec![0.3, 0.35, 0.6, 0.65, f64::NAN];
        let curve = bias_curve(counts.view(), &covariate, 2, 0.1).unwrap();
        assert_eq!(curve.n_missing, 1);
        assert_eq!(curve.strata.len(), 2);
        assert_eq!(curve.strata[0].n_features, 2);
        assert!((curve.strata[0].covariate_median - 0.325).abs() < 1e-12);
        assert!(curve.strata[1].lane_medians[0] > curve.strata[0].lane_medians[0]);
        assert!(curve.spread(0) > 2.0);
    }

    #[test]
    fn test_within_lane_flattens_curve() {
        let n = 30;
        let covariate: Vec<f64> = (0..n).map(|i| 0.3 + 0.01 * i as f64).collect();
        let mut counts = Array2::zeros((n, 2));
        for i in 0..n {
            let noise = [1.0, 1.3, 0.8][i % 3];
            counts[[i, 0]] = (40.0 * (8.0 * covariate[i]).exp() * noise).round();
            counts[[i, 1]] = (90.0 * (8.0 * covariate[i]).exp() * noise).round();
        }
        let before = bias_curve(counts.view(), &covariate, 3, 0.1).unwrap();

        let params = NormalizationParams {
            num_bins: 3,
            round: false,
            ..Default::default()
        };
        let method = WithinLaneMethod::Median;
        let result =
            within_lane_normalization(counts.view(), &covariate, method, None, &params).unwrap();
        let after = bias_curve(result.normalized.view(), &covariate, 3, 0.1).unwrap();
        for lane in 0..2 {
            assert!(before.spread(lane) > 1.0);
            assert!(after.spread(lane) < 1e-9);
        }
    }

    #[test]
    fn test_length_mismatch() {
        let counts = array![[1.0], [2.0]];
        assert!(matches!(
            bias_curve(counts.view(), &[0.5], 2, 0.1),
            Err(EdaseqError::DimensionMismatch { .. })
        ));
    }
}
