//! Per-lane and per-feature summaries

use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::{EdaseqError, Result};
use crate::normalization::{validate_counts, validate_pseudo_count};
use crate::stats::quantile_sorted;

/// Minimum, quartiles and maximum (boxplot data)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiveNumber {
    pub min: f64,
    pub lower_quartile: f64,
    pub median: f64,
    pub upper_quartile: f64,
    pub max: f64,
}

impl FiveNumber {
    fn of(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            min: quantile_sorted(&sorted, 0.0),
            lower_quartile: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            upper_quartile: quantile_sorted(&sorted, 0.75),
            max: quantile_sorted(&sorted, 1.0),
        }
    }
}

/// Depth and distribution of one lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSummary {
    pub lane: usize,
    pub total_reads: f64,
    pub zero_fraction: f64,
    /// Five-number summary of `log(count + c)`
    pub log_counts: FiveNumber,
}

/// Per-feature mean and variance across lanes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanVariance {
    pub means: Vec<f64>,
    /// Sample variance (n - 1 denominator)
    pub variances: Vec<f64>,
    /// Fraction of features whose variance exceeds their mean
    pub overdispersed_fraction: f64,
}

/// Summaries of every lane of `counts` (features x lanes)
pub fn lane_summaries(counts: ArrayView2<f64>, pseudo_count: f64) -> Result<Vec<LaneSummary>> {
    validate_counts(counts, "counts")?;
    validate_pseudo_count(counts, pseudo_count)?;
    if counts.nrows() == 0 {
        return Err(EdaseqError::EmptyData {
            reason: "no features to summarize".to_string(),
        });
    }

    let lanes: Vec<_> = counts.axis_iter(Axis(1)).collect();
    Ok(lanes
        .par_iter()
        .enumerate()
        .map(|(lane, column)| {
            let logs: Vec<f64> = column.iter().map(|&x| (x + pseudo_count).ln()).collect();
            let zeros = column.iter().filter(|&&x| x == 0.0).count();
            LaneSummary {
                lane,
                total_reads: column.sum(),
                zero_fraction: zeros as f64 / column.len() as f64,
                log_counts: FiveNumber::of(&logs),
            }
        })
        .collect())
}

/// Mean and variance of every feature across lanes
pub fn mean_variance(counts: ArrayView2<f64>) -> Result<MeanVariance> {
    validate_counts(counts, "counts")?;
    let (n_features, n_lanes) = counts.dim();
    if n_features == 0 || n_lanes < 2 {
        return Err(EdaseqError::EmptyData {
            reason: format!(
                "mean-variance needs at least one feature and two lanes, got {} x {}",
                n_features, n_lanes
            ),
        });
    }

    let (means, variances): (Vec<f64>, Vec<f64>) = counts
        .axis_iter(Axis(0))
        .map(|row| (row.iter().mean(), row.iter().variance()))
        .unzip();
    let overdispersed = means
        .iter()
        .zip(&variances)
        .filter(|(m, v)| v > m)
        .count();

    Ok(MeanVariance {
        overdispersed_fraction: overdispersed as f64 / n_features as f64,
        means,
        variances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_lane_summaries() {
        let counts = array![[0.0, 10.0], [4.0, 20.0], [9.0, 0.0], [0.0, 30.0]];
        let summaries = lane_summaries(counts.view(), 1.0).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].total_reads, 13.0);
        assert_eq!(summaries[0].zero_fraction, 0.5);
        assert_eq!(summaries[1].zero_fraction, 0.25);
        let five = summaries[0].log_counts;
        assert_eq!(five.min, 0.0);
        assert!((five.max - 10f64.ln()).abs() < 1e-12);
        assert!(five.lower_quartile <= five.median && five.median <= five.upper_quartile);
    }

    #[test]
    fn test_mean_variance() {
        // Row 0 is Poisson-like flat, row 1 heavily overdispersed
        let counts = array![[5.0, 5.0, 5.0], [1.0, 10.0, 40.0]];
        let mv = mean_variance(counts.view()).unwrap();
        assert_eq!(mv.means[0], 5.0);
        assert_eq!(mv.variances[0], 0.0);
        assert!((mv.means[1] - 17.0).abs() < 1e-12);
        assert!((mv.variances[1] - 417.0).abs() < 1e-9);
        assert_eq!(mv.overdispersed_fraction, 0.5);
    }

    #[test]
    fn test_single_lane_rejected() {
        let counts = array![[1.0], [2.0]];
        assert!(mean_variance(counts.view()).is_err());
        let negative = array![[-1.0, 2.0]];
        assert!(lane_summaries(negative.view(), 0.1).is_err());
    }
}
