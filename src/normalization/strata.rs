//! Quantile-based stratification of features by a covariate

use serde::{Deserialize, Serialize};

use crate::error::{EdaseqError, Result};
use crate::stats::quantile_sorted;

/// Assignment of features to covariate strata.
///
/// Bins are numbered `0..n_bins()` in increasing covariate order and every
/// bin is non-empty. Each bin covers `[lower_bound, next lower_bound)`, the
/// last one being closed on the right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strata {
    assignment: Vec<usize>,
    lower_bounds: Vec<f64>,
    requested: usize,
}

impl Strata {
    /// Build strata from caller-supplied bin labels.
    ///
    /// Labels may be any integers; they are renumbered to consecutive bins in
    /// ascending label order.
    pub fn from_labels(labels: &[usize]) -> Result<Self> {
        if labels.is_empty() {
            return Err(EdaseqError::EmptyData {
                reason: "no features to stratify".to_string(),
            });
        }
        let mut distinct = labels.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        let assignment: Vec<usize> = labels
            .iter()
            .map(|l| distinct.partition_point(|d| d < l))
            .collect();
        Ok(Self {
            assignment,
            lower_bounds: Vec::new(),
            requested: distinct.len(),
        })
    }

    /// Bin index of every feature
    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }

    /// Number of non-empty bins
    pub fn n_bins(&self) -> usize {
        self.assignment.iter().max().map_or(0, |&m| m + 1)
    }

    /// Number of bins originally requested
    pub fn requested_bins(&self) -> usize {
        self.requested
    }

    /// Inclusive lower covariate bound of each bin (empty for label-based strata)
    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower_bounds
    }

    /// True when fewer bins than requested could be formed
    pub fn is_degenerate(&self) -> bool {
        self.n_bins() < self.requested
    }

    /// Feature indices belonging to each bin
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.n_bins()];
        for (i, &bin) in self.assignment.iter().enumerate() {
            groups[bin].push(i);
        }
        groups
    }

    /// Number of features in each bin
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_bins()];
        for &bin in &self.assignment {
            sizes[bin] += 1;
        }
        sizes
    }
}

/// Partition features into `num_bins` strata of roughly equal size.
///
/// Cut points are the `k / num_bins` quantiles of the covariate; a feature
/// equal to a cut point falls in the upper bin. With fewer distinct values
/// than bins each distinct value becomes its own stratum and the strata are
/// flagged as degenerate.
pub fn compute_strata(covariate: &[f64], num_bins: usize) -> Result<Strata> {
    if num_bins == 0 {
        return Err(EdaseqError::InvalidInput {
            reason: "number of bins must be at least 1".to_string(),
        });
    }
    if covariate.is_empty() {
        return Err(EdaseqError::EmptyData {
            reason: "no covariate values to stratify".to_string(),
        });
    }
    if let Some(bad) = covariate.iter().find(|v| !v.is_finite()) {
        return Err(EdaseqError::InvalidInput {
            reason: format!(
                "covariate contains {}; exclude features with missing values before binning",
                bad
            ),
        });
    }

    let mut sorted = covariate.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut distinct = sorted.clone();
    distinct.dedup();

    let raw_bins: Vec<usize> = if distinct.len() <= num_bins {
        covariate
            .iter()
            .map(|v| distinct.partition_point(|d| d < v))
            .collect()
    } else {
        let mut cuts: Vec<f64> = (1..num_bins)
            .map(|k| quantile_sorted(&sorted, k as f64 / num_bins as f64))
            .collect();
        cuts.dedup();
        log::debug!("strata cut points: {:?}", cuts);
        covariate
            .iter()
            .map(|v| cuts.partition_point(|c| c <= v))
            .collect()
    };

    // Drop empty bins so labels are consecutive
    let strata = Strata::from_labels(&raw_bins)?;
    let mut lower_bounds = vec![f64::INFINITY; strata.n_bins()];
    for (&bin, &v) in strata.assignment.iter().zip(covariate) {
        lower_bounds[bin] = lower_bounds[bin].min(v);
    }

    let strata = Strata {
        assignment: strata.assignment,
        lower_bounds,
        requested: num_bins,
    };

    if strata.is_degenerate() {
        log::warn!(
            "Only {} strata could be formed from the covariate ({} requested)",
            strata.n_bins(),
            num_bins
        );
    }

    Ok(strata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_sized_bins() {
        let cov: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let strata = compute_strata(&cov, 10).unwrap();
        assert_eq!(strata.n_bins(), 10);
        assert!(!strata.is_degenerate());
        for size in strata.sizes() {
            assert!((9..=11).contains(&size), "unbalanced bin size {}", size);
        }
        // Monotone in the covariate
        let a = strata.assignment();
        assert!(a.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(a[0], 0);
        assert_eq!(a[99], 9);
    }

    #[test]
    fn test_unsorted_input_keeps_feature_order() {
        let cov = vec![0.9, 0.1, 0.5, 0.3];
        let strata = compute_strata(&cov, 2).unwrap();
        assert_eq!(strata.assignment(), &[1, 0, 1, 0]);
        assert_eq!(strata.lower_bounds(), &[0.1, 0.5]);
    }

    #[test]
    fn test_fewer_distinct_values_collapse() {
        let cov = vec![0.4, 0.4, 0.6, 0.6, 0.4];
        let strata = compute_strata(&cov, 10).unwrap();
        assert_eq!(strata.n_bins(), 2);
        assert_eq!(strata.requested_bins(), 10);
        assert!(strata.is_degenerate());
        assert_eq!(strata.assignment(), &[0, 0, 1, 1, 0]);
    }

    #[test]
    fn test_heavy_ties_drop_empty_bins() {
        let mut cov = vec![1.0; 50];
        cov.extend((0..50).map(|i| 2.0 + i as f64));
        let strata = compute_strata(&cov, 4).unwrap();
        assert!(strata.n_bins() <= 4);
        assert_eq!(strata.sizes().iter().sum::<usize>(), 100);
        assert!(strata.sizes().iter().all(|&s| s > 0));
    }

    #[test]
    fn test_missing_values_rejected() {
        assert!(compute_strata(&[0.1, f64::NAN], 2).is_err());
        assert!(compute_strata(&[], 2).is_err());
        assert!(compute_strata(&[0.1, 0.2], 0).is_err());
    }

    #[test]
    fn test_from_labels_renumbers() {
        let strata = Strata::from_labels(&[5, 2, 5, 9]).unwrap();
        assert_eq!(strata.assignment(), &[1, 0, 1, 2]);
        assert_eq!(strata.members(), vec![vec![1], vec![0, 2], vec![3]]);
    }
}
