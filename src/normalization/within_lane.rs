//! Within-lane normalization: remove the dependence of log-counts on a
//! feature-level covariate such as GC-content or length

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use super::loess::lowess;
use super::quantile::full_quantile_within;
use super::strata::{compute_strata, Strata};
use super::{
    check_input, finish, from_log, unchanged, DegenerateStrata, LoessParams,
    NormalizationParams, NormalizationReport, NormalizationResult, WithinLaneMethod,
};
use crate::error::{EdaseqError, Result};
use crate::stats::{mean, quantile};

/// Per-lane correction applied to the features with a usable covariate
enum LaneModel {
    /// Covariate values of the usable features
    Loess(Vec<f64>),
    /// Strata as positions into the usable features, with the scaling quantile
    Scale { groups: Vec<Vec<usize>>, prob: f64 },
    FullQuantile { groups: Vec<Vec<usize>> },
}

impl LaneModel {
    /// Model for a strata-based method; loess has no strata form
    fn stratified(method: WithinLaneMethod, groups: Vec<Vec<usize>>) -> Result<Self> {
        match method {
            WithinLaneMethod::Median => Ok(LaneModel::Scale { groups, prob: 0.5 }),
            WithinLaneMethod::Upper => Ok(LaneModel::Scale { groups, prob: 0.75 }),
            WithinLaneMethod::Full => Ok(LaneModel::FullQuantile { groups }),
            WithinLaneMethod::Loess => Err(EdaseqError::InvalidInput {
                reason: "loess normalization needs a covariate, not strata".to_string(),
            }),
        }
    }

    /// Normalize one lane's log-counts
    fn apply(&self, log_counts: &[f64], loess: &LoessParams) -> Vec<f64> {
        match self {
            LaneModel::Loess(covariate) => {
                let fitted = lowess(covariate, log_counts, loess);
                let centre = mean(&fitted);
                log_counts
                    .iter()
                    .zip(&fitted)
                    .map(|(y, f)| y - f + centre)
                    .collect()
            }
            LaneModel::Scale { groups, prob } => {
                let overall = quantile(log_counts, *prob);
                let mut out = log_counts.to_vec();
                for group in groups {
                    let values: Vec<f64> = group.iter().map(|&i| log_counts[i]).collect();
                    let shift = overall - quantile(&values, *prob);
                    for &i in group {
                        out[i] += shift;
                    }
                }
                out
            }
            LaneModel::FullQuantile { groups } => full_quantile_within(log_counts, groups),
        }
    }
}

fn check_lane(lane: Option<usize>, n_lanes: usize) -> Result<Vec<usize>> {
    match lane {
        Some(j) if j >= n_lanes => Err(EdaseqError::InvalidInput {
            reason: format!("lane {} out of range for {} lanes", j, n_lanes),
        }),
        Some(j) => Ok(vec![j]),
        None => Ok((0..n_lanes).collect()),
    }
}

/// Remove covariate bias from each lane of a count matrix.
///
/// `covariate` holds one value per feature; non-finite entries mark features
/// without covariate data, which are passed through unchanged and listed in
/// the report. `lane` restricts the correction to a single column; other
/// columns are returned as they are.
///
/// - `Loess`: `log(x + c) - fit(covariate) + mean(fit)` with a robust local
///   regression fit.
/// - `Median` / `Upper`: shift each covariate stratum so its median (upper
///   quartile) of `log(x + c)` matches the lane-wide value.
/// - `Full`: full-quantile normalize the strata of the lane to each other.
pub fn within_lane_normalization(
    counts: ArrayView2<f64>,
    covariate: &[f64],
    method: WithinLaneMethod,
    lane: Option<usize>,
    params: &NormalizationParams,
) -> Result<NormalizationResult> {
    check_input(counts, params)?;
    let (n_features, n_lanes) = counts.dim();
    if covariate.len() != n_features {
        return Err(EdaseqError::DimensionMismatch {
            expected: format!("{} covariate values", n_features),
            got: format!("{} covariate values", covariate.len()),
        });
    }
    let lanes = check_lane(lane, n_lanes)?;

    let mut report =
        NormalizationReport::new(format!("within-lane {}", method), n_features, n_lanes);
    let (usable, missing): (Vec<usize>, Vec<usize>) =
        (0..n_features).partition(|&i| covariate[i].is_finite());
    report.missing_covariate = missing;

    if usable.len() < 2 {
        return unchanged(counts, params, report);
    }

    let usable_covariate: Vec<f64> = usable.iter().map(|&i| covariate[i]).collect();
    let model = match method {
        WithinLaneMethod::Loess => LaneModel::Loess(usable_covariate),
        _ => {
            let strata = compute_strata(&usable_covariate, params.num_bins)?;
            if strata.is_degenerate() {
                report.degenerate_strata = Some(DegenerateStrata {
                    requested: strata.requested_bins(),
                    used: strata.n_bins(),
                });
            }
            LaneModel::stratified(method, strata.members())?
        }
    };

    run(counts, &usable, &model, lanes, params, report)
}

/// Within-lane normalization with caller-supplied strata.
///
/// `strata` must cover every feature. Loess needs a continuous covariate and
/// is rejected here.
pub fn within_lane_normalization_by_strata(
    counts: ArrayView2<f64>,
    strata: &Strata,
    method: WithinLaneMethod,
    lane: Option<usize>,
    params: &NormalizationParams,
) -> Result<NormalizationResult> {
    check_input(counts, params)?;
    let (n_features, n_lanes) = counts.dim();
    if strata.len() != n_features {
        return Err(EdaseqError::DimensionMismatch {
            expected: format!("strata for {} features", n_features),
            got: format!("strata for {} features", strata.len()),
        });
    }
    let model = LaneModel::stratified(method, strata.members())?;
    let lanes = check_lane(lane, n_lanes)?;

    let report =
        NormalizationReport::new(format!("within-lane {}", method), n_features, n_lanes);
    if n_features < 2 {
        return unchanged(counts, params, report);
    }

    let usable: Vec<usize> = (0..n_features).collect();
    run(counts, &usable, &model, lanes, params, report)
}

fn run(
    counts: ArrayView2<f64>,
    usable: &[usize],
    model: &LaneModel,
    lanes: Vec<usize>,
    params: &NormalizationParams,
    mut report: NormalizationReport,
) -> Result<NormalizationResult> {
    let c = params.pseudo_count;

    let columns: Vec<(usize, Vec<f64>)> = lanes
        .par_iter()
        .map(|&j| {
            let log_counts: Vec<f64> = usable.iter().map(|&i| (counts[[i, j]] + c).ln()).collect();
            (j, model.apply(&log_counts, &params.loess))
        })
        .collect();

    let mut normalized: Array2<f64> = counts.to_owned();
    for (j, values) in columns {
        log::debug!("{}: lane {} normalized", report.step, j);
        for (&i, &v) in usable.iter().zip(&values) {
            normalized[[i, j]] = from_log(v, c);
        }
    }

    report.lanes_normalized = lanes;
    log::info!(
        "{}: {} features in {} lane(s)",
        report.step,
        usable.len(),
        report.lanes_normalized.len()
    );
    finish(counts, normalized, params, report)
}
