//! Between-lane normalization: remove depth and distributional differences
//! between lanes

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use super::quantile::full_quantile;
use super::{
    check_input, finish, from_log, unchanged, BetweenLaneMethod, NormalizationParams,
    NormalizationReport, NormalizationResult,
};
use crate::error::Result;
use crate::stats::{median, quantile};

/// Make lanes comparable across the whole feature set.
///
/// - `Median` / `Upper`: shift each lane's `log(x + c)` so its median
///   (upper quartile) equals the median of those values across lanes.
/// - `Full`: full-quantile normalize `log(x + c)` across lanes, so every lane
///   ends up with the same sorted values.
///
/// Matrices with a single lane or a single feature are returned unchanged.
pub fn between_lane_normalization(
    counts: ArrayView2<f64>,
    method: BetweenLaneMethod,
    params: &NormalizationParams,
) -> Result<NormalizationResult> {
    check_input(counts, params)?;
    let (n_features, n_lanes) = counts.dim();
    let mut report =
        NormalizationReport::new(format!("between-lane {}", method), n_features, n_lanes);

    if n_features < 2 || n_lanes < 2 {
        return unchanged(counts, params, report);
    }

    let c = params.pseudo_count;
    let log_lanes: Vec<Vec<f64>> = (0..n_lanes)
        .into_par_iter()
        .map(|j| counts.column(j).iter().map(|&x| (x + c).ln()).collect::<Vec<f64>>())
        .collect();

    let adjusted = match method {
        BetweenLaneMethod::Median => scale_lanes(log_lanes, 0.5),
        BetweenLaneMethod::Upper => scale_lanes(log_lanes, 0.75),
        BetweenLaneMethod::Full => full_quantile(&log_lanes),
    };

    let mut normalized = Array2::zeros((n_features, n_lanes));
    for (j, lane) in adjusted.iter().enumerate() {
        for (i, &v) in lane.iter().enumerate() {
            normalized[[i, j]] = from_log(v, c);
        }
    }

    report.lanes_normalized = (0..n_lanes).collect();
    log::info!("{}: {} features x {} lanes", report.step, n_features, n_lanes);
    finish(counts, normalized, params, report)
}

/// Shift every lane so its `prob` quantile hits the across-lane median
fn scale_lanes(log_lanes: Vec<Vec<f64>>, prob: f64) -> Vec<Vec<f64>> {
    let lane_quantiles: Vec<f64> = log_lanes.par_iter().map(|y| quantile(y, prob)).collect();
    let target = median(&lane_quantiles);
    log::debug!("lane quantiles {:?}, target {}", lane_quantiles, target);

    log_lanes
        .into_par_iter()
        .zip(lane_quantiles)
        .map(|(y, q)| {
            let shift = target - q;
            y.into_iter().map(|v| v + shift).collect::<Vec<f64>>()
        })
        .collect()
}
