//! rust_edaseq: exploratory normalization of RNA-seq count data
//!
//! Within-lane normalization removes the dependence of counts on feature
//! covariates such as GC-content or length; between-lane normalization removes
//! sequencing depth and distributional differences between lanes. Both work on
//! `log(count + c)` and return normalized counts or log-ratio offsets that
//! downstream count models can consume.
//!
//! # Example
//!
//! ```ignore
//! use rust_edaseq::prelude::*;
//!
//! // Load data
//! let counts = read_count_matrix("counts.tsv")?;
//! let features = read_feature_covariates("features.tsv")?;
//! let mut set = SeqExpressionSet::new(counts).with_feature_metadata(features);
//!
//! // GC-content correction, then depth
//! let params = NormalizationParams { offset: true, ..Default::default() };
//! let within = Some(WithinLaneMethod::Full);
//! let between = Some(BetweenLaneMethod::Full);
//! run_normalization(&mut set, Some("gc"), within, between, &params)?;
//!
//! let offset = set.model_offset();
//! ```

pub mod cli;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod io;
pub mod normalization;
pub mod stats;

/// Re-exports for common usage
pub mod prelude {
    pub use crate::data::{CountMatrix, FeatureMetadata, SampleMetadata, SeqExpressionSet};
    pub use crate::diagnostics::{bias_curve, lane_summaries, mean_variance};
    pub use crate::error::{EdaseqError, Result};
    pub use crate::io::{read_count_matrix, read_feature_covariates, write_matrix, write_strata};
    pub use crate::normalization::{
        between_lane_normalization, compute_strata, model_offset, reconcile_normalized,
        reconcile_offset, within_lane_normalization, within_lane_normalization_by_strata,
        BetweenLaneMethod, LoessParams, NormalizationParams, NormalizationReport,
        NormalizationResult, Strata, WithinLaneMethod,
    };
    pub use crate::run_normalization;
}

use prelude::*;

/// Run the usual pipeline: within-lane against `covariate`, then between-lane.
///
/// Either step may be skipped by passing `None`. Reports of the steps run are
/// appended to the set.
pub fn run_normalization(
    set: &mut SeqExpressionSet,
    covariate: Option<&str>,
    within: Option<WithinLaneMethod>,
    between: Option<BetweenLaneMethod>,
    params: &NormalizationParams,
) -> Result<()> {
    if let Some(method) = within {
        let covariate = covariate.ok_or_else(|| EdaseqError::InvalidInput {
            reason: format!("within-lane {} normalization needs a covariate", method),
        })?;
        log::info!("Step 1: within-lane {} normalization against '{}'", method, covariate);
        set.within_lane_normalization(covariate, method, None, params)?;
    }

    if let Some(method) = between {
        log::info!("Step 2: between-lane {} normalization", method);
        set.between_lane_normalization(method, params)?;
    }

    Ok(())
}
