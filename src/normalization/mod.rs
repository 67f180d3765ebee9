//! Within-lane and between-lane normalization of RNA-seq count data
//!
//! Every method works on `log(count + c)` for a small pseudo-count `c`,
//! transforms back with `exp(.) - c`, floors at zero and optionally rounds.
//! The optional offset matrix records `log(normalized + c) - log(raw + c)`.

mod between_lane;
mod loess;
mod offset;
mod quantile;
mod strata;
mod within_lane;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{EdaseqError, Result};

pub use between_lane::between_lane_normalization;
pub use loess::{lowess, LoessParams};
pub use offset::{model_offset, reconcile_normalized, reconcile_offset};
pub use quantile::full_quantile;
pub use strata::{compute_strata, Strata};
pub use within_lane::{within_lane_normalization, within_lane_normalization_by_strata};

/// Pseudo-count added before taking logs
pub const DEFAULT_PSEUDO_COUNT: f64 = 0.1;

/// Negative values closer to zero than this are rounding noise from the
/// log/exp round trip and are not reported as clipped.
const CLIP_TOLERANCE: f64 = 1e-8;

/// Within-lane normalization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithinLaneMethod {
    /// Robust local regression on the covariate
    Loess,
    /// Per-stratum median scaling
    Median,
    /// Per-stratum upper-quartile scaling
    Upper,
    /// Full-quantile normalization of the strata
    Full,
}

/// Between-lane normalization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetweenLaneMethod {
    /// Global median scaling
    Median,
    /// Global upper-quartile scaling
    Upper,
    /// Full-quantile normalization across lanes
    Full,
}

impl fmt::Display for WithinLaneMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WithinLaneMethod::Loess => "loess",
            WithinLaneMethod::Median => "median",
            WithinLaneMethod::Upper => "upper",
            WithinLaneMethod::Full => "full",
        };
        f.write_str(name)
    }
}

impl FromStr for WithinLaneMethod {
    type Err = EdaseqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "loess" => Ok(WithinLaneMethod::Loess),
            "median" => Ok(WithinLaneMethod::Median),
            "upper" => Ok(WithinLaneMethod::Upper),
            "full" => Ok(WithinLaneMethod::Full),
            _ => Err(EdaseqError::InvalidInput {
                reason: format!(
                    "Unknown within-lane method '{}'. Use loess, median, upper or full.",
                    s
                ),
            }),
        }
    }
}

impl fmt::Display for BetweenLaneMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BetweenLaneMethod::Median => "median",
            BetweenLaneMethod::Upper => "upper",
            BetweenLaneMethod::Full => "full",
        };
        f.write_str(name)
    }
}

impl FromStr for BetweenLaneMethod {
    type Err = EdaseqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "median" => Ok(BetweenLaneMethod::Median),
            "upper" => Ok(BetweenLaneMethod::Upper),
            "full" => Ok(BetweenLaneMethod::Full),
            _ => Err(EdaseqError::InvalidInput {
                reason: format!(
                    "Unknown between-lane method '{}'. Use median, upper or full.",
                    s
                ),
            }),
        }
    }
}

/// Configurable parameters shared by all normalization methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    /// Constant added to counts before taking logs, also used for offsets
    pub pseudo_count: f64,
    /// Round normalized counts to the nearest integer
    pub round: bool,
    /// Also return the offset matrix
    pub offset: bool,
    /// Number of covariate strata for median/upper/full within-lane methods
    pub num_bins: usize,
    /// Local regression settings for within-lane loess
    pub loess: LoessParams,
}

impl Default for NormalizationParams {
    fn default() -> Self {
        Self {
            pseudo_count: DEFAULT_PSEUDO_COUNT,
            round: true,
            offset: false,
            num_bins: 10,
            loess: LoessParams::default(),
        }
    }
}

impl NormalizationParams {
    /// Check that every knob holds a usable value
    pub fn validate(&self) -> Result<()> {
        if !self.pseudo_count.is_finite() {
            return Err(EdaseqError::InvalidInput {
                reason: format!("pseudo-count must be finite, got {}", self.pseudo_count),
            });
        }
        if self.num_bins == 0 {
            return Err(EdaseqError::InvalidInput {
                reason: "number of bins must be at least 1".to_string(),
            });
        }
        self.loess.validate()
    }
}

/// Stratification that produced fewer bins than requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegenerateStrata {
    pub requested: usize,
    pub used: usize,
}

/// Recoverable conditions met during one normalization step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    /// Human-readable step name, e.g. "within-lane loess"
    pub step: String,
    pub n_features: usize,
    pub n_lanes: usize,
    /// Lanes that were actually transformed
    pub lanes_normalized: Vec<usize>,
    /// Features passed through because their covariate is missing
    pub missing_covariate: Vec<usize>,
    pub degenerate_strata: Option<DegenerateStrata>,
    /// Input too small to normalize; returned unchanged
    pub unchanged: bool,
    /// Entries that became negative and were floored at zero
    pub clipped: usize,
}

impl NormalizationReport {
    pub(crate) fn new(step: impl Into<String>, n_features: usize, n_lanes: usize) -> Self {
        Self {
            step: step.into(),
            n_features,
            n_lanes,
            ..Default::default()
        }
    }

    /// True if any recoverable condition was recorded
    pub fn has_warnings(&self) -> bool {
        !self.warnings().is_empty()
    }

    /// One line per recoverable condition
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.missing_covariate.is_empty() {
            out.push(format!(
                "{} features lack covariate data and were left unnormalized",
                self.missing_covariate.len()
            ));
        }
        if let Some(d) = self.degenerate_strata {
            out.push(format!(
                "only {} distinct strata available, {} requested",
                d.used, d.requested
            ));
        }
        if self.unchanged {
            out.push("input too small to normalize, returned unchanged".to_string());
        }
        if self.clipped > 0 {
            out.push(format!("{} negative values floored at zero", self.clipped));
        }
        out
    }
}

/// Output of a normalization step
#[derive(Debug, Clone)]
pub struct NormalizationResult {
    /// Normalized counts, same shape as the input
    pub normalized: Array2<f64>,
    /// `log(normalized + c) - log(raw + c)` when requested
    pub offset: Option<Array2<f64>>,
    pub report: NormalizationReport,
}

/// Reject negative or non-finite counts
pub(crate) fn validate_counts(counts: ArrayView2<f64>, what: &str) -> Result<()> {
    if let Some(bad) = counts.iter().find(|x| !x.is_finite() || **x < 0.0) {
        return Err(EdaseqError::InvalidCountMatrix {
            reason: format!("{} must be non-negative finite values, found {}", what, bad),
        });
    }
    Ok(())
}

/// Ensure `count + c` stays positive so logs are defined
pub(crate) fn validate_pseudo_count(counts: ArrayView2<f64>, pseudo_count: f64) -> Result<()> {
    let min = counts.iter().copied().fold(f64::INFINITY, f64::min);
    if min.is_finite() && min + pseudo_count <= 0.0 {
        return Err(EdaseqError::NumericalInstability {
            operation: "log transform".to_string(),
            details: format!(
                "count {} plus pseudo-count {} is not positive",
                min, pseudo_count
            ),
        });
    }
    Ok(())
}

/// Common entry checks for both normalizers
pub(crate) fn check_input(counts: ArrayView2<f64>, params: &NormalizationParams) -> Result<()> {
    params.validate()?;
    let (n_features, n_lanes) = counts.dim();
    if n_features == 0 || n_lanes == 0 {
        return Err(EdaseqError::EmptyData {
            reason: format!("count matrix is {} x {}", n_features, n_lanes),
        });
    }
    validate_counts(counts, "counts")?;
    validate_pseudo_count(counts, params.pseudo_count)
}

/// Back-transform a log-scale value
pub(crate) fn from_log(value: f64, pseudo_count: f64) -> f64 {
    value.exp() - pseudo_count
}

/// Floor, round and derive offsets for a freshly normalized matrix
pub(crate) fn finish(
    raw: ArrayView2<f64>,
    mut normalized: Array2<f64>,
    params: &NormalizationParams,
    mut report: NormalizationReport,
) -> Result<NormalizationResult> {
    let mut clipped = 0;
    normalized.mapv_inplace(|v| {
        if v < 0.0 {
            if v < -CLIP_TOLERANCE {
                clipped += 1;
            }
            0.0
        } else {
            v
        }
    });
    report.clipped = clipped;

    if params.round {
        normalized.mapv_inplace(f64::round);
    }

    let offset = if params.offset {
        Some(reconcile_offset(raw, normalized.view(), params.pseudo_count)?)
    } else {
        None
    };

    for warning in report.warnings() {
        log::warn!("{}: {}", report.step, warning);
    }

    Ok(NormalizationResult {
        normalized,
        offset,
        report,
    })
}

/// Result for input that is returned as-is
pub(crate) fn unchanged(
    raw: ArrayView2<f64>,
    params: &NormalizationParams,
    mut report: NormalizationReport,
) -> Result<NormalizationResult> {
    report.unchanged = true;
    finish(raw, raw.to_owned(), params, report)
}
