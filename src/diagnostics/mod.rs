//! Exploratory summaries of a count matrix
//!
//! These produce the numbers behind the usual RNA-seq quality plots: per-lane
//! boxplots and depth, the mean-variance relation, and covariate bias curves.
//! Rendering is left to the caller.

mod bias;
mod summary;

pub use bias::{bias_curve, BiasCurve, BiasStratum};
pub use summary::{lane_summaries, mean_variance, FiveNumber, LaneSummary, MeanVariance};
