//! Input/Output operations for count tables, covariates and reports

mod report;
mod tables;

pub use report::{write_report, RunReport};
pub use tables::{read_count_matrix, read_feature_covariates, write_matrix, write_strata};
