//! Count matrix of aligned reads per feature and lane

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};

use crate::error::{EdaseqError, Result};

/// Make feature names unique by appending _1, _2, ... to repeats
fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for name in &names {
        *seen.entry(name.clone()).or_insert(0) += 1;
    }
    if seen.values().all(|&c| c == 1) {
        return names;
    }
    seen.clear();
    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name
            } else {
                let renamed = format!("{}_{}", name, *count - 1);
                log::warn!("Duplicate feature name '{}' renamed to '{}'", name, renamed);
                renamed
            }
        })
        .collect()
}

/// Read counts, rows are features (genes) and columns are lanes (samples).
///
/// All entries are non-negative and finite.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    counts: Array2<f64>,
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix from raw data
    pub fn new(
        counts: Array2<f64>,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_features, n_samples) = counts.dim();

        if feature_ids.len() != n_features {
            return Err(EdaseqError::DimensionMismatch {
                expected: format!("{} feature IDs", n_features),
                got: format!("{} feature IDs", feature_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(EdaseqError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(EdaseqError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }

        if counts.iter().any(|&x| x != x.round()) {
            log::warn!(
                "Some count values are not integers; read counts are expected to be whole numbers"
            );
        }

        Ok(Self {
            counts,
            feature_ids: deduplicate_names(feature_ids),
            sample_ids,
        })
    }

    pub fn n_features(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }
}
