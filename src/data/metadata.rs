//! Metadata for lanes (phenotype) and features (covariates)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{EdaseqError, Result};

/// Phenotype data for each lane, e.g. condition or library prep batch.
///
/// Carried alongside the counts for the caller; normalization never reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    /// Column name -> value for each sample
    conditions: HashMap<String, Vec<String>>,
}

impl SampleMetadata {
    pub fn new(sample_ids: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id) {
                log::warn!("Duplicate sample ID detected: '{}'. Sample IDs should be unique.", id);
            }
        }
        Self {
            sample_ids,
            conditions: HashMap::new(),
        }
    }

    /// Add a phenotype column
    pub fn add_condition(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(EdaseqError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        self.conditions.insert(name.to_string(), values);
        Ok(())
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn condition(&self, name: &str) -> Option<&[String]> {
        self.conditions.get(name).map(Vec::as_slice)
    }
}

/// Numeric per-feature covariates such as GC-content or length.
///
/// A non-finite value (NaN) marks a feature without covariate data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMetadata {
    feature_ids: Vec<String>,
    covariates: BTreeMap<String, Vec<f64>>,
}

impl FeatureMetadata {
    pub fn new(feature_ids: Vec<String>) -> Self {
        Self {
            feature_ids,
            covariates: BTreeMap::new(),
        }
    }

    /// Add or replace a covariate column
    pub fn add_covariate(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if values.len() != self.feature_ids.len() {
            return Err(EdaseqError::DimensionMismatch {
                expected: format!("{} values", self.feature_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        self.covariates.insert(name.to_string(), values);
        Ok(())
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn covariate(&self, name: &str) -> Option<&[f64]> {
        self.covariates.get(name).map(Vec::as_slice)
    }

    /// Covariate values, or an error naming the unknown covariate
    pub fn require_covariate(&self, name: &str) -> Result<&[f64]> {
        self.covariate(name).ok_or_else(|| EdaseqError::UnknownCovariate {
            name: name.to_string(),
        })
    }

    /// Covariate names in sorted order
    pub fn covariate_names(&self) -> Vec<&str> {
        self.covariates.keys().map(|s| s.as_str()).collect()
    }

    /// Number of features lacking a value for `name`
    pub fn n_missing(&self, name: &str) -> Option<usize> {
        self.covariate(name)
            .map(|values| values.iter().filter(|v| !v.is_finite()).count())
    }

    /// Reorder rows to follow `feature_ids`.
    ///
    /// Features absent from this table get missing values for every covariate.
    pub fn align_to(&self, feature_ids: &[String]) -> FeatureMetadata {
        let index: HashMap<&str, usize> = self
            .feature_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let positions: Vec<Option<usize>> = feature_ids
            .iter()
            .map(|id| index.get(id.as_str()).copied())
            .collect();

        let absent = positions.iter().filter(|p| p.is_none()).count();
        if absent > 0 {
            log::warn!("{} features have no annotation; their covariates are missing", absent);
        }

        let covariates = self
            .covariates
            .iter()
            .map(|(name, values)| {
                let aligned = positions
                    .iter()
                    .map(|p| p.map_or(f64::NAN, |i| values[i]))
                    .collect();
                (name.clone(), aligned)
            })
            .collect();

        FeatureMetadata {
            feature_ids: feature_ids.to_vec(),
            covariates,
        }
    }

    /// Subset metadata to specific features
    pub fn subset(&self, feature_indices: &[usize]) -> Result<Self> {
        let ids = feature_indices.iter().map(|&i| self.feature_ids[i].clone()).collect();
        let mut subset = FeatureMetadata::new(ids);
        for (name, values) in &self.covariates {
            subset.add_covariate(name, feature_indices.iter().map(|&i| values[i]).collect())?;
        }
        Ok(subset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sample_metadata() {
        let mut meta = SampleMetadata::new(ids(&["s1", "s2", "s3", "s4"]));
        meta.add_condition("treatment", ids(&["control", "control", "treated", "treated"]))
            .unwrap();
        assert_eq!(meta.condition("treatment").unwrap()[2], "treated");
        assert!(meta.condition("batch").is_none());
        assert!(meta.add_condition("batch", ids(&["a"])).is_err());
    }

    #[test]
    fn test_covariates_and_missing() {
        let mut meta = FeatureMetadata::new(ids(&["g1", "g2", "g3"]));
        meta.add_covariate("gc", vec![0.4, f64::NAN, 0.6]).unwrap();
        meta.add_covariate("length", vec![1200.0, 800.0, 3000.0]).unwrap();
        assert_eq!(meta.covariate_names(), vec!["gc", "length"]);
        assert_eq!(meta.n_missing("gc"), Some(1));
        assert!(matches!(
            meta.require_covariate("mappability"),
            Err(EdaseqError::UnknownCovariate { .. })
        ));
        assert!(meta.add_covariate("gc", vec![0.1]).is_err());
    }

    #[test]
    fn test_align_to_count_order() {
        let mut meta = FeatureMetadata::new(ids(&["g1", "g2", "g3"]));
        meta.add_covariate("gc", vec![0.1, 0.2, 0.3]).unwrap();
        let aligned = meta.align_to(&ids(&["g3", "g9", "g1"]));
        let gc = aligned.covariate("gc").unwrap();
        assert_eq!(gc[0], 0.3);
        assert!(gc[1].is_nan());
        assert_eq!(gc[2], 0.1);
    }

    #[test]
    fn test_subset() {
        let mut meta = FeatureMetadata::new(ids(&["g1", "g2", "g3"]));
        meta.add_covariate("gc", vec![0.1, 0.2, 0.3]).unwrap();
        let subset = meta.subset(&[2, 0]).unwrap();
        assert_eq!(subset.feature_ids(), &["g3", "g1"]);
        assert_eq!(subset.covariate("gc").unwrap(), &[0.3, 0.1]);
    }
}
