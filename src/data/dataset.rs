//! SeqExpressionSet - counts, annotation and normalization state of one experiment

use ndarray::{Array2, ArrayView2};

use super::{CountMatrix, FeatureMetadata, SampleMetadata};
use crate::error::{EdaseqError, Result};
use crate::normalization::{
    self, model_offset, reconcile_normalized, reconcile_offset, BetweenLaneMethod,
    NormalizationParams, NormalizationReport, NormalizationResult, WithinLaneMethod,
};

/// Main data structure for a normalization run.
/// Raw counts are never modified; every step produces new normalized counts.
#[derive(Debug, Clone)]
pub struct SeqExpressionSet {
    /// Raw count matrix
    counts: CountMatrix,
    /// Lane phenotype data
    sample_metadata: SampleMetadata,
    /// Feature covariates, aligned to the count rows
    feature_metadata: FeatureMetadata,

    // Normalization results
    /// Counts after the most recent step
    normalized_counts: Option<Array2<f64>>,
    /// log(normalized + c) - log(raw + c)
    offset: Option<Array2<f64>>,
    /// Pseudo-count the stored offset was computed with
    pseudo_count: f64,
    /// One report per normalization step, in order
    reports: Vec<NormalizationReport>,
}

impl SeqExpressionSet {
    /// Create a set with empty annotation
    pub fn new(counts: CountMatrix) -> Self {
        let sample_metadata = SampleMetadata::new(counts.sample_ids().to_vec());
        let feature_metadata = FeatureMetadata::new(counts.feature_ids().to_vec());
        Self {
            counts,
            sample_metadata,
            feature_metadata,
            normalized_counts: None,
            offset: None,
            pseudo_count: normalization::DEFAULT_PSEUDO_COUNT,
            reports: Vec::new(),
        }
    }

    /// Attach feature covariates, reordered to follow the count rows
    pub fn with_feature_metadata(mut self, metadata: FeatureMetadata) -> Self {
        self.feature_metadata = if metadata.feature_ids() == self.counts.feature_ids() {
            metadata
        } else {
            metadata.align_to(self.counts.feature_ids())
        };
        self
    }

    /// Attach lane phenotype data
    pub fn with_sample_metadata(mut self, metadata: SampleMetadata) -> Result<Self> {
        if metadata.sample_ids() != self.counts.sample_ids() {
            return Err(EdaseqError::InvalidMetadata {
                reason: "Sample IDs in counts and metadata do not match".to_string(),
            });
        }
        self.sample_metadata = metadata;
        Ok(self)
    }

    // Getters
    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn sample_metadata(&self) -> &SampleMetadata {
        &self.sample_metadata
    }

    pub fn feature_metadata(&self) -> &FeatureMetadata {
        &self.feature_metadata
    }

    pub fn n_features(&self) -> usize {
        self.counts.n_features()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    pub fn offset(&self) -> Option<&Array2<f64>> {
        self.offset.as_ref()
    }

    /// Offset with the sign expected by GLM tools (raw over normalized)
    pub fn model_offset(&self) -> Option<Array2<f64>> {
        self.offset.as_ref().map(|o| model_offset(o.view()))
    }

    pub fn reports(&self) -> &[NormalizationReport] {
        &self.reports
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized_counts.is_some() || self.offset.is_some()
    }

    /// Normalized counts; rebuilt from the offset when only that is stored,
    /// raw counts when nothing has been normalized
    pub fn normalized_counts(&self) -> Result<Array2<f64>> {
        if let Some(normalized) = &self.normalized_counts {
            return Ok(normalized.clone());
        }
        match &self.offset {
            Some(offset) => {
                reconcile_normalized(self.counts.counts(), offset.view(), self.pseudo_count)
            }
            None => Ok(self.counts.counts().to_owned()),
        }
    }

    /// Store an externally computed offset; normalized counts are then derived from it
    pub fn set_offset(&mut self, offset: Array2<f64>, pseudo_count: f64) -> Result<()> {
        if offset.dim() != self.counts.counts().dim() {
            return Err(EdaseqError::DimensionMismatch {
                expected: format!("{:?}", self.counts.counts().dim()),
                got: format!("{:?}", offset.dim()),
            });
        }
        // Validates finiteness and the pseudo-count
        reconcile_normalized(self.counts.counts(), offset.view(), pseudo_count)?;
        self.offset = Some(offset);
        self.pseudo_count = pseudo_count;
        self.normalized_counts = None;
        Ok(())
    }

    /// Drop all normalization results
    pub fn reset_normalization(&mut self) {
        self.normalized_counts = None;
        self.offset = None;
        self.reports.clear();
    }

    /// Within-lane normalization against the named feature covariate
    pub fn within_lane_normalization(
        &mut self,
        covariate_name: &str,
        method: WithinLaneMethod,
        lane: Option<usize>,
        params: &NormalizationParams,
    ) -> Result<&NormalizationReport> {
        let covariate = self.feature_metadata.require_covariate(covariate_name)?.to_vec();
        let input = self.normalized_counts()?;
        let result = normalization::within_lane_normalization(
            input.view(),
            &covariate,
            method,
            lane,
            &step_params(params),
        )?;
        self.store(result, params)
    }

    /// Between-lane normalization of the current counts
    pub fn between_lane_normalization(
        &mut self,
        method: BetweenLaneMethod,
        params: &NormalizationParams,
    ) -> Result<&NormalizationReport> {
        let input = self.normalized_counts()?;
        let result =
            normalization::between_lane_normalization(input.view(), method, &step_params(params))?;
        self.store(result, params)
    }

    fn store(
        &mut self,
        result: NormalizationResult,
        params: &NormalizationParams,
    ) -> Result<&NormalizationReport> {
        self.offset = if params.offset {
            let raw = self.counts.counts();
            Some(reconcile_offset(raw, result.normalized.view(), params.pseudo_count)?)
        } else {
            None
        };
        self.pseudo_count = params.pseudo_count;
        self.normalized_counts = Some(result.normalized);
        self.reports.push(result.report);
        let n = self.reports.len();
        Ok(&self.reports[n - 1])
    }

    /// Raw counts as a view
    pub fn raw_counts(&self) -> ArrayView2<'_, f64> {
        self.counts.counts()
    }
}

/// The set derives its offset from the raw counts, not the step input
fn step_params(params: &NormalizationParams) -> NormalizationParams {
    NormalizationParams {
        offset: false,
        ..params.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn create_test_set() -> SeqExpressionSet {
        let counts = CountMatrix::new(
            array![
                [12.0, 30.0, 5.0],
                [40.0, 95.0, 21.0],
                [3.0, 9.0, 0.0],
                [150.0, 310.0, 80.0],
                [22.0, 41.0, 13.0],
                [7.0, 18.0, 2.0],
                [64.0, 120.0, 35.0],
                [0.0, 4.0, 1.0]
            ],
            ids("gene", 8),
            ids("lane", 3),
        )
        .unwrap();
        let mut features = FeatureMetadata::new(ids("gene", 8));
        features
            .add_covariate("gc", vec![0.35, 0.41, 0.52, 0.38, 0.60, 0.47, 0.44, f64::NAN])
            .unwrap();
        SeqExpressionSet::new(counts).with_feature_metadata(features)
    }

    fn with_offset() -> NormalizationParams {
        NormalizationParams {
            offset: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_set_creation() {
        let set = create_test_set();
        assert_eq!(set.n_features(), 8);
        assert_eq!(set.n_samples(), 3);
        assert!(!set.is_normalized());
        assert_eq!(set.normalized_counts().unwrap(), set.raw_counts().to_owned());
    }

    #[test]
    fn test_sample_metadata_must_match() {
        let set = create_test_set();
        let wrong = SampleMetadata::new(ids("other", 3));
        assert!(matches!(
            set.with_sample_metadata(wrong),
            Err(EdaseqError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_unknown_covariate() {
        let mut set = create_test_set();
        let params = NormalizationParams::default();
        let err = set
            .within_lane_normalization("length", WithinLaneMethod::Median, None, &params)
            .unwrap_err();
        assert!(matches!(err, EdaseqError::UnknownCovariate { .. }));
    }

    #[test]
    fn test_chained_offsets_telescope() {
        let mut set = create_test_set();
        let params = with_offset();
        set.within_lane_normalization("gc", WithinLaneMethod::Median, None, &params)
            .unwrap();
        let first = set.offset().unwrap().clone();
        let after_within = set.normalized_counts().unwrap();

        set.between_lane_normalization(BetweenLaneMethod::Median, &params)
            .unwrap();
        let total = set.offset().unwrap();
        let normalized = set.normalized_counts().unwrap();
        let step = reconcile_offset(after_within.view(), normalized.view(), 0.1).unwrap();

        for ((t, f), s) in total.iter().zip(first.iter()).zip(step.iter()) {
            assert!((t - (f + s)).abs() < 1e-9);
        }
        assert_eq!(set.reports().len(), 2);
        assert_eq!(set.model_offset().unwrap()[[0, 0]], -total[[0, 0]]);
    }

    #[test]
    fn test_missing_covariate_reported() {
        let mut set = create_test_set();
        let params = NormalizationParams::default();
        let report = set
            .within_lane_normalization("gc", WithinLaneMethod::Upper, None, &params)
            .unwrap();
        assert_eq!(report.missing_covariate, vec![7]);
        let normalized = set.normalized_counts().unwrap();
        assert_eq!(normalized.row(7), set.raw_counts().row(7));
    }

    #[test]
    fn test_offset_only_rebuilds_counts() {
        let mut set = create_test_set();
        let target = set.raw_counts().mapv(|x| x * 2.0);
        let offset = reconcile_offset(set.raw_counts(), target.view(), 0.1).unwrap();
        set.set_offset(offset, 0.1).unwrap();
        let rebuilt = set.normalized_counts().unwrap();
        for (a, b) in rebuilt.iter().zip(target.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert!(set.set_offset(array![[0.0]], 0.1).is_err());
    }

    #[test]
    fn test_reset_normalization() {
        let mut set = create_test_set();
        set.between_lane_normalization(BetweenLaneMethod::Full, &with_offset())
            .unwrap();
        assert!(set.is_normalized());
        set.reset_normalization();
        assert!(!set.is_normalized());
        assert!(set.offset().is_none());
        assert!(set.reports().is_empty());
    }
}
