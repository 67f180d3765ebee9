//! Conversion between normalized counts and log-ratio offsets
//!
//! `offset = log(normalized + c) - log(raw + c)` and its exact inverse
//! `normalized = exp(log(raw + c) + offset) - c`. Raw counts are never
//! modified; both directions return new matrices.

use ndarray::{Array2, ArrayView2, Zip};

use super::{validate_counts, validate_pseudo_count};
use crate::error::{EdaseqError, Result};

fn check_shapes(raw: ArrayView2<f64>, other: ArrayView2<f64>, what: &str) -> Result<()> {
    if raw.dim() != other.dim() {
        return Err(EdaseqError::DimensionMismatch {
            expected: format!("{} of shape {:?}", what, raw.dim()),
            got: format!("{:?}", other.dim()),
        });
    }
    Ok(())
}

/// Offset matrix relating normalized counts to raw counts
pub fn reconcile_offset(
    raw: ArrayView2<f64>,
    normalized: ArrayView2<f64>,
    pseudo_count: f64,
) -> Result<Array2<f64>> {
    check_shapes(raw, normalized, "normalized counts")?;
    validate_counts(raw, "raw counts")?;
    validate_counts(normalized, "normalized counts")?;
    validate_pseudo_count(raw, pseudo_count)?;
    validate_pseudo_count(normalized, pseudo_count)?;

    let mut offset = Array2::zeros(raw.dim());
    Zip::from(&mut offset)
        .and(&raw)
        .and(&normalized)
        .for_each(|o, &r, &n| *o = (n + pseudo_count).ln() - (r + pseudo_count).ln());
    Ok(offset)
}

/// Normalized counts recovered from raw counts and an offset matrix.
///
/// Results are floored at zero to absorb floating-point noise.
pub fn reconcile_normalized(
    raw: ArrayView2<f64>,
    offset: ArrayView2<f64>,
    pseudo_count: f64,
) -> Result<Array2<f64>> {
    check_shapes(raw, offset, "offset matrix")?;
    validate_counts(raw, "raw counts")?;
    validate_pseudo_count(raw, pseudo_count)?;
    if offset.iter().any(|o| !o.is_finite()) {
        return Err(EdaseqError::InvalidInput {
            reason: "offset matrix contains non-finite values".to_string(),
        });
    }

    let mut normalized = Array2::zeros(raw.dim());
    Zip::from(&mut normalized)
        .and(&raw)
        .and(&offset)
        .for_each(|n, &r, &o| {
            *n = (((r + pseudo_count).ln() + o).exp() - pseudo_count).max(0.0)
        });
    Ok(normalized)
}

/// Offset in the raw-over-normalized convention expected by GLM-based
/// differential expression tools: the negated offset.
pub fn model_offset(offset: ArrayView2<f64>) -> Array2<f64> {
    offset.mapv(|o| -o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_offset_round_trip() {
        let raw = array![[0.0, 10.0, 250.0], [3.0, 0.0, 1.0]];
        let normalized = array![[2.0, 14.0, 180.0], [0.0, 0.0, 5.0]];
        let offset = reconcile_offset(raw.view(), normalized.view(), 0.1).unwrap();
        let back = reconcile_normalized(raw.view(), offset.view(), 0.1).unwrap();
        for (a, b) in back.iter().zip(normalized.iter()) {
            assert!((a - b).abs() < 1e-9);
            assert_eq!(a.round(), b.round());
        }
    }

    #[test]
    fn test_identity_offset_is_zero() {
        let raw = array![[1.0, 2.0], [3.0, 4.0]];
        let offset = reconcile_offset(raw.view(), raw.view(), 0.1).unwrap();
        assert!(offset.iter().all(|&o| o == 0.0));
    }

    #[test]
    fn test_model_offset_sign() {
        let raw = array![[10.0]];
        let normalized = array![[20.0]];
        let offset = reconcile_offset(raw.view(), normalized.view(), 0.1).unwrap();
        assert!(offset[[0, 0]] > 0.0);
        assert_eq!(model_offset(offset.view())[[0, 0]], -offset[[0, 0]]);
    }

    #[test]
    fn test_shape_mismatch() {
        let raw = array![[1.0, 2.0]];
        let normalized = array![[1.0], [2.0]];
        assert!(matches!(
            reconcile_offset(raw.view(), normalized.view(), 0.1),
            Err(EdaseqError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_negative_normalized_rejected() {
        let raw = array![[1.0]];
        let normalized = array![[-1.0]];
        assert!(reconcile_offset(raw.view(), normalized.view(), 0.1).is_err());
        let bad_offset = array![[f64::INFINITY]];
        assert!(reconcile_normalized(raw.view(), bad_offset.view(), 0.1).is_err());
    }
}
