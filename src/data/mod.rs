//! Data structures for count-based normalization

mod count_matrix;
mod dataset;
mod metadata;

pub use count_matrix::CountMatrix;
pub use dataset::SeqExpressionSet;
pub use metadata::{FeatureMetadata, SampleMetadata};
