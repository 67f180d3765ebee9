//! JSON run reports

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::normalization::{NormalizationParams, NormalizationReport};

/// Parameters and per-step reports of one command-line run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub command: String,
    pub n_features: usize,
    pub n_lanes: usize,
    pub params: NormalizationParams,
    pub steps: Vec<NormalizationReport>,
    /// Flattened warnings of all steps, prefixed with the step name
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn new(
        command: &str,
        n_features: usize,
        n_lanes: usize,
        params: &NormalizationParams,
        steps: &[NormalizationReport],
    ) -> Self {
        let warnings = steps
            .iter()
            .flat_map(|s| s.warnings().into_iter().map(move |w| format!("{}: {}", s.step, w)))
            .collect();
        Self {
            command: command.to_string(),
            n_features,
            n_lanes,
            params: params.clone(),
            steps: steps.to_vec(),
            warnings,
        }
    }
}

/// Write any serializable report as pretty-printed JSON
pub fn write_report<P: AsRef<Path>, T: Serialize>(path: P, report: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}
