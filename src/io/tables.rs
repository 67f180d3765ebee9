//! Delimited text tables: counts, covariates, normalized matrices and strata

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use ndarray::{Array2, ArrayView2};

use crate::data::{CountMatrix, FeatureMetadata};
use crate::error::{EdaseqError, Result};
use crate::normalization::Strata;

/// Tab if the header line has one, comma otherwise
fn detect_delimiter(path: &Path) -> Result<u8> {
    let mut header = String::new();
    BufReader::new(File::open(path)?).read_line(&mut header)?;
    if header.trim().is_empty() {
        return Err(EdaseqError::EmptyData {
            reason: format!("{} is empty", path.display()),
        });
    }
    Ok(if header.contains('\t') { b'\t' } else { b',' })
}

/// Header and data rows of a table whose first column holds row names
fn read_table(path: &Path) -> Result<(Vec<String>, Vec<StringRecord>)> {
    let delimiter = detect_delimiter(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let header: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();
    if header.is_empty() {
        return Err(EdaseqError::InvalidInput {
            reason: format!("{}: need a name column and at least one data column", path.display()),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() != header.len() + 1 {
            return Err(EdaseqError::InvalidInput {
                reason: format!(
                    "{}: row '{}' has {} columns, expected {}",
                    path.display(),
                    record.get(0).unwrap_or(""),
                    record.len(),
                    header.len() + 1
                ),
            });
        }
        rows.push(record);
    }
    if rows.is_empty() {
        return Err(EdaseqError::EmptyData {
            reason: format!("{} has no data rows", path.display()),
        });
    }
    Ok((header, rows))
}

/// Read a count matrix.
/// Expected format: first column is feature IDs, first row is lane IDs
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let (sample_ids, rows) = read_table(path.as_ref())?;
    let mut counts = Array2::zeros((rows.len(), sample_ids.len()));
    let mut feature_ids = Vec::with_capacity(rows.len());

    for (i, record) in rows.iter().enumerate() {
        let mut fields = record.iter();
        let id = fields.next().unwrap_or_default().to_string();
        for (j, field) in fields.enumerate() {
            counts[[i, j]] = field.parse::<f64>().map_err(|_| EdaseqError::InvalidCountMatrix {
                reason: format!("Invalid count value '{}' for feature '{}'", field, id),
            })?;
        }
        feature_ids.push(id);
    }

    log::debug!("read {} features x {} lanes", feature_ids.len(), sample_ids.len());
    CountMatrix::new(counts, feature_ids, sample_ids)
}

/// Parse a covariate cell; `NA`, `NaN` and empty cells are missing
fn parse_covariate(field: &str) -> Option<f64> {
    match field {
        "" | "NA" | "NaN" | "nan" => None,
        _ => field.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Read feature covariates.
/// Expected format: first column is feature IDs, one numeric column per covariate
pub fn read_feature_covariates<P: AsRef<Path>>(path: P) -> Result<FeatureMetadata> {
    let (names, rows) = read_table(path.as_ref())?;
    let feature_ids: Vec<String> = rows
        .iter()
        .map(|r| r.get(0).unwrap_or_default().to_string())
        .collect();
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); names.len()];

    for record in &rows {
        for (column, field) in columns.iter_mut().zip(record.iter().skip(1)) {
            let value = parse_covariate(field);
            if value.is_none() && !matches!(field, "" | "NA" | "NaN" | "nan") {
                return Err(EdaseqError::InvalidMetadata {
                    reason: format!(
                        "Invalid covariate value '{}' for feature '{}'",
                        field, &record[0]
                    ),
                });
            }
            column.push(value.unwrap_or(f64::NAN));
        }
    }

    let mut metadata = FeatureMetadata::new(feature_ids);
    for (name, values) in names.iter().zip(columns) {
        metadata.add_covariate(name, values)?;
        if let Some(missing) = metadata.n_missing(name).filter(|&m| m > 0) {
            log::info!("covariate '{}': {} features without a value", name, missing);
        }
    }
    Ok(metadata)
}

/// Write a features x lanes matrix as TSV
pub fn write_matrix<P: AsRef<Path>>(
    path: P,
    feature_ids: &[String],
    sample_ids: &[String],
    matrix: ArrayView2<f64>,
) -> Result<()> {
    if matrix.dim() != (feature_ids.len(), sample_ids.len()) {
        return Err(EdaseqError::DimensionMismatch {
            expected: format!("{} x {}", feature_ids.len(), sample_ids.len()),
            got: format!("{:?}", matrix.dim()),
        });
    }
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;

    let mut header = vec!["feature_id".to_string()];
    header.extend(sample_ids.iter().cloned());
    writer.write_record(&header)?;

    for (id, row) in feature_ids.iter().zip(matrix.rows()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(id.clone());
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write strata as TSV with 1-based bin labels
pub fn write_strata<P: AsRef<Path>>(
    path: P,
    feature_ids: &[String],
    strata: &Strata,
) -> Result<()> {
    if strata.len() != feature_ids.len() {
        return Err(EdaseqError::DimensionMismatch {
            expected: format!("strata for {} features", feature_ids.len()),
            got: format!("strata for {} features", strata.len()),
        });
    }
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(["feature_id", "stratum"])?;
    for (id, bin) in feature_ids.iter().zip(strata.assignment()) {
        writer.write_record([id.as_str(), (bin + 1).to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::compute_strata;
    use ndarray::array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_count_matrix() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(file, "gene1\t100\t200\t150").unwrap();
        writeln!(file, "gene2\t50\t75\t60").unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_features(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.counts()[[1, 2]], 60.0);
    }

    #[test]
    fn test_read_comma_separated_with_quotes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "\"id\",\"a\",\"b\"").unwrap();
        writeln!(file, "\"g1\",1,2").unwrap();
        writeln!(file, "\"g2\",3,4").unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.sample_ids(), &["a", "b"]);
        assert_eq!(matrix.feature_ids(), &["g1", "g2"]);
    }

    #[test]
    fn test_bad_count_value() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\ta").unwrap();
        writeln!(file, "g1\tmany").unwrap();
        assert!(matches!(
            read_count_matrix(file.path()),
            Err(EdaseqError::InvalidCountMatrix { .. })
        ));
    }

    #[test]
    fn test_read_covariates_with_missing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\tgc\tlength").unwrap();
        writeln!(file, "g1\t0.42\t1500").unwrap();
        writeln!(file, "g2\tNA\t900").unwrap();
        writeln!(file, "g3\t\t2100").unwrap();

        let meta = read_feature_covariates(file.path()).unwrap();
        let gc = meta.covariate("gc").unwrap();
        assert_eq!(gc[0], 0.42);
        assert!(gc[1].is_nan() && gc[2].is_nan());
        assert_eq!(meta.covariate("length").unwrap(), &[1500.0, 900.0, 2100.0]);
    }

    #[test]
    fn test_write_matrix_and_read_back() {
        let file = NamedTempFile::new().unwrap();
        let ids = vec!["g1".to_string(), "g2".to_string()];
        let lanes = vec!["a".to_string(), "b".to_string()];
        let matrix = array![[1.0, 2.5], [0.0, 7.0]];
        write_matrix(file.path(), &ids, &lanes, matrix.view()).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["feature_id\ta\tb", "g1\t1\t2.5", "g2\t0\t7"]);
        assert!(write_matrix(file.path(), &ids, &lanes[..1], matrix.view()).is_err());
    }

    #[test]
    fn test_write_strata_one_based() {
        let file = NamedTempFile::new().unwrap();
        let ids = vec!["g1".to_string(), "g2".to_string(), "g3".to_string()];
        let strata = compute_strata(&[0.1, 0.9, 0.5], 3).unwrap();
        write_strata(file.path(), &ids, &strata).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["feature_id\tstratum", "g1\t1", "g2\t3", "g3\t2"]);
    }
}
