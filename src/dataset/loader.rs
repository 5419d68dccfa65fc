//! Tabular file loading (CSV, JSON) through polars

use super::frame::{DatasetColumn, DatasetFrame};
use crate::error::{MeovisError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Supported dataset file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Json,
}

impl DatasetFormat {
    pub const EXTENSIONS: [&'static str; 2] = ["csv", "json"];

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(DatasetFormat::Csv),
            "json" => Ok(DatasetFormat::Json),
            other => Err(MeovisError::DatasetFormat(format!(
                "unsupported dataset format '.{}' (expected one of: .csv, .json)",
                other
            ))),
        }
    }
}

/// Data loader for tabular files
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    /// Rows used by polars for schema inference
    infer_schema_length: usize,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: 100,
        }
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows.max(1);
        self
    }

    /// Load a dataset file. Parse failures, empty files and unsupported
    /// extensions are all `DatasetFormat` errors.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<DatasetFrame> {
        let path = path.as_ref();
        let format = DatasetFormat::from_path(path)?;
        let start = Instant::now();

        let file = File::open(path)
            .map_err(|e| MeovisError::DatasetFormat(format!("{}: {}", path.display(), e)))?;

        let df = match format {
            DatasetFormat::Csv => CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(self.infer_schema_length))
                .into_reader_with_file_handle(file)
                .finish(),
            DatasetFormat::Json => JsonReader::new(file)
                .infer_schema_len(std::num::NonZeroUsize::new(self.infer_schema_length))
                .finish(),
        }
        .map_err(|e| MeovisError::DatasetFormat(format!("{}: {}", path.display(), e)))?;

        let frame = Self::from_polars(&df)?;
        if frame.row_count() == 0 {
            return Err(MeovisError::DatasetFormat(format!(
                "{}: dataset has no rows",
                path.display()
            )));
        }

        info!(
            path = %path.display(),
            rows = frame.row_count(),
            columns = frame.column_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset loaded"
        );
        Ok(frame)
    }

    /// Convert a polars DataFrame. String columns stay categorical; anything
    /// that casts to Float64 becomes numeric.
    pub fn from_polars(df: &DataFrame) -> Result<DatasetFrame> {
        let mut columns = Vec::with_capacity(df.width());
        for col in df.get_columns() {
            let name = col.name().to_string();
            let series = col.as_materialized_series();

            let column = match series.dtype() {
                DataType::String => DatasetColumn::categorical(name, string_values(series)?),
                _ => match series.cast(&DataType::Float64) {
                    Ok(cast) => {
                        let values: Vec<Option<f64>> = cast.f64()?.into_iter().collect();
                        DatasetColumn::numeric(name, values)
                    }
                    Err(_) => {
                        debug!(column = %name, dtype = %series.dtype(), "Falling back to string column");
                        let cast = series.cast(&DataType::String)?;
                        DatasetColumn::categorical(name, string_values(&cast)?)
                    }
                },
            };
            columns.push(column);
        }
        DatasetFrame::new(columns)
    }
}

fn string_values(series: &Series) -> Result<Vec<Option<String>>> {
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnData;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_csv_types() {
        let file = write_temp(".csv", "age,city,label\n30,paris,0\n,rome,1\n50,paris,1\n");
        let frame = DatasetLoader::new().load(file.path()).unwrap();
        assert_eq!(frame.row_count(), 3);
        assert_eq!(frame.column_names(), vec!["age", "city", "label"]);
        assert_eq!(
            frame.column("age").unwrap().data,
            ColumnData::Numeric(vec![Some(30.0), None, Some(50.0)])
        );
        assert!(matches!(frame.column("city").unwrap().data, ColumnData::Categorical(_)));
    }

    #[test]
    fn test_load_json_records() {
        let file = write_temp(".json", r#"[{"x": 1.5, "y": 0}, {"x": 2.5, "y": 1}]"#);
        let frame = DatasetLoader::new().load(file.path()).unwrap();
        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.column_count(), 2);
    }

    #[test]
    fn test_header_only_csv_has_no_rows() {
        let file = write_temp(".csv", "a,b\n");
        assert!(matches!(
            DatasetLoader::new().load(file.path()),
            Err(MeovisError::DatasetFormat(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".xlsx", "a,b\n1,2\n");
        let err = DatasetLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, MeovisError::DatasetFormat(msg) if msg.contains(".xlsx")));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DatasetLoader::new().load("/no/such/data.csv"),
            Err(MeovisError::DatasetFormat(_))
        ));
    }
}
