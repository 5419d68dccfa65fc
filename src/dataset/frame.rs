//! In-memory tabular dataset

use crate::error::{MeovisError, Result};
use serde::{Deserialize, Serialize};

/// Values of one column. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            ColumnData::Numeric(_) => "numeric",
            ColumnData::Categorical(_) => "categorical",
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetColumn {
    pub name: String,
    pub data: ColumnData,
}

impl DatasetColumn {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }
}

/// Summary of a dataset, reported next to the model info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub dtypes: Vec<String>,
    pub missing_values: usize,
    pub target_column: Option<String>,
}

/// Ordered named columns of equal length.
///
/// When `target_column` is unset the last column by position is the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFrame {
    columns: Vec<DatasetColumn>,
    target_column: Option<String>,
}

impl DatasetFrame {
    /// Build a frame; all columns must have the same length and distinct names
    pub fn new(columns: Vec<DatasetColumn>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let rows = first.data.len();
            for col in &columns {
                if col.data.len() != rows {
                    return Err(MeovisError::DatasetFormat(format!(
                        "column '{}' has {} rows, expected {}",
                        col.name,
                        col.data.len(),
                        rows
                    )));
                }
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(MeovisError::DatasetFormat(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        Ok(Self {
            columns,
            target_column: None,
        })
    }

    /// Designate the target column; it must be present
    pub fn with_target_column(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if self.column_index(&name).is_none() {
            return Err(MeovisError::TargetColumnNotFound(name));
        }
        self.target_column = Some(name);
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[DatasetColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&DatasetColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The explicitly designated target, if any
    pub fn target_column(&self) -> Option<&str> {
        self.target_column.as_deref()
    }

    /// Position of the target: the designated column, else the last one
    pub fn target_index(&self) -> Option<usize> {
        match &self.target_column {
            Some(name) => self.column_index(name),
            None => self.columns.len().checked_sub(1),
        }
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            rows: self.row_count(),
            columns: self.column_count(),
            column_names: self.column_names(),
            dtypes: self.columns.iter().map(|c| c.data.dtype().to_string()).collect(),
            missing_values: self.columns.iter().map(|c| c.data.null_count()).sum(),
            target_column: self
                .target_index()
                .map(|i| self.columns[i].name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DatasetFrame {
        DatasetFrame::new(vec![
            DatasetColumn::numeric("age", vec![Some(30.0), None, Some(50.0)]),
            DatasetColumn::categorical("city", vec![Some("a".into()), Some("b".into()), None]),
            DatasetColumn::numeric("label", vec![Some(0.0), Some(1.0), Some(1.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_shape_and_default_target() {
        let f = frame();
        assert_eq!(f.row_count(), 3);
        assert_eq!(f.column_count(), 3);
        assert_eq!(f.target_column(), None);
        assert_eq!(f.target_index(), Some(2));
    }

    #[test]
    fn test_named_target_must_exist() {
        assert_eq!(frame().with_target_column("age").unwrap().target_index(), Some(0));
        assert!(matches!(
            frame().with_target_column("missing"),
            Err(MeovisError::TargetColumnNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let err = DatasetFrame::new(vec![
            DatasetColumn::numeric("a", vec![Some(1.0)]),
            DatasetColumn::numeric("b", vec![Some(1.0), Some(2.0)]),
        ]);
        assert!(matches!(err, Err(MeovisError::DatasetFormat(_))));
    }

    #[test]
    fn test_info() {
        let info = frame().info();
        assert_eq!(info.rows, 3);
        assert_eq!(info.dtypes, vec!["numeric", "categorical", "numeric"]);
        assert_eq!(info.missing_values, 2);
        assert_eq!(info.target_column.as_deref(), Some("label"));
    }
}
