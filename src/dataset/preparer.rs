//! Splits a dataset into a numeric feature matrix and a target vector

use super::frame::{ColumnData, DatasetFrame};
use super::loader::DatasetLoader;
use crate::error::{MeovisError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

/// Feature columns (target excluded) as a dense `f64` matrix.
///
/// Missing values are NaN; categorical columns are ordinal codes over
/// their sorted distinct values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub values: Array2<f64>,
    /// Category order of each ordinal-encoded column, keyed by name
    pub encodings: BTreeMap<String, Vec<String>>,
}

impl FeatureMatrix {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }
}

/// The extracted target column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetVector {
    pub name: String,
    pub values: Array1<f64>,
    /// Original labels when the target was categorical; `values` hold their indices
    pub class_names: Option<Vec<String>>,
}

impl TargetVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Prepares model inputs from dataset files or frames
#[derive(Debug, Clone, Default)]
pub struct DatasetPreparer {
    loader: DatasetLoader,
}

impl DatasetPreparer {
    pub fn new(loader: DatasetLoader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &DatasetLoader {
        &self.loader
    }

    /// Load `path` and split it. A named target must exist; without one the
    /// last column is the target.
    pub fn prepare(
        &self,
        path: impl AsRef<Path>,
        target_column: Option<&str>,
    ) -> Result<(FeatureMatrix, TargetVector)> {
        let frame = self.loader.load(path)?;
        Self::split_with_target(&frame, target_column)
    }

    /// Split an in-memory frame using its own target designation
    pub fn split(frame: &DatasetFrame) -> Result<(FeatureMatrix, TargetVector)> {
        Self::split_with_target(frame, frame.target_column())
    }

    /// Split with an explicit target; `None` selects the last column
    pub fn split_with_target(
        frame: &DatasetFrame,
        target_column: Option<&str>,
    ) -> Result<(FeatureMatrix, TargetVector)> {
        Self::split_with_vocabulary(frame, target_column, &BTreeMap::new(), None)
    }

    /// Split against category orders fixed when a model was trained.
    ///
    /// A categorical feature listed in `encodings` is coded by position in
    /// its stored categories, and values outside them become NaN. With
    /// `class_names`, a categorical target is coded by position in those
    /// names and an unknown label is a [`MeovisError::DatasetFormat`].
    /// Anything without a stored order is encoded from its own values.
    pub fn split_with_vocabulary(
        frame: &DatasetFrame,
        target_column: Option<&str>,
        encodings: &BTreeMap<String, Vec<String>>,
        class_names: Option<&[String]>,
    ) -> Result<(FeatureMatrix, TargetVector)> {
        if frame.row_count() == 0 {
            return Err(MeovisError::DatasetFormat("dataset has no rows".to_string()));
        }
        let target_idx = match target_column {
            Some(name) => frame
                .column_index(name)
                .ok_or_else(|| MeovisError::TargetColumnNotFound(name.to_string()))?,
            None => frame
                .column_count()
                .checked_sub(1)
                .ok_or_else(|| MeovisError::DatasetFormat("dataset has no columns".to_string()))?,
        };
        if frame.column_count() < 2 {
            return Err(MeovisError::DatasetFormat(
                "dataset has no feature column".to_string(),
            ));
        }

        let n_rows = frame.row_count();
        let n_features = frame.column_count() - 1;
        let mut values = Array2::<f64>::zeros((n_rows, n_features));
        let mut feature_names = Vec::with_capacity(n_features);
        let mut feature_encodings = BTreeMap::new();

        let feature_columns = frame
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_idx)
            .map(|(_, c)| c);

        for (j, col) in feature_columns.enumerate() {
            feature_names.push(col.name.clone());
            match &col.data {
                ColumnData::Numeric(v) => {
                    for (i, cell) in v.iter().enumerate() {
                        values[[i, j]] = cell.unwrap_or(f64::NAN);
                    }
                }
                ColumnData::Categorical(v) => {
                    let (codes, categories) = match encodings.get(&col.name) {
                        Some(known) => {
                            let (codes, unknown) = encode_against(v, known);
                            if !unknown.is_empty() {
                                warn!(
                                    column = %col.name,
                                    unknown = ?unknown,
                                    "Unknown categories treated as missing"
                                );
                            }
                            (codes, known.clone())
                        }
                        None => ordinal_encode(v),
                    };
                    for (i, code) in codes.into_iter().enumerate() {
                        values[[i, j]] = code;
                    }
                    feature_encodings.insert(col.name.clone(), categories);
                }
            }
        }

        let target_col = &frame.columns()[target_idx];
        let (target, class_names) = match (&target_col.data, class_names) {
            (ColumnData::Numeric(v), _) => {
                let target = v
                    .iter()
                    .map(|cell| cell.filter(|x| x.is_finite()))
                    .collect::<Option<Vec<f64>>>();
                (target, None)
            }
            (ColumnData::Categorical(v), Some(known)) => {
                let (codes, unknown) = encode_against(v, known);
                if !unknown.is_empty() {
                    return Err(MeovisError::DatasetFormat(format!(
                        "target column '{}' has labels the model was not trained on: {:?}",
                        target_col.name, unknown
                    )));
                }
                let target = if codes.iter().any(|c| c.is_nan()) { None } else { Some(codes) };
                (target, Some(known.to_vec()))
            }
            (ColumnData::Categorical(v), None) => {
                let (codes, categories) = ordinal_encode(v);
                let target = if codes.iter().any(|c| c.is_nan()) { None } else { Some(codes) };
                (target, Some(categories))
            }
        };
        let target = target.ok_or_else(|| {
            MeovisError::DatasetFormat(format!(
                "target column '{}' contains missing values",
                target_col.name
            ))
        })?;

        debug!(
            rows = n_rows,
            features = n_features,
            target = %target_col.name,
            encoded_columns = feature_encodings.len(),
            "Dataset split"
        );

        Ok((
            FeatureMatrix {
                feature_names,
                values,
                encodings: feature_encodings,
            },
            TargetVector {
                name: target_col.name.clone(),
                values: Array1::from_vec(target),
                class_names,
            },
        ))
    }
}

/// Codes are positions in the sorted distinct values; missing cells are NaN
fn ordinal_encode(values: &[Option<String>]) -> (Vec<f64>, Vec<String>) {
    let mut categories: Vec<String> = values.iter().flatten().cloned().collect();
    categories.sort();
    categories.dedup();
    let codes = values
        .iter()
        .map(|v| match v {
            Some(s) => categories
                .binary_search(s)
                .map(|idx| idx as f64)
                .unwrap_or(f64::NAN),
            None => f64::NAN,
        })
        .collect();
    (codes, categories)
}

/// Codes are positions in `categories`. Missing and unknown cells are NaN;
/// the distinct unknown values come back sorted.
fn encode_against(values: &[Option<String>], categories: &[String]) -> (Vec<f64>, Vec<String>) {
    let positions: HashMap<&str, f64> = categories
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i as f64))
        .collect();
    let mut unknown = Vec::new();
    let codes = values
        .iter()
        .map(|v| match v {
            Some(s) => positions.get(s.as_str()).copied().unwrap_or_else(|| {
                unknown.push(s.clone());
                f64::NAN
            }),
            None => f64::NAN,
        })
        .collect();
    unknown.sort();
    unknown.dedup();
    (codes, unknown)
}
