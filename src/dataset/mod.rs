//! Dataset loading and preparation
//!
//! - [`DatasetLoader`] reads `.csv` / `.json` files into a [`DatasetFrame`]
//! - [`DatasetPreparer`] splits a frame into a [`FeatureMatrix`] and a
//!   [`TargetVector`] (explicit target column, else the last column)

mod frame;
mod loader;
mod preparer;

pub use frame::{ColumnData, DatasetColumn, DatasetFrame, DatasetInfo};
pub use loader::{DatasetFormat, DatasetLoader};
pub use preparer::{DatasetPreparer, FeatureMatrix, TargetVector};
