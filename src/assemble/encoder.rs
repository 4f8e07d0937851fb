//! Fitted label encoder and feature scaler.
//!
//! The pair is saved next to the dataset and is the only thing needed to
//! build conditioning vectors at inference time that match the training
//! matrix column for column.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PatchprepError;
use crate::metadata::PatchMetadataRow;

/// Number of scaled numeric columns after the one-hot block.
pub const NUM_FEATURES: usize = 2;

/// Column names of the scaled block, in vector order.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = ["aspect_ratio", "area"];

/// One-hot encoding over labels sorted lexicographically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let categories: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            categories: categories.into_iter().map(ToOwned::to_owned).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|category| category.as_str().cmp(label))
            .ok()
    }
}

/// Per-column min-max scaling to `[0, 1]` over the fitted range.
///
/// A constant column maps to 0. Values outside the fitted range are not
/// clipped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: [f64; NUM_FEATURES],
    pub data_max: [f64; NUM_FEATURES],
}

impl MinMaxScaler {
    /// `None` when there is nothing to fit on.
    pub fn fit<'a>(samples: impl IntoIterator<Item = &'a [f64; NUM_FEATURES]>) -> Option<Self> {
        let mut samples = samples.into_iter();
        let first = samples.next()?;
        let mut data_min = *first;
        let mut data_max = *first;

        for sample in samples {
            for (column, value) in sample.iter().enumerate() {
                data_min[column] = data_min[column].min(*value);
                data_max[column] = data_max[column].max(*value);
            }
        }

        Some(Self { data_min, data_max })
    }

    pub fn transform(&self, sample: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
        let mut scaled = [0.0; NUM_FEATURES];
        for (column, value) in sample.iter().enumerate() {
            let range = self.data_max[column] - self.data_min[column];
            scaled[column] = if range == 0.0 {
                0.0
            } else {
                (value - self.data_min[column]) / range
            };
        }
        scaled
    }
}

/// The persisted encoder state: one-hot block, then scaled features.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoders {
    pub label: OneHotEncoder,
    pub features: Vec<String>,
    pub scaler: MinMaxScaler,
}

impl FeatureEncoders {
    /// Fit both encoders over `rows`; `None` when `rows` is empty.
    pub fn fit(rows: &[&PatchMetadataRow]) -> Option<Self> {
        let samples: Vec<[f64; NUM_FEATURES]> = rows.iter().map(|row| features_of(row)).collect();
        let scaler = MinMaxScaler::fit(&samples)?;

        Some(Self {
            label: OneHotEncoder::fit(rows.iter().map(|row| row.label.as_str())),
            features: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            scaler,
        })
    }

    /// Conditioning vector width: distinct labels plus the scaled features.
    pub fn width(&self) -> usize {
        self.label.width() + NUM_FEATURES
    }

    /// Conditioning vector for one sample, `None` for an unfitted label.
    pub fn try_encode(&self, label: &str, aspect_ratio: f64, area: f64) -> Option<Vec<f64>> {
        let hot = self.label.index_of(label)?;

        let mut vector = vec![0.0; self.width()];
        vector[hot] = 1.0;
        let scaled = self.scaler.transform(&[aspect_ratio, area]);
        vector[self.label.width()..].copy_from_slice(&scaled);
        Some(vector)
    }

    /// Like [`try_encode`](Self::try_encode), with an error naming the
    /// fitted labels.
    pub fn encode(&self, label: &str, aspect_ratio: f64, area: f64) -> Result<Vec<f64>, PatchprepError> {
        self.try_encode(label, aspect_ratio, area)
            .ok_or_else(|| PatchprepError::UnknownLabel {
                label: label.to_string(),
                known: self.label.categories.join(", "),
            })
    }

    pub fn encode_row(&self, row: &PatchMetadataRow) -> Option<Vec<f64>> {
        let [aspect_ratio, area] = features_of(row);
        self.try_encode(&row.label, aspect_ratio, area)
    }

    pub fn save(&self, path: &Path) -> Result<(), PatchprepError> {
        let file = File::create(path).map_err(PatchprepError::Io)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| {
            PatchprepError::EncodersWrite {
                path: path.to_path_buf(),
                source,
            }
        })?;
        writer.write_all(b"\n").map_err(PatchprepError::Io)?;
        writer.flush().map_err(PatchprepError::Io)
    }

    pub fn load(path: &Path) -> Result<Self, PatchprepError> {
        let file = File::open(path).map_err(PatchprepError::Io)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            PatchprepError::EncodersRead {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

fn features_of(row: &PatchMetadataRow) -> [f64; NUM_FEATURES] {
    [row.aspect_ratio, row.area as f64]
}
