//! Dataset assembly.
//!
//! Joins the metadata table with the patch files on disk, fits the feature
//! encoders and packs everything into two aligned arrays:
//!
//! - `X`: patches, `[N, S, S]`, `f32` in `[0, 1]`
//! - `Y`: conditioning vectors, `[N, labels + 2]`, `f64`
//!
//! Rows without a patch file, or whose patch does not decode to `S`×`S`, are
//! recorded in the run report and left out of both arrays.

pub mod encoder;

pub use encoder::{FeatureEncoders, MinMaxScaler, OneHotEncoder, FEATURE_NAMES, NUM_FEATURES};

use std::fs::File;
use std::path::Path;

use ndarray::{Array2, Array3, ArrayView1, Axis};
use ndarray_npy::NpzWriter;

use crate::config::{ensure_dir, FitScope, PipelineConfig, TRAIN_SPLIT};
use crate::error::{ItemError, PatchprepError};
use crate::metadata::{read_metadata_csv, PatchMetadataRow};
use crate::report::{AssembleCounts, RunReport, Stage};

/// Array names inside the `.npz` archive.
pub const PATCHES_ARRAY: &str = "X";
pub const CONDITIONS_ARRAY: &str = "Y";

/// Aligned patches and conditioning vectors; row `i` of each belongs to
/// `rows[i]`.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub patches: Array3<f32>,
    pub conditions: Array2<f64>,
    pub rows: Vec<PatchMetadataRow>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read the metadata table, assemble the dataset and write both artifacts.
pub fn assemble(
    config: &PipelineConfig,
    report: &mut RunReport,
) -> Result<(Dataset, FeatureEncoders), PatchprepError> {
    let metadata_path = config.metadata_path();
    let rows = read_metadata_csv(&metadata_path)?;
    log::info!("assembling from {} metadata row(s)", rows.len());

    let (dataset, encoders) = assemble_dataset(config, rows, report)?;

    ensure_dir(&config.out_dir)?;
    write_dataset(&config.dataset_path(), &dataset)?;
    encoders.save(&config.encoders_path())?;

    log::info!(
        "saved dataset: {} patch(es), conditioning vector size {}",
        dataset.len(),
        encoders.width()
    );
    Ok((dataset, encoders))
}

/// Join `rows` with their patch files and build the aligned arrays.
///
/// Fails only when no row survives to fit the encoders on.
pub fn assemble_dataset(
    config: &PipelineConfig,
    rows: Vec<PatchMetadataRow>,
    report: &mut RunReport,
) -> Result<(Dataset, FeatureEncoders), PatchprepError> {
    let size = config.image_size;
    let rows_read = rows.len();

    let mut loaded: Vec<(PatchMetadataRow, Array2<f32>)> = Vec::with_capacity(rows.len());
    for row in rows {
        let path = config.patch_path(&row.split, &row.label, &row.filename);
        if !path.is_file() {
            report.record(
                Stage::Assemble,
                &ItemError::JoinInconsistency {
                    path,
                    filename: row.filename,
                },
            );
            continue;
        }

        match load_patch(&path, size) {
            Ok(patch) => loaded.push((row, patch)),
            Err(error) => report.record(Stage::Assemble, &error),
        }
    }

    let fit_rows: Vec<&PatchMetadataRow> = loaded
        .iter()
        .map(|(row, _)| row)
        .filter(|row| config.fit_scope == FitScope::All || row.split == TRAIN_SPLIT)
        .collect();
    let encoders =
        FeatureEncoders::fit(&fit_rows).ok_or_else(|| PatchprepError::EmptyDataset {
            path: config.metadata_path(),
        })?;
    log::debug!(
        "fitted encoders on {} row(s), labels: {}",
        fit_rows.len(),
        encoders.label.categories.join(", ")
    );

    let mut encoded: Vec<(PatchMetadataRow, Array2<f32>, Vec<f64>)> =
        Vec::with_capacity(loaded.len());
    for (row, patch) in loaded {
        match encoders.encode_row(&row) {
            Some(vector) => encoded.push((row, patch, vector)),
            None => report.record(
                Stage::Assemble,
                &ItemError::UnknownLabel {
                    filename: row.filename,
                    label: row.label,
                },
            ),
        }
    }

    let n = encoded.len();
    let side = size as usize;
    let mut patches = Array3::<f32>::zeros((n, side, side));
    let mut conditions = Array2::<f64>::zeros((n, encoders.width()));
    let mut kept_rows = Vec::with_capacity(n);

    for (i, (row, patch, vector)) in encoded.into_iter().enumerate() {
        patches.index_axis_mut(Axis(0), i).assign(&patch);
        conditions
            .index_axis_mut(Axis(0), i)
            .assign(&ArrayView1::from(vector.as_slice()));
        kept_rows.push(row);
    }

    report.assemble = Some(AssembleCounts {
        rows_read,
        rows_retained: n,
        rows_excluded: rows_read - n,
        labels: encoders.label.width(),
        conditioning_width: encoders.width(),
    });

    Ok((
        Dataset {
            patches,
            conditions,
            rows: kept_rows,
        },
        encoders,
    ))
}

/// Decode a patch as grayscale `[size, size]` with values in `[0, 1]`.
pub fn load_patch(path: &Path, size: u32) -> Result<Array2<f32>, ItemError> {
    let image = image::open(path)
        .map_err(|source| ItemError::ImageLoad {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?
        .to_luma8();

    if image.dimensions() != (size, size) {
        return Err(ItemError::ShapeMismatch {
            path: path.to_path_buf(),
            width: image.width(),
            height: image.height(),
            expected: size,
        });
    }

    let side = size as usize;
    Ok(Array2::from_shape_fn((side, side), |(y, x)| {
        f32::from(image.get_pixel(x as u32, y as u32)[0]) / 255.0
    }))
}

/// Write `X` and `Y` into a compressed `.npz` archive.
pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<(), PatchprepError> {
    let to_error = |source: ndarray_npy::WriteNpzError| PatchprepError::DatasetWrite {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(PatchprepError::Io)?;
    let mut npz = NpzWriter::new_compressed(file);
    npz.add_array(PATCHES_ARRAY, &dataset.patches)
        .map_err(to_error)?;
    npz.add_array(CONDITIONS_ARRAY, &dataset.conditions)
        .map_err(to_error)?;
    npz.finish().map_err(to_error)?;
    Ok(())
}
