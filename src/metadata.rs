//! Patch metadata table.
//!
//! One CSV row per planned patch with the box geometry the conditioning
//! vector is later built from:
//!
//! ```text
//! split,filename,label,width,height,aspect_ratio,area
//! train,crazing_1_0.jpg,crazing,191,192,0.99,36672
//! ```
//!
//! Rows come straight from the extraction plan, in plan order, so the table
//! is byte-identical across runs on unchanged inputs.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{ensure_dir, PipelineConfig};
use crate::error::PatchprepError;
use crate::plan::{ExtractionPlan, PlannedPatch};
use crate::report::{MetadataCounts, RunReport};

/// A single row of the metadata table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchMetadataRow {
    pub split: String,
    pub filename: String,
    pub label: String,
    pub width: i64,
    pub height: i64,
    pub aspect_ratio: f64,
    pub area: i64,
}

impl PatchMetadataRow {
    pub fn from_planned(planned: &PlannedPatch) -> Self {
        let width = planned.bbox.width();
        let height = planned.bbox.height();
        Self {
            split: planned.identity.split.clone(),
            filename: planned.identity.filename(),
            label: planned.bbox.label.clone(),
            width,
            height,
            aspect_ratio: aspect_ratio(width, height),
            area: planned.bbox.area(),
        }
    }
}

/// `width / height` rounded to two decimals; 0 when `height` is 0.
pub fn aspect_ratio(width: i64, height: i64) -> f64 {
    if height == 0 {
        return 0.0;
    }
    round2(width as f64 / height as f64)
}

/// Rounds the exact binary value, ties to even, so `0.125` becomes `0.12`.
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

/// Metadata rows for every planned patch, in plan order.
pub fn rows_from_plan(plan: &ExtractionPlan) -> Vec<PatchMetadataRow> {
    plan.patches().map(PatchMetadataRow::from_planned).collect()
}

/// Build the metadata table from `plan` and write it to the configured path.
pub fn collect_metadata(
    config: &PipelineConfig,
    plan: &ExtractionPlan,
    report: &mut RunReport,
) -> Result<Vec<PatchMetadataRow>, PatchprepError> {
    let rows = rows_from_plan(plan);
    let path = config.metadata_path();
    write_metadata_csv(&path, &rows)?;

    log::info!("saved {} metadata row(s) to {}", rows.len(), path.display());
    report.metadata = Some(MetadataCounts {
        rows_written: rows.len(),
    });
    Ok(rows)
}

/// Write rows with a header, creating the parent directory if needed.
pub fn write_metadata_csv(path: &Path, rows: &[PatchMetadataRow]) -> Result<(), PatchprepError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }

    let file = File::create(path).map_err(PatchprepError::Io)?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));
    write_rows(&mut csv_writer, rows, path)?;

    csv_writer
        .into_inner()
        .map_err(|e| PatchprepError::Io(e.into_error()))?
        .flush()
        .map_err(PatchprepError::Io)
}

/// Read a metadata table written by [`write_metadata_csv`].
pub fn read_metadata_csv(path: &Path) -> Result<Vec<PatchMetadataRow>, PatchprepError> {
    let file = File::open(path).map_err(PatchprepError::Io)?;
    let mut csv_reader = csv::Reader::from_reader(BufReader::new(file));

    csv_reader
        .deserialize::<PatchMetadataRow>()
        .map(|result| {
            result.map_err(|source| PatchprepError::MetadataCsvRead {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

/// Render rows as CSV text.
pub fn to_metadata_csv_string(rows: &[PatchMetadataRow]) -> Result<String, PatchprepError> {
    let path = Path::new("<string>");
    let mut csv_writer = csv::Writer::from_writer(Vec::new());
    write_rows(&mut csv_writer, rows, path)?;

    let bytes = csv_writer
        .into_inner()
        .map_err(|e| PatchprepError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| {
        PatchprepError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

fn write_rows<W: Write>(
    csv_writer: &mut csv::Writer<W>,
    rows: &[PatchMetadataRow],
    path: &Path,
) -> Result<(), PatchprepError> {
    let to_error = |source: csv::Error| PatchprepError::MetadataCsvWrite {
        path: path.to_path_buf(),
        source,
    };

    // serialize() only emits the header once a row exists
    if rows.is_empty() {
        csv_writer
            .write_record([
                "split",
                "filename",
                "label",
                "width",
                "height",
                "aspect_ratio",
                "area",
            ])
            .map_err(to_error)?;
    }
    for row in rows {
        csv_writer.serialize(row).map_err(to_error)?;
    }
    Ok(())
}
