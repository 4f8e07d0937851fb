use std::path::PathBuf;
use thiserror::Error;

/// The main error type for patchprep operations.
///
/// Every variant is fatal for the run. Problems confined to a single
/// annotation file, source image or patch are [`ItemError`]s instead and end
/// up in the run report.
#[derive(Debug, Error)]
pub enum PatchprepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input directory {path}: {message}")]
    InputLayout { path: PathBuf, message: String },

    #[error("Failed to write patch {path}: {message}")]
    PatchWrite { path: PathBuf, message: String },

    #[error("Failed to read metadata table {path}: {source}")]
    MetadataCsvRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write metadata table {path}: {source}")]
    MetadataCsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write dataset archive {path}: {source}")]
    DatasetWrite {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpzError,
    },

    #[error("Failed to read encoders from {path}: {source}")]
    EncodersRead {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write encoders to {path}: {source}")]
    EncodersWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to render report as JSON: {0}")]
    ReportJson(#[source] serde_json::Error),

    #[error("Unknown label '{label}' (fitted labels: {known})")]
    UnknownLabel { label: String, known: String },

    #[error("No rows left to assemble from {path}")]
    EmptyDataset { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Run cancelled")]
    Cancelled,
}

/// Why a single item (annotation file, source image, box, metadata row) was
/// excluded from the output.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("Failed to parse annotation {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to load image {path}: {message}")]
    ImageLoad { path: PathBuf, message: String },

    #[error("Label '{label}' of {filename} is not a plain directory name")]
    InvalidLabel { filename: String, label: String },

    #[error("Empty patch {filename}: {message}")]
    EmptyPatch { filename: String, message: String },

    #[error("Patch {path} is {width}x{height}, expected {expected}x{expected}")]
    ShapeMismatch {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("No patch file at {path} for metadata row {filename}")]
    JoinInconsistency { path: PathBuf, filename: String },

    #[error("Label '{label}' of {filename} was not seen when fitting the encoders")]
    UnknownLabel { filename: String, label: String },
}

impl ItemError {
    /// Stable snake_case code for JSON reports.
    pub fn code(&self) -> &'static str {
        match self {
            ItemError::Parse { .. } => "parse",
            ItemError::ImageLoad { .. } => "image_load",
            ItemError::InvalidLabel { .. } => "invalid_label",
            ItemError::EmptyPatch { .. } => "empty_patch",
            ItemError::ShapeMismatch { .. } => "shape_mismatch",
            ItemError::JoinInconsistency { .. } => "join_inconsistency",
            ItemError::UnknownLabel { .. } => "unknown_label",
        }
    }
}
