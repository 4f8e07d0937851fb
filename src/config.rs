//! Pipeline configuration.
//!
//! One [`PipelineConfig`] is built (by the CLI or by a caller) and passed by
//! reference into every stage. All derived paths are computed here so the
//! extractor, the metadata collector and the assembler agree on them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::PatchprepError;

pub const DEFAULT_DATA_DIR: &str = "Data/NEU-DET";
pub const DEFAULT_OUT_DIR: &str = "data/processed";
pub const DEFAULT_IMAGE_SIZE: u32 = 32;
pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_SPLITS: [&str; 2] = ["train", "validation"];

/// The split whose rows the encoders are fitted on under [`FitScope::Train`].
pub const TRAIN_SPLIT: &str = "train";

const ANNOTATIONS_DIR: &str = "annotations";
const IMAGES_DIR: &str = "images";
const PATCHES_DIR: &str = "patches";
const METADATA_FILE: &str = "patch_metadata.csv";
const DATASET_FILE: &str = "dataset.npz";
const ENCODERS_FILE: &str = "encoders.json";

/// How a source image is located from its annotation's base name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageLookup {
    /// Search `images/` recursively by exact file name. Duplicates are an
    /// error for the affected source.
    #[default]
    Recursive,
    /// Only try `images/{name}.jpg`.
    Flat,
}

/// Which rows the label encoder and feature scaler are fitted on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitScope {
    /// Fit once over every retained row, all splits together.
    #[default]
    All,
    /// Fit on the train split only and transform the others.
    Train,
}

impl FromStr for ImageLookup {
    type Err = PatchprepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recursive" => Ok(ImageLookup::Recursive),
            "flat" => Ok(ImageLookup::Flat),
            other => Err(PatchprepError::InvalidConfig(format!(
                "image lookup '{other}' (supported: recursive, flat)"
            ))),
        }
    }
}

impl FromStr for FitScope {
    type Err = PatchprepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FitScope::All),
            "train" => Ok(FitScope::Train),
            other => Err(PatchprepError::InvalidConfig(format!(
                "fit scope '{other}' (supported: all, train)"
            ))),
        }
    }
}

impl fmt::Display for ImageLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLookup::Recursive => write!(f, "recursive"),
            ImageLookup::Flat => write!(f, "flat"),
        }
    }
}

impl fmt::Display for FitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitScope::All => write!(f, "all"),
            FitScope::Train => write!(f, "train"),
        }
    }
}

/// Explicit configuration for a pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Root of the source dataset (`{split}/annotations`, `{split}/images`).
    pub data_dir: PathBuf,
    /// Root for every produced artifact.
    pub out_dir: PathBuf,
    /// Side length of the square output patches.
    pub image_size: u32,
    /// Splits to process, in order.
    pub splits: Vec<String>,
    /// Progress is logged every `batch_size` extracted patches.
    pub batch_size: usize,
    pub image_lookup: ImageLookup,
    pub fit_scope: FitScope,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            image_size: DEFAULT_IMAGE_SIZE,
            splits: DEFAULT_SPLITS.iter().map(|s| s.to_string()).collect(),
            batch_size: DEFAULT_BATCH_SIZE,
            image_lookup: ImageLookup::default(),
            fit_scope: FitScope::default(),
        }
    }
}

impl PipelineConfig {
    /// Config rooted at the given input and output directories, defaults
    /// everywhere else.
    pub fn new(data_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            out_dir: out_dir.into(),
            ..Default::default()
        }
    }

    /// Rejects settings no stage can work with.
    pub fn validate(&self) -> Result<(), PatchprepError> {
        if self.image_size == 0 {
            return Err(PatchprepError::InvalidConfig(
                "image size must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PatchprepError::InvalidConfig(
                "batch size must be positive".to_string(),
            ));
        }
        if self.splits.is_empty() {
            return Err(PatchprepError::InvalidConfig(
                "at least one split is required".to_string(),
            ));
        }
        for split in &self.splits {
            if !is_plain_dir_name(split) {
                return Err(PatchprepError::InvalidConfig(format!(
                    "split name '{split}' must be a plain directory name"
                )));
            }
        }
        Ok(())
    }

    pub fn annotations_dir(&self, split: &str) -> PathBuf {
        self.data_dir.join(split).join(ANNOTATIONS_DIR)
    }

    pub fn images_dir(&self, split: &str) -> PathBuf {
        self.data_dir.join(split).join(IMAGES_DIR)
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.out_dir.join(PATCHES_DIR)
    }

    /// `{out}/patches/{split}/{label}/{filename}`
    pub fn patch_path(&self, split: &str, label: &str, filename: &str) -> PathBuf {
        self.patches_dir().join(split).join(label).join(filename)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.out_dir.join(METADATA_FILE)
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.out_dir.join(DATASET_FILE)
    }

    pub fn encoders_path(&self) -> PathBuf {
        self.out_dir.join(ENCODERS_FILE)
    }
}

/// True when `name` joins onto a directory as exactly one child entry.
pub(crate) fn is_plain_dir_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// Create `path` and its parents if missing. Safe to call repeatedly.
pub(crate) fn ensure_dir(path: &Path) -> Result<(), PatchprepError> {
    std::fs::create_dir_all(path).map_err(|source| PatchprepError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
