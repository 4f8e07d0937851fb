//! Source image lookup by base name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::ImageLookup;
use crate::error::ItemError;

const SOURCE_IMAGE_EXTENSION: &str = "jpg";

/// Resolves `{source_name}.jpg` inside one split's image directory.
///
/// In recursive mode the tree is walked once up front; a name found more
/// than once is reported as ambiguous instead of picking one.
#[derive(Debug)]
pub struct ImageLocator {
    root: PathBuf,
    mode: ImageLookup,
    index: HashMap<String, Vec<PathBuf>>,
}

impl ImageLocator {
    pub fn new(root: &Path, mode: ImageLookup) -> Self {
        let mut index: HashMap<String, Vec<PathBuf>> = HashMap::new();

        if mode == ImageLookup::Recursive {
            for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(source) => {
                        log::warn!("skipping unreadable entry under {}: {source}", root.display());
                        continue;
                    }
                };
                if entry.file_type().is_file() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    index.entry(name).or_default().push(entry.into_path());
                }
            }
            log::debug!("indexed {} file name(s) under {}", index.len(), root.display());
        }

        Self {
            root: root.to_path_buf(),
            mode,
            index,
        }
    }

    /// Path of the source image for `source_name`.
    pub fn locate(&self, source_name: &str) -> Result<PathBuf, ItemError> {
        let file_name = format!("{source_name}.{SOURCE_IMAGE_EXTENSION}");

        match self.mode {
            ImageLookup::Flat => {
                let path = self.root.join(&file_name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(ItemError::ImageLoad {
                        path,
                        message: "source image not found".to_string(),
                    })
                }
            }
            ImageLookup::Recursive => match self.index.get(&file_name).map(Vec::as_slice) {
                Some([path]) => Ok(path.clone()),
                Some(paths) if paths.len() > 1 => Err(ItemError::ImageLoad {
                    path: self.root.join(&file_name),
                    message: format!(
                        "{} files share this name: {}",
                        paths.len(),
                        paths
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }),
                _ => Err(ItemError::ImageLoad {
                    path: self.root.join(&file_name),
                    message: "source image not found under image directory".to_string(),
                }),
            },
        }
    }
}
