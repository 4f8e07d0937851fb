//! Patch extraction.
//!
//! For every planned source image: locate and decode the image once, cut
//! each planned box out of it, resize the crop to a square grayscale patch
//! and store it at `{out}/patches/{split}/{label}/{source}_{index}.jpg`.

mod lookup;

pub use lookup::ImageLocator;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, GrayImage, ImageEncoder};

use crate::annotation::BoundingBox;
use crate::config::{ensure_dir, PipelineConfig};
use crate::error::{ItemError, PatchprepError};
use crate::plan::ExtractionPlan;
use crate::report::{ExtractCounts, RunReport, Stage};

const JPEG_QUALITY: u8 = 95;

/// Shared flag for stopping a run between source images.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Extract every planned patch.
///
/// Missing or undecodable source images and empty crops are recorded in
/// `report` and skipped. Failing to create an output directory or to write
/// a patch aborts the run, as does cancellation.
pub fn extract_patches(
    config: &PipelineConfig,
    plan: &ExtractionPlan,
    cancel: &CancelToken,
    report: &mut RunReport,
) -> Result<(), PatchprepError> {
    let mut counts = ExtractCounts::default();
    let mut locators: HashMap<&str, ImageLocator> = HashMap::new();

    for source in &plan.sources {
        if cancel.is_cancelled() {
            log::warn!(
                "cancelled after {} patch(es); stopping before {}",
                counts.patches_produced,
                source.source_name
            );
            return Err(PatchprepError::Cancelled);
        }
        if source.patches.is_empty() {
            continue;
        }
        counts.source_images += 1;

        let locator = locators
            .entry(source.split.as_str())
            .or_insert_with(|| ImageLocator::new(&config.images_dir(&source.split), config.image_lookup));

        let image = match locator
            .locate(&source.source_name)
            .and_then(|path| load_source_image(&path))
        {
            Ok(image) => image,
            Err(error) => {
                counts.images_failed += 1;
                counts.patches_skipped += source.patches.len();
                report.record(Stage::Extract, &error);
                continue;
            }
        };

        for planned in &source.patches {
            let filename = planned.identity.filename();
            let Some(patch) = cut_patch(&image, &planned.bbox, config.image_size) else {
                counts.patches_skipped += 1;
                report.record(
                    Stage::Extract,
                    &ItemError::EmptyPatch {
                        filename,
                        message: format!(
                            "crop is empty inside the {}x{} source image",
                            image.width(),
                            image.height()
                        ),
                    },
                );
                continue;
            };

            let out_path = config.patch_path(&source.split, &planned.bbox.label, &filename);
            write_patch(&out_path, &patch)?;
            log::debug!("saved patch {}", out_path.display());

            counts.patches_produced += 1;
            if counts.patches_produced % config.batch_size == 0 {
                log::info!("extracted {} patch(es)", counts.patches_produced);
            }
        }
    }

    log::info!(
        "extraction finished: {} patch(es) from {} source image(s)",
        counts.patches_produced,
        counts.source_images
    );
    report.extract = Some(counts);
    Ok(())
}

/// Decode a source image and convert it to 8-bit grayscale.
pub fn load_source_image(path: &Path) -> Result<GrayImage, ItemError> {
    image::open(path)
        .map(|image| image.to_luma8())
        .map_err(|source| ItemError::ImageLoad {
            path: path.to_path_buf(),
            message: source.to_string(),
        })
}

/// Crop rectangle `(x, y, width, height)` for `bbox` inside an image of the
/// given size.
///
/// Box coordinates behave like slice bounds: anything past an edge stops at
/// the edge and negative values count as 0. Returns `None` when nothing is
/// left.
pub fn crop_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clamp = |value: i64, limit: u32| value.clamp(0, i64::from(limit)) as u32;

    let x0 = clamp(bbox.xmin, width);
    let x1 = clamp(bbox.xmax, width);
    let y0 = clamp(bbox.ymin, height);
    let y1 = clamp(bbox.ymax, height);

    (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
}

/// Crop `bbox` out of `image` and resize it to `size`×`size`.
pub fn cut_patch(image: &GrayImage, bbox: &BoundingBox, size: u32) -> Option<GrayImage> {
    let (x, y, w, h) = crop_rect(bbox, image.width(), image.height())?;
    let crop = image::imageops::crop_imm(image, x, y, w, h).to_image();
    Some(image::imageops::resize(&crop, size, size, FilterType::Triangle))
}

/// Encode `patch` as JPEG and move it into place atomically.
fn write_patch(path: &Path, patch: &GrayImage) -> Result<(), PatchprepError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .write_image(
            patch.as_raw(),
            patch.width(),
            patch.height(),
            ExtendedColorType::L8,
        )
        .map_err(|source| PatchprepError::PatchWrite {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?;

    let tmp_path = path.with_extension("jpg.tmp");
    fs::write(&tmp_path, &bytes)
        .and_then(|()| fs::rename(&tmp_path, path))
        .map_err(|source| PatchprepError::PatchWrite {
            path: path.to_path_buf(),
            message: source.to_string(),
        })
}
