//! The extraction plan.
//!
//! A single pass over every split's annotations decides which patches exist
//! and what they are called. Patch extraction and metadata collection both
//! consume the plan, so a patch file and its metadata row always carry the
//! same identity.

use std::path::PathBuf;

use serde::Serialize;

use crate::annotation::{collect_annotation_files, parse_annotation_file, BoundingBox};
use crate::config::{is_plain_dir_name, PipelineConfig};
use crate::error::{ItemError, PatchprepError};
use crate::report::{PlanCounts, RunReport, Stage};

const PATCH_EXTENSION: &str = "jpg";

/// `(split, source_name, box_index)`; determines a patch's file name and,
/// together with its label, its location under the patch root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PatchIdentity {
    pub split: String,
    pub source_name: String,
    /// Position of the box in its annotation file, counting dropped boxes.
    pub box_index: usize,
}

impl PatchIdentity {
    pub fn new(split: impl Into<String>, source_name: impl Into<String>, box_index: usize) -> Self {
        Self {
            split: split.into(),
            source_name: source_name.into(),
            box_index,
        }
    }

    /// `{source_name}_{box_index}.jpg`
    pub fn filename(&self) -> String {
        format!("{}_{}.{}", self.source_name, self.box_index, PATCH_EXTENSION)
    }
}

/// A usable box together with the identity of the patch cut from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedPatch {
    pub identity: PatchIdentity,
    pub bbox: BoundingBox,
}

/// All planned patches of one source image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedSource {
    pub split: String,
    pub source_name: String,
    pub annotation_path: PathBuf,
    pub patches: Vec<PlannedPatch>,
}

/// Planned sources in split order, then annotation file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub sources: Vec<PlannedSource>,
}

impl ExtractionPlan {
    pub fn patches(&self) -> impl Iterator<Item = &PlannedPatch> {
        self.sources.iter().flat_map(|source| source.patches.iter())
    }

    pub fn patch_count(&self) -> usize {
        self.sources.iter().map(|source| source.patches.len()).sum()
    }
}

/// Parse every annotation file of every configured split.
///
/// Unparseable files, boxes without area and boxes whose label cannot name a
/// patch directory are recorded in `report` and left out of the plan. Only an unreadable annotations directory is fatal.
pub fn build_plan(
    config: &PipelineConfig,
    report: &mut RunReport,
) -> Result<ExtractionPlan, PatchprepError> {
    let mut plan = ExtractionPlan::default();
    let mut counts = PlanCounts::default();

    for split in &config.splits {
        let annotations_dir = config.annotations_dir(split);
        let files = collect_annotation_files(&annotations_dir)?;
        log::info!(
            "planning split '{}': {} annotation file(s) in {}",
            split,
            files.len(),
            annotations_dir.display()
        );

        for annotation_path in files {
            counts.annotation_files += 1;

            let record = match parse_annotation_file(&annotation_path) {
                Ok(record) => record,
                Err(error) => {
                    counts.files_failed += 1;
                    report.record(Stage::Plan, &error);
                    continue;
                }
            };

            let mut patches = Vec::with_capacity(record.boxes.len());
            for (box_index, bbox) in record.boxes.into_iter().enumerate() {
                let identity = PatchIdentity::new(split.as_str(), &record.source_name, box_index);
                if !bbox.is_usable() {
                    counts.boxes_dropped += 1;
                    report.record(
                        Stage::Plan,
                        &ItemError::EmptyPatch {
                            filename: identity.filename(),
                            message: format!(
                                "box ({}, {}, {}, {}) has no area",
                                bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax
                            ),
                        },
                    );
                    continue;
                }
                if !is_plain_dir_name(&bbox.label) {
                    counts.boxes_dropped += 1;
                    report.record(
                        Stage::Plan,
                        &ItemError::InvalidLabel {
                            filename: identity.filename(),
                            label: bbox.label,
                        },
                    );
                    continue;
                }
                patches.push(PlannedPatch { identity, bbox });
            }

            counts.boxes_planned += patches.len();
            plan.sources.push(PlannedSource {
                split: split.clone(),
                source_name: record.source_name,
                annotation_path,
                patches,
            });
        }
    }

    report.plan = Some(counts);
    Ok(plan)
}
