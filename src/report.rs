//! Run report types.
//!
//! Every stage records per-item outcomes here instead of only logging them.
//! The report's `Display` output is the run summary printed at the end of a
//! successful run.

use serde::Serialize;
use std::fmt;

use crate::error::ItemError;

/// Counts and failures collected over one run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assemble: Option<AssembleCounts>,
    /// Items excluded from the output, in the order they were found.
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the failure and keep it for the summary.
    pub fn record(&mut self, stage: Stage, error: &ItemError) {
        log::warn!("[{stage}] {error}");
        self.failures.push(ItemFailure::new(stage, error));
    }

    /// Number of failures recorded by `stage`.
    pub fn failure_count(&self, stage: Stage) -> usize {
        self.failures.iter().filter(|f| f.stage == stage).count()
    }

    /// Number of failures with the given code (see [`ItemError::code`]).
    pub fn count_code(&self, code: &str) -> usize {
        self.failures.iter().filter(|f| f.code == code).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(plan) = &self.plan {
            writeln!(
                f,
                "Annotation files: {} processed, {} failed",
                plan.annotation_files, plan.files_failed
            )?;
            writeln!(
                f,
                "  boxes planned: {} ({} dropped)",
                plan.boxes_planned, plan.boxes_dropped
            )?;
        }

        if let Some(extract) = &self.extract {
            writeln!(
                f,
                "Patches produced: {} from {} source image(s) ({} skipped, {} image(s) failed)",
                extract.patches_produced,
                extract.source_images,
                extract.patches_skipped,
                extract.images_failed
            )?;
        }

        if let Some(metadata) = &self.metadata {
            writeln!(f, "Metadata rows: {}", metadata.rows_written)?;
        }

        if let Some(assemble) = &self.assemble {
            writeln!(
                f,
                "Rows retained: {} of {} ({} excluded)",
                assemble.rows_retained, assemble.rows_read, assemble.rows_excluded
            )?;
            writeln!(
                f,
                "  labels: {}, conditioning vector size: {}",
                assemble.labels, assemble.conditioning_width
            )?;
        }

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings ({}):", self.failures.len())?;
            for failure in &self.failures {
                writeln!(f, "  - [{}] {}", failure.stage, failure.message)?;
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub annotation_files: usize,
    pub files_failed: usize,
    pub boxes_planned: usize,
    pub boxes_dropped: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtractCounts {
    pub source_images: usize,
    pub images_failed: usize,
    pub patches_produced: usize,
    pub patches_skipped: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetadataCounts {
    pub rows_written: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssembleCounts {
    pub rows_read: usize,
    pub rows_retained: usize,
    pub rows_excluded: usize,
    pub labels: usize,
    pub conditioning_width: usize,
}

/// One excluded item.
#[derive(Clone, Debug, Serialize)]
pub struct ItemFailure {
    pub stage: Stage,
    pub code: &'static str,
    pub message: String,
}

impl ItemFailure {
    pub fn new(stage: Stage, error: &ItemError) -> Self {
        Self {
            stage,
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// Pipeline stage that produced a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Extract,
    Metadata,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Plan => "plan",
            Stage::Extract => "extract",
            Stage::Metadata => "metadata",
            Stage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}
