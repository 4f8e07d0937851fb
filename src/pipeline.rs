//! Stage drivers.
//!
//! Each function runs one or more stages to completion, in order, and
//! returns the run report. Per-item failures never surface as `Err`.

use crate::assemble::assemble;
use crate::config::{ensure_dir, PipelineConfig};
use crate::error::PatchprepError;
use crate::extract::{extract_patches, CancelToken};
use crate::metadata::collect_metadata;
use crate::plan::{build_plan, ExtractionPlan};
use crate::report::RunReport;

/// Plan, extract, collect metadata and assemble.
pub fn run_pipeline(
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<RunReport, PatchprepError> {
    let mut report = RunReport::new();
    let plan = prepare(config, &mut report)?;

    extract_patches(config, &plan, cancel, &mut report)?;
    collect_metadata(config, &plan, &mut report)?;
    assemble(config, &mut report)?;

    Ok(report)
}

/// Plan and extract patches only.
pub fn run_extract(
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<RunReport, PatchprepError> {
    let mut report = RunReport::new();
    let plan = prepare(config, &mut report)?;
    extract_patches(config, &plan, cancel, &mut report)?;
    Ok(report)
}

/// Plan and write the metadata table only.
pub fn run_metadata(config: &PipelineConfig) -> Result<RunReport, PatchprepError> {
    let mut report = RunReport::new();
    let plan = prepare(config, &mut report)?;
    collect_metadata(config, &plan, &mut report)?;
    Ok(report)
}

/// Assemble from an existing metadata table and patch tree.
pub fn run_assemble(config: &PipelineConfig) -> Result<RunReport, PatchprepError> {
    config.validate()?;
    let mut report = RunReport::new();
    assemble(config, &mut report)?;
    Ok(report)
}

fn prepare(
    config: &PipelineConfig,
    report: &mut RunReport,
) -> Result<ExtractionPlan, PatchprepError> {
    config.validate()?;
    ensure_dir(&config.out_dir)?;
    build_plan(config, report)
}
