#![allow(dead_code)]

use patchprep::annotation::BoundingBox;
use patchprep::metadata::PatchMetadataRow;
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const LABELS: [&str; 6] = [
    "crazing",
    "inclusion",
    "patches",
    "pitted_surface",
    "rolled-in_scale",
    "scratches",
];

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_label() -> impl Strategy<Value = String> {
    prop::sample::select(LABELS.to_vec()).prop_map(str::to_string)
}

/// A box with positive area, anywhere in (and possibly past) a 200x200 image.
pub fn arb_usable_box() -> impl Strategy<Value = BoundingBox> {
    (arb_label(), 0i64..199, 0i64..199, 1i64..120, 1i64..120).prop_map(
        |(label, xmin, ymin, w, h)| BoundingBox::new(label, xmin, ymin, xmin + w, ymin + h),
    )
}

pub fn arb_row() -> impl Strategy<Value = PatchMetadataRow> {
    (
        prop::sample::select(vec!["train", "validation"]),
        arb_label(),
        0usize..50,
        0i64..2000,
        0i64..2000,
    )
        .prop_map(|(split, label, index, width, height)| PatchMetadataRow {
            split: split.to_string(),
            filename: format!("{label}_{index}_0.jpg"),
            label,
            width,
            height,
            aspect_ratio: patchprep::metadata::aspect_ratio(width, height),
            area: width * height,
        })
}
