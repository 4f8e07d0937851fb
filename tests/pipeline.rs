//! End-to-end tests over a small NEU-DET style corpus.

use std::fs::{self, File};

use ndarray::{Array2, Array3, Ix2, Ix3, OwnedRepr};
use ndarray_npy::NpzReader;
use patchprep::assemble::FeatureEncoders;
use patchprep::extract::CancelToken;
use patchprep::metadata::read_metadata_csv;
use patchprep::pipeline::{run_assemble, run_extract, run_metadata, run_pipeline};
use patchprep::report::Stage;
use patchprep::{FitScope, ImageLookup, PatchprepError};

mod common;

const EXPECTED_METADATA: &str = "\
split,filename,label,width,height,aspect_ratio,area
train,crazing_1_0.jpg,crazing,50,30,1.67,1500
train,ghost_1_0.jpg,pits,19,19,1.0,361
train,pits_1_0.jpg,pits,40,80,0.5,3200
validation,crazing_2_0.jpg,crazing,80,90,0.89,7200
validation,scratches_2_0.jpg,scratches,110,40,2.75,4400
";

fn read_npz(path: &std::path::Path) -> (Array3<f32>, Array2<f64>) {
    let mut npz = NpzReader::new(File::open(path).expect("open npz")).expect("read npz");
    let x = npz.by_index::<OwnedRepr<f32>, Ix3>(0).expect("read X");
    let y = npz.by_index::<OwnedRepr<f64>, Ix2>(1).expect("read Y");
    (x, y)
}

#[test]
fn full_pipeline_produces_aligned_dataset() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = common::sample_corpus(temp.path());

    let report = run_pipeline(&config, &CancelToken::new()).expect("run pipeline");

    let plan = report.plan.clone().expect("plan counts");
    assert_eq!(plan.annotation_files, 6);
    assert_eq!(plan.files_failed, 1);
    assert_eq!(plan.boxes_planned, 5);
    assert_eq!(plan.boxes_dropped, 1);

    let extract = report.extract.clone().expect("extract counts");
    assert_eq!(extract.patches_produced, 4);
    assert_eq!(extract.images_failed, 1);

    assert_eq!(report.metadata.clone().expect("metadata counts").rows_written, 5);

    let assemble = report.assemble.clone().expect("assemble counts");
    assert_eq!(assemble.rows_read, 5);
    assert_eq!(assemble.rows_retained, 4);
    assert_eq!(assemble.labels, 3);
    assert_eq!(assemble.conditioning_width, 5);

    assert_eq!(report.failure_count(Stage::Plan), 2);
    assert_eq!(report.count_code("image_load"), 1);
    assert_eq!(report.count_code("join_inconsistency"), 1);

    let metadata = fs::read_to_string(config.metadata_path()).expect("read metadata");
    assert_eq!(metadata, EXPECTED_METADATA);

    let (x, y) = read_npz(&config.dataset_path());
    assert_eq!(x.dim(), (4, 32, 32));
    assert_eq!(y.dim(), (4, 5));
    assert!(x.iter().all(|v| (0.0..=1.0).contains(v)));

    // one hot per row, scaled features inside the fitted range
    for row in y.rows() {
        assert_eq!(row.iter().take(3).sum::<f64>(), 1.0);
        assert!(row.iter().skip(3).all(|v| (0.0..=1.0).contains(v)));
    }
    let expected_aspect = (1.67 - 0.5) / (2.75 - 0.5);
    assert!((y[[0, 3]] - expected_aspect).abs() < 1e-12);
    assert_eq!(y[[0, 4]], 0.0);
    assert_eq!(y[[0, 0]], 1.0);
}

#[test]
fn dataset_length_matches_rows_with_valid_patches() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = common::sample_corpus(temp.path());
    run_extract(&config, &CancelToken::new()).expect("extract");
    run_metadata(&config).expect("metadata");

    // overwrite one patch with the wrong size
    let misshapen = config.patch_path("train", "pits", "pits_1_0.jpg");
    common::gradient(20, 32).save(&misshapen).expect("overwrite patch");

    let rows = read_metadata_csv(&config.metadata_path()).expect("read metadata");
    let valid = rows
        .iter()
        .filter(|row| {
            let path = config.patch_path(&row.split, &row.label, &row.filename);
            image::open(&path)
                .map(|img| img.to_luma8().dimensions() == (32, 32))
                .unwrap_or(false)
        })
        .count();

    let report = run_assemble(&config).expect("assemble");
    let counts = report.assemble.as_ref().expect("assemble counts");
    assert_eq!(counts.rows_retained, valid);
    assert_eq!(counts.rows_retained, 3);
    assert_eq!(report.count_code("shape_mismatch"), 1);
}

#[test]
fn pipeline_is_idempotent() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = common::sample_corpus(temp.path());

    run_pipeline(&config, &CancelToken::new()).expect("first run");
    let first_metadata = fs::read(config.metadata_path()).expect("read metadata");
    let (first_x, first_y) = read_npz(&config.dataset_path());

    run_pipeline(&config, &CancelToken::new()).expect("second run");
    let second_metadata = fs::read(config.metadata_path()).expect("read metadata");
    let (second_x, second_y) = read_npz(&config.dataset_path());

    assert_eq!(first_metadata, second_metadata);
    assert_eq!(first_y, second_y);
    assert_eq!(first_x.dim(), second_x.dim());
    let max_diff = first_x
        .iter()
        .zip(second_x.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    assert!(max_diff < 0.05, "patch sets differ by {max_diff}");
}

#[test]
fn saved_encoders_reproduce_conditioning_matrix() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = common::sample_corpus(temp.path());
    run_pipeline(&config, &CancelToken::new()).expect("run pipeline");

    let encoders = FeatureEncoders::load(&config.encoders_path()).expect("load encoders");
    assert_eq!(encoders.label.categories, vec!["crazing", "pits", "scratches"]);

    let rows = read_metadata_csv(&config.metadata_path()).expect("read metadata");
    let retained: Vec<_> = rows
        .iter()
        .filter(|row| config.patch_path(&row.split, &row.label, &row.filename).is_file())
        .collect();
    let (_, y) = read_npz(&config.dataset_path());

    assert_eq!(retained.len(), y.nrows());
    for (row, expected) in retained.iter().zip(y.rows()) {
        let vector = encoders
            .encode(&row.label, row.aspect_ratio, row.area as f64)
            .expect("encode");
        assert_eq!(vector, expected.to_vec());
    }
}

#[test]
fn train_fit_scope_fits_on_train_split_only() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = patchprep::PipelineConfig {
        fit_scope: FitScope::Train,
        ..common::sample_corpus(temp.path())
    };

    let report = run_pipeline(&config, &CancelToken::new()).expect("run pipeline");
    let encoders = FeatureEncoders::load(&config.encoders_path()).expect("load encoders");

    assert_eq!(encoders.label.categories, vec!["crazing", "pits"]);
    // scratches_2 only occurs in validation
    assert_eq!(report.count_code("unknown_label"), 1);
    assert_eq!(report.assemble.expect("assemble counts").rows_retained, 3);
}

#[test]
fn flat_lookup_misses_nested_images() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = patchprep::PipelineConfig {
        image_lookup: ImageLookup::Flat,
        ..common::sample_corpus(temp.path())
    };

    let report = run_extract(&config, &CancelToken::new()).expect("extract");
    let counts = report.extract.expect("extract counts");
    assert_eq!(counts.patches_produced, 0);
    assert_eq!(counts.images_failed, 5);
}

#[test]
fn assemble_without_any_patch_is_fatal() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = common::sample_corpus(temp.path());
    run_metadata(&config).expect("metadata");

    let result = run_assemble(&config);
    assert!(matches!(result, Err(PatchprepError::EmptyDataset { .. })));
}

#[test]
fn missing_split_directory_aborts_run() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = patchprep::PipelineConfig {
        splits: vec!["train".to_string(), "test".to_string()],
        ..common::sample_corpus(temp.path())
    };

    let result = run_pipeline(&config, &CancelToken::new());
    assert!(matches!(result, Err(PatchprepError::InputLayout { .. })));
}

#[test]
fn cancelled_run_produces_no_summary() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = common::sample_corpus(temp.path());
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = run_pipeline(&config, &cancel);
    assert!(matches!(result, Err(PatchprepError::Cancelled)));
    assert!(!config.metadata_path().exists());
}

#[test]
fn out_of_range_coordinates_skip_only_their_file() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = common::sample_corpus(temp.path());
    common::write_annotation(&config, "train", "huge_1", &[("crazing", "0", "0", "1e10", "1e10")]);

    let report = run_metadata(&config).expect("metadata");

    assert_eq!(report.count_code("parse"), 2);
    let table = fs::read_to_string(config.metadata_path()).expect("read metadata");
    assert_eq!(table, EXPECTED_METADATA);
}

#[test]
fn patches_never_leave_the_output_directory() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = common::sample_corpus(temp.path());
    let outside = temp.path().join("escaped");
    let outside_label = outside.to_str().expect("utf-8 path");
    common::write_annotation(
        &config,
        "train",
        "crazing_9",
        &[
            (outside_label, "1", "1", "20", "20"),
            ("../../../escaped", "1", "1", "20", "20"),
        ],
    );
    common::write_source_image(&config, "train", "crazing", "crazing_9");

    let report = run_extract(&config, &CancelToken::new()).expect("extract");

    assert_eq!(report.count_code("invalid_label"), 2);
    assert!(!outside.exists());
    assert_eq!(report.extract.expect("extract counts").patches_produced, 4);
}
