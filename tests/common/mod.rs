#![allow(dead_code)]

use std::fs;
use std::path::Path;

use image::{GrayImage, Luma};
use patchprep::PipelineConfig;

pub type BoxSpec<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str);

pub fn annotation_xml(filename: &str, boxes: &[BoxSpec<'_>]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\"?>\n<annotation>\n  <folder>images</folder>\n  <filename>{filename}</filename>\n  <size><width>200</width><height>200</height><depth>1</depth></size>\n"
    );
    for (label, xmin, ymin, xmax, ymax) in boxes {
        xml.push_str(&format!(
            "  <object>\n    <name>{label}</name>\n    <pose>Unspecified</pose>\n    <bndbox>\n      <xmin>{xmin}</xmin>\n      <ymin>{ymin}</ymin>\n      <xmax>{xmax}</xmax>\n      <ymax>{ymax}</ymax>\n    </bndbox>\n  </object>\n"
        ));
    }
    xml.push_str("</annotation>\n");
    xml
}

pub fn write_annotation(config: &PipelineConfig, split: &str, name: &str, boxes: &[BoxSpec<'_>]) {
    let dir = config.annotations_dir(split);
    fs::create_dir_all(&dir).expect("create annotations dir");
    fs::write(
        dir.join(format!("{name}.xml")),
        annotation_xml(&format!("{name}.jpg"), boxes),
    )
    .expect("write annotation");
}

/// Writes a 200x200 gradient JPEG under `images/{class_dir}/{name}.jpg`.
pub fn write_source_image(config: &PipelineConfig, split: &str, class_dir: &str, name: &str) {
    let dir = config.images_dir(split).join(class_dir);
    fs::create_dir_all(&dir).expect("create images dir");
    gradient(200, 200)
        .save(dir.join(format!("{name}.jpg")))
        .expect("save source image");
}

pub fn gradient(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
}

/// A small NEU-DET style corpus:
///
/// - train: `crazing_1` (two boxes, one degenerate), `pits_1` (one box,
///   fractional coordinates), `broken` (invalid XML), `ghost_1` (no image)
/// - validation: `crazing_2` (one box), `scratches_2` (one box partly past
///   the right edge)
pub fn sample_corpus(root: &Path) -> PipelineConfig {
    let config = PipelineConfig::new(root.join("NEU-DET"), root.join("processed"));

    write_annotation(
        &config,
        "train",
        "crazing_1",
        &[
            ("crazing", "10", "10", "60", "40"),
            ("crazing", "0", "0", "0", "10"),
        ],
    );
    write_source_image(&config, "train", "crazing", "crazing_1");

    write_annotation(&config, "train", "pits_1", &[("pits", "5.7", "20", "45.2", "100")]);
    write_source_image(&config, "train", "pits", "pits_1");

    fs::write(config.annotations_dir("train").join("broken.xml"), "<annotation><object>")
        .expect("write broken annotation");

    write_annotation(&config, "train", "ghost_1", &[("pits", "1", "1", "20", "20")]);

    write_annotation(&config, "validation", "crazing_2", &[("crazing", "100", "100", "180", "190")]);
    write_source_image(&config, "validation", "crazing", "crazing_2");

    write_annotation(&config, "validation", "scratches_2", &[("scratches", "150", "30", "260", "70")]);
    write_source_image(&config, "validation", "scratches", "scratches_2");

    config
}
