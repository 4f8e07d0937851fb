//! Pascal VOC annotation reader.
//!
//! Each split keeps one XML file per source image under `annotations/`. Only
//! the object labels and their `<bndbox>` coordinates are read; image size
//! and the VOC attributes are ignored because patches are cut from the
//! decoded image itself.

use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::Node;
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{ItemError, PatchprepError};

const VOC_XML_EXTENSION: &str = "xml";

/// Largest coordinate magnitude accepted from an annotation file. Keeps box
/// widths, heights and areas well inside `i64`.
pub const MAX_COORDINATE: f64 = 1_000_000_000.0;

/// A labeled box in pixel coordinates, truncated to integers.
///
/// Construction does not check `xmax > xmin` / `ymax > ymin`; use
/// [`BoundingBox::is_usable`] to decide whether a patch can be cut from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub label: String,
    pub xmin: i64,
    pub ymin: i64,
    pub xmax: i64,
    pub ymax: i64,
}

impl BoundingBox {
    pub fn new(label: impl Into<String>, xmin: i64, ymin: i64, xmax: i64, ymax: i64) -> Self {
        Self {
            label: label.into(),
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// May be zero or negative for malformed boxes.
    #[inline]
    pub fn width(&self) -> i64 {
        self.xmax.saturating_sub(self.xmin)
    }

    /// May be zero or negative for malformed boxes.
    #[inline]
    pub fn height(&self) -> i64 {
        self.ymax.saturating_sub(self.ymin)
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.width().saturating_mul(self.height())
    }

    /// True when the box spans a positive area.
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.xmax > self.xmin && self.ymax > self.ymin
    }
}

/// All boxes of one source image, in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationRecord {
    /// Base name shared by the annotation file and its source image.
    pub source_name: String,
    /// The `<filename>` element, if the file carries one.
    pub filename: Option<String>,
    pub boxes: Vec<BoundingBox>,
}

/// Read one annotation file.
///
/// The source name is the file stem, so `crazing_1.xml` pairs with
/// `crazing_1.jpg`.
pub fn parse_annotation_file(path: &Path) -> Result<AnnotationRecord, ItemError> {
    let xml = fs::read_to_string(path).map_err(|source| ItemError::Parse {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;
    parse_annotation_str(&xml, &source_name_of(path), path)
}

/// Parse annotation XML held in memory.
///
/// `path` is only used for error messages.
pub fn parse_annotation_str(
    xml: &str,
    source_name: &str,
    path: &Path,
) -> Result<AnnotationRecord, ItemError> {
    let document = roxmltree::Document::parse(xml).map_err(|source| ItemError::Parse {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(ItemError::Parse {
            path: path.to_path_buf(),
            message: "missing <annotation> root element".to_string(),
        });
    }

    let filename = optional_child_text(annotation, "filename");

    let mut boxes = Vec::new();
    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let label = required_child_text(object, "name", path, "<object>")?;
        let bndbox = required_child_element(object, "bndbox", path, "<object>")?;

        boxes.push(BoundingBox {
            label,
            xmin: parse_required_coord(bndbox, "xmin", path)?,
            ymin: parse_required_coord(bndbox, "ymin", path)?,
            xmax: parse_required_coord(bndbox, "xmax", path)?,
            ymax: parse_required_coord(bndbox, "ymax", path)?,
        });
    }

    Ok(AnnotationRecord {
        source_name: source_name.to_string(),
        filename,
        boxes,
    })
}

/// Parse annotation XML from bytes.
///
/// The input must be valid UTF-8.
pub fn from_annotation_slice(bytes: &[u8]) -> Result<AnnotationRecord, ItemError> {
    let path = Path::new("<memory>");
    let xml = std::str::from_utf8(bytes).map_err(|source| ItemError::Parse {
        path: path.to_path_buf(),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    parse_annotation_str(xml, "memory", path)
}

/// Fuzz-only entrypoint: parse, then derive the geometry every usable box
/// feeds into the metadata table.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_annotation(bytes: &[u8]) -> Result<(), ItemError> {
    let record = from_annotation_slice(bytes)?;
    for bbox in record.boxes.iter().filter(|bbox| bbox.is_usable()) {
        let _ = crate::metadata::aspect_ratio(bbox.width(), bbox.height());
        let _ = bbox.area();
    }
    Ok(())
}

/// List the `.xml` files directly inside `dir`, sorted by file name.
///
/// Nested files are skipped with a warning.
pub fn collect_annotation_files(dir: &Path) -> Result<Vec<PathBuf>, PatchprepError> {
    let entries = fs::read_dir(dir).map_err(|source| PatchprepError::InputLayout {
        path: dir.to_path_buf(),
        message: source.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(PatchprepError::Io)?.path();
        if path.is_file() && has_xml_extension(&path) {
            files.push(path);
        }
    }
    files.sort_by_cached_key(|path| file_name_string(path));

    let nested = WalkDir::new(dir)
        .follow_links(true)
        .min_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && has_xml_extension(entry.path()))
        .count();
    if nested > 0 {
        log::warn!(
            "annotations are read flat from {}; skipping {} nested .xml file(s)",
            dir.display(),
            nested
        );
    }

    Ok(files)
}

pub(crate) fn source_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>, ItemError> {
    child_element(node, tag).ok_or_else(|| ItemError::Parse {
        path: path.to_path_buf(),
        message: format!("missing <{tag}> in {context}"),
    })
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String, ItemError> {
    optional_child_text(node, tag).ok_or_else(|| ItemError::Parse {
        path: path.to_path_buf(),
        message: format!("missing <{tag}> in {context}"),
    })
}

/// Coordinates may be written as `"12"` or `"12.7"`; both truncate toward
/// zero. Magnitudes above [`MAX_COORDINATE`] are rejected.
fn parse_required_coord(node: Node<'_, '_>, tag: &str, path: &Path) -> Result<i64, ItemError> {
    let raw = required_child_text(node, tag, path, "<bndbox>")?;
    let value = match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value.trunc(),
        _ => {
            return Err(ItemError::Parse {
                path: path.to_path_buf(),
                message: format!("invalid <{tag}> value '{raw}' in <bndbox>; expected a number"),
            })
        }
    };
    if value.abs() > MAX_COORDINATE {
        return Err(ItemError::Parse {
            path: path.to_path_buf(),
            message: format!("<{tag}> value '{raw}' in <bndbox> is out of range"),
        });
    }
    Ok(value as i64)
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(VOC_XML_EXTENSION))
        .unwrap_or(false)
}
