//! Traffic Management Plan assembly
//!
//! Fills a paginated PDF template with an operator's job details, a risk
//! register built from a hazard selection, and an optional traffic
//! management diagram.
//!
//! - [`HazardCatalog`] / [`hazards::resolve`]: hazard selection to register rows
//! - [`LayoutConfig`]: where every field, the register and the diagram go
//! - [`TemplateDocument`]: the template being filled, and its serializer
//! - [`TmpEngine`]: runs the whole assembly

pub mod catalog;
pub mod command;
pub mod diagram;
pub mod engine;
pub mod error;
pub mod fields;
pub mod hazards;
pub mod job;
pub mod layout;
mod overlay;
pub mod table;
pub mod template;

pub use catalog::{HazardCatalog, HazardDescriptor};
pub use command::{process_request, AssemblyRequest, ProcessMetrics, ProcessResult};
pub use engine::{AssemblyInput, AssemblyReport, AssemblyResult, ComposedDocument, Stage, TmpEngine};
pub use error::{Result, TmpError};
pub use hazards::{HazardRow, HazardSelection};
pub use job::{Field, JobRecord, RoadLevel};
pub use layout::{LayoutConfig, PlacementTarget, SkippedPlacement};
pub use overlay::PageGeometry;
pub use template::TemplateDocument;

use chrono::NaiveDateTime;

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize> {
    Ok(TemplateDocument::load_mem(bytes)?.page_count())
}

/// File name for a finished TMP: `TMP_<reference>_<HHMM>.pdf`.
///
/// A blank reference becomes `Draft`; characters that are awkward in file
/// names are replaced with `_`.
pub fn output_file_name(reference: &str, at: NaiveDateTime) -> String {
    let reference = reference.trim();
    let reference: String = if reference.is_empty() {
        "Draft".to_string()
    } else {
        reference
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!("TMP_{}_{}.pdf", reference, at.format("%H%M"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::io::Cursor;

    /// Letter-sized template with `num_pages` pages reading "Page N"
    pub(crate) fn template_pdf(num_pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut kids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("Page {}", i + 1))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                lopdf::Dictionary::new(),
                content.encode().unwrap(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
            });
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => num_pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    pub(crate) fn png_bytes(width: u32, height: u32, alpha: u8) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, alpha]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([30, 30, 200]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }
}
