//! Template document
//!
//! Owns one in-memory copy of the template for a single assembly. Drawing
//! calls are buffered per page and only written into the PDF structure when
//! the document is serialized, so a run that fails part-way leaves nothing
//! behind.

use crate::diagram::ImageXObject;
use crate::error::{Result, TmpError};
use crate::layout::{LayoutConfig, PlacementTarget, Rect, SkippedPlacement};
use crate::overlay::{self, PageGeometry, PageOverlay};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Line advance as a multiple of the font size
pub const LINE_SPACING: f32 = 1.2;

pub struct TemplateDocument {
    doc: Document,
    /// Page object ids, zero-based
    pages: Vec<ObjectId>,
    overlays: BTreeMap<usize, PageOverlay>,
    font_id: Option<ObjectId>,
    image_count: usize,
}

impl std::fmt::Debug for TemplateDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateDocument")
            .field("pages", &self.pages.len())
            .field("pending_pages", &self.overlays.len())
            .finish()
    }
}

impl TemplateDocument {
    /// Open a template from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let doc = Document::load(path)
            .map_err(|e| TmpError::TemplateLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_document(doc)
    }

    /// Open a template from bytes already in memory
    pub fn load_mem(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes).map_err(|e| TmpError::TemplateLoad(e.to_string()))?;
        Self::from_document(doc)
    }

    fn from_document(doc: Document) -> Result<Self> {
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(TmpError::TemplateLoad("document has no pages".into()));
        }

        debug!(pages = pages.len(), "Loaded template");
        Ok(Self {
            doc,
            pages,
            overlays: BTreeMap::new(),
            font_id: None,
            image_count: 0,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_id(&self, page: usize) -> Result<ObjectId> {
        self.pages.get(page).copied().ok_or_else(|| {
            TmpError::FieldPlacement(format!(
                "page index {} is outside the template ({} pages)",
                page,
                self.pages.len()
            ))
        })
    }

    /// MediaBox of a zero-based page
    pub fn page_geometry(&self, page: usize) -> Result<PageGeometry> {
        let page_id = self.page_id(page)?;
        self.doc
            .get_dictionary(page_id)
            .map_err(|e| TmpError::FieldPlacement(format!("page {} is unreadable: {}", page, e)))?;
        Ok(overlay::page_geometry(&self.doc, page_id))
    }

    /// Place one line of text with its baseline at (x, y), top-left origin
    pub fn draw_text(&mut self, page: usize, x: f32, y: f32, font_size: f32, text: &str) -> Result<()> {
        let geometry = self.page_geometry(page)?;
        if self.font_id.is_none() {
            self.font_id = Some(overlay::helvetica(&mut self.doc));
        }

        let (pdf_x, pdf_y) = geometry.to_pdf(x, y);
        self.overlays
            .entry(page)
            .or_default()
            .push_text(pdf_x, pdf_y, font_size, text);
        Ok(())
    }

    /// Place text that may span several lines.
    ///
    /// Lines are split on explicit breaks only and each one sits
    /// `font_size * LINE_SPACING` below the previous baseline. Returns the
    /// number of lines consumed, blank ones included.
    pub fn draw_lines(&mut self, page: usize, x: f32, y: f32, font_size: f32, text: &str) -> Result<usize> {
        let leading = font_size * LINE_SPACING;
        let mut count = 0;
        for (i, line) in text.lines().enumerate() {
            count = i + 1;
            if line.trim().is_empty() {
                continue;
            }
            self.draw_text(page, x, y + i as f32 * leading, font_size, line)?;
        }
        Ok(count)
    }

    /// Stretch an image over `rect` (top-left origin) on a page
    pub fn draw_image(&mut self, page: usize, rect: Rect, xobject: ImageXObject) -> Result<()> {
        let geometry = self.page_geometry(page)?;

        let smask_id = xobject.smask.map(|smask| self.doc.add_object(smask));
        let mut image = xobject.image;
        if let Some(smask_id) = smask_id {
            image.dict.set("SMask", Object::Reference(smask_id));
        }
        let image_id = self.doc.add_object(image);

        self.image_count += 1;
        let name = format!("TmpImg{}", self.image_count);

        // The rectangle's bottom edge is y1 in top-left coordinates
        let (pdf_x, pdf_y) = geometry.to_pdf(rect.x0, rect.y1);
        self.overlays.entry(page).or_default().push_image(
            name,
            image_id,
            pdf_x,
            pdf_y,
            rect.width(),
            rect.height(),
        );
        Ok(())
    }

    /// Pages with pending drawing that has not been written yet
    pub fn pending_pages(&self) -> Vec<usize> {
        self.overlays
            .iter()
            .filter(|(_, overlay)| !overlay.is_empty())
            .map(|(page, _)| *page)
            .collect()
    }

    /// Placements in `layout` this template cannot satisfy
    pub fn check_layout(&self, layout: &LayoutConfig) -> Vec<SkippedPlacement> {
        let page_count = self.page_count();
        let mut skipped: Vec<SkippedPlacement> = layout
            .fields
            .iter()
            .filter(|(_, placement)| placement.page >= page_count)
            .map(|(field, placement)| {
                SkippedPlacement::new(PlacementTarget::Field(*field), placement.page, page_count)
            })
            .collect();

        if layout.table.page >= page_count {
            skipped.push(SkippedPlacement::new(
                PlacementTarget::HazardTable,
                layout.table.page,
                page_count,
            ));
        }
        if layout.image.page.resolve(page_count).is_none() {
            skipped.push(SkippedPlacement::new(
                PlacementTarget::Diagram,
                layout.image.page.requested(page_count),
                page_count,
            ));
        }
        skipped
    }

    /// Text shown by the page's content streams, one entry per text run.
    ///
    /// Only reads what is already written into the PDF structure; pending
    /// drawing is not included.
    pub fn page_text(&self, page: usize) -> Result<Vec<String>> {
        let page_id = self.page_id(page)?;
        let data = self
            .doc
            .get_page_content(page_id)
            .map_err(|e| TmpError::TemplateLoad(format!("page {} content: {}", page, e)))?;
        let content = Content::decode(&data)
            .map_err(|e| TmpError::TemplateLoad(format!("page {} content: {}", page, e)))?;

        let mut runs = Vec::new();
        for operation in &content.operations {
            match operation.operator.as_str() {
                "Tj" | "'" | "\"" => {
                    if let Some(Object::String(bytes, _)) = operation.operands.last() {
                        runs.push(overlay::decode_win_ansi(bytes));
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operation.operands.first() {
                        let text: String = items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(overlay::decode_win_ansi(bytes)),
                                _ => None,
                            })
                            .collect();
                        runs.push(text);
                    }
                }
                _ => {}
            }
        }
        Ok(runs)
    }

    fn commit(&mut self) -> Result<()> {
        let overlays = std::mem::take(&mut self.overlays);
        for (page, overlay) in overlays {
            if overlay.is_empty() {
                continue;
            }
            let page_id = self.pages[page];
            overlay::commit_overlay(&mut self.doc, page_id, overlay, self.font_id)
                .map_err(TmpError::Serialization)?;
        }
        self.doc.compress();
        Ok(())
    }

    /// Finish the document and return its bytes.
    ///
    /// Consumes the template: a serialized document cannot be drawn on again.
    pub fn emit(mut self) -> Result<Vec<u8>> {
        self.commit()?;
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| TmpError::Serialization(e.to_string()))?;
        debug!(bytes = buffer.len(), "Serialized document");
        Ok(buffer)
    }

    /// Finish the document and write it to `path`
    pub fn save<P: AsRef<Path>>(mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.commit()?;
        self.doc
            .save(path)
            .map_err(|e| TmpError::Serialization(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Saved document");
        Ok(())
    }
}
