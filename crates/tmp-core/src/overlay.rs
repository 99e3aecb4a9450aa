//! Page overlays
//!
//! Text and images are not written into the template's existing content.
//! Each page collects its drawing operations in a [`PageOverlay`], and on
//! commit the overlay becomes a new content stream appended after the
//! page's original streams, which are wrapped in `q`/`Q` so any graphics
//! state they leave behind cannot leak into ours.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// Resource name the overlay font is registered under on every page
pub(crate) const FONT_RESOURCE: &str = "TmpHelv";

/// Page inheritance chains deeper than this are treated as broken
const MAX_TREE_DEPTH: usize = 32;

/// Visible box of a page in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Default for PageGeometry {
    /// US Letter, used when a template omits its MediaBox
    fn default() -> Self {
        Self {
            left: 0.0,
            bottom: 0.0,
            right: 612.0,
            top: 792.0,
        }
    }
}

impl PageGeometry {
    /// Convert a top-left origin point to PDF user space
    pub fn to_pdf(&self, x: f32, y: f32) -> (f32, f32) {
        (self.left + x, self.top - y)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }
}

/// Pending drawing operations for one page
#[derive(Debug, Default)]
pub(crate) struct PageOverlay {
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
    uses_font: bool,
}

impl PageOverlay {
    pub(crate) fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Queue a single line of Helvetica text with its baseline at (x, y)
    /// in PDF user space.
    pub(crate) fn push_text(&mut self, x: f32, y: f32, font_size: f32, text: &str) {
        self.uses_font = true;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("g", vec![Object::Real(0.0)]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                    Object::Real(font_size),
                ],
            ),
            Operation::new(
                "Tm",
                vec![
                    Object::Real(1.0),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(1.0),
                    Object::Real(x),
                    Object::Real(y),
                ],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    /// Queue an image XObject scaled to fill the box whose lower-left corner
    /// is (x, y) in PDF user space.
    pub(crate) fn push_image(
        &mut self,
        name: String,
        image_id: ObjectId,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) {
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(width),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(height),
                    Object::Real(x),
                    Object::Real(y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.images.push((name, image_id));
    }

    pub(crate) fn uses_font(&self) -> bool {
        self.uses_font
    }
}

/// Standard Helvetica with WinAnsi encoding, shared by every overlaid page
pub(crate) fn helvetica(doc: &mut Document) -> ObjectId {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    doc.add_object(Object::Dictionary(font))
}

/// Write an overlay into its page: resources first, then contents
pub(crate) fn commit_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: PageOverlay,
    font_id: Option<ObjectId>,
) -> Result<(), String> {
    let mut resources = effective_resources(doc, page_id);
    if overlay.uses_font() {
        let font_id = font_id.ok_or("overlay uses text but no font was registered")?;
        add_resource(doc, &mut resources, b"Font", FONT_RESOURCE, font_id);
    }
    for (name, image_id) in &overlay.images {
        add_resource(doc, &mut resources, b"XObject", name, *image_id);
    }

    let content = Content {
        operations: overlay.operations,
    }
    .encode()
    .map_err(|e| format!("Failed to encode overlay content: {}", e))?;
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let existing = existing_contents(doc, page_id)?;
    let contents = if existing.is_empty() {
        vec![Object::Reference(overlay_id)]
    } else {
        let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        let mut contents = Vec::with_capacity(existing.len() + 3);
        contents.push(Object::Reference(save_id));
        contents.extend(existing);
        contents.push(Object::Reference(restore_id));
        contents.push(Object::Reference(overlay_id));
        contents
    };

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| format!("Page {:?} is not a dictionary: {}", page_id, e))?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));
    Ok(())
}

/// The page's current content streams as a flat list of objects
fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, String> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| format!("Page {:?} is not a dictionary: {}", page_id, e))?;

    let contents = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            // Indirect array of streams
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    Ok(contents)
}

/// Follow a reference one level, leaving direct objects alone
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Look up a page attribute, walking up the page tree for inherited ones
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited_attribute(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Register `name -> id` in a resource category (Font, XObject), copying
/// the category dictionary so shared resources of other pages stay intact.
fn add_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    name: &str,
    id: ObjectId,
) {
    let mut entries = match resources.get(category).map(|o| resolve(doc, o)) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    entries.set(name, Object::Reference(id));
    resources.set(category, Object::Dictionary(entries));
}

/// Visible area of the page: the CropBox when there is one, else the
/// MediaBox, either inherited if necessary. `/Rotate` is not applied.
pub(crate) fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    page_box(doc, page_id, b"CropBox")
        .or_else(|| page_box(doc, page_id, b"MediaBox"))
        .unwrap_or_default()
}

fn page_box(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<PageGeometry> {
    let Some(Object::Array(values)) = inherited_attribute(doc, page_id, key) else {
        return None;
    };

    let numbers: Vec<f32> = values
        .iter()
        .filter_map(|v| number(resolve(doc, v)))
        .collect();
    if numbers.len() != 4 {
        return None;
    }

    Some(PageGeometry {
        left: numbers[0].min(numbers[2]),
        bottom: numbers[1].min(numbers[3]),
        right: numbers[0].max(numbers[2]),
        top: numbers[1].max(numbers[3]),
    })
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(v) => Some(*v as f32),
        Object::Real(v) => Some(*v),
        _ => None,
    }
}

/// Encode text for a WinAnsiEncoding font.
///
/// Latin-1 maps straight through; the common typographic characters map
/// to their WinAnsi slots; anything else becomes '?'.
pub(crate) fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

/// Inverse of [`encode_win_ansi`] for the characters it produces
pub(crate) fn decode_win_ansi(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80 => '€',
            0x85 => '…',
            0x91 => '‘',
            0x92 => '’',
            0x93 => '“',
            0x94 => '”',
            0x95 => '•',
            0x96 => '–',
            0x97 => '—',
            _ => b as char,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    fn single_page_doc(contents: Option<Object>) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
        };
        if let Some(contents) = contents {
            page.set("Contents", contents);
        }
        let page_id = doc.add_object(page);
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        (doc, page_id)
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("Road 100"), b"Road 100".to_vec());
        assert_eq!(encode_win_ansi("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encode_win_ansi("a–b"), vec![b'a', 0x96, b'b']);
        assert_eq!(encode_win_ansi("Ω"), b"?".to_vec());
        assert_eq!(decode_win_ansi(&encode_win_ansi("Māori – café")), "M?ori – café");
    }

    #[test]
    fn test_geometry_is_inherited_from_page_tree() {
        let (doc, page_id) = single_page_doc(None);
        let geometry = page_geometry(&doc, page_id);
        assert_eq!(geometry.width(), 595.0);
        assert_eq!(geometry.height(), 842.0);
        assert_eq!(geometry.to_pdf(50.0, 100.0), (50.0, 742.0));
    }

    #[test]
    fn test_crop_box_takes_precedence() {
        let (mut doc, page_id) = single_page_doc(None);
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set(
                "CropBox",
                vec![
                    Object::Integer(10),
                    Object::Integer(20),
                    Object::Integer(585),
                    Object::Integer(812),
                ],
            );

        let geometry = page_geometry(&doc, page_id);
        assert_eq!(geometry.width(), 575.0);
        assert_eq!(geometry.to_pdf(50.0, 100.0), (60.0, 712.0));
    }

    #[test]
    fn test_malformed_crop_box_falls_back_to_media_box() {
        let (mut doc, page_id) = single_page_doc(None);
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set("CropBox", vec![Object::Name(b"bogus".to_vec())]);
        assert_eq!(page_geometry(&doc, page_id).height(), 842.0);
    }

    #[test]
    fn test_missing_media_box_defaults_to_letter() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        assert_eq!(page_geometry(&doc, page_id), PageGeometry::default());
    }

    #[test]
    fn test_commit_without_existing_contents() {
        let (mut doc, page_id) = single_page_doc(None);
        let font_id = helvetica(&mut doc);
        let mut overlay = PageOverlay::default();
        overlay.push_text(10.0, 20.0, 10.0, "Hello");
        commit_overlay(&mut doc, page_id, overlay, Some(font_id)).unwrap();

        let page = doc.get_dictionary(page_id).unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 1);

        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert_eq!(
            fonts.get(FONT_RESOURCE.as_bytes()).unwrap().as_reference().unwrap(),
            font_id
        );
    }

    #[test]
    fn test_commit_wraps_existing_contents() {
        let mut doc = Document::with_version("1.7");
        let original = doc.add_object(Stream::new(Dictionary::new(), b"1 0 0 1 5 5 cm".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => Object::Reference(original),
        });
        let font_id = helvetica(&mut doc);
        let mut overlay = PageOverlay::default();
        overlay.push_text(10.0, 20.0, 10.0, "Hello");
        commit_overlay(&mut doc, page_id, overlay, Some(font_id)).unwrap();

        let page = doc.get_dictionary(page_id).unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[1].as_reference().unwrap(), original);

        let content = doc.get_page_content(page_id).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.starts_with("q\n1 0 0 1 5 5 cm\nQ\n"));
        assert!(text.contains("(Hello) Tj"));
    }

    #[test]
    fn test_text_without_font_is_an_error() {
        let (mut doc, page_id) = single_page_doc(None);
        let mut overlay = PageOverlay::default();
        overlay.push_text(0.0, 0.0, 10.0, "x");
        assert!(commit_overlay(&mut doc, page_id, overlay, None).is_err());
    }
}
