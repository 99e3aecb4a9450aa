//! Traffic management diagram compositing
//!
//! The diagram arrives as encoded image bytes (PNG or JPEG from an upload).
//! Greyscale and RGB JPEG data is embedded untouched with `DCTDecode`;
//! everything else (CMYK JPEGs included) is flattened to 8-bit RGB and
//! deflated, with a soft mask when the image has any transparency.

use crate::error::{Result, TmpError};
use crate::layout::{ImageRegion, PlacementTarget, SkippedPlacement};
use crate::template::TemplateDocument;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::GenericImageView;
use lopdf::{Dictionary, Object, Stream};
use std::io::Write;
use tracing::{debug, warn};

/// Image XObject ready to be added to a document
#[derive(Debug)]
pub struct ImageXObject {
    pub width: u32,
    pub height: u32,
    pub image: Stream,
    pub smask: Option<Stream>,
}

/// Decode image bytes into an embeddable XObject
pub fn decode(bytes: &[u8]) -> Result<ImageXObject> {
    if bytes.is_empty() {
        return Err(TmpError::ImageDecode("image data is empty".into()));
    }

    let format = image::guess_format(bytes).map_err(|e| TmpError::ImageDecode(e.to_string()))?;
    let decoded =
        image::load_from_memory(bytes).map_err(|e| TmpError::ImageDecode(e.to_string()))?;
    let (width, height) = decoded.dimensions();

    if format == image::ImageFormat::Jpeg {
        let color_space = match jpeg_components(bytes) {
            Some(1) => Some("DeviceGray"),
            Some(3) => Some("DeviceRGB"),
            _ => None,
        };
        if let Some(color_space) = color_space {
            let image = image_stream(width, height, color_space, "DCTDecode", bytes.to_vec());
            return Ok(ImageXObject {
                width,
                height,
                image,
                smask: None,
            });
        }
        // CMYK and other layouts are re-encoded from the decoded pixels
        debug!(components = ?jpeg_components(bytes), "Re-encoding JPEG diagram");
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let image = image_stream(width, height, "DeviceRGB", "FlateDecode", deflate(&rgb)?);
    let smask = if alpha.iter().any(|&a| a != u8::MAX) {
        Some(image_stream(
            width,
            height,
            "DeviceGray",
            "FlateDecode",
            deflate(&alpha)?,
        ))
    } else {
        None
    };

    Ok(ImageXObject {
        width,
        height,
        image,
        smask,
    })
}

/// Component count from the first SOF segment of a JPEG stream
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        match marker {
            // Fill byte
            0xFF => pos += 1,
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD7 => pos += 2,
            // Start of scan: no frame header before it
            0xDA => return None,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                // length(2) precision(1) height(2) width(2) components(1)
                return bytes.get(pos + 9).copied();
            }
            _ => {
                let length = usize::from(u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]));
                pos += 2 + length;
            }
        }
    }
    None
}

fn image_stream(
    width: u32,
    height: u32,
    color_space: &str,
    filter: &str,
    data: Vec<u8>,
) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(i64::from(width)));
    dict.set("Height", Object::Integer(i64::from(height)));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));

    let mut stream = Stream::new(dict, data);
    // Already encoded; must not be compressed a second time
    stream.allows_compression = false;
    stream
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| TmpError::ImageDecode(format!("Failed to compress image: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| TmpError::ImageDecode(format!("Failed to compress image: {}", e)))
}

/// Overlay the diagram onto its region.
///
/// Bytes are decoded before anything is drawn. The image is stretched to
/// exactly fill the rectangle; aspect ratio is not preserved. A region on a
/// page the template does not have is skipped and reported.
pub fn overlay_image(
    document: &mut TemplateDocument,
    bytes: &[u8],
    region: &ImageRegion,
) -> Result<Option<SkippedPlacement>> {
    let xobject = decode(bytes)?;

    let page_count = document.page_count();
    let Some(page) = region.page.resolve(page_count) else {
        let skipped = SkippedPlacement::new(
            PlacementTarget::Diagram,
            region.page.requested(page_count),
            page_count,
        );
        warn!(%skipped, "Diagram region is outside the template");
        return Ok(Some(skipped));
    };

    debug!(
        page,
        width = xobject.width,
        height = xobject.height,
        "Compositing diagram"
    );
    document.draw_image(page, region.rect, xobject)?;
    Ok(None)
}
