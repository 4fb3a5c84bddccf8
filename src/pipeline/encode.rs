//! Image encoding for the vision service: `DynamicImage` → base64 PNG.
//!
//! PNG keeps rendered text crisp; `detail: "high"` lets tiling models read
//! small print in tables and captions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::trace;

/// Encode one rendered page as a base64 PNG `ImageData`.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    trace!(bytes = b64.len(), "encoded page");
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode a whole window, keeping page order.
pub fn encode_window(pages: &[(usize, DynamicImage)]) -> Result<Vec<ImageData>, image::ImageError> {
    pages.iter().map(|(_, img)| encode_page(img)).collect()
}
