//! pdfium access: binding, page counting, and window rasterisation.
//!
//! pdfium is blocking and CPU-bound, so every entry point here hops onto
//! `tokio::task::spawn_blocking` and opens the document from the in-memory
//! bytes the loader already read.
//!
//! Rendering caps the longest edge (`max_pixels`) rather than fixing a DPI:
//! page sizes vary too much for a single DPI to give readable, bounded images.

use crate::error::Pdf2RecError;
use crate::pipeline::window::PageWindow;
use image::DynamicImage;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A page whose text has a line that is only this heading ends the body.
static REFERENCES_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(references?|bibliography|works\s+cited)\s*:?\s*$").unwrap()
});

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the working directory, then
/// the system library.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2RecError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        return Pdfium::bind_to_library(&path)
            .map(Pdfium::new)
            .map_err(|e| Pdf2RecError::PdfiumBindingFailed(format!("{path}: {e:?}")));
    }
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| Pdf2RecError::PdfiumBindingFailed(format!("{e:?}")))
}

/// Index of the first page that opens a references section, if any.
///
/// `texts` yields each page's extracted text in page order.
pub fn references_cutoff<I, S>(texts: I) -> Option<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    texts
        .into_iter()
        .position(|t| REFERENCES_HEADING.is_match(t.as_ref()))
}

/// Count annotatable pages; with `stop_at_references`, pages from the
/// references heading onwards are excluded.
pub async fn count_pages(
    content: Arc<Vec<u8>>,
    name: &str,
    password: Option<String>,
    stop_at_references: bool,
) -> Result<usize, Pdf2RecError> {
    let name = name.to_string();
    tokio::task::spawn_blocking(move || {
        count_pages_blocking(&content, &name, password.as_deref(), stop_at_references)
    })
    .await
    .map_err(|e| Pdf2RecError::Internal(format!("Page-count task panicked: {e}")))?
}

fn count_pages_blocking(
    content: &[u8],
    name: &str,
    password: Option<&str>,
    stop_at_references: bool,
) -> Result<usize, Pdf2RecError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, content, name, password)?;
    let pages = document.pages();
    let total = pages.len() as usize;

    if !stop_at_references {
        return Ok(total);
    }

    let texts = pages.iter().map(|page| match page.text() {
        Ok(text) => text.all(),
        Err(e) => {
            debug!(doc = %name, "text extraction failed on a page: {e:?}");
            String::new()
        }
    });
    match references_cutoff(texts) {
        Some(cut) => {
            info!(doc = %name, total, kept = cut, "stopping at references heading");
            Ok(cut)
        }
        None => Ok(total),
    }
}

/// Rasterise the pages of `window`, longest edge capped at `max_pixels`.
pub async fn render_window(
    content: Arc<Vec<u8>>,
    name: &str,
    password: Option<String>,
    window: &PageWindow,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, Pdf2RecError> {
    let name = name.to_string();
    let indices: Vec<usize> = window.pages().collect();
    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&content, &name, password.as_deref(), &indices, max_pixels)
    })
    .await
    .map_err(|e| Pdf2RecError::Internal(format!("Render task panicked: {e}")))?
}

fn render_pages_blocking(
    content: &[u8],
    name: &str,
    password: Option<&str>,
    page_indices: &[usize],
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, Pdf2RecError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, content, name, password)?;
    let pages = document.pages();
    let total = pages.len() as usize;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(page_indices.len());
    for &idx in page_indices {
        if idx >= total {
            warn!(doc = %name, page = idx + 1, total, "skipping out-of-range page");
            continue;
        }
        let page = pages.get(idx as u16).map_err(|e| Pdf2RecError::CorruptPdf {
            name: name.to_string(),
            detail: format!("page {}: {e:?}", idx + 1),
        })?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Pdf2RecError::CorruptPdf {
                name: name.to_string(),
                detail: format!("render page {}: {e:?}", idx + 1),
            })?;
        let image = bitmap.as_image();
        debug!(doc = %name, page = idx + 1, w = image.width(), h = image.height(), "rendered");
        results.push((idx, image));
    }
    Ok(results)
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    content: &'a [u8],
    name: &str,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2RecError> {
    pdfium
        .load_pdf_from_byte_slice(content, password)
        .map_err(|e| {
            let detail = format!("{e:?}");
            if detail.contains("Password") || detail.contains("password") {
                Pdf2RecError::PasswordRequired {
                    name: name.to_string(),
                }
            } else {
                Pdf2RecError::CorruptPdf {
                    name: name.to_string(),
                    detail,
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_references_heading_page() {
        let pages = [
            "Introduction\nWe study things.",
            "Methods\nSee references in the appendix.",
            "Discussion\n\nReferences\n1. Smith 2020",
            "more refs",
        ];
        assert_eq!(references_cutoff(pages), Some(2));
    }

    #[test]
    fn heading_variants() {
        assert_eq!(references_cutoff(["x", "  BIBLIOGRAPHY:  "]), Some(1));
        assert_eq!(references_cutoff(["x", "Works   Cited"]), Some(1));
        assert_eq!(references_cutoff(["Reference\n"]), Some(0));
    }

    #[test]
    fn inline_mentions_do_not_cut() {
        let pages = ["References are listed below", "Table of contents: References 12"];
        assert_eq!(references_cutoff(pages), None);
        assert_eq!(references_cutoff(Vec::<String>::new()), None);
    }
}
