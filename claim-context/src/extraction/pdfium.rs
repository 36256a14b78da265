//! PDFium-backed [`PdfRenderer`].
//!
//! The upstream `Pdfium` handle is neither `Send` nor `Sync`, so every call
//! binds the library again. The OS caches the dynamic load.

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::renderer::{PdfRenderer, render_dimensions};
use crate::error::ExtractionError;

pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Fails when no PDFium library can be bound.
    pub fn new() -> Result<Self, ExtractionError> {
        load_pdfium()?;
        Ok(Self)
    }
}

/// `PDFIUM_DYNAMIC_LIB_PATH` first, then the system library path.
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from PDFIUM_DYNAMIC_LIB_PATH");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| ExtractionError::PdfLoad(format!("cannot bind PDFium at {path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::PdfLoad(format!(
            "PDFium library not found, set PDFIUM_DYNAMIC_LIB_PATH: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn page_index(page: usize) -> Result<u16, ExtractionError> {
    u16::try_from(page).map_err(|_| ExtractionError::PdfRendering {
        page,
        reason: "page index out of range".to_string(),
    })
}

impl PdfRenderer for PdfiumRenderer {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| ExtractionError::PdfLoad(e.to_string()))?;
        Ok(document.pages().len() as usize)
    }

    fn native_text(&self, pdf: &[u8], page: usize) -> Result<String, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| ExtractionError::PdfLoad(e.to_string()))?;
        let pdf_page = document
            .pages()
            .get(page_index(page)?)
            .map_err(|e| ExtractionError::PdfRendering {
                page,
                reason: e.to_string(),
            })?;

        // A page without a text layer reads as empty.
        Ok(pdf_page.text().map(|t| t.all()).unwrap_or_default())
    }

    fn rasterize(
        &self,
        pdf: &[u8],
        page: usize,
        dpi: u32,
    ) -> Result<DynamicImage, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| ExtractionError::PdfLoad(e.to_string()))?;
        let pdf_page = document
            .pages()
            .get(page_index(page)?)
            .map_err(|e| ExtractionError::PdfRendering {
                page,
                reason: e.to_string(),
            })?;

        let (width, height) =
            render_dimensions(pdf_page.width().value, pdf_page.height().value, dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);

        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| ExtractionError::PdfRendering {
                page,
                reason: e.to_string(),
            })?;

        let (bitmap_width, bitmap_height) = (bitmap.width() as u32, bitmap.height() as u32);
        let Some(rgba) = RgbaImage::from_raw(bitmap_width, bitmap_height, bitmap.as_rgba_bytes())
        else {
            warn!(page, bitmap_width, bitmap_height, "Bitmap size mismatch");
            return Err(ExtractionError::PdfRendering {
                page,
                reason: "rendered bitmap has an unexpected size".to_string(),
            });
        };

        debug!(page, width = bitmap_width, height = bitmap_height, "Rasterized PDF page");
        Ok(DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8()))
    }
}
