use std::sync::Arc;

use image::DynamicImage;

use crate::error::ExtractionError;

/// Rendered pages never exceed this many pixels on either side.
pub const MAX_DIMENSION_PX: u32 = 4096;

const POINTS_PER_INCH: f32 = 72.0;

/// Page-level access to a PDF held in memory.
///
/// Implementations are synchronous and may be slow; the extractor runs them
/// on the blocking pool. Pages are zero-based.
pub trait PdfRenderer: Send + Sync {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, ExtractionError>;

    /// Embedded text of one page, empty when the page has none.
    fn native_text(&self, pdf: &[u8], page: usize) -> Result<String, ExtractionError>;

    fn rasterize(&self, pdf: &[u8], page: usize, dpi: u32)
    -> Result<DynamicImage, ExtractionError>;
}

/// Pixel size for a page of `width_points` x `height_points` at `dpi`,
/// scaled down to fit [`MAX_DIMENSION_PX`] with the aspect ratio kept.
pub fn render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    if longest > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / longest;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

/// The renderer compiled into this build, if any could be bound.
#[cfg(feature = "pdf")]
pub fn default_renderer() -> Option<Arc<dyn PdfRenderer>> {
    match super::pdfium::PdfiumRenderer::new() {
        Ok(renderer) => Some(Arc::new(renderer)),
        Err(e) => {
            tracing::warn!(error = %e, "PDFium unavailable, PDF extraction disabled");
            None
        }
    }
}

#[cfg(not(feature = "pdf"))]
pub fn default_renderer() -> Option<Arc<dyn PdfRenderer>> {
    None
}
