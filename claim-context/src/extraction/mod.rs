//! Bill text extraction: native PDF text where a page has it, vision OCR
//! everywhere else.

mod renderer;

#[cfg(feature = "pdf")]
mod pdfium;

use std::io::Cursor;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info, warn};

use crate::config::ClaimConfig;
use crate::error::{ClaimError, ExtractionError, Result};
use crate::message::{ContentPart, Message};
use crate::model::{ChatModel, OpenAiChatModel};
use crate::normalize::normalize;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumRenderer;
pub use renderer::{MAX_DIMENSION_PX, PdfRenderer, default_renderer, render_dimensions};

pub const RENDER_DPI: u32 = 200;

/// Returned in place of text when a PDF arrives and no renderer is available.
pub const PDF_SUPPORT_UNAVAILABLE: &str = "PDF OCR requires PDFium: build with the `pdf` feature and \
set PDFIUM_DYNAMIC_LIB_PATH or install the PDFium library";

pub const OCR_SYSTEM_PROMPT: &str = "Extract text exactly. Do NOT summarize.";
pub const OCR_USER_PROMPT: &str = "Extract all text:";

const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image(ImageFormat),
}

/// An uploaded bill as raw bytes plus whatever the uploader said about it.
#[derive(Debug, Clone)]
pub struct BillDocument {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl BillDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Content type wins, then the file extension, then magic bytes.
    pub fn kind(&self) -> std::result::Result<DocumentKind, ExtractionError> {
        if let Some(kind) = self.content_type.as_deref().and_then(kind_from_content_type) {
            return Ok(kind);
        }
        if let Some(kind) = self.extension().as_deref().and_then(kind_from_extension) {
            return Ok(kind);
        }
        if self.bytes.starts_with(b"%PDF") {
            return Ok(DocumentKind::Pdf);
        }
        match image::guess_format(&self.bytes) {
            Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(DocumentKind::Image(format)),
            _ => Err(ExtractionError::UnsupportedFormat(format!(
                "'{}' is not a PDF, JPEG or PNG",
                self.name
            ))),
        }
    }

    fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

fn kind_from_content_type(content_type: &str) -> Option<DocumentKind> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match essence.as_str() {
        "application/pdf" => Some(DocumentKind::Pdf),
        "image/png" => Some(DocumentKind::Image(ImageFormat::Png)),
        "image/jpeg" | "image/jpg" => Some(DocumentKind::Image(ImageFormat::Jpeg)),
        _ => None,
    }
}

fn kind_from_extension(extension: &str) -> Option<DocumentKind> {
    match extension {
        "pdf" => Some(DocumentKind::Pdf),
        "png" => Some(DocumentKind::Image(ImageFormat::Png)),
        "jpg" | "jpeg" => Some(DocumentKind::Image(ImageFormat::Jpeg)),
        _ => None,
    }
}

/// Turns bill documents into plain text.
pub struct DocumentExtractor {
    vision: Arc<dyn ChatModel>,
    renderer: Option<Arc<dyn PdfRenderer>>,
}

impl DocumentExtractor {
    pub fn new(vision: Arc<dyn ChatModel>, renderer: Option<Arc<dyn PdfRenderer>>) -> Self {
        Self { vision, renderer }
    }

    /// Vision client from config, PDF renderer from whatever this build has.
    pub fn from_config(config: &ClaimConfig) -> Self {
        Self::new(Arc::new(OpenAiChatModel::vision(config)), default_renderer())
    }

    pub fn with_renderer(vision: Arc<dyn ChatModel>, renderer: Arc<dyn PdfRenderer>) -> Self {
        Self::new(vision, Some(renderer))
    }

    pub fn without_pdf_support(vision: Arc<dyn ChatModel>) -> Self {
        Self::new(vision, None)
    }

    pub fn supports_pdf(&self) -> bool {
        self.renderer.is_some()
    }

    pub async fn extract(&self, document: &BillDocument) -> Result<String> {
        let kind = document
            .kind()
            .map_err(|e| ClaimError::extraction(&document.name, e))?;
        info!(
            document = %document.name,
            ?kind,
            bytes = document.bytes.len(),
            "Extracting bill text"
        );

        match kind {
            DocumentKind::Pdf => self.extract_from_pdf(&document.name, &document.bytes).await,
            DocumentKind::Image(format) => {
                let image = image::load_from_memory_with_format(&document.bytes, format)
                    .map_err(|e| {
                        ClaimError::extraction(
                            &document.name,
                            ExtractionError::ImageDecode(e.to_string()),
                        )
                    })?;
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                self.extract_from_image(&document.name, &rgb).await
            }
        }
    }

    /// One OCR call for one image. Model failures are returned unchanged.
    pub async fn extract_from_image(&self, document: &str, image: &DynamicImage) -> Result<String> {
        let encoded = image_to_base64(image).map_err(|e| ClaimError::extraction(document, e))?;
        let messages = [
            Message::system(OCR_SYSTEM_PROMPT),
            Message::user_parts(vec![
                ContentPart::text(OCR_USER_PROMPT),
                ContentPart::image_url(format!("data:image/png;base64,{encoded}")),
            ]),
        ];

        let response = self.vision.invoke(&messages).await?;
        let text = normalize(&response);
        debug!(document, chars = text.len(), "OCR completed");
        Ok(text)
    }

    /// Pages are handled one at a time, in order, and joined by a blank line.
    /// A failure stops the document; the pages already done travel with the
    /// error as partial text.
    pub async fn extract_from_pdf(&self, document: &str, bytes: &[u8]) -> Result<String> {
        let Some(renderer) = self.renderer.clone() else {
            warn!(document, "No PDF renderer available, returning advisory text");
            return Ok(PDF_SUPPORT_UNAVAILABLE.to_string());
        };

        let pdf: Arc<[u8]> = Arc::from(bytes);
        let page_count = blocking(document, {
            let (renderer, pdf) = (renderer.clone(), pdf.clone());
            move || renderer.page_count(&pdf)
        })
        .await?;
        info!(document, page_count, "Opened PDF");

        let mut pages: Vec<String> = Vec::with_capacity(page_count);
        for page in 0..page_count {
            let text = self
                .extract_page(document, &renderer, &pdf, page)
                .await
                .map_err(|e| e.with_partial(pages.join(PAGE_SEPARATOR)))?;
            pages.push(text);
        }

        let text = pages.join(PAGE_SEPARATOR);
        info!(document, page_count, chars = text.len(), "PDF extraction completed");
        Ok(text)
    }

    async fn extract_page(
        &self,
        document: &str,
        renderer: &Arc<dyn PdfRenderer>,
        pdf: &Arc<[u8]>,
        page: usize,
    ) -> Result<String> {
        let native = blocking(document, {
            let (renderer, pdf) = (renderer.clone(), pdf.clone());
            move || renderer.native_text(&pdf, page)
        })
        .await?;

        if !native.trim().is_empty() {
            debug!(document, page, chars = native.len(), "Using native page text");
            return Ok(native);
        }

        debug!(document, page, dpi = RENDER_DPI, "No native text, rasterizing for OCR");
        let image = blocking(document, {
            let (renderer, pdf) = (renderer.clone(), pdf.clone());
            move || renderer.rasterize(&pdf, page, RENDER_DPI)
        })
        .await?;
        self.extract_from_image(document, &image).await
    }
}

/// Runs a renderer call on the blocking pool and names the document in any
/// failure.
async fn blocking<T, F>(document: &str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, ExtractionError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| ClaimError::extraction(document, e)),
        Err(join_error) => Err(ClaimError::extraction(
            document,
            ExtractionError::PdfLoad(format!("renderer task failed: {join_error}")),
        )),
    }
}

fn image_to_base64(image: &DynamicImage) -> std::result::Result<String, ExtractionError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| ExtractionError::ImageEncode(e.to_string()))?;
    Ok(STANDARD.encode(&buffer))
}
