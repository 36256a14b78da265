use thiserror::Error;

/// Failures below the document level: decoding, rendering, format detection.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Image decoding failed: {0}")]
    ImageDecode(String),

    #[error("Image encoding failed: {0}")]
    ImageEncode(String),

    #[error("PDF could not be opened: {0}")]
    PdfLoad(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },
}

#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("Policy data format error: {0}")]
    DataFormat(String),

    #[error("No policy for insurer '{insurer}' and plan '{plan}'")]
    NotFound { insurer: String, plan: String },

    /// `partial` holds the page texts completed before the failure, joined the
    /// same way a successful extraction would be.
    #[error("Extraction failed for '{document}': {source}")]
    Extraction {
        document: String,
        source: ExtractionError,
        partial: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model invocation failed: {0}")]
    Model(String),
}

impl ClaimError {
    pub fn extraction(document: impl Into<String>, source: ExtractionError) -> Self {
        Self::Extraction {
            document: document.into(),
            source,
            partial: String::new(),
        }
    }

    /// Attach already-extracted text to an extraction failure. Other variants
    /// pass through unchanged.
    pub fn with_partial(self, text: impl Into<String>) -> Self {
        match self {
            Self::Extraction {
                document, source, ..
            } => Self::Extraction {
                document,
                source,
                partial: text.into(),
            },
            other => other,
        }
    }
}

impl From<reqwest::Error> for ClaimError {
    fn from(err: reqwest::Error) -> Self {
        Self::Model(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;
