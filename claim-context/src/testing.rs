//! In-process fakes for the model and the PDF renderer.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use image::DynamicImage;
use serde_json::json;

use crate::error::{ClaimError, ExtractionError, Result};
use crate::message::Message;
use crate::model::{ChatModel, ModelResponse};
use crate::policy::{PolicyCatalog, PolicyRecord};

pub const SAMPLE_CATALOG: &str = r#"{
    "Star Health": {
        "Comprehensive": {
            "insurer": "Star Health",
            "plan": "Comprehensive",
            "sum_insured": 500000,
            "room": {"type": "Single Private AC", "cap_per_day": 5000, "proportionate_deduction": true},
            "copay": {"percentage": 10},
            "non_payables": ["registration", "admin fee", "gloves"]
        }
    }
}"#;

pub fn sample_policy() -> PolicyRecord {
    PolicyCatalog::from_json_str(SAMPLE_CATALOG)
        .unwrap()
        .lookup("Star Health", "Comprehensive")
        .unwrap()
        .clone()
}

/// Answers with scripted replies in OpenAI completion shape and keeps every
/// message list it was called with.
pub struct RecordingModel {
    replies: Mutex<VecDeque<String>>,
    failure: Option<String>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl RecordingModel {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::replying(&[])
        }
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for RecordingModel {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if let Some(failure) = &self.failure {
            return Err(ClaimError::Model(failure.clone()));
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "no scripted reply".to_string());
        Ok(ModelResponse::Json(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        })))
    }
}

/// A PDF made of pages with known native text. Blank pages rasterize to a
/// tiny image.
pub struct FakePdf {
    pages: Vec<String>,
    fail_on: Option<usize>,
    rasterized: Mutex<Vec<(usize, u32)>>,
}

impl FakePdf {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            fail_on: None,
            rasterized: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, page: usize) -> Self {
        self.fail_on = Some(page);
        self
    }

    pub fn rasterized(&self) -> Vec<(usize, u32)> {
        self.rasterized.lock().unwrap().clone()
    }

    fn check(&self, page: usize) -> std::result::Result<(), ExtractionError> {
        if self.fail_on == Some(page) || page >= self.pages.len() {
            return Err(ExtractionError::PdfRendering {
                page,
                reason: "fake failure".to_string(),
            });
        }
        Ok(())
    }
}

impl crate::extraction::PdfRenderer for FakePdf {
    fn page_count(&self, _pdf: &[u8]) -> std::result::Result<usize, ExtractionError> {
        Ok(self.pages.len())
    }

    fn native_text(&self, _pdf: &[u8], page: usize) -> std::result::Result<String, ExtractionError> {
        self.check(page)?;
        Ok(self.pages[page].clone())
    }

    fn rasterize(
        &self,
        _pdf: &[u8],
        page: usize,
        dpi: u32,
    ) -> std::result::Result<DynamicImage, ExtractionError> {
        self.check(page)?;
        self.rasterized.lock().unwrap().push((page, dpi));
        Ok(DynamicImage::new_rgb8(4, 4))
    }
}
