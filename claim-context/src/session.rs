use serde::Serialize;
use tracing::{info, warn};

use crate::conversation::{ConversationHistory, ConversationManager};
use crate::error::Result;
use crate::extraction::{BillDocument, DocumentExtractor};
use crate::format::format_for_display;
use crate::message::Role;
use crate::policy::PolicyRecord;

/// A turn as the user should see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMessage {
    pub role: Role,
    pub content: String,
}

/// Everything one claim conversation owns: the chat history and the bill
/// text currently in play.
#[derive(Debug, Clone, Default)]
pub struct ClaimSession {
    history: ConversationHistory,
    bill_text: String,
}

impl ClaimSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bill_text(&self) -> &str {
        &self.bill_text
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub async fn send(
        &mut self,
        manager: &ConversationManager,
        policy: &PolicyRecord,
        text: &str,
    ) -> Result<String> {
        manager
            .send(&mut self.history, policy, &self.bill_text, text)
            .await
    }

    pub fn reset(&mut self) {
        self.history.clear();
        info!("Session conversation reset");
    }

    pub fn clear_bill(&mut self) {
        self.bill_text.clear();
        info!("Session bill text cleared");
    }

    /// Replaces the bill text with the document's text. On failure the
    /// previous bill text is kept.
    pub async fn extract_bill(
        &mut self,
        extractor: &DocumentExtractor,
        document: &BillDocument,
    ) -> Result<&str> {
        match extractor.extract(document).await {
            Ok(text) => {
                info!(document = %document.name, chars = text.len(), "Bill text replaced");
                self.bill_text = text;
                Ok(&self.bill_text)
            }
            Err(e) => {
                warn!(document = %document.name, error = %e, "Bill extraction failed");
                Err(e)
            }
        }
    }

    /// Turns after the system context; assistant text is reshaped for display.
    pub fn display_messages(&self) -> Vec<DisplayMessage> {
        self.history
            .turns()
            .iter()
            .map(|message| {
                let text = message.text();
                let content = match message.role {
                    Role::Assistant => format_for_display(&text),
                    Role::User | Role::System => text,
                };
                DisplayMessage {
                    role: message.role,
                    content,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use image::{DynamicImage, ImageFormat};

    use super::*;
    use crate::error::ClaimError;
    use crate::testing::{FakePdf, RecordingModel, sample_policy};

    fn png() -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::new_rgb8(2, 2)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[tokio::test]
    async fn bill_text_flows_into_the_next_turn() {
        let vision = Arc::new(RecordingModel::replying(&["Registration 100\nNet Payable 450"]));
        let chat = Arc::new(RecordingModel::replying(&[
            "1. Insurance pays: ₹300.00 2. You pay: ₹150.00",
        ]));
        let extractor = DocumentExtractor::without_pdf_support(vision);
        let manager = ConversationManager::new(chat.clone());
        let mut session = ClaimSession::new();

        let text = session
            .extract_bill(&extractor, &BillDocument::new("bill.png", png()))
            .await
            .unwrap();
        assert_eq!(text, "Registration 100\nNet Payable 450");

        session
            .send(&manager, &sample_policy(), "how much do I pay?")
            .await
            .unwrap();
        assert!(chat.calls()[0][0].text().ends_with("BILL:\nRegistration 100\nNet Payable 450\n"));

        let shown = session.display_messages();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].content, "how much do I pay?");
        assert_eq!(shown[1].content, "1. Insurance pays: ₹300.00\n2. You pay: ₹150.00");
    }

    #[tokio::test]
    async fn failed_extraction_keeps_previous_bill() {
        let vision = Arc::new(RecordingModel::replying(&["old bill"]));
        let pdf = Arc::new(FakePdf::new(&["page"]).failing_on(0));
        let extractor = DocumentExtractor::with_renderer(vision, pdf);
        let mut session = ClaimSession::new();

        session
            .extract_bill(&extractor, &BillDocument::new("first.png", png()))
            .await
            .unwrap();
        let err = session
            .extract_bill(&extractor, &BillDocument::new("second.pdf", b"%PDF".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, ClaimError::Extraction { .. }));
        assert_eq!(session.bill_text(), "old bill");
    }

    #[tokio::test]
    async fn reset_and_clear_are_independent() {
        let chat = Arc::new(RecordingModel::replying(&["hi"]));
        let vision = Arc::new(RecordingModel::replying(&["Total 10"]));
        let manager = ConversationManager::new(chat);
        let extractor = DocumentExtractor::without_pdf_support(vision);
        let mut session = ClaimSession::new();

        session
            .extract_bill(&extractor, &BillDocument::new("b.png", png()))
            .await
            .unwrap();
        session.send(&manager, &sample_policy(), "hello").await.unwrap();

        session.reset();
        assert!(session.history().is_empty());
        assert_eq!(session.bill_text(), "Total 10");

        session.clear_bill();
        assert_eq!(session.bill_text(), "");
    }
}
