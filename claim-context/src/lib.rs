//! # claim-context
//!
//! The core of a medical insurance claim assistant: policy lookup, bill
//! text extraction (native PDF text with vision OCR as fallback), heuristic
//! amount parsing, and a policy-aware chat whose system context is rebuilt
//! from the current policy and bill on every turn.
//!
//! ```rust,no_run
//! use claim_context::{
//!     BillDocument, ClaimConfig, ClaimSession, ConversationManager, DocumentExtractor,
//!     PolicyCatalog,
//! };
//!
//! # async fn run() -> claim_context::Result<()> {
//! let config = ClaimConfig::from_env();
//! let catalog = PolicyCatalog::load(&config.policy_path)?;
//! let policy = catalog.lookup("Star Health", "Comprehensive")?;
//!
//! let extractor = DocumentExtractor::from_config(&config);
//! let manager = ConversationManager::from_config(&config);
//! let mut session = ClaimSession::new();
//!
//! let bill = BillDocument::new("bill.png", std::fs::read("bill.png").unwrap_or_default());
//! session.extract_bill(&extractor, &bill).await?;
//! let reply = session.send(&manager, policy, "How much will I pay?").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod extraction;
pub mod format;
pub mod message;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod policy;
pub mod prompt;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ClaimConfig;
pub use conversation::{ConversationHistory, ConversationManager};
pub use error::{ClaimError, ExtractionError, Result};
pub use extraction::{BillDocument, DocumentExtractor, DocumentKind, PdfRenderer};
pub use format::{format_currency, format_for_display};
pub use message::{ContentPart, Message, MessageContent, Role};
pub use model::{ChatModel, ModelResponse, OpenAiChatModel};
pub use normalize::normalize;
pub use parser::{BillCheck, NonPayableHit, NonPayableSummary, parse_total_amount, sum_non_payables};
pub use policy::{PolicyCatalog, PolicyRecord, PolicySummary};
pub use session::{ClaimSession, DisplayMessage};

// Re-export for implementors of ChatModel.
pub use async_trait::async_trait;
