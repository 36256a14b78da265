//! Policy-aware chat history.
//!
//! Message 0 of a non-empty history is always the system context, rebuilt
//! from the current policy and bill text on every turn. Everything after it
//! only grows until the history is cleared.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ClaimConfig;
use crate::error::Result;
use crate::message::{Message, MessageContent, Role};
use crate::model::{ChatModel, OpenAiChatModel};
use crate::normalize::normalize;
use crate::policy::PolicyRecord;
use crate::prompt::build_system_context;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system_context(&self) -> Option<&str> {
        match self.messages.first() {
            Some(Message {
                role: Role::System,
                content: MessageContent::Text(text),
            }) => Some(text.as_str()),
            _ => None,
        }
    }

    /// User and assistant turns, oldest first.
    pub fn turns(&self) -> &[Message] {
        match self.messages.first() {
            Some(first) if first.role == Role::System => &self.messages[1..],
            _ => &self.messages,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn refresh_context(&mut self, context: String) {
        if self.messages.first().is_some_and(|m| m.role == Role::System) {
            self.messages[0].content = MessageContent::Text(context);
        } else {
            self.messages.insert(0, Message::system(context));
        }
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// Runs chat turns against a [`ConversationHistory`].
pub struct ConversationManager {
    chat: Arc<dyn ChatModel>,
}

impl ConversationManager {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub fn from_config(config: &ClaimConfig) -> Self {
        Self::new(Arc::new(OpenAiChatModel::chat(config)))
    }

    /// One turn: refresh the context, append the user text, ask the model,
    /// append and return its normalized reply.
    ///
    /// When the model call fails the user turn stays in the history and the
    /// error is returned as is.
    pub async fn send(
        &self,
        history: &mut ConversationHistory,
        policy: &PolicyRecord,
        bill_text: &str,
        user_text: &str,
    ) -> Result<String> {
        let context = build_system_context(policy, bill_text)?;
        history.refresh_context(context);
        history.push(Message::user(user_text));

        debug!(
            insurer = %policy.insurer,
            plan = %policy.plan,
            history_len = history.len(),
            bill_chars = bill_text.len(),
            "Sending chat turn"
        );

        let response = self.chat.invoke(history.messages()).await?;
        let reply = normalize(&response);

        history.push(Message::assistant(reply.clone()));
        info!(
            history_len = history.len(),
            reply_chars = reply.len(),
            "Chat turn completed"
        );
        Ok(reply)
    }
}
