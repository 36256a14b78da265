//! Plain text out of any [`ModelResponse`].
//!
//! Shapes are tried in a fixed order: the first candidate's message content,
//! the first candidate's flat `text`, a top-level text field, and finally the
//! display rendering of the whole response. Nothing here fails; a shape that
//! is not there just hands over to the next one.

use serde_json::Value;

use crate::model::ModelResponse;

pub fn normalize(response: &ModelResponse) -> String {
    candidate_message_content(response)
        .or_else(|| candidate_text(response))
        .or_else(|| top_level_text(response))
        .unwrap_or_else(|| response.to_string())
        .trim()
        .to_string()
}

fn candidate_message_content(response: &ModelResponse) -> Option<String> {
    match response {
        ModelResponse::Completion(completion) => completion
            .choices
            .first()?
            .message
            .as_ref()?
            .content
            .clone(),
        ModelResponse::Json(value) => value.pointer("/choices/0/message/content").and_then(text_of),
        ModelResponse::Text(_) | ModelResponse::Other(_) => None,
    }
}

fn candidate_text(response: &ModelResponse) -> Option<String> {
    match response {
        ModelResponse::Completion(completion) => completion.choices.first()?.text.clone(),
        ModelResponse::Json(value) => value
            .pointer("/choices/0/text")
            .and_then(Value::as_str)
            .map(str::to_string),
        ModelResponse::Text(_) | ModelResponse::Other(_) => None,
    }
}

fn top_level_text(response: &ModelResponse) -> Option<String> {
    match response {
        ModelResponse::Text(text) => Some(text.clone()),
        ModelResponse::Json(value) => ["content", "text"]
            .iter()
            .find_map(|key| value.get(key).and_then(text_of)),
        ModelResponse::Completion(_) | ModelResponse::Other(_) => None,
    }
}

/// A string, or a list of text parts (`[{"type": "text", "text": ...}]`)
/// joined together. Anything else is not text.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(_) => part.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join(""))
            }
        }
        _ => None,
    }
}
