//! Core types shared by the generation backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

// =============================================================================
// SAMPLING
// =============================================================================

/// Sampler settings handed to a generator for one call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature; exactly 0 means greedy.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Cap on generated tokens.
    pub max_tokens: u32,
}

impl SamplingParams {
    pub fn new(temperature: f32, top_p: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            top_p,
            max_tokens,
        }
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature == 0.0
    }

    /// Some backends reject greedy requests unless top_p is exactly 1.0.
    pub fn top_p_for_greedy_backend(&self) -> f32 {
        if self.is_greedy() {
            1.0
        } else {
            self.top_p
        }
    }
}

/// Text produced by one generator call plus wall-clock latency.
///
/// `text` may be empty when the backend answered successfully without any
/// extractable content; that is distinct from an error.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub text: String,
    pub latency: Duration,
}

impl GenerationOutcome {
    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// =============================================================================
// CONTENT EXTRACTION
// =============================================================================

/// Concatenate the text of a list of typed content blocks.
///
/// Per block: a string `text`, else a string `content`, else a `text`/`output_text`
/// block whose `text` is an object carrying a string `value`.
fn join_blocks(blocks: &[Value]) -> String {
    let mut out = String::new();
    for block in blocks {
        let Some(obj) = block.as_object() else {
            continue;
        };
        if let Some(text) = obj.get("text").and_then(Value::as_str) {
            out.push_str(text);
        } else if let Some(text) = obj.get("content").and_then(Value::as_str) {
            out.push_str(text);
        } else if matches!(
            obj.get("type").and_then(Value::as_str),
            Some("text") | Some("output_text")
        ) {
            if let Some(value) = obj
                .get("text")
                .and_then(|t| t.get("value"))
                .and_then(Value::as_str)
            {
                out.push_str(value);
            }
        }
    }
    out
}

/// Extract text from a message `content` field that is either a plain string or
/// a list of content blocks. Returns `None` when nothing non-blank is found.
pub fn extract_content_text(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(s) => s.trim().to_string(),
        Value::Array(blocks) => join_blocks(blocks).trim().to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Extract the assistant text from a chat-completions style body.
///
/// Tries `choices[0].message.content`, then `choices[0].text`, then a top-level
/// `output_text`. Returns `None` if none of them yields non-blank text.
pub fn extract_chat_text(body: &Value) -> Option<String> {
    let choice = body.pointer("/choices/0");

    if let Some(text) = choice
        .and_then(|c| c.pointer("/message/content"))
        .and_then(extract_content_text)
    {
        return Some(text);
    }

    let non_blank = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    non_blank(choice.and_then(|c| c.get("text"))).or_else(|| non_blank(body.get("output_text")))
}

/// Extract the text from a messages-API style body (`content` list of blocks,
/// or the same list nested under `message`).
pub fn extract_message_blocks_text(body: &Value) -> Option<String> {
    let blocks = body
        .get("content")
        .filter(|v| !v.is_null())
        .or_else(|| body.pointer("/message/content"))?;
    extract_content_text(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn greedy_pins_top_p() {
        let greedy = SamplingParams::new(0.0, 0.3, 100);
        assert_eq!(greedy.top_p_for_greedy_backend(), 1.0);

        let sampled = SamplingParams::new(0.7, 0.3, 100);
        assert_eq!(sampled.top_p_for_greedy_backend(), 0.3);
    }

    #[test]
    fn chat_text_plain_string() {
        let body = json!({"choices": [{"message": {"content": "  Hallo \n"}}]});
        assert_eq!(extract_chat_text(&body).as_deref(), Some("Hallo"));
    }

    #[test]
    fn chat_text_block_list_shapes() {
        let body = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "A"},
            {"content": "B"},
            {"type": "output_text", "text": {"value": "C"}},
            {"type": "image_url", "image_url": {"url": "x"}},
            "ignored"
        ]}}]});
        assert_eq!(extract_chat_text(&body).as_deref(), Some("ABC"));
    }

    #[test]
    fn chat_text_falls_back_to_choice_text_then_output_text() {
        let body = json!({"choices": [{"message": {"content": ""}, "text": "from choice"}]});
        assert_eq!(extract_chat_text(&body).as_deref(), Some("from choice"));

        let body = json!({"choices": [{"message": {"content": null}}], "output_text": "top"});
        assert_eq!(extract_chat_text(&body).as_deref(), Some("top"));
    }

    #[test]
    fn chat_text_none_when_empty() {
        let body = json!({"choices": [{"message": {"content": "   "}}]});
        assert!(extract_chat_text(&body).is_none());
        assert!(extract_chat_text(&json!({})).is_none());
    }

    #[test]
    fn message_blocks_text() {
        let body = json!({"content": [{"type": "text", "text": "Teil 1 "}, {"type": "text", "text": "Teil 2"}]});
        assert_eq!(
            extract_message_blocks_text(&body).as_deref(),
            Some("Teil 1 Teil 2")
        );

        let nested = json!({"message": {"content": [{"content": "nested"}]}});
        assert_eq!(extract_message_blocks_text(&nested).as_deref(), Some("nested"));
    }
}
