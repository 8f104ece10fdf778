//! Anthropic Messages API wire types.

use serde::{Deserialize, Serialize};

use super::ChatMessage;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<&'a ChatMessage>,
    pub stream: bool,
}

impl<'a> MessagesRequest<'a> {
    /// Build a request from chat history. System messages are not valid in
    /// `messages` for this API, so they are joined into the `system` field.
    pub fn from_history(
        model: &'a str,
        max_tokens: u32,
        history: &'a [ChatMessage],
        stream: bool,
    ) -> Self {
        let (system, messages): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
            history.iter().partition(|m| m.role == "system");
        let system = (!system.is_empty()).then(|| {
            system
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        });

        Self {
            model,
            max_tokens,
            system,
            messages,
            stream,
        }
    }
}

#[derive(Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Body of a non-streaming Messages API response.
#[derive(Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
}

impl MessagesResponse {
    /// Concatenated text of every text block.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_history_is_lifted_out_of_messages() {
        let history = [
            ChatMessage::new("system", "be brief"),
            ChatMessage::new("user", "hi"),
            ChatMessage::new("system", "use French"),
        ];
        let request = MessagesRequest::from_history("claude-2.1", 256, &history, false);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "claude-2.1",
                "max_tokens": 256,
                "system": "be brief\n\nuse French",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": false
            })
        );
    }

    #[test]
    fn system_field_is_omitted_without_system_messages() {
        let history = [ChatMessage::new("user", "hi")];
        let request = MessagesRequest::from_history("claude-2.1", 256, &history, true);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("system").is_none());
    }

    #[test]
    fn response_text_skips_non_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"Hel"},{"type":"tool_use","id":"x"},{"type":"text","text":"lo"}]}"#;
        let response: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), "Hello");
    }
}
