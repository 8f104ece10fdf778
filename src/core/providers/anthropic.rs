//! Backend for the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

use super::sse::{api_error, drive_sse, format_api_error, SseEvent};
use super::{ChatBackend, ProviderConfig, ProviderError};
use crate::api::anthropic::{MessagesRequest, MessagesResponse, ANTHROPIC_VERSION};
use crate::api::ChatMessage;
use crate::core::chat_stream::ChunkSink;
use crate::utils::url::construct_api_url;

pub struct AnthropicBackend {
    client: reqwest::Client,
    provider_name: String,
    model: String,
    messages_url: String,
    request_timeout: Duration,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(config: ProviderConfig, default_base_url: &str) -> Result<Self, ProviderError> {
        let api_key = config.require_api_key()?;
        let mut key = HeaderValue::from_str(api_key).map_err(|_| {
            ProviderError::InvalidCredential {
                provider: config.provider_name.clone(),
            }
        })?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(ProviderError::Client)?;

        let messages_url = construct_api_url(config.base_url_or(default_base_url), "messages");
        debug!(provider = %config.provider_name, model = %config.model, url = %messages_url, "anthropic backend ready");

        Ok(Self {
            client,
            messages_url,
            request_timeout: config.request_timeout,
            max_tokens: config.max_tokens,
            provider_name: config.provider_name,
            model: config.model,
        })
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }

    async fn post(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let request = MessagesRequest::from_history(&self.model, self.max_tokens, messages, stream);
        let mut http_request = self.client.post(&self.messages_url).json(&request);
        http_request = if stream {
            http_request.header(header::ACCEPT, "text/event-stream")
        } else {
            http_request.timeout(self.request_timeout)
        };

        let response = http_request
            .send()
            .await
            .map_err(ProviderError::Transport)?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }
}

/// Interpret one `data:` payload of a Messages API event stream.
pub(crate) fn parse_stream_payload(payload: &str) -> Result<SseEvent, ProviderError> {
    if payload.trim().is_empty() {
        return Ok(SseEvent::Skip);
    }
    let event: Value =
        serde_json::from_str(payload).map_err(|err| ProviderError::Decode(err.to_string()))?;

    match event.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            let delta = &event["delta"];
            if delta.get("type").and_then(Value::as_str) != Some("text_delta") {
                return Ok(SseEvent::Skip);
            }
            Ok(delta
                .get("text")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map_or(SseEvent::Skip, |text| SseEvent::Text(text.to_owned())))
        }
        Some("message_stop") => Ok(SseEvent::Done),
        Some("error") => Err(ProviderError::Api(format_api_error(payload))),
        _ => Ok(SseEvent::Skip),
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let response: MessagesResponse = self
            .post(messages, false)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;
        Ok(response.text())
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        sink: &ChunkSink,
    ) -> Result<String, ProviderError> {
        let response = self.post(messages, true).await?;
        drive_sse(response.bytes_stream(), sink, parse_stream_payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_url_follows_base_url() {
        let backend = AnthropicBackend::new(
            ProviderConfig::new("Anthropic", "sk-ant-test", "claude-2.1"),
            "https://api.anthropic.com/v1",
        )
        .unwrap();
        assert_eq!(
            backend.messages_url(),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = AnthropicBackend::new(
            ProviderConfig::new("Anthropic", "", "claude-2.1"),
            "https://api.anthropic.com/v1",
        )
        .err()
        .unwrap();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
    }

    #[test]
    fn text_deltas_become_chunks() {
        let payload = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(
            parse_stream_payload(payload).unwrap(),
            SseEvent::Text("Hi".into())
        );

        let tool = r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{"}}"#;
        assert_eq!(parse_stream_payload(tool).unwrap(), SseEvent::Skip);
    }

    #[test]
    fn bookkeeping_events_are_skipped_and_stop_ends() {
        for payload in [
            r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#,
        ] {
            assert_eq!(parse_stream_payload(payload).unwrap(), SseEvent::Skip);
        }
        assert_eq!(
            parse_stream_payload(r#"{"type":"message_stop"}"#).unwrap(),
            SseEvent::Done
        );
    }

    #[test]
    fn error_event_is_reported() {
        let payload =
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        match parse_stream_payload(payload).unwrap_err() {
            ProviderError::Api(text) => assert!(text.starts_with("API Error: Overloaded")),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_event_is_a_decode_error() {
        assert!(matches!(
            parse_stream_payload("{not json"),
            Err(ProviderError::Decode(_))
        ));
    }
}
