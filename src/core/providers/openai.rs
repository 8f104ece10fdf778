//! Backend for the OpenAI chat-completions wire format, also spoken by
//! OpenAI-compatible vendors such as Deepseek.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::debug;

use super::sse::{api_error, drive_sse, format_api_error, SseEvent};
use super::{ChatBackend, ProviderConfig, ProviderError};
use crate::api::{ChatCompletion, ChatMessage, ChatRequest, ChatResponse};
use crate::core::chat_stream::ChunkSink;
use crate::utils::url::construct_api_url;

pub struct OpenAiBackend {
    client: reqwest::Client,
    provider_name: String,
    model: String,
    chat_url: String,
    request_timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(config: ProviderConfig, default_base_url: &str) -> Result<Self, ProviderError> {
        let api_key = config.require_api_key()?;
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            ProviderError::InvalidCredential {
                provider: config.provider_name.clone(),
            }
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(ProviderError::Client)?;

        let chat_url = construct_api_url(config.base_url_or(default_base_url), "chat/completions");
        debug!(provider = %config.provider_name, model = %config.model, url = %chat_url, "openai backend ready");

        Ok(Self {
            client,
            chat_url,
            request_timeout: config.request_timeout,
            provider_name: config.provider_name,
            model: config.model,
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    async fn post(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream,
        };
        let mut http_request = self.client.post(&self.chat_url).json(&request);
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

/// Interpret one `data:` payload of a chat-completions stream.
pub(crate) fn parse_stream_payload(payload: &str) -> Result<SseEvent, ProviderError> {
    if payload == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map_or(SseEvent::Skip, SseEvent::Text)),
        Err(_) if payload.trim().is_empty() => Ok(SseEvent::Skip),
        Err(_) => Err(ProviderError::Api(format_api_error(payload))),
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let completion: ChatCompletion = self
            .post(messages, false)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;
        completion
            .into_text()
            .ok_or_else(|| ProviderError::Decode("response carried no message content".into()))
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
