//! Provider adapters: one contract over heterogeneous LLM HTTP APIs.

pub mod anthropic;
pub mod client;
pub mod openai;
pub mod registry;
pub mod resolve;
pub(crate) mod sse;

use std::error::Error;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::ChatMessage;
use crate::core::chat_stream::ChunkSink;
use crate::core::store::settings::mask_api_key;
use crate::core::store::StoreError;

pub use client::ChatClient;
pub use registry::ProviderRegistry;
pub use resolve::{ClientFactory, ClientOptions, ClientSource};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

const QUICK_FIXES: &[&str] = &[
    "llmschat providers                                  # List providers",
    "llmschat models <provider>                          # List a provider's models",
    "llmschat settings set --name <you> --provider <p> --model <m> --api-key <key>",
];

/// Which history write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStage {
    SaveUser,
    Load,
    SaveResponse,
}

impl fmt::Display for HistoryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HistoryStage::SaveUser => "failed to save user message",
            HistoryStage::Load => "failed to load chat history",
            HistoryStage::SaveResponse => "failed to save AI response",
        })
    }
}

#[derive(Debug)]
pub enum ProviderError {
    /// No backend is registered under this provider name.
    UnsupportedProvider(String),
    MissingCredential { provider: String },
    /// The credential cannot be carried in an HTTP header.
    InvalidCredential { provider: String },
    /// Settings are absent or point at catalog rows that do not exist.
    NotConfigured(String),
    Client(reqwest::Error),
    Transport(reqwest::Error),
    /// The provider answered with an error; the text is display-ready.
    Api(String),
    Decode(String),
    History {
        stage: HistoryStage,
        source: StoreError,
    },
    Store(StoreError),
    EmptyPrompt,
    Cancelled,
}

impl ProviderError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProviderError::UnsupportedProvider(_)
                | ProviderError::MissingCredential { .. }
                | ProviderError::InvalidCredential { .. }
                | ProviderError::NotConfigured(_)
        )
    }

    /// Commands that help the user recover from a configuration error.
    pub fn quick_fixes(&self) -> &'static [&'static str] {
        if self.is_configuration() {
            QUICK_FIXES
        } else {
            &[]
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::UnsupportedProvider(name) => write!(f, "unsupported provider: {name}"),
            ProviderError::MissingCredential { provider } => {
                write!(f, "no API key configured for provider '{provider}'")
            }
            ProviderError::InvalidCredential { provider } => write!(
                f,
                "API key for provider '{provider}' contains characters that cannot be sent in an HTTP header"
            ),
            ProviderError::NotConfigured(message) => f.write_str(message),
            ProviderError::Client(err) => write!(f, "failed to build HTTP client: {err}"),
            ProviderError::Transport(err) => write!(f, "request failed: {err}"),
            ProviderError::Api(message) => f.write_str(message),
            ProviderError::Decode(message) => write!(f, "unexpected provider response: {message}"),
            ProviderError::History { stage, source } => write!(f, "{stage}: {source}"),
            ProviderError::Store(err) => err.fmt(f),
            ProviderError::EmptyPrompt => f.write_str("prompt is empty"),
            ProviderError::Cancelled => f.write_str("request cancelled"),
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProviderError::Client(err) | ProviderError::Transport(err) => Some(err),
            ProviderError::History { source, .. } => Some(source),
            ProviderError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ProviderError {
    fn from(err: StoreError) -> Self {
        ProviderError::Store(err)
    }
}

/// Everything needed to construct a backend.
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider_name: String,
    pub api_key: String,
    pub model: String,
    /// Overrides the provider's built-in endpoint.
    pub base_url: Option<String>,
    pub request_timeout: Duration,
    pub max_tokens: u32,
}

impl ProviderConfig {
    pub fn new(
        provider_name: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(default)
    }

    fn require_api_key(&self) -> Result<&str, ProviderError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(ProviderError::MissingCredential {
                provider: self.provider_name.clone(),
            });
        }
        Ok(key)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_name", &self.provider_name)
            .field("api_key", &mask_api_key(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// A constructed, credentialed connection to one provider/model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn provider_name(&self) -> &str;

    fn model(&self) -> &str;

    /// One request; returns the whole reply.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;

    /// Streaming request. Text is pushed into `sink` as it arrives; the
    /// concatenated reply is returned at the end.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        sink: &ChunkSink,
    ) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_errors_name_the_failed_stage() {
        let err = ProviderError::History {
            stage: HistoryStage::SaveUser,
            source: StoreError::InvalidData("disk full".into()),
        };
        assert_eq!(
            err.to_string(),
            "failed to save user message: invalid stored data: disk full"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn configuration_errors_offer_quick_fixes() {
        let err = ProviderError::UnsupportedProvider("Google".into());
        assert_eq!(err.to_string(), "unsupported provider: Google");
        assert_eq!(err.exit_code(), 2);
        assert!(!err.quick_fixes().is_empty());

        assert!(ProviderError::Cancelled.quick_fixes().is_empty());
        assert_eq!(ProviderError::Cancelled.exit_code(), 1);
    }

    #[test]
    fn config_debug_masks_the_key() {
        let config = ProviderConfig::new("OpenAI", "sk-0123456789abcdef", "gpt-4");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("0123456789"));
    }

    #[test]
    fn blank_override_falls_back_to_default_base_url() {
        let config = ProviderConfig::new("OpenAI", "k", "gpt-4").with_base_url("  ");
        assert_eq!(config.base_url_or("https://default"), "https://default");

        let config = config.with_base_url("http://localhost:8080/v1");
        assert_eq!(
            config.base_url_or("https://default"),
            "http://localhost:8080/v1"
        );
    }
}
