//! Turning the saved settings profile into a ready client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ChatClient, ProviderConfig, ProviderError, ProviderRegistry};
use super::{DEFAULT_MAX_TOKENS, DEFAULT_REQUEST_TIMEOUT};
use crate::core::chat_stream::DEFAULT_STREAM_BUFFER;
use crate::core::session::SessionId;
use crate::core::store::{Database, SessionStore, StoreError};

/// Where the session manager gets a client for each request.
#[async_trait]
pub trait ClientSource: Send + Sync {
    async fn client_for(&self, session_id: SessionId) -> Result<ChatClient, ProviderError>;

    /// Drop whatever is kept for a deleted session.
    async fn forget_session(&self, session_id: SessionId) -> Result<(), ProviderError>;
}

/// Request tuning applied to every client a factory builds.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    pub max_tokens: u32,
    pub stream_buffer: usize,
    /// Base URL overrides keyed by provider name, matched ignoring case.
    pub base_urls: HashMap<String, String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            base_urls: HashMap::new(),
        }
    }
}

impl ClientOptions {
    fn base_url_override(&self, provider_name: &str) -> Option<&str> {
        self.base_urls
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(provider_name))
            .map(|(_, url)| url.as_str())
    }
}

/// Builds clients from the settings profile stored in the database.
///
/// Settings are read on every call, so a profile saved while the app runs
/// applies to the next request.
#[derive(Clone, Debug)]
pub struct ClientFactory {
    db: Database,
    registry: Arc<ProviderRegistry>,
    options: ClientOptions,
}

impl ClientFactory {
    pub fn new(db: Database, registry: ProviderRegistry, options: ClientOptions) -> Self {
        Self {
            db,
            registry: Arc::new(registry),
            options,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Provider configuration described by the current settings.
    pub fn resolve_config(&self) -> Result<ProviderConfig, ProviderError> {
        let settings = self.db.settings()?.ok_or_else(|| {
            ProviderError::NotConfigured(
                "No settings saved yet. Choose a provider, model and API key first.".into(),
            )
        })?;
        let provider = self
            .db
            .provider_by_id(settings.provider_id)?
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "Saved settings reference provider {} which no longer exists",
                    settings.provider_id
                ))
            })?;
        let model = self.db.model_by_id(settings.model_id)?.ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Saved settings reference model {} which no longer exists",
                settings.model_id
            ))
        })?;

        let base_url = self
            .options
            .base_url_override(&provider.name)
            .map(str::to_owned)
            .or_else(|| Some(provider.base_url.clone()).filter(|url| !url.is_empty()));

        Ok(ProviderConfig {
            provider_name: provider.name,
            api_key: settings.api_key,
            model: model.name,
            base_url,
            request_timeout: self.options.request_timeout,
            max_tokens: self.options.max_tokens,
        })
    }

    /// Build a client for `session_id` from the current settings.
    pub fn build_client(&self, session_id: SessionId) -> Result<ChatClient, ProviderError> {
        let config = self.resolve_config()?;
        debug!(session_id = %session_id, ?config, "building client");
        let backend = self.registry.build(config)?;
        let history: Arc<dyn SessionStore> = Arc::new(self.db.clone());
        Ok(ChatClient::new(Arc::from(backend), history, session_id)
            .with_stream_buffer(self.options.stream_buffer))
    }
}

#[async_trait]
impl ClientSource for ClientFactory {
    async fn client_for(&self, session_id: SessionId) -> Result<ChatClient, ProviderError> {
        let factory = self.clone();
        tokio::task::spawn_blocking(move || factory.build_client(session_id))
            .await
            .map_err(|err| ProviderError::Store(StoreError::Task(err.to_string())))?
    }

    async fn forget_session(&self, session_id: SessionId) -> Result<(), ProviderError> {
        Ok(self.db.clear(session_id).await?)
    }
}
