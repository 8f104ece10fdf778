//! Provider name to backend constructor dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::anthropic::AnthropicBackend;
use super::openai::OpenAiBackend;
use super::{ChatBackend, ProviderConfig, ProviderError};
use crate::core::builtin_providers::{load_builtin_providers, ApiMode};

pub type BackendConstructor =
    Arc<dyn Fn(ProviderConfig) -> Result<Box<dyn ChatBackend>, ProviderError> + Send + Sync>;

/// Maps lowercase provider names to backend constructors.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, BackendConstructor>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a backend for every built-in provider that declares
    /// a wire format.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for provider in load_builtin_providers() {
            let default_base_url = provider.base_url.clone();
            match provider.mode {
                Some(ApiMode::OpenAi) => registry.register(&provider.name, move |config| {
                    OpenAiBackend::new(config, &default_base_url)
                        .map(|backend| Box::new(backend) as Box<dyn ChatBackend>)
                }),
                Some(ApiMode::Anthropic) => registry.register(&provider.name, move |config| {
                    AnthropicBackend::new(config, &default_base_url)
                        .map(|backend| Box::new(backend) as Box<dyn ChatBackend>)
                }),
                None => debug!(provider = %provider.name, "catalog provider has no backend"),
            }
        }
        registry
    }

    /// Register (or replace) the constructor for `name`.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(ProviderConfig) -> Result<Box<dyn ChatBackend>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(name.to_lowercase(), Arc::new(constructor));
    }

    pub fn supports(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a backend. Fails for unknown providers and bad credentials.
    pub fn build(&self, config: ProviderConfig) -> Result<Box<dyn ChatBackend>, ProviderError> {
        let constructor = self
            .constructors
            .get(&config.provider_name.to_lowercase())
            .ok_or_else(|| ProviderError::UnsupportedProvider(config.provider_name.clone()))?;
        debug!(provider = %config.provider_name, model = %config.model, "constructing backend");
        constructor(config)
    }
}
