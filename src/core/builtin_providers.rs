//! Built-in provider catalog
//!
//! The providers and models seeded into the store on startup come from the
//! `builtin_models.toml` file embedded at build time.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Wire format spoken by a provider's chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// OpenAI chat-completions (also used by many compatible vendors).
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinProvider {
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    pub mode: Option<ApiMode>,
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<BuiltinProvider>,
}

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> &'static [BuiltinProvider] {
    static PROVIDERS: OnceLock<Vec<BuiltinProvider>> = OnceLock::new();

    PROVIDERS.get_or_init(|| {
        const CONFIG_CONTENT: &str = include_str!("../builtin_models.toml");
        let config: BuiltinProvidersConfig =
            toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_models.toml");
        config.providers
    })
}
