use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::io::{default_database_path, ConfigError};
use crate::core::chat_stream::DEFAULT_STREAM_BUFFER;
use crate::core::providers::{ClientOptions, DEFAULT_MAX_TOKENS, DEFAULT_REQUEST_TIMEOUT};
use crate::core::session::DEFAULT_GREETING;

/// User configuration, stored as TOML. Unset fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// SQLite file holding the catalog, settings and chat history
    pub database_path: Option<PathBuf>,
    /// First assistant turn of every new chat
    pub greeting: Option<String>,
    /// Chunks buffered between a provider and the display
    pub stream_buffer: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    /// Reply length cap sent to Anthropic-format providers
    pub max_tokens: Option<u32>,
    /// Base URL overrides keyed by provider name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub base_urls: BTreeMap<String, String>,
    /// `tracing` filter directive, e.g. `llmschat=debug`
    pub log_filter: Option<String>,
}

/// Keys accepted by [`Config::set_value`] and [`Config::unset_value`].
pub const CONFIG_KEYS: &[&str] = &[
    "database-path",
    "greeting",
    "stream-buffer",
    "request-timeout",
    "max-tokens",
    "log-filter",
    "base-url.<provider>",
];

/// Shorten a path for display by replacing the home directory with `~`.
///
/// Examples:
/// - Unix: `/home/user/.config/llmschat/config.toml` → `~/.config/llmschat/config.toml`
/// - Windows paths are shown unchanged.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("'{value}' is not a valid number")))
}

impl Config {
    pub fn greeting(&self) -> &str {
        self.greeting.as_deref().unwrap_or(DEFAULT_GREETING)
    }

    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer.unwrap_or(DEFAULT_STREAM_BUFFER).max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// The configured database file, or the platform default.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => default_database_path(),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: self.request_timeout(),
            max_tokens: self.max_tokens(),
            stream_buffer: self.stream_buffer(),
            base_urls: self
                .base_urls
                .iter()
                .map(|(name, url)| (name.clone(), url.clone()))
                .collect(),
        }
    }

    /// Set one value by its command-line key.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::invalid(key, "value must not be empty"));
        }

        match key {
            "database-path" => self.database_path = Some(PathBuf::from(value)),
            "greeting" => self.greeting = Some(value.to_string()),
            "stream-buffer" => {
                let buffer: usize = parse_number(key, value)?;
                if buffer == 0 {
                    return Err(ConfigError::invalid(key, "must be at least 1"));
                }
                self.stream_buffer = Some(buffer);
            }
            "request-timeout" => self.request_timeout_secs = Some(parse_number(key, value)?),
            "max-tokens" => self.max_tokens = Some(parse_number(key, value)?),
            "log-filter" => self.log_filter = Some(value.to_string()),
            _ => match key.strip_prefix("base-url.").filter(|p| !p.is_empty()) {
                Some(provider) => {
                    self.base_urls
                        .retain(|name, _| !name.eq_ignore_ascii_case(provider));
                    self.base_urls
                        .insert(provider.to_string(), value.to_string());
                }
                None => return Err(ConfigError::UnknownKey(key.to_string())),
            },
        }
        Ok(())
    }

    /// Reset one value to its default.
    pub fn unset_value(&mut self, key: &str) -> Result<(), ConfigError> {
        match key {
            "database-path" => self.database_path = None,
            "greeting" => self.greeting = None,
            "stream-buffer" => self.stream_buffer = None,
            "request-timeout" => self.request_timeout_secs = None,
            "max-tokens" => self.max_tokens = None,
            "log-filter" => self.log_filter = None,
            _ => match key.strip_prefix("base-url.").filter(|p| !p.is_empty()) {
                Some(provider) => self
                    .base_urls
                    .retain(|name, _| !name.eq_ignore_ascii_case(provider)),
                None => return Err(ConfigError::UnknownKey(key.to_string())),
            },
        }
        Ok(())
    }
}
