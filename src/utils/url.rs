//! Endpoint URL construction for provider base URLs.

/// Strip surrounding whitespace and trailing slashes from a base URL.
///
/// ```
/// use llmschat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url(" https://api.deepseek.com/v1/ "), "https://api.deepseek.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a provider base URL and an endpoint path with exactly one slash.
///
/// ```
/// use llmschat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.anthropic.com/v1/", "/messages"),
///     "https://api.anthropic.com/v1/messages"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        normalize_base_url(base_url),
        endpoint.trim_start_matches('/')
    )
}
