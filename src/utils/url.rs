//! URL utilities for API endpoints and inline image payloads.

use crate::mcp::types::mime_type_for_format;

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use toolbridge::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:11434/v1/"), "http://localhost:11434/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// ```
/// use toolbridge::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.openai.com/v1/", "/chat/completions"),
///     "https://api.openai.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// `data:` URI for a base64 image payload, e.g. `data:image/png;base64,...`.
pub fn image_data_uri(format: &str, base64_payload: &str) -> String {
    format!(
        "data:{};base64,{}",
        mime_type_for_format(format),
        base64_payload
    )
}
