//! URL utilities for consistent URL handling
//!
//! This module provides utilities for normalizing URLs to prevent issues
//! with trailing slashes when constructing API endpoints.

/// Path prefix every backend endpoint lives under.
pub const API_PREFIX: &str = "api/v1";

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use kbchat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000"), "http://127.0.0.1:8000");
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000///"), "http://127.0.0.1:8000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Construct a complete endpoint URL from a base URL and endpoint path,
/// with no doubled slashes at the seam.
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// URL of a backend endpoint under the `/api/v1` prefix.
///
/// A base URL that already ends in the prefix is not prefixed twice.
///
/// ```
/// use kbchat::utils::url::api_url;
///
/// assert_eq!(api_url("http://localhost:8000/", "chat/list"), "http://localhost:8000/api/v1/chat/list");
/// assert_eq!(api_url("http://localhost:8000/api/v1", "/login"), "http://localhost:8000/api/v1/login");
/// ```
pub fn api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    if normalized_base.ends_with(&format!("/{API_PREFIX}")) {
        construct_api_url(&normalized_base, endpoint)
    } else {
        construct_api_url(&normalized_base, &format!("{API_PREFIX}/{endpoint}"))
    }
}
