//! Authentication utilities for API requests

/// Attach the bearer credential every backend call carries.
pub fn add_bearer(request: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
    request.bearer_auth(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_set() {
        let client = reqwest::Client::new();
        let request = add_bearer(client.get("https://example.com"), "test-token")
            .build()
            .expect("request builds");

        let header = request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        assert_eq!(header, Some("Bearer test-token"));
    }
}
