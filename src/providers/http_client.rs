use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use reqwest::Client;
use std::time::Duration;

use super::ProviderResult;

pub(crate) fn default_http_client(timeout: Duration) -> ProviderResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    Ok(Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .user_agent(concat!("modelviz/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .build()?)
}

/// Turns a non-success response into a typed error, keeping the body text.
pub(crate) async fn check_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    tracing::debug!(status = status.as_u16(), body = %error_text, "Provider returned error status");

    Err(super::ProviderError::from_status(status.as_u16(), extract_message(&error_text)))
}

/// Vendors wrap the human-readable message differently; fall back to the raw body.
fn extract_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };

    let error = value.get("error").unwrap_or(&value);
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::extract_message;

    #[test]
    fn test_extract_message() {
        assert_eq!(
            extract_message(r#"{"error":{"message":"rate limited","type":"rate_limit_error"}}"#),
            "rate limited"
        );
        assert_eq!(extract_message(r#"{"error":"nope"}"#), "nope");
        assert_eq!(extract_message("plain text"), "plain text");
    }
}
