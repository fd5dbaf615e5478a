use crate::models::Provider;
use std::time::Duration;
use thiserror::Error;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Failures of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key configured for the provider.
    #[error("No API key configured for {}", .0.display_name())]
    MissingApiKey(Provider),

    /// Authentication failed (invalid or revoked key).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Insufficient quota or credits.
    #[error("Insufficient quota: {0}")]
    InsufficientQuota(String),

    /// Model not found at the provider.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Provider API returned another error status.
    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network or connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Failure reported without an HTTP status, passed through verbatim.
    #[error("{0}")]
    Other(String),

    /// The shared comparison deadline passed before the call finished.
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ProviderError {
    /// Maps an HTTP error status and body text the way all vendors share.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => Self::InvalidRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::InsufficientQuota(message),
            404 => Self::ModelNotFound(message),
            429 => Self::RateLimited(message),
            _ => Self::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}
