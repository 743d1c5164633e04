//! Payment provider error types.

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, PayError>;

/// Errors that can occur talking to the payment provider.
#[derive(Debug, thiserror::Error)]
pub enum PayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider API returned an error.
    #[error("provider API error: {code} - {description}")]
    Api {
        /// Provider error code.
        code: String,
        /// Human-readable description.
        description: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The provider response was missing a required field.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}
