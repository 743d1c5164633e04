//! Error types for vacdesk core.

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur when working with core types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A stored enum string did not match any known variant.
    #[error("unknown {kind} value: {value}")]
    UnknownVariant {
        /// What was being parsed (e.g. "plan", "payment status").
        kind: &'static str,
        /// The offending string.
        value: String,
    },

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    /// Shorthand for an [`CoreError::UnknownVariant`].
    #[must_use]
    pub fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}
