//! Storage error types.

use vacdesk_core::CoreError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value failed to parse into its domain type.
    #[error("corrupt row: {0}")]
    CorruptRow(#[from] CoreError),

    /// A balance mutation would have violated the ledger invariant.
    /// This is a programming error, not a user error; the transaction
    /// that raised it has been aborted.
    #[error("ledger invariant violation for user {user_id}: {detail}")]
    LedgerInvariant {
        /// The affected user.
        user_id: i64,
        /// What went wrong.
        detail: String,
    },

    /// Ran out of attempts generating a unique referral token.
    #[error("could not generate a unique referral token")]
    TokenExhausted,
}
