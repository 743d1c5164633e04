//! Engine error types.

use vacdesk_core::{QuotaDecision, RejectReason};
use vacdesk_store::StoreError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine.
///
/// Several variants are expected control flow rather than faults:
/// `QuotaDenied`, `UserBusy`, and `AtCapacity` each carry enough context
/// to build the user-facing reply.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The quota gate denied the job.
    #[error("quota denied")]
    QuotaDenied(Box<QuotaDecision>),

    /// The user already has a job running.
    #[error("user already has a running job")]
    UserBusy,

    /// The global concurrency limit is saturated.
    #[error("all job slots are busy")]
    AtCapacity,

    /// The pipeline exceeded its deadline and was killed.
    #[error("job timed out after {timeout_secs}s")]
    JobTimeout {
        /// The deadline that was exceeded.
        timeout_secs: u64,
        /// Last few lines of pipeline output.
        tail: Vec<String>,
    },

    /// The pipeline exited non-zero or produced no artifact.
    #[error("job failed: {detail}")]
    JobFailed {
        /// Short description of the failure.
        detail: String,
        /// Last few lines of pipeline output.
        tail: Vec<String>,
    },

    /// A referral operation was rejected.
    #[error("referral rejected: {0:?}")]
    ReferralRejected(RejectReason),

    /// Payment provider failure.
    #[error(transparent)]
    Payment(#[from] vacdesk_pay::PayError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Pipeline process could not be spawned or its output read.
    #[error("pipeline I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether this error is expected admission control rather than a fault.
    #[must_use]
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            Self::QuotaDenied(_) | Self::UserBusy | Self::AtCapacity
        )
    }
}
