//! Quota decision types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which entitlement bucket a job request resolves to.
///
/// Precedence, first match wins: unlimited, paid, free, denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaMode {
    /// Active unlimited plan; no debit.
    Unlimited,
    /// Positive credit balance; debits exactly one credit.
    Paid,
    /// Within the monthly free allowance; records a free usage event.
    Free,
    /// No entitlement left.
    Denied,
}

/// The result of evaluating a user's entitlement, without side effects.
///
/// The caller (chat/UI layer) renders `user_message` when present and is
/// never allowed to bypass `allowed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaDecision {
    /// Whether a job may run.
    pub allowed: bool,

    /// Which bucket would be (or was) debited.
    pub mode: QuotaMode,

    /// Free jobs consumed this month.
    pub free_used: i64,

    /// Free jobs remaining this month.
    pub free_left: i64,

    /// Current credit balance.
    pub credits: i64,

    /// Unlimited plan expiry, if active.
    pub unlimited_until: Option<DateTime<Utc>>,

    /// User-facing denial text, set only when `allowed` is false.
    pub user_message: Option<String>,
}

/// The result of atomically applying a quota decision for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaOutcome {
    /// The bucket that admitted the job.
    pub mode: QuotaMode,

    /// Free jobs consumed this month, after the apply.
    pub free_used: i64,

    /// Free jobs remaining this month, after the apply.
    pub free_left: i64,

    /// Credit balance after the apply.
    pub credits: i64,

    /// Unlimited plan expiry, if active.
    pub unlimited_until: Option<DateTime<Utc>>,

    /// Credit delta applied (`-1` for paid mode, otherwise `0`).
    pub credits_delta: i64,
}
