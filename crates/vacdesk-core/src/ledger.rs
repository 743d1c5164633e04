//! Ledger entry types.
//!
//! Every balance-affecting event appends exactly one [`LedgerEntry`],
//! written in the same transaction as the balance mutation itself. Entries
//! are never updated or deleted; they are the audit trail of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::{LedgerEntryId, ReferralId, UserId};

/// What kind of entitlement an entry touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// A credit balance change (`delta` is the signed amount).
    Credit,
    /// An unlimited-plan grant. `delta` is zero; the entry exists so the
    /// audit trail captures every entitlement change.
    Unlimited,
}

impl LedgerKind {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Unlimited => "unlimited",
        }
    }

    /// Parse the stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized values.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "credit" => Ok(Self::Credit),
            "unlimited" => Ok(Self::Unlimited),
            other => Err(CoreError::unknown("ledger kind", other)),
        }
    }
}

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    /// Credits purchased through the payment provider.
    Purchase,
    /// One credit consumed by a job run.
    JobRun,
    /// Bonus granted to an inviter on referral activation.
    ReferralInviter,
    /// One-time signup bonus granted to an invitee on attribution.
    ReferralInvitee,
    /// Manual adjustment by an operator.
    Manual,
}

impl EntryReason {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::JobRun => "job_run",
            Self::ReferralInviter => "referral_inviter",
            Self::ReferralInvitee => "referral_invitee",
            Self::Manual => "manual",
        }
    }

    /// Parse the stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized values.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "job_run" => Ok(Self::JobRun),
            "referral_inviter" => Ok(Self::ReferralInviter),
            "referral_invitee" => Ok(Self::ReferralInvitee),
            "manual" => Ok(Self::Manual),
            other => Err(CoreError::unknown("entry reason", other)),
        }
    }
}

/// An immutable record of one balance-affecting event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry id (monotonic per insertion order).
    pub id: LedgerEntryId,

    /// The user whose entitlement was affected.
    pub user_id: UserId,

    /// Which entitlement was touched.
    pub kind: LedgerKind,

    /// Signed credit delta. Zero for `unlimited` entries.
    pub delta: i64,

    /// Why the entry was written.
    pub reason: EntryReason,

    /// The referral this entry rewards, if any.
    pub related_referral: Option<ReferralId>,

    /// Credit balance after applying `delta`, clamped at zero.
    pub balance_after: i64,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// Verify the ledger chain invariant for one user's entries in time order:
/// `balance_after[i] == max(0, balance_after[i-1] + delta[i])`, starting
/// from zero.
#[must_use]
pub fn chain_is_consistent(entries: &[LedgerEntry]) -> bool {
    let mut balance = 0i64;
    for entry in entries {
        balance = (balance + entry.delta).max(0);
        if entry.balance_after != balance {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(delta: i64, balance_after: i64) -> LedgerEntry {
        LedgerEntry {
            id: LedgerEntryId::new(0),
            user_id: UserId::new(7),
            kind: LedgerKind::Credit,
            delta,
            reason: EntryReason::Manual,
            related_referral: None,
            balance_after,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn consistent_chain_with_clamp() {
        let entries = vec![entry(3, 3), entry(-1, 2), entry(-5, 0), entry(2, 2)];
        assert!(chain_is_consistent(&entries));
    }

    #[test]
    fn inconsistent_chain_is_caught() {
        let entries = vec![entry(3, 3), entry(-1, 3)];
        assert!(!chain_is_consistent(&entries));
    }

    #[test]
    fn reason_roundtrip() {
        for reason in [
            EntryReason::Purchase,
            EntryReason::JobRun,
            EntryReason::ReferralInviter,
            EntryReason::ReferralInvitee,
            EntryReason::Manual,
        ] {
            assert_eq!(EntryReason::parse(reason.as_str()).unwrap(), reason);
        }
    }
}
