//! Referral attribution types.
//!
//! A referral is created once per invitee (attribution) and later either
//! activated by a milestone event or rejected. `activated` and `rejected`
//! are terminal states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::{ReferralId, UserId};

/// Referral state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    /// Attributed, waiting for a milestone event.
    Pending,
    /// Milestone reached inside the attribution window. Terminal.
    Activated,
    /// Rejected with a reason. Terminal.
    Rejected,
}

impl ReferralStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Activated => "activated",
            Self::Rejected => "rejected",
        }
    }

    /// Parse the stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized values.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "activated" => Ok(Self::Activated),
            "rejected" => Ok(Self::Rejected),
            other => Err(CoreError::unknown("referral status", other)),
        }
    }
}

/// How the invitee entered the referral program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralSource {
    /// Followed an inviter's deep link token.
    DeepLink,
    /// Entered a promo code.
    PromoCode,
}

impl ReferralSource {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeepLink => "deep_link",
            Self::PromoCode => "promo_code",
        }
    }

    /// Parse the stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized values.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "deep_link" => Ok(Self::DeepLink),
            "promo_code" => Ok(Self::PromoCode),
            other => Err(CoreError::unknown("referral source", other)),
        }
    }
}

/// Why an attribution or activation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The token or code resolved to nothing.
    InvalidToken,
    /// Inviter and invitee are the same user.
    SelfReferral,
    /// Either party is banned from the program.
    Banned,
    /// The invitee already has a referral row.
    Duplicate,
    /// The invitee is not a new user.
    NotNew,
    /// Activation arrived after the attribution window closed.
    Expired,
    /// Inviter hit the daily or lifetime bonus cap.
    BonusLimit,
    /// The referral program is disabled.
    Disabled,
    /// The promo code is inactive, expired, or exhausted.
    PromoUnavailable,
    /// The invitee's account is too old to apply a promo code.
    PromoWindowClosed,
}

impl RejectReason {
    /// Stable string form used in storage and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::SelfReferral => "self_ref",
            Self::Banned => "banned",
            Self::Duplicate => "duplicate",
            Self::NotNew => "not_new",
            Self::Expired => "expired",
            Self::BonusLimit => "bonus_limit",
            Self::Disabled => "disabled",
            Self::PromoUnavailable => "promo_unavailable",
            Self::PromoWindowClosed => "promo_window_closed",
        }
    }

    /// Parse the stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized values.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "invalid_token" => Ok(Self::InvalidToken),
            "self_ref" => Ok(Self::SelfReferral),
            "banned" => Ok(Self::Banned),
            "duplicate" => Ok(Self::Duplicate),
            "not_new" => Ok(Self::NotNew),
            "expired" => Ok(Self::Expired),
            "bonus_limit" => Ok(Self::BonusLimit),
            "disabled" => Ok(Self::Disabled),
            "promo_unavailable" => Ok(Self::PromoUnavailable),
            "promo_window_closed" => Ok(Self::PromoWindowClosed),
            other => Err(CoreError::unknown("reject reason", other)),
        }
    }
}

/// A referral record, one per invitee for the lifetime of the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    /// Row id.
    pub id: ReferralId,

    /// The inviting user.
    pub inviter_id: UserId,

    /// The invited user. Unique across all referrals.
    pub invitee_id: UserId,

    /// The token or promo code that attributed this referral.
    pub token: Option<String>,

    /// How the invitee entered the program.
    pub source: ReferralSource,

    /// Current state.
    pub status: ReferralStatus,

    /// Rejection reason, set once status is `rejected`.
    pub rejection_reason: Option<RejectReason>,

    /// When the referral was attributed.
    pub created_at: DateTime<Utc>,

    /// Attribution window deadline; activation after this rejects.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the referral was activated, if it was.
    pub activated_at: Option<DateTime<Utc>>,
}

/// Per-inviter referral counters and the durable referral token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralStats {
    /// The inviter.
    pub user_id: UserId,

    /// The inviter's durable referral handle. Generated once,
    /// collision-checked.
    pub token: String,

    /// Referrals attributed to this inviter.
    pub invited_count: i64,

    /// Referrals that reached activation.
    pub activated_count: i64,

    /// Total bonus credits earned.
    pub bonuses_earned: i64,

    /// When the last referral was attributed.
    pub last_invited_at: Option<DateTime<Utc>>,

    /// When the last bonus was granted.
    pub last_bonus_at: Option<DateTime<Utc>>,
}

/// An alternative attribution path into the same state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    /// The code itself (stored uppercase).
    pub code: String,

    /// The inviter credited for uses of this code, if bound.
    pub inviter_id: Option<UserId>,

    /// Whether the code currently works.
    pub is_active: bool,

    /// Code-level expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,

    /// Maximum total uses, if capped.
    pub max_uses: Option<i64>,

    /// Uses so far.
    pub uses: i64,
}

impl PromoCode {
    /// Whether the code can still attribute referrals at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.expires_at.is_some_and(|at| at < now) {
            return false;
        }
        if self.max_uses.is_some_and(|max| self.uses >= max) {
            return false;
        }
        true
    }
}

/// Outcome of the attribution state on first contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionStatus {
    /// The program is disabled.
    Disabled,
    /// A new pending referral was created.
    Pending,
    /// The invitee re-entered through the same inviter; nothing changed.
    Existing(ReferralStatus),
    /// Attribution was rejected.
    Rejected,
}

/// Result of an attribution attempt, used by callers only to notify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResult {
    /// The resolved inviter, when one exists.
    pub inviter_id: Option<UserId>,

    /// What happened.
    pub status: AttributionStatus,

    /// Rejection reason, when `status` is `Rejected`.
    pub reason: Option<RejectReason>,

    /// Signup bonus granted to the invitee (may be zero).
    pub invitee_bonus: i64,
}

impl StartResult {
    /// A result carrying only a status.
    #[must_use]
    pub const fn status_only(status: AttributionStatus) -> Self {
        Self {
            inviter_id: None,
            status,
            reason: None,
            invitee_bonus: 0,
        }
    }

    /// A rejection with a reason.
    #[must_use]
    pub const fn rejected(reason: RejectReason) -> Self {
        Self {
            inviter_id: None,
            status: AttributionStatus::Rejected,
            reason: Some(reason),
            invitee_bonus: 0,
        }
    }
}

/// Result of an activation trigger, used by callers only to notify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationResult {
    /// The inviter of the activated (or expired) referral.
    pub inviter_id: Option<UserId>,

    /// Whether a bonus was actually granted.
    pub granted: bool,

    /// Bonus amount granted (zero when capped or expired).
    pub bonus: i64,

    /// Why no bonus was granted, when applicable.
    pub reason: Option<RejectReason>,
}
