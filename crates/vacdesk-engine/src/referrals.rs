//! Referral attribution and activation.
//!
//! Attribution happens on first contact (deep link token or promo code)
//! and creates at most one referral row per invitee, ever. Activation is
//! triggered later by a milestone event and is where the inviter's bonus
//! is decided, subject to the expiry window and the bonus caps.

use chrono::{Duration as ChronoDuration, Utc};

use vacdesk_core::{
    ActivationResult, AttributionStatus, EntryReason, ReferralSource, ReferralStats,
    ReferralStatus, RejectReason, StartResult, UserId,
};
use vacdesk_store::SqliteStore;

use crate::config::EngineConfig;
use crate::error::Result;

/// Drives the referral state machine.
#[derive(Clone)]
pub struct ReferralEngine {
    store: SqliteStore,
    enabled: bool,
    bonus_invitee: i64,
    bonus_inviter: i64,
    attribution_ttl: ChronoDuration,
    promo_window: ChronoDuration,
    max_bonus_per_day: i64,
    max_bonus_total: i64,
}

impl ReferralEngine {
    /// Create a referral engine over the given store.
    ///
    /// # Panics
    ///
    /// Panics if a configured duration exceeds the chrono range, which is
    /// practically impossible for sane configs.
    #[must_use]
    pub fn new(store: SqliteStore, config: &EngineConfig) -> Self {
        Self {
            store,
            enabled: config.referrals_enabled,
            bonus_invitee: config.referral_bonus_invitee,
            bonus_inviter: config.referral_bonus_inviter,
            attribution_ttl: ChronoDuration::from_std(config.referral_attribution_ttl)
                .unwrap_or_else(|_| ChronoDuration::hours(48)),
            promo_window: ChronoDuration::from_std(config.promo_account_age_window)
                .unwrap_or_else(|_| ChronoDuration::hours(48)),
            max_bonus_per_day: config.referral_max_bonus_per_day,
            max_bonus_total: config.referral_max_bonus_total,
        }
    }

    /// The inviter's durable referral token, created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or token generation exhausts
    /// its retries.
    pub async fn referral_token(&self, user_id: UserId) -> Result<String> {
        Ok(self.store.ensure_stats(user_id).await?.token)
    }

    /// The inviter's counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn stats(&self, user_id: UserId) -> Result<ReferralStats> {
        Ok(self.store.ensure_stats(user_id).await?)
    }

    /// Attribute a new invitee through a deep link token.
    ///
    /// Never fails the caller's flow: every outcome, including rejection,
    /// is an `Ok(StartResult)`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn attribute(&self, invitee_id: UserId, token: &str) -> Result<StartResult> {
        if !self.enabled {
            return Ok(StartResult::status_only(AttributionStatus::Disabled));
        }

        let Some(inviter_stats) = self.store.stats_by_token(token).await? else {
            tracing::info!(invitee_id = %invitee_id, token, reason = "invalid_token", "referral_rejected");
            return Ok(StartResult::rejected(RejectReason::InvalidToken));
        };
        let inviter_id = inviter_stats.user_id;

        self.attribute_to(invitee_id, inviter_id, Some(token), ReferralSource::DeepLink)
            .await
    }

    /// Attribute a new invitee through a promo code.
    ///
    /// Codes are matched case-insensitively. A code without a bound
    /// inviter is rejected; every grant must trace to a referral row so
    /// the once-per-invitee gate applies.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn apply_promo(&self, invitee_id: UserId, code: &str) -> Result<StartResult> {
        if !self.enabled {
            return Ok(StartResult::status_only(AttributionStatus::Disabled));
        }

        let now = Utc::now();
        let code = code.trim().to_uppercase();

        let Some(promo) = self.store.promo_code(&code).await? else {
            tracing::info!(invitee_id = %invitee_id, code = %code, reason = "invalid_token", "referral_rejected");
            return Ok(StartResult::rejected(RejectReason::InvalidToken));
        };

        if !promo.is_usable_at(now) {
            tracing::info!(invitee_id = %invitee_id, code = %code, reason = "promo_unavailable", "referral_rejected");
            return Ok(StartResult::rejected(RejectReason::PromoUnavailable));
        }

        // Promo codes only work for accounts younger than the window.
        if let Some(age) = self.store.account_age_hours(invitee_id).await? {
            if age >= self.promo_window.num_hours() {
                tracing::info!(invitee_id = %invitee_id, code = %code, reason = "promo_window_closed", "referral_rejected");
                return Ok(StartResult::rejected(RejectReason::PromoWindowClosed));
            }
        }

        let Some(inviter_id) = promo.inviter_id else {
            tracing::info!(invitee_id = %invitee_id, code = %code, reason = "promo_unavailable", "referral_rejected");
            return Ok(StartResult::rejected(RejectReason::PromoUnavailable));
        };

        let result = self
            .attribute_to(invitee_id, inviter_id, Some(&code), ReferralSource::PromoCode)
            .await?;
        if result.status == AttributionStatus::Pending {
            self.store.increment_promo_uses(&code).await?;
        }
        Ok(result)
    }

    /// Shared attribution path once an inviter is resolved.
    async fn attribute_to(
        &self,
        invitee_id: UserId,
        inviter_id: UserId,
        token: Option<&str>,
        source: ReferralSource,
    ) -> Result<StartResult> {
        let now = Utc::now();

        if inviter_id == invitee_id {
            tracing::info!(invitee_id = %invitee_id, reason = "self_ref", "referral_rejected");
            return Ok(StartResult::rejected(RejectReason::SelfReferral));
        }

        if self.store.is_banned(inviter_id).await? || self.store.is_banned(invitee_id).await? {
            tracing::info!(invitee_id = %invitee_id, inviter_id = %inviter_id, reason = "banned", "referral_rejected");
            return Ok(StartResult::rejected(RejectReason::Banned));
        }

        // Attribution is once per invitee for the lifetime of the system.
        if let Some(existing) = self.store.referral_by_invitee(invitee_id).await? {
            if existing.inviter_id == inviter_id {
                return Ok(StartResult {
                    inviter_id: Some(inviter_id),
                    status: AttributionStatus::Existing(existing.status),
                    reason: None,
                    invitee_bonus: 0,
                });
            }
            tracing::info!(invitee_id = %invitee_id, reason = "duplicate", "referral_rejected");
            return Ok(StartResult::rejected(RejectReason::Duplicate));
        }

        // Deep links only attribute genuinely new accounts.
        if source == ReferralSource::DeepLink {
            if let Some(age) = self.store.account_age_hours(invitee_id).await? {
                if age >= self.attribution_ttl.num_hours() {
                    tracing::info!(invitee_id = %invitee_id, reason = "not_new", "referral_rejected");
                    return Ok(StartResult::rejected(RejectReason::NotNew));
                }
            }
        }

        self.store.ensure_user(invitee_id, None, None).await?;
        self.store.ensure_stats(inviter_id).await?;

        let expires_at = now + self.attribution_ttl;
        let referral = self
            .store
            .create_referral(inviter_id, invitee_id, token, source, Some(expires_at))
            .await?;

        self.store
            .grant_credits(
                invitee_id,
                self.bonus_invitee,
                EntryReason::ReferralInvitee,
                Some(referral.id),
            )
            .await?;

        tracing::info!(
            invitee_id = %invitee_id,
            inviter_id = %inviter_id,
            referral_id = %referral.id,
            source = source.as_str(),
            "referral_attributed"
        );

        Ok(StartResult {
            inviter_id: Some(inviter_id),
            status: AttributionStatus::Pending,
            reason: None,
            invitee_bonus: self.bonus_invitee,
        })
    }

    /// Drive a pending referral forward on a milestone event (the
    /// invitee's first completed job or first payment).
    ///
    /// Activation past the expiry deadline rejects the referral instead.
    /// A capped inviter still gets the activation, just no bonus.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn trigger_activation(&self, invitee_id: UserId) -> Result<ActivationResult> {
        let none = ActivationResult {
            inviter_id: None,
            granted: false,
            bonus: 0,
            reason: None,
        };

        if !self.enabled {
            return Ok(none);
        }

        let Some(referral) = self.store.referral_by_invitee(invitee_id).await? else {
            return Ok(none);
        };
        if referral.status != ReferralStatus::Pending {
            return Ok(none);
        }

        let now = Utc::now();
        let inviter_id = referral.inviter_id;

        if referral.expires_at.is_some_and(|at| at < now) {
            self.store
                .mark_referral_rejected(referral.id, RejectReason::Expired)
                .await?;
            tracing::info!(referral_id = %referral.id, reason = "expired", "referral_rejected");
            return Ok(ActivationResult {
                inviter_id: Some(inviter_id),
                granted: false,
                bonus: 0,
                reason: Some(RejectReason::Expired),
            });
        }

        if self.store.is_banned(inviter_id).await? {
            self.store
                .mark_referral_rejected(referral.id, RejectReason::Banned)
                .await?;
            tracing::info!(referral_id = %referral.id, reason = "banned", "referral_rejected");
            return Ok(ActivationResult {
                inviter_id: Some(inviter_id),
                granted: false,
                bonus: 0,
                reason: Some(RejectReason::Banned),
            });
        }

        // The transition is single-shot; a concurrent trigger loses here.
        if !self.store.mark_referral_activated(referral.id).await? {
            return Ok(none);
        }
        tracing::info!(referral_id = %referral.id, inviter_id = %inviter_id, "referral_activated");

        if self.inviter_is_capped(inviter_id).await? {
            tracing::info!(inviter_id = %inviter_id, reason = "bonus_limit", "referral_rejected");
            return Ok(ActivationResult {
                inviter_id: Some(inviter_id),
                granted: false,
                bonus: 0,
                reason: Some(RejectReason::BonusLimit),
            });
        }

        self.store
            .grant_credits(
                inviter_id,
                self.bonus_inviter,
                EntryReason::ReferralInviter,
                Some(referral.id),
            )
            .await?;
        self.store
            .increment_bonuses(inviter_id, self.bonus_inviter)
            .await?;

        tracing::info!(inviter_id = %inviter_id, bonus = self.bonus_inviter, "bonus_granted");

        Ok(ActivationResult {
            inviter_id: Some(inviter_id),
            granted: true,
            bonus: self.bonus_inviter,
            reason: None,
        })
    }

    /// Both caps count inviter bonus ledger entries, not credit amounts:
    /// the daily cap over a rolling 24h window, the lifetime cap over
    /// the whole ledger.
    async fn inviter_is_capped(&self, inviter_id: UserId) -> Result<bool> {
        let since = Utc::now() - ChronoDuration::hours(24);
        let today = self
            .store
            .count_entries_with_reason(inviter_id, EntryReason::ReferralInviter, Some(since))
            .await?;
        if today >= self.max_bonus_per_day {
            return Ok(true);
        }

        let total = self
            .store
            .count_entries_with_reason(inviter_id, EntryReason::ReferralInviter, None)
            .await?;
        Ok(total >= self.max_bonus_total)
    }

    /// Exclude a user from the referral program, both roles.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn ban(&self, user_id: UserId, reason: Option<&str>) -> Result<()> {
        self.store.ban_user(user_id, reason).await?;
        tracing::warn!(user_id = %user_id, "user banned from referral program");
        Ok(())
    }
}
