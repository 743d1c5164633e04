//! Quota evaluation and atomic application.
//!
//! Precedence is fixed: an active unlimited plan wins, then paid credits,
//! then the monthly free allowance, then denial. `decide` is a side-effect
//! free preview for rendering status screens; admission itself always goes
//! through `decide_and_apply`, whose debit is atomic at apply time.

use chrono::Utc;

use vacdesk_core::{QuotaDecision, QuotaMode, QuotaOutcome, UserId};
use vacdesk_store::SqliteStore;

use crate::config::EngineConfig;
use crate::error::Result;

/// Evaluates and applies entitlement for job admission.
#[derive(Clone)]
pub struct QuotaEngine {
    store: SqliteStore,
    free_per_month: i64,
}

impl QuotaEngine {
    /// Create a quota engine over the given store.
    #[must_use]
    pub fn new(store: SqliteStore, config: &EngineConfig) -> Self {
        Self {
            store,
            free_per_month: config.free_per_month,
        }
    }

    /// Preview the user's entitlement without consuming anything.
    ///
    /// The answer can go stale immediately; never treat it as a
    /// reservation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn decide(&self, user_id: UserId) -> Result<QuotaDecision> {
        let now = Utc::now();
        let user = self.store.ensure_user(user_id, None, None).await?;
        let credits = self.store.credits(user_id).await?;
        let free_used = self.store.free_used_this_month(user_id).await?;
        let free_left = (self.free_per_month - free_used).max(0);
        let unlimited_until = user.active_unlimited_until(now);

        let mode = if unlimited_until.is_some() {
            QuotaMode::Unlimited
        } else if credits > 0 {
            QuotaMode::Paid
        } else if free_left > 0 {
            QuotaMode::Free
        } else {
            QuotaMode::Denied
        };

        let user_message = (mode == QuotaMode::Denied).then(|| denial_message(free_used));

        Ok(QuotaDecision {
            allowed: mode != QuotaMode::Denied,
            mode,
            free_used,
            free_left,
            credits,
            unlimited_until,
            user_message,
        })
    }

    /// Resolve entitlement and consume it in one step.
    ///
    /// The paid path delegates to the store's guarded decrement, so two
    /// concurrent calls against a balance of one cannot both debit.
    /// Returns `Ok(Err(decision))` when denied; nothing was consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn decide_and_apply(
        &self,
        user_id: UserId,
    ) -> Result<std::result::Result<QuotaOutcome, QuotaDecision>> {
        let now = Utc::now();
        let user = self.store.ensure_user(user_id, None, None).await?;

        if let Some(until) = user.active_unlimited_until(now) {
            let free_used = self.store.free_used_this_month(user_id).await?;
            return Ok(Ok(QuotaOutcome {
                mode: QuotaMode::Unlimited,
                free_used,
                free_left: (self.free_per_month - free_used).max(0),
                credits: self.store.credits(user_id).await?,
                unlimited_until: Some(until),
                credits_delta: 0,
            }));
        }

        // Guarded decrement; returns None rather than going negative.
        if let Some(balance) = self.store.consume_credit(user_id).await? {
            self.store.record_usage(user_id, "paid").await?;
            let free_used = self.store.free_used_this_month(user_id).await?;
            return Ok(Ok(QuotaOutcome {
                mode: QuotaMode::Paid,
                free_used,
                free_left: (self.free_per_month - free_used).max(0),
                credits: balance,
                unlimited_until: None,
                credits_delta: -1,
            }));
        }

        let free_used = self.store.free_used_this_month(user_id).await?;
        if free_used < self.free_per_month {
            self.store.record_usage(user_id, "free").await?;
            let free_used = free_used + 1;
            return Ok(Ok(QuotaOutcome {
                mode: QuotaMode::Free,
                free_used,
                free_left: (self.free_per_month - free_used).max(0),
                credits: 0,
                unlimited_until: None,
                credits_delta: 0,
            }));
        }

        tracing::info!(user_id = %user_id, free_used, "quota denied");
        Ok(Err(QuotaDecision {
            allowed: false,
            mode: QuotaMode::Denied,
            free_used,
            free_left: 0,
            credits: 0,
            unlimited_until: None,
            user_message: Some(denial_message(free_used)),
        }))
    }
}

fn denial_message(free_used: i64) -> String {
    format!(
        "You've used all {free_used} free reports this month and have no credits left. \
         Buy a pack to keep going, or wait for the monthly reset."
    )
}
