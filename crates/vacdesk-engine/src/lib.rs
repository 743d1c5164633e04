//! Entitlement and job admission engine for vacdesk.
//!
//! Ties the storage, payment, and pipeline layers together behind one
//! facade. A job run goes through three gates in order: admission (one
//! job per user, bounded global concurrency), quota (unlimited plan,
//! then credits, then the monthly free allowance), and finally the
//! pipeline itself. Denied requests are parked so the user can pay and
//! resume them without retyping anything.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod admission;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payments;
pub mod quota;
pub mod referrals;
pub mod session;

pub use admission::{AdmissionController, AdmissionPermit};
pub use cache::ExpiringCache;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::JobOrchestrator;
pub use payments::{Checkout, CheckoutOutcome, PaymentReconciler};
pub use quota::QuotaEngine;
pub use referrals::ReferralEngine;
pub use session::{PendingCheckout, SessionState};

use vacdesk_core::{
    ActivationResult, JobArtifact, JobRequest, LedgerEntry, Pack, QuotaDecision, QuotaOutcome,
    ReferralStats, StartResult, StatusEvent, UserId,
};
use vacdesk_pay::ProviderClient;
use vacdesk_store::SqliteStore;

/// A completed job: what ran and what entitlement paid for it.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// The produced artifact.
    pub artifact: JobArtifact,
    /// The entitlement bucket that admitted the job.
    pub outcome: QuotaOutcome,
}

/// The engine facade. Cheap to clone; all components share state.
#[derive(Clone)]
pub struct Engine {
    store: SqliteStore,
    quota: QuotaEngine,
    referrals: ReferralEngine,
    payments: PaymentReconciler,
    admission: AdmissionController,
    orchestrator: JobOrchestrator,
    sessions: std::sync::Arc<SessionState>,
}

impl Engine {
    /// Assemble an engine from its parts.
    #[must_use]
    pub fn new(store: SqliteStore, provider: ProviderClient, config: &EngineConfig) -> Self {
        let quota = QuotaEngine::new(store.clone(), config);
        let referrals = ReferralEngine::new(store.clone(), config);
        let payments =
            PaymentReconciler::new(store.clone(), provider, referrals.clone(), config);
        Self {
            store,
            quota,
            referrals,
            payments,
            admission: AdmissionController::new(config.max_concurrent_jobs),
            orchestrator: JobOrchestrator::new(config),
            sessions: std::sync::Arc::new(SessionState::new(
                config.saved_request_ttl,
                config.pending_checkout_ttl,
            )),
        }
    }

    /// Run a job end to end: admission, quota, pipeline.
    ///
    /// # Errors
    ///
    /// See [`Engine::run_job_with_progress`].
    pub async fn run_job(&self, user_id: UserId, request: JobRequest) -> Result<JobReport> {
        self.run_job_with_progress(user_id, request, |_| {}).await
    }

    /// Run a job end to end, surfacing pipeline status events to
    /// `progress` as they arrive.
    ///
    /// On quota denial the request is parked for later resumption and the
    /// denial decision is returned inside the error. The admission permit
    /// is held for the full pipeline run and released on every exit path.
    ///
    /// # Errors
    ///
    /// [`EngineError::UserBusy`] / [`EngineError::AtCapacity`] when
    /// admission fails, [`EngineError::QuotaDenied`] when entitlement is
    /// exhausted, and the pipeline errors from
    /// [`JobOrchestrator::run_with_progress`].
    pub async fn run_job_with_progress(
        &self,
        user_id: UserId,
        request: JobRequest,
        progress: impl FnMut(&StatusEvent),
    ) -> Result<JobReport> {
        let _permit = self.admission.admit(user_id)?;

        let outcome = match self.quota.decide_and_apply(user_id).await? {
            Ok(outcome) => outcome,
            Err(decision) => {
                self.sessions.save_request(user_id, request);
                return Err(EngineError::QuotaDenied(Box::new(decision)));
            }
        };

        let artifact = self
            .orchestrator
            .run_with_progress(user_id, &request, progress)
            .await?;

        // A first completed job is a referral milestone.
        self.referrals.trigger_activation(user_id).await?;

        Ok(JobReport { artifact, outcome })
    }

    /// Preview the user's entitlement without consuming anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn quota_status(&self, user_id: UserId) -> Result<QuotaDecision> {
        self.quota.decide(user_id).await
    }

    /// The request parked at the last quota denial, consumed on take.
    pub fn take_saved_request(&self, user_id: UserId) -> Option<JobRequest> {
        self.sessions.take_saved_request(user_id)
    }

    /// Start a checkout for a pack and park it for polling.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or the store fails.
    pub async fn buy_pack(&self, user_id: UserId, pack: Pack) -> Result<Checkout> {
        let checkout = self.payments.create_checkout(user_id, pack).await?;
        self.sessions.save_checkout(
            user_id,
            PendingCheckout {
                payment_id: checkout.payment.id,
                external_ref: checkout.payment.external_ref.clone(),
                pack,
                confirmation_url: checkout.confirmation_url.clone(),
            },
        );
        Ok(checkout)
    }

    /// Poll the user's in-flight checkout and apply it if settled.
    ///
    /// Returns `None` when there is nothing to poll (no checkout, or the
    /// parked one expired). Settled checkouts are cleared from the
    /// session either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or the store fails.
    pub async fn poll_checkout(&self, user_id: UserId) -> Result<Option<CheckoutOutcome>> {
        let Some(pending) = self.sessions.pending_checkout(user_id) else {
            return Ok(None);
        };

        let outcome = self.payments.check_and_apply(&pending.external_ref).await?;
        match &outcome {
            CheckoutOutcome::Applied { .. }
            | CheckoutOutcome::AlreadyApplied
            | CheckoutOutcome::Canceled => self.sessions.clear_checkout(user_id),
            CheckoutOutcome::Pending { .. } => {}
        }
        Ok(Some(outcome))
    }

    /// The user's durable referral token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn referral_token(&self, user_id: UserId) -> Result<String> {
        self.referrals.referral_token(user_id).await
    }

    /// The user's referral counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn referral_stats(&self, user_id: UserId) -> Result<ReferralStats> {
        self.referrals.stats(user_id).await
    }

    /// Attribute a new user through a deep link token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn apply_referral_token(
        &self,
        invitee_id: UserId,
        token: &str,
    ) -> Result<StartResult> {
        self.referrals.attribute(invitee_id, token).await
    }

    /// Attribute a new user through a promo code.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn apply_promo(&self, invitee_id: UserId, code: &str) -> Result<StartResult> {
        self.referrals.apply_promo(invitee_id, code).await
    }

    /// Drive the invitee's referral forward on a milestone event.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn trigger_referral_activation(
        &self,
        invitee_id: UserId,
    ) -> Result<ActivationResult> {
        self.referrals.trigger_activation(invitee_id).await
    }

    /// Recent reward ledger entries, for the user's bonus history screen.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn recent_rewards(&self, user_id: UserId, limit: i64) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.recent_rewards(user_id, limit).await?)
    }

    /// Exclude a user from the referral program.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn ban_from_referrals(&self, user_id: UserId, reason: Option<&str>) -> Result<()> {
        self.referrals.ban(user_id, reason).await
    }

    /// Whether the user currently has a job in flight.
    #[must_use]
    pub fn is_busy(&self, user_id: UserId) -> bool {
        self.admission.is_busy(user_id)
    }

    /// The underlying store, for read-only screens built on top.
    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }
}
