//! Checkout creation and payment reconciliation.
//!
//! Local payment rows are keyed by the provider's payment id. Applying a
//! succeeded payment is gated on the single-shot `pending -> paid`
//! transition in the store, so polling the same payment from two places
//! can never grant twice.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use vacdesk_core::{EntryReason, Pack, Payment, UserId};
use vacdesk_pay::{ProviderClient, ProviderStatus};
use vacdesk_store::SqliteStore;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::referrals::ReferralEngine;

/// A freshly created checkout, ready to hand to the user.
#[derive(Debug, Clone)]
pub struct Checkout {
    /// The local payment row, status `pending`.
    pub payment: Payment,
    /// Where the user pays.
    pub confirmation_url: String,
}

/// Result of reconciling one payment against the provider.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Money confirmed and the pack applied, exactly now.
    Applied {
        /// The payment row after the transition.
        payment: Payment,
        /// Credits granted, zero for the unlimited pack.
        credits_granted: i64,
        /// New unlimited expiry, for the unlimited pack.
        unlimited_until: Option<DateTime<Utc>>,
    },
    /// The payment had already been applied earlier; nothing changed.
    AlreadyApplied,
    /// The provider reported a terminal cancellation.
    Canceled,
    /// The provider has not settled yet; reported verbatim.
    Pending {
        /// Provider status string.
        status: String,
    },
}

/// Creates checkouts and applies settled payments.
#[derive(Clone)]
pub struct PaymentReconciler {
    store: SqliteStore,
    client: ProviderClient,
    referrals: ReferralEngine,
    prices: crate::config::PackPrices,
    return_url_base: String,
}

impl PaymentReconciler {
    /// Create a reconciler over the given store and provider client.
    #[must_use]
    pub fn new(
        store: SqliteStore,
        client: ProviderClient,
        referrals: ReferralEngine,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            client,
            referrals,
            prices: config.prices_minor,
            return_url_base: config.return_url_base.clone(),
        }
    }

    /// Create a provider payment and the matching local pending row.
    ///
    /// The idempotence key is fresh per attempt; retrying a failed call
    /// creates a new attempt rather than resurrecting a dead one.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call or the store fails, or the
    /// provider response lacks a confirmation URL.
    pub async fn create_checkout(&self, user_id: UserId, pack: Pack) -> Result<Checkout> {
        self.store.ensure_user(user_id, None, None).await?;

        let amount_minor = self.prices.for_pack(pack);
        let idempotence_key = Uuid::new_v4().to_string();
        let metadata = serde_json::json!({
            "user_id": user_id.value(),
            "pack": pack.as_str(),
        });

        let provider_payment = self
            .client
            .create_payment(
                amount_minor,
                "RUB",
                pack.title(),
                &self.return_url_base,
                metadata,
                &idempotence_key,
            )
            .await?;

        let confirmation_url = provider_payment
            .confirmation
            .and_then(|c| c.confirmation_url)
            .ok_or_else(|| {
                EngineError::Payment(vacdesk_pay::PayError::MalformedResponse(
                    "missing confirmation_url".to_string(),
                ))
            })?;

        let payment = self
            .store
            .create_payment(user_id, pack, amount_minor, "RUB", &provider_payment.id)
            .await?;

        tracing::info!(
            user_id = %user_id,
            payment_id = %payment.id,
            external_ref = %provider_payment.id,
            pack = pack.as_str(),
            amount_minor,
            "checkout created"
        );

        Ok(Checkout {
            payment,
            confirmation_url,
        })
    }

    /// Poll the provider and, on success, apply the purchase exactly once.
    ///
    /// Safe to call any number of times from any place; only the call that
    /// wins the `pending -> paid` transition mutates entitlements. A
    /// succeeded payment also counts as the invitee's referral milestone.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call or the store fails, or if no
    /// local payment row matches `external_ref`.
    pub async fn check_and_apply(&self, external_ref: &str) -> Result<CheckoutOutcome> {
        let payment = self
            .store
            .payment_by_external_ref(external_ref)
            .await?
            .ok_or_else(|| {
                EngineError::Payment(vacdesk_pay::PayError::MalformedResponse(format!(
                    "no local payment for {external_ref}"
                )))
            })?;

        let provider_payment = self.client.get_payment(external_ref).await?;

        match provider_payment.status {
            ProviderStatus::Succeeded => self.apply(payment).await,
            ProviderStatus::Canceled => {
                self.store.mark_payment_failed(payment.id).await?;
                tracing::info!(payment_id = %payment.id, "payment canceled by provider");
                Ok(CheckoutOutcome::Canceled)
            }
            other => Ok(CheckoutOutcome::Pending {
                status: other.as_str().to_string(),
            }),
        }
    }

    async fn apply(&self, payment: Payment) -> Result<CheckoutOutcome> {
        // The idempotency gate. Losing it means someone else applied.
        if !self.store.mark_payment_paid(payment.id).await? {
            return Ok(CheckoutOutcome::AlreadyApplied);
        }

        let user_id = payment.user_id;
        let pack = payment.pack;

        let (credits_granted, unlimited_until) = if let Some(days) = pack.unlimited_days() {
            let until = self.store.set_unlimited(user_id, days).await?;
            (0, Some(until))
        } else {
            self.store
                .grant_credits(user_id, pack.credits(), EntryReason::Purchase, None)
                .await?;
            (pack.credits(), None)
        };

        tracing::info!(
            user_id = %user_id,
            payment_id = %payment.id,
            pack = pack.as_str(),
            credits_granted,
            "payment applied"
        );

        // A first purchase is a referral milestone for the buyer.
        self.referrals.trigger_activation(user_id).await?;

        let payment = self
            .store
            .get_payment(payment.id)
            .await?
            .unwrap_or(payment);

        Ok(CheckoutOutcome::Applied {
            payment,
            credits_granted,
            unlimited_until,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vacdesk_core::PaymentStatus;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(server: &MockServer) -> (PaymentReconciler, SqliteStore) {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let config = EngineConfig::default();
        let client = ProviderClient::with_base_url("shop", "secret", server.uri()).unwrap();
        let referrals = ReferralEngine::new(store.clone(), &config);
        let reconciler = PaymentReconciler::new(store.clone(), client, referrals, &config);
        (reconciler, store)
    }

    fn provider_payment_json(id: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "status": status,
            "paid": status == "succeeded",
            "confirmation": { "confirmation_url": "https://pay.example/c" }
        })
    }

    #[tokio::test]
    async fn checkout_creates_pending_local_row() {
        let server = MockServer::start().await;
        let (reconciler, store) = setup(&server).await;

        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(provider_payment_json("ext-1", "pending")),
            )
            .mount(&server)
            .await;

        let checkout = reconciler
            .create_checkout(UserId::new(1), Pack::Triple)
            .await
            .unwrap();

        assert_eq!(checkout.confirmation_url, "https://pay.example/c");
        assert_eq!(checkout.payment.status, PaymentStatus::Pending);
        assert_eq!(checkout.payment.amount_minor, 139_00);

        let row = store.payment_by_external_ref("ext-1").await.unwrap().unwrap();
        assert_eq!(row.id, checkout.payment.id);
    }

    #[tokio::test]
    async fn succeeded_payment_applies_exactly_once() {
        let server = MockServer::start().await;
        let (reconciler, store) = setup(&server).await;
        let user = UserId::new(2);

        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(provider_payment_json("ext-2", "pending")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/payments/ext-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(provider_payment_json("ext-2", "succeeded")),
            )
            .mount(&server)
            .await;

        reconciler.create_checkout(user, Pack::Nine).await.unwrap();

        let outcome = reconciler.check_and_apply("ext-2").await.unwrap();
        match outcome {
            CheckoutOutcome::Applied {
                credits_granted, ..
            } => assert_eq!(credits_granted, 9),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.credits(user).await.unwrap(), 9);

        // Polling again must not double-grant.
        let outcome = reconciler.check_and_apply("ext-2").await.unwrap();
        assert!(matches!(outcome, CheckoutOutcome::AlreadyApplied));
        assert_eq!(store.credits(user).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn unsettled_status_is_reported_verbatim() {
        let server = MockServer::start().await;
        let (reconciler, store) = setup(&server).await;
        let user = UserId::new(3);

        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(provider_payment_json("ext-3", "pending")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/payments/ext-3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(provider_payment_json("ext-3", "waiting_for_capture")),
            )
            .mount(&server)
            .await;

        reconciler.create_checkout(user, Pack::Single).await.unwrap();

        let outcome = reconciler.check_and_apply("ext-3").await.unwrap();
        match outcome {
            CheckoutOutcome::Pending { status } => assert_eq!(status, "waiting_for_capture"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.credits(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unlimited_pack_sets_plan_instead_of_credits() {
        let server = MockServer::start().await;
        let (reconciler, store) = setup(&server).await;
        let user = UserId::new(4);

        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(provider_payment_json("ext-4", "pending")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/payments/ext-4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(provider_payment_json("ext-4", "succeeded")),
            )
            .mount(&server)
            .await;

        reconciler
            .create_checkout(user, Pack::Unlimited30)
            .await
            .unwrap();
        let outcome = reconciler.check_and_apply("ext-4").await.unwrap();

        match outcome {
            CheckoutOutcome::Applied {
                credits_granted,
                unlimited_until,
                ..
            } => {
                assert_eq!(credits_granted, 0);
                assert!(unlimited_until.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(store.credits(user).await.unwrap(), 0);
        let loaded = store.get_user(user).await.unwrap().unwrap();
        assert!(loaded.is_unlimited_at(Utc::now()));
    }

    #[tokio::test]
    async fn canceled_payment_marks_local_row_failed() {
        let server = MockServer::start().await;
        let (reconciler, store) = setup(&server).await;
        let user = UserId::new(5);

        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(provider_payment_json("ext-5", "pending")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/payments/ext-5"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(provider_payment_json("ext-5", "canceled")),
            )
            .mount(&server)
            .await;

        reconciler.create_checkout(user, Pack::Single).await.unwrap();
        let outcome = reconciler.check_and_apply("ext-5").await.unwrap();
        assert!(matches!(outcome, CheckoutOutcome::Canceled));

        let row = store.payment_by_external_ref("ext-5").await.unwrap().unwrap();
        assert_eq!(row.status, PaymentStatus::Failed);
    }
}
