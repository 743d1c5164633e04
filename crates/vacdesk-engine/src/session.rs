//! Short-lived conversational state.
//!
//! When a job is denied for lack of quota, the request is parked here so
//! the user can pay and resume without retyping it. Pending checkouts are
//! parked the same way while the provider redirect is in flight.

use std::time::Duration;

use vacdesk_core::{JobRequest, Pack, PaymentId, UserId};

use crate::cache::ExpiringCache;

/// A checkout that was created but not yet confirmed by the provider.
#[derive(Debug, Clone)]
pub struct PendingCheckout {
    /// Local payment row.
    pub payment_id: PaymentId,
    /// Provider-side payment id, used for polling.
    pub external_ref: String,
    /// What was bought.
    pub pack: Pack,
    /// Where the user should go to pay.
    pub confirmation_url: String,
}

/// Per-user session state with TTL semantics.
#[derive(Debug)]
pub struct SessionState {
    saved_requests: ExpiringCache<UserId, JobRequest>,
    pending_checkouts: ExpiringCache<UserId, PendingCheckout>,
}

impl SessionState {
    /// Create session state with the given TTLs.
    #[must_use]
    pub fn new(saved_request_ttl: Duration, pending_checkout_ttl: Duration) -> Self {
        Self {
            saved_requests: ExpiringCache::new(saved_request_ttl),
            pending_checkouts: ExpiringCache::new(pending_checkout_ttl),
        }
    }

    /// Park a denied job request so it can be resumed after payment.
    pub fn save_request(&self, user_id: UserId, request: JobRequest) {
        self.saved_requests.insert(user_id, request);
    }

    /// Take the parked request, if it has not expired. Consuming.
    pub fn take_saved_request(&self, user_id: UserId) -> Option<JobRequest> {
        self.saved_requests.remove(&user_id)
    }

    /// Peek at the parked request without consuming it.
    pub fn saved_request(&self, user_id: UserId) -> Option<JobRequest> {
        self.saved_requests.get(&user_id)
    }

    /// Remember an in-flight checkout for later polling.
    pub fn save_checkout(&self, user_id: UserId, checkout: PendingCheckout) {
        self.pending_checkouts.insert(user_id, checkout);
    }

    /// The user's in-flight checkout, if any.
    pub fn pending_checkout(&self, user_id: UserId) -> Option<PendingCheckout> {
        self.pending_checkouts.get(&user_id)
    }

    /// Forget the in-flight checkout, normally after it was applied.
    pub fn clear_checkout(&self, user_id: UserId) {
        self.pending_checkouts.remove(&user_id);
    }
}
