//! Referral lifecycle tests across the whole engine.

mod common;

use common::{provider_payment_json, TestHarness};
use vacdesk_core::{AttributionStatus, JobRequest, Pack, ReferralStatus, RejectReason, UserId};

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn first_completed_job_activates_the_referral() {
    let harness = TestHarness::new().await;
    harness.install_succeeding_pipeline();
    let inviter = UserId::new(1);
    let invitee = UserId::new(2);

    let token = harness.engine.referral_token(inviter).await.unwrap();
    let start = harness
        .engine
        .apply_referral_token(invitee, &token)
        .await
        .unwrap();
    assert_eq!(start.status, AttributionStatus::Pending);
    assert_eq!(harness.store.credits(invitee).await.unwrap(), 1);

    // No inviter bonus yet.
    assert_eq!(harness.store.credits(inviter).await.unwrap(), 0);

    // The invitee's first completed job is the milestone.
    harness
        .engine
        .run_job(invitee, JobRequest::new("welder", "Perm"))
        .await
        .unwrap();

    assert_eq!(harness.store.credits(inviter).await.unwrap(), 1);
    let referral = harness
        .store
        .referral_by_invitee(invitee)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Activated);

    let stats = harness.engine.referral_stats(inviter).await.unwrap();
    assert_eq!(stats.invited_count, 1);
    assert_eq!(stats.activated_count, 1);
    assert_eq!(stats.bonuses_earned, 1);
}

#[tokio::test]
async fn a_purchase_is_also_a_milestone() {
    let harness = TestHarness::new().await;
    let inviter = UserId::new(3);
    let invitee = UserId::new(4);

    let token = harness.engine.referral_token(inviter).await.unwrap();
    harness
        .engine
        .apply_referral_token(invitee, &token)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(provider_payment_json("ext-ref", "pending")),
        )
        .mount(&harness.provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/ext-ref"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(provider_payment_json("ext-ref", "succeeded")),
        )
        .mount(&harness.provider)
        .await;

    harness.engine.buy_pack(invitee, Pack::Single).await.unwrap();
    harness.engine.poll_checkout(invitee).await.unwrap();

    // Pack credit plus the signup bonus.
    assert_eq!(harness.store.credits(invitee).await.unwrap(), 2);
    // The purchase activated the referral and paid the inviter.
    assert_eq!(harness.store.credits(inviter).await.unwrap(), 1);
}

#[tokio::test]
async fn second_milestone_grants_nothing_further() {
    let harness = TestHarness::new().await;
    harness.install_succeeding_pipeline();
    let inviter = UserId::new(5);
    let invitee = UserId::new(6);

    let token = harness.engine.referral_token(inviter).await.unwrap();
    harness
        .engine
        .apply_referral_token(invitee, &token)
        .await
        .unwrap();

    harness
        .engine
        .run_job(invitee, JobRequest::new("courier", "Tula"))
        .await
        .unwrap();
    harness
        .engine
        .run_job(invitee, JobRequest::new("courier", "Tula"))
        .await
        .unwrap();

    assert_eq!(harness.store.credits(inviter).await.unwrap(), 1);
}

#[tokio::test]
async fn expired_attribution_rejects_instead_of_activating() {
    let harness =
        TestHarness::with_config(|c| c.referral_attribution_ttl = std::time::Duration::ZERO).await;
    harness.install_succeeding_pipeline();
    let inviter = UserId::new(7);
    let invitee = UserId::new(8);

    let token = harness.engine.referral_token(inviter).await.unwrap();
    harness
        .engine
        .apply_referral_token(invitee, &token)
        .await
        .unwrap();

    // The window has already closed by the time the milestone fires.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let result = harness
        .engine
        .trigger_referral_activation(invitee)
        .await
        .unwrap();
    assert!(!result.granted);
    assert_eq!(result.reason, Some(RejectReason::Expired));

    let referral = harness
        .store
        .referral_by_invitee(invitee)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Rejected);
    assert_eq!(referral.rejection_reason, Some(RejectReason::Expired));
    assert_eq!(harness.store.credits(inviter).await.unwrap(), 0);
}

#[tokio::test]
async fn rewards_history_lists_referral_bonuses() {
    let harness = TestHarness::new().await;
    harness.install_succeeding_pipeline();
    let inviter = UserId::new(9);
    let invitee = UserId::new(10);

    let token = harness.engine.referral_token(inviter).await.unwrap();
    harness
        .engine
        .apply_referral_token(invitee, &token)
        .await
        .unwrap();
    harness
        .engine
        .run_job(invitee, JobRequest::new("cook", "Sochi"))
        .await
        .unwrap();

    let inviter_rewards = harness.engine.recent_rewards(inviter, 10).await.unwrap();
    assert_eq!(inviter_rewards.len(), 1);
    assert_eq!(inviter_rewards[0].delta, 1);

    let invitee_rewards = harness.engine.recent_rewards(invitee, 10).await.unwrap();
    assert_eq!(invitee_rewards.len(), 1);
}

#[tokio::test]
async fn banned_users_are_excluded_end_to_end() {
    let harness = TestHarness::new().await;
    let inviter = UserId::new(11);
    let invitee = UserId::new(12);

    let token = harness.engine.referral_token(inviter).await.unwrap();
    harness
        .engine
        .apply_referral_token(invitee, &token)
        .await
        .unwrap();

    // Ban the inviter after attribution but before the milestone.
    harness
        .engine
        .ban_from_referrals(inviter, Some("abuse"))
        .await
        .unwrap();

    let result = harness
        .engine
        .trigger_referral_activation(invitee)
        .await
        .unwrap();
    assert!(!result.granted);
    assert_eq!(result.reason, Some(RejectReason::Banned));
    assert_eq!(harness.store.credits(inviter).await.unwrap(), 0);
}
