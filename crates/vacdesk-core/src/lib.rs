//! Core types for the vacdesk entitlement and job admission engine.
//!
//! This crate provides the foundational types used throughout vacdesk:
//!
//! - **Identifiers**: `UserId`, `ReferralId`, `PaymentId`, `LedgerEntryId`
//! - **Users**: `User`, `Plan`
//! - **Ledger**: `LedgerEntry`, `LedgerKind`, `EntryReason`
//! - **Quota**: `QuotaDecision`, `QuotaOutcome`, `QuotaMode`
//! - **Payments**: `Payment`, `Pack`, `PaymentStatus`
//! - **Referrals**: `Referral`, `ReferralStats`, `PromoCode`, attribution results
//! - **Jobs**: `JobRequest`, `StatusEvent`, `JobArtifact`
//!
//! # Credit unit
//!
//! One credit buys exactly one scraping job. Balances are stored as `i64`
//! and never go below zero; every balance change is paired with an
//! append-only [`LedgerEntry`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod job;
pub mod ledger;
pub mod payment;
pub mod quota;
pub mod referral;
pub mod user;

pub use error::{CoreError, Result};
pub use ids::{LedgerEntryId, PaymentId, ReferralId, UserId};
pub use job::{JobArtifact, JobRequest, Site, StatusEvent, RECOGNIZED_EXTENSIONS};
pub use ledger::{chain_is_consistent, EntryReason, LedgerEntry, LedgerKind};
pub use payment::{Pack, Payment, PaymentStatus};
pub use quota::{QuotaDecision, QuotaMode, QuotaOutcome};
pub use referral::{
    ActivationResult, AttributionStatus, PromoCode, Referral, ReferralSource, ReferralStats,
    ReferralStatus, RejectReason, StartResult,
};
pub use user::{Plan, User};
