//! SQLite storage layer for vacdesk.
//!
//! This crate owns all durable state: users, credit balances, the
//! append-only ledger, monthly usage, payments, and referral records.
//!
//! # Invariants
//!
//! - `credits.balance` is mutated only here, and only inside a transaction
//!   that also appends the matching ledger entry. Every other component
//!   calls into this crate rather than touching balances.
//! - The ledger is append-only; rows are never updated or deleted.
//! - `consume_credit` fails closed: at zero balance it writes nothing and
//!   returns `None`.
//!
//! # Example
//!
//! ```no_run
//! use vacdesk_store::SqliteStore;
//! use vacdesk_core::{EntryReason, UserId};
//!
//! # async fn example() -> vacdesk_store::Result<()> {
//! let store = SqliteStore::open("vacdesk.db").await?;
//! let user = UserId::new(42);
//! store.ensure_user(user, None, None).await?;
//! let balance = store
//!     .grant_credits(user, 3, EntryReason::Purchase, None)
//!     .await?;
//! assert_eq!(balance, 3);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod schema;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
