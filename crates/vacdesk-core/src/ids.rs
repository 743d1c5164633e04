//! Identifier types for vacdesk.
//!
//! This module provides strongly-typed identifiers for users, referrals,
//! payments, and ledger entries.
//!
//! # Macro-based ID types
//!
//! The `int_id_type!` macro reduces boilerplate for integer-backed
//! identifier types. User ids come from the chat platform and are plain
//! 64-bit integers; the remaining ids are database row ids. Wrapping them
//! keeps a `UserId` from ever being passed where a `ReferralId` is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Macro to define an i64-backed identifier type with standard trait
/// implementations.
///
/// Generates a newtype wrapper with:
/// - `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize`, `Deserialize` (transparent)
/// - `FromStr`, `Display`, `Debug`
/// - `From<i64>` and a `value()` accessor
macro_rules! int_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create an identifier from a raw integer.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Return the underlying integer.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<i64>()
                    .map(Self)
                    .map_err(|_| CoreError::InvalidId(s.to_string()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id_type!(UserId, "A user identifier (chat platform numeric id).");
int_id_type!(ReferralId, "A referral record identifier.");
int_id_type!(PaymentId, "A local payment row identifier.");
int_id_type!(LedgerEntryId, "A ledger entry identifier.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_string() {
        let id = UserId::new(123_456_789);
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-number".parse::<PaymentId>().is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let id = ReferralId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: ReferralId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }
}
