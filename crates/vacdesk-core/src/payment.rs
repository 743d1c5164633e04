//! Payment and pack types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::{PaymentId, UserId};

/// A purchasable pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pack {
    /// One credit.
    Single,
    /// Three credits.
    Triple,
    /// Nine credits.
    Nine,
    /// Unlimited plan for thirty days.
    Unlimited30,
}

/// All packs, in display order.
pub const PACK_ORDER: [Pack; 4] = [Pack::Single, Pack::Triple, Pack::Nine, Pack::Unlimited30];

impl Pack {
    /// Stable string form used in storage and env var names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "p1",
            Self::Triple => "p3",
            Self::Nine => "p9",
            Self::Unlimited30 => "unlim30",
        }
    }

    /// Parse the stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized values.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "p1" => Ok(Self::Single),
            "p3" => Ok(Self::Triple),
            "p9" => Ok(Self::Nine),
            "unlim30" => Ok(Self::Unlimited30),
            other => Err(CoreError::unknown("pack", other)),
        }
    }

    /// Credits granted on purchase. Zero for the unlimited pack.
    #[must_use]
    pub const fn credits(self) -> i64 {
        match self {
            Self::Single => 1,
            Self::Triple => 3,
            Self::Nine => 9,
            Self::Unlimited30 => 0,
        }
    }

    /// Days of unlimited plan granted on purchase, if any.
    #[must_use]
    pub const fn unlimited_days(self) -> Option<i64> {
        match self {
            Self::Unlimited30 => Some(30),
            _ => None,
        }
    }

    /// Default price in minor currency units, overridable per pack via env.
    #[must_use]
    pub const fn default_amount_minor(self) -> i64 {
        match self {
            Self::Single => 49_00,
            Self::Triple => 139_00,
            Self::Nine => 399_00,
            Self::Unlimited30 => 1_299_00,
        }
    }

    /// Human-readable pack title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Single => "1 report",
            Self::Triple => "3 reports",
            Self::Nine => "9 reports",
            Self::Unlimited30 => "Unlimited, 30 days",
        }
    }
}

/// Local payment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Checkout started, not yet confirmed by the provider.
    Pending,
    /// Applied to the account. A payment transitions here exactly once.
    Paid,
    /// Confirmed failed/canceled.
    Failed,
}

impl PaymentStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
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
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::unknown("payment status", other)),
        }
    }
}

/// A purchase intent, created when checkout starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Local row id.
    pub id: PaymentId,

    /// Purchasing user.
    pub user_id: UserId,

    /// Which pack was bought.
    pub pack: Pack,

    /// Amount in minor currency units.
    pub amount_minor: i64,

    /// ISO currency code.
    pub currency: String,

    /// Local status. Only reconciliation may move this to `paid`.
    pub status: PaymentStatus,

    /// The provider's payment reference id.
    pub external_ref: String,

    /// When checkout started.
    pub created_at: DateTime<Utc>,

    /// When the payment was applied, if it was.
    pub paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_roundtrip() {
        for pack in PACK_ORDER {
            assert_eq!(Pack::parse(pack.as_str()).unwrap(), pack);
        }
    }

    #[test]
    fn credit_packs_grant_no_plan() {
        assert_eq!(Pack::Triple.credits(), 3);
        assert!(Pack::Triple.unlimited_days().is_none());
        assert_eq!(Pack::Unlimited30.credits(), 0);
        assert_eq!(Pack::Unlimited30.unlimited_days(), Some(30));
    }
}
