//! User and plan types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::UserId;

/// A user's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Free tier: a monthly allowance of jobs, plus any purchased credits.
    Free,
    /// Time-boxed unlimited plan; jobs are not debited while active.
    Unlimited,
}

impl Plan {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Unlimited => "unlimited",
        }
    }

    /// Parse the stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for anything but
    /// `free`/`unlimited`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "free" => Ok(Self::Free),
            "unlimited" => Ok(Self::Unlimited),
            other => Err(CoreError::unknown("plan", other)),
        }
    }
}

/// A user record.
///
/// Created lazily on first contact and never deleted. `last_seen` is
/// refreshed on every quota check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The user id.
    pub user_id: UserId,

    /// Chat handle, if known.
    pub username: Option<String>,

    /// Display name, if known.
    pub full_name: Option<String>,

    /// Current plan.
    pub plan: Plan,

    /// When the unlimited plan expires, if one was ever granted.
    pub plan_until: Option<DateTime<Utc>>,

    /// When the user was first seen.
    pub created_at: DateTime<Utc>,

    /// When the user last interacted with the engine.
    pub last_seen: DateTime<Utc>,
}

impl User {
    /// Whether the unlimited plan is active at `now`.
    #[must_use]
    pub fn is_unlimited_at(&self, now: DateTime<Utc>) -> bool {
        self.plan == Plan::Unlimited && self.plan_until.is_some_and(|until| until > now)
    }

    /// The unlimited expiry, but only while the plan is still active.
    #[must_use]
    pub fn active_unlimited_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_unlimited_at(now) {
            self.plan_until
        } else {
            None
        }
    }
}
