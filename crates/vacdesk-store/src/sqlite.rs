//! SQLite storage implementation.
//!
//! All queries use the runtime `sqlx::query` API with explicit binds and
//! manual row mapping, so the crate builds without a live database.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use vacdesk_core::{
    EntryReason, LedgerEntry, LedgerEntryId, LedgerKind, Pack, Payment, PaymentId, PaymentStatus,
    Plan, PromoCode, Referral, ReferralId, ReferralSource, ReferralStats, ReferralStatus,
    RejectReason, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::schema;

/// Attempts at generating a collision-free referral token.
const TOKEN_ATTEMPTS: usize = 8;

/// Length of a referral token.
const TOKEN_LEN: usize = 10;

/// SQLite-backed storage.
///
/// Cheap to clone; the inner pool is shared.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a database file and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        // A single long-lived connection: each new in-memory connection
        // would otherwise see an empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for ddl in schema::TABLES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        for ddl in schema::INDEXES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Create the user on first contact, refresh metadata on every call.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn ensure_user(
        &self,
        user_id: UserId,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> Result<User> {
        let now = Utc::now();
        sqlx::query(
            r"INSERT INTO users (user_id, username, full_name, plan, created_at, last_seen)
              VALUES (?, ?, ?, 'free', ?, ?)
              ON CONFLICT(user_id) DO UPDATE SET
                  username  = COALESCE(excluded.username, users.username),
                  full_name = COALESCE(excluded.full_name, users.full_name),
                  last_seen = excluded.last_seen",
        )
        .bind(user_id.value())
        .bind(username)
        .bind(full_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_user(user_id)
            .await?
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT user_id, username, full_name, plan, plan_until, created_at, last_seen
             FROM users WHERE user_id = ?",
        )
        .bind(user_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| user_from_row(&r)).transpose()
    }

    /// Whether the user is a new account: seen for the first time within
    /// `window_hours` of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn account_age_hours(&self, user_id: UserId) -> Result<Option<i64>> {
        let user = self.get_user(user_id).await?;
        Ok(user.map(|u| (Utc::now() - u.created_at).num_hours()))
    }

    /// Grant the unlimited plan for `days` from now.
    ///
    /// Writes a `kind = unlimited`, `delta = 0` audit entry in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_unlimited(&self, user_id: UserId, days: i64) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let until = now + chrono::Duration::days(days);

        let mut tx = self.pool.begin().await?;

        ensure_user_tx(&mut tx, user_id, now).await?;
        ensure_credit_row_tx(&mut tx, user_id).await?;

        sqlx::query("UPDATE users SET plan = 'unlimited', plan_until = ? WHERE user_id = ?")
            .bind(until)
            .bind(user_id.value())
            .execute(&mut *tx)
            .await?;

        let balance: i64 = sqlx::query_scalar("SELECT balance FROM credits WHERE user_id = ?")
            .bind(user_id.value())
            .fetch_one(&mut *tx)
            .await?;

        insert_ledger_tx(
            &mut tx,
            user_id,
            LedgerKind::Unlimited,
            0,
            EntryReason::Purchase,
            None,
            balance,
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, until = %until, "unlimited plan granted");
        Ok(until)
    }

    // =========================================================================
    // Usage
    // =========================================================================

    /// Count free-tier jobs consumed in the current month.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn free_used_this_month(&self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage WHERE user_id = ? AND month_key = ? AND kind = 'free'",
        )
        .bind(user_id.value())
        .bind(month_key(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Append a usage event for the current month.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn record_usage(&self, user_id: UserId, kind: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query("INSERT INTO usage (user_id, month_key, kind, created_at) VALUES (?, ?, ?, ?)")
            .bind(user_id.value())
            .bind(month_key(now))
            .bind(kind)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Credits and ledger (single writer of balances)
    // =========================================================================

    /// Current credit balance; zero when no row exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn credits(&self, user_id: UserId) -> Result<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM credits WHERE user_id = ?")
                .bind(user_id.value())
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance.unwrap_or(0))
    }

    /// Apply a signed credit delta, clamped at zero, and append the
    /// matching ledger entry in the same transaction.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn grant_credits(
        &self,
        user_id: UserId,
        delta: i64,
        reason: EntryReason,
        related_referral: Option<ReferralId>,
    ) -> Result<i64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        ensure_user_tx(&mut tx, user_id, now).await?;
        ensure_credit_row_tx(&mut tx, user_id).await?;

        let balance: i64 = sqlx::query_scalar("SELECT balance FROM credits WHERE user_id = ?")
            .bind(user_id.value())
            .fetch_one(&mut *tx)
            .await?;

        let new_balance = (balance + delta).max(0);

        sqlx::query("UPDATE credits SET balance = ? WHERE user_id = ?")
            .bind(new_balance)
            .bind(user_id.value())
            .execute(&mut *tx)
            .await?;

        insert_ledger_tx(
            &mut tx,
            user_id,
            LedgerKind::Credit,
            delta,
            reason,
            related_referral,
            new_balance,
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            delta,
            balance = new_balance,
            reason = reason.as_str(),
            "credits granted"
        );
        Ok(new_balance)
    }

    /// Atomically consume one credit: a single read-check-decrement.
    ///
    /// Returns the new balance, or `None` if the balance was insufficient
    /// at apply time — in which case nothing is written. Callers treat
    /// `None` as "denied", never as a retryable error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn consume_credit(&self, user_id: UserId) -> Result<Option<i64>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE credits SET balance = balance - 1 WHERE user_id = ? AND balance > 0",
        )
        .bind(user_id.value())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        let balance: i64 = sqlx::query_scalar("SELECT balance FROM credits WHERE user_id = ?")
            .bind(user_id.value())
            .fetch_one(&mut *tx)
            .await?;

        if balance < 0 {
            // The CHECK constraint makes this unreachable; abort loudly
            // rather than clamp.
            return Err(StoreError::LedgerInvariant {
                user_id: user_id.value(),
                detail: format!("balance {balance} after consume"),
            });
        }

        insert_ledger_tx(
            &mut tx,
            user_id,
            LedgerKind::Credit,
            -1,
            EntryReason::JobRun,
            None,
            balance,
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, balance, "credit consumed");
        Ok(Some(balance))
    }

    /// All ledger entries for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn ledger_entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT id, user_id, kind, delta, reason, related_referral, balance_after, created_at
             FROM ledger WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id.value())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_from_row).collect()
    }

    /// Most recent reward entries (referral bonuses and manual grants).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn recent_rewards(&self, user_id: UserId, limit: i64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT id, user_id, kind, delta, reason, related_referral, balance_after, created_at
             FROM ledger
             WHERE user_id = ? AND reason IN ('referral_inviter', 'referral_invitee', 'manual')
             ORDER BY id DESC LIMIT ?",
        )
        .bind(user_id.value())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_from_row).collect()
    }

    /// Count a user's ledger entries with `reason`, optionally only those
    /// at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn count_entries_with_reason(
        &self,
        user_id: UserId,
        reason: EntryReason,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let count: i64 = if let Some(since) = since {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM ledger
                 WHERE user_id = ? AND reason = ? AND created_at >= ?",
            )
            .bind(user_id.value())
            .bind(reason.as_str())
            .bind(since)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger WHERE user_id = ? AND reason = ?")
                .bind(user_id.value())
                .bind(reason.as_str())
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Persist a pending payment keyed by the provider's reference id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_payment(
        &self,
        user_id: UserId,
        pack: Pack,
        amount_minor: i64,
        currency: &str,
        external_ref: &str,
    ) -> Result<Payment> {
        let now = Utc::now();
        let result = sqlx::query(
            r"INSERT INTO payments (user_id, pack, amount_minor, currency, status, external_ref, created_at)
              VALUES (?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(user_id.value())
        .bind(pack.as_str())
        .bind(amount_minor)
        .bind(currency)
        .bind(external_ref)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = PaymentId::new(result.last_insert_rowid());
        self.get_payment(id)
            .await?
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// Fetch a payment by local id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            "SELECT id, user_id, pack, amount_minor, currency, status, external_ref, created_at, paid_at
             FROM payments WHERE id = ?",
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| payment_from_row(&r)).transpose()
    }

    /// Fetch a payment by the provider's reference id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn payment_by_external_ref(&self, external_ref: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(
            "SELECT id, user_id, pack, amount_minor, currency, status, external_ref, created_at, paid_at
             FROM payments WHERE external_ref = ?",
        )
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| payment_from_row(&r)).transpose()
    }

    /// Transition a payment to `paid`, exactly once.
    ///
    /// Returns `true` only for the call that performed the transition;
    /// repeated calls return `false` and write nothing. This is the
    /// idempotency gate for payment application.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_payment_paid(&self, id: PaymentId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE payments SET status = 'paid', paid_at = ? WHERE id = ? AND status != 'paid'")
                .bind(Utc::now())
                .bind(id.value())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record a terminal provider failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_payment_failed(&self, id: PaymentId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE payments SET status = 'failed' WHERE id = ? AND status = 'pending'")
                .bind(id.value())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    /// Fetch an inviter's stats row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn stats(&self, user_id: UserId) -> Result<Option<ReferralStats>> {
        let row = sqlx::query(
            "SELECT user_id, token, invited_count, activated_count, bonuses_earned,
                    last_invited_at, last_bonus_at
             FROM referral_stats WHERE user_id = ?",
        )
        .bind(user_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| stats_from_row(&r)).transpose()
    }

    /// Resolve a referral token to the inviter's stats row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn stats_by_token(&self, token: &str) -> Result<Option<ReferralStats>> {
        let row = sqlx::query(
            "SELECT user_id, token, invited_count, activated_count, bonuses_earned,
                    last_invited_at, last_bonus_at
             FROM referral_stats WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| stats_from_row(&r)).transpose()
    }

    /// Create the stats row (and durable token) on first use.
    ///
    /// Token generation is collision-checked against the UNIQUE constraint
    /// and retried.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TokenExhausted`] if a unique token cannot be
    /// generated, or an error if the database operation fails.
    pub async fn ensure_stats(&self, user_id: UserId) -> Result<ReferralStats> {
        if let Some(stats) = self.stats(user_id).await? {
            return Ok(stats);
        }

        self.ensure_user(user_id, None, None).await?;

        for _ in 0..TOKEN_ATTEMPTS {
            let token = generate_token();
            let result = sqlx::query(
                "INSERT INTO referral_stats (user_id, token) VALUES (?, ?)
                 ON CONFLICT(user_id) DO NOTHING",
            )
            .bind(user_id.value())
            .bind(&token)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    return self
                        .stats(user_id)
                        .await?
                        .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound));
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    // Token collision; try another.
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::TokenExhausted)
    }

    /// Fetch the referral row for an invitee, any status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn referral_by_invitee(&self, invitee_id: UserId) -> Result<Option<Referral>> {
        let row = sqlx::query(
            "SELECT id, inviter_id, invitee_id, token, source, status, rejection_reason,
                    created_at, expires_at, activated_at
             FROM referrals WHERE invitee_id = ?",
        )
        .bind(invitee_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| referral_from_row(&r)).transpose()
    }

    /// Create a pending referral and bump the inviter's invited count, in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails (including the
    /// UNIQUE violation when the invitee already has a referral).
    pub async fn create_referral(
        &self,
        inviter_id: UserId,
        invitee_id: UserId,
        token: Option<&str>,
        source: ReferralSource,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Referral> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"INSERT INTO referrals (inviter_id, invitee_id, token, source, status, created_at, expires_at)
              VALUES (?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(inviter_id.value())
        .bind(invitee_id.value())
        .bind(token)
        .bind(source.as_str())
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        sqlx::query(
            "UPDATE referral_stats SET invited_count = invited_count + 1, last_invited_at = ?
             WHERE user_id = ?",
        )
        .bind(now)
        .bind(inviter_id.value())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT id, inviter_id, invitee_id, token, source, status, rejection_reason,
                    created_at, expires_at, activated_at
             FROM referrals WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let referral = referral_from_row(&row)?;
        tx.commit().await?;
        Ok(referral)
    }

    /// Transition a pending referral to `activated` and bump the inviter's
    /// activated count.
    ///
    /// Returns `false` when the referral was not pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_referral_activated(&self, id: ReferralId) -> Result<bool> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inviter: Option<i64> =
            sqlx::query_scalar("SELECT inviter_id FROM referrals WHERE id = ? AND status = 'pending'")
                .bind(id.value())
                .fetch_optional(&mut *tx)
                .await?;

        let Some(inviter) = inviter else {
            return Ok(false);
        };

        sqlx::query("UPDATE referrals SET status = 'activated', activated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id.value())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE referral_stats SET activated_count = activated_count + 1 WHERE user_id = ?",
        )
        .bind(inviter)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Transition a pending referral to `rejected` with a reason.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_referral_rejected(&self, id: ReferralId, reason: RejectReason) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE referrals SET status = 'rejected', rejection_reason = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(reason.as_str())
        .bind(id.value())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Add earned bonus credits to the inviter's counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn increment_bonuses(&self, inviter_id: UserId, delta: i64) -> Result<()> {
        sqlx::query(
            "UPDATE referral_stats SET bonuses_earned = bonuses_earned + ?, last_bonus_at = ?
             WHERE user_id = ?",
        )
        .bind(delta)
        .bind(Utc::now())
        .bind(inviter_id.value())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Promo codes and bans
    // =========================================================================

    /// Look up a promo code (codes are stored uppercase).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn promo_code(&self, code: &str) -> Result<Option<PromoCode>> {
        let row = sqlx::query(
            "SELECT code, inviter_id, is_active, expires_at, max_uses, uses
             FROM promo_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| promo_from_row(&r)).transpose()
    }

    /// Create or replace a promo code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_promo_code(&self, promo: &PromoCode) -> Result<()> {
        sqlx::query(
            r"INSERT INTO promo_codes (code, inviter_id, is_active, expires_at, max_uses, uses)
              VALUES (?, ?, ?, ?, ?, ?)
              ON CONFLICT(code) DO UPDATE SET
                  inviter_id = excluded.inviter_id,
                  is_active  = excluded.is_active,
                  expires_at = excluded.expires_at,
                  max_uses   = excluded.max_uses",
        )
        .bind(&promo.code)
        .bind(promo.inviter_id.map(UserId::value))
        .bind(i64::from(promo.is_active))
        .bind(promo.expires_at)
        .bind(promo.max_uses)
        .bind(promo.uses)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump a promo code's usage counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn increment_promo_uses(&self, code: &str) -> Result<()> {
        sqlx::query("UPDATE promo_codes SET uses = uses + 1 WHERE code = ?")
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether the user is banned from the referral program.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn is_banned(&self, user_id: UserId) -> Result<bool> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM referral_bans WHERE user_id = ?")
            .bind(user_id.value())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Ban a user from the referral program (both roles).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn ban_user(&self, user_id: UserId, reason: Option<&str>) -> Result<()> {
        self.ensure_user(user_id, None, None).await?;
        sqlx::query(
            "INSERT INTO referral_bans (user_id, reason, created_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id.value())
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

async fn ensure_user_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (user_id, plan, created_at, last_seen) VALUES (?, 'free', ?, ?)
         ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(user_id.value())
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn ensure_credit_row_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: UserId,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO credits (user_id, balance) VALUES (?, 0) ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(user_id.value())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn insert_ledger_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: UserId,
    kind: LedgerKind,
    delta: i64,
    reason: EntryReason,
    related_referral: Option<ReferralId>,
    balance_after: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r"INSERT INTO ledger (user_id, kind, delta, reason, related_referral, balance_after, created_at)
          VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id.value())
    .bind(kind.as_str())
    .bind(delta)
    .bind(reason.as_str())
    .bind(related_referral.map(ReferralId::value))
    .bind(balance_after)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// =============================================================================
// Row mapping
// =============================================================================

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        user_id: UserId::new(row.try_get("user_id")?),
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        plan: Plan::parse(row.try_get::<String, _>("plan")?.as_str())?,
        plan_until: row.try_get("plan_until")?,
        created_at: row.try_get("created_at")?,
        last_seen: row.try_get("last_seen")?,
    })
}

fn ledger_from_row(row: &SqliteRow) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: LedgerEntryId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        kind: LedgerKind::parse(row.try_get::<String, _>("kind")?.as_str())?,
        delta: row.try_get("delta")?,
        reason: EntryReason::parse(row.try_get::<String, _>("reason")?.as_str())?,
        related_referral: row
            .try_get::<Option<i64>, _>("related_referral")?
            .map(ReferralId::new),
        balance_after: row.try_get("balance_after")?,
        created_at: row.try_get("created_at")?,
    })
}

fn payment_from_row(row: &SqliteRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        pack: Pack::parse(row.try_get::<String, _>("pack")?.as_str())?,
        amount_minor: row.try_get("amount_minor")?,
        currency: row.try_get("currency")?,
        status: PaymentStatus::parse(row.try_get::<String, _>("status")?.as_str())?,
        external_ref: row.try_get("external_ref")?,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}

fn referral_from_row(row: &SqliteRow) -> Result<Referral> {
    let rejection_reason = row
        .try_get::<Option<String>, _>("rejection_reason")?
        .map(|s| RejectReason::parse(&s))
        .transpose()?;

    Ok(Referral {
        id: ReferralId::new(row.try_get("id")?),
        inviter_id: UserId::new(row.try_get("inviter_id")?),
        invitee_id: UserId::new(row.try_get("invitee_id")?),
        token: row.try_get("token")?,
        source: ReferralSource::parse(row.try_get::<String, _>("source")?.as_str())?,
        status: ReferralStatus::parse(row.try_get::<String, _>("status")?.as_str())?,
        rejection_reason,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        activated_at: row.try_get("activated_at")?,
    })
}

fn stats_from_row(row: &SqliteRow) -> Result<ReferralStats> {
    Ok(ReferralStats {
        user_id: UserId::new(row.try_get("user_id")?),
        token: row.try_get("token")?,
        invited_count: row.try_get("invited_count")?,
        activated_count: row.try_get("activated_count")?,
        bonuses_earned: row.try_get("bonuses_earned")?,
        last_invited_at: row.try_get("last_invited_at")?,
        last_bonus_at: row.try_get("last_bonus_at")?,
    })
}

fn promo_from_row(row: &SqliteRow) -> Result<PromoCode> {
    Ok(PromoCode {
        code: row.try_get("code")?,
        inviter_id: row.try_get::<Option<i64>, _>("inviter_id")?.map(UserId::new),
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        expires_at: row.try_get("expires_at")?,
        max_uses: row.try_get("max_uses")?,
        uses: row.try_get("uses")?,
    })
}

/// "YYYY-MM" key for monthly usage scoping.
fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// A 10-character alphanumeric token from v4 UUID entropy.
fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..TOKEN_LEN].to_string()
}
