//! Database schema definitions.
//!
//! The schema is created idempotently on open. All timestamps are stored
//! as RFC 3339 text in UTC.

/// DDL statements, applied in order.
pub const TABLES: [&str; 9] = [
    r"CREATE TABLE IF NOT EXISTS users (
        user_id    INTEGER PRIMARY KEY,
        username   TEXT,
        full_name  TEXT,
        plan       TEXT NOT NULL DEFAULT 'free',
        plan_until TEXT,
        created_at TEXT NOT NULL,
        last_seen  TEXT NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS credits (
        user_id INTEGER PRIMARY KEY REFERENCES users(user_id) ON DELETE CASCADE,
        balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0)
    )",
    r"CREATE TABLE IF NOT EXISTS ledger (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id          INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        kind             TEXT NOT NULL,
        delta            INTEGER NOT NULL,
        reason           TEXT NOT NULL,
        related_referral INTEGER REFERENCES referrals(id) ON DELETE SET NULL,
        balance_after    INTEGER NOT NULL,
        created_at       TEXT NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS usage (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        month_key  TEXT NOT NULL,
        kind       TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS payments (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id      INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        pack         TEXT NOT NULL,
        amount_minor INTEGER NOT NULL,
        currency     TEXT NOT NULL DEFAULT 'RUB',
        status       TEXT NOT NULL DEFAULT 'pending',
        external_ref TEXT NOT NULL UNIQUE,
        created_at   TEXT NOT NULL,
        paid_at      TEXT
    )",
    r"CREATE TABLE IF NOT EXISTS referrals (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        inviter_id       INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        invitee_id       INTEGER NOT NULL UNIQUE REFERENCES users(user_id) ON DELETE CASCADE,
        token            TEXT,
        source           TEXT NOT NULL DEFAULT 'deep_link',
        status           TEXT NOT NULL DEFAULT 'pending',
        rejection_reason TEXT,
        created_at       TEXT NOT NULL,
        expires_at       TEXT,
        activated_at     TEXT
    )",
    r"CREATE TABLE IF NOT EXISTS referral_stats (
        user_id         INTEGER PRIMARY KEY REFERENCES users(user_id) ON DELETE CASCADE,
        token           TEXT NOT NULL UNIQUE,
        invited_count   INTEGER NOT NULL DEFAULT 0,
        activated_count INTEGER NOT NULL DEFAULT 0,
        bonuses_earned  INTEGER NOT NULL DEFAULT 0,
        last_invited_at TEXT,
        last_bonus_at   TEXT
    )",
    r"CREATE TABLE IF NOT EXISTS promo_codes (
        code       TEXT PRIMARY KEY,
        inviter_id INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
        is_active  INTEGER NOT NULL DEFAULT 1,
        expires_at TEXT,
        max_uses   INTEGER,
        uses       INTEGER NOT NULL DEFAULT 0
    )",
    r"CREATE TABLE IF NOT EXISTS referral_bans (
        user_id    INTEGER PRIMARY KEY REFERENCES users(user_id) ON DELETE CASCADE,
        reason     TEXT,
        created_at TEXT NOT NULL
    )",
];

/// Secondary indexes.
pub const INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS idx_ledger_user_reason ON ledger(user_id, reason, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_usage_user_month ON usage(user_id, month_key, kind)",
    "CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_referrals_inviter ON referrals(inviter_id, created_at)",
];
