//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use vacdesk_core::Pack;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Free jobs allowed per calendar month (default: 3).
    pub free_per_month: i64,

    /// Referral program master switch (default: true).
    pub referrals_enabled: bool,

    /// Credits granted to the invitee on attribution (default: 1).
    pub referral_bonus_invitee: i64,

    /// Credits granted to the inviter on activation (default: 1).
    pub referral_bonus_inviter: i64,

    /// How long a pending attribution stays valid (default: 48h).
    pub referral_attribution_ttl: Duration,

    /// Inviter bonus cap per rolling 24 hours (default: 5).
    pub referral_max_bonus_per_day: i64,

    /// Inviter lifetime bonus cap (default: 100).
    pub referral_max_bonus_total: i64,

    /// Account-age window for promo-code attribution (default: 48h).
    pub promo_account_age_window: Duration,

    /// Price per pack in minor units; indexed by [`Pack`].
    pub prices_minor: PackPrices,

    /// Base URL the provider redirects back to after payment.
    pub return_url_base: String,

    /// Payment provider shop id.
    pub shop_id: String,

    /// Payment provider secret key.
    pub secret_key: String,

    /// Directory where per-user job output lands.
    pub report_dir: PathBuf,

    /// Path to the pipeline executable.
    pub pipeline_path: PathBuf,

    /// Base pipeline deadline (default: 180s). Scaled up for large jobs.
    pub job_timeout: Duration,

    /// Global concurrent job limit (default: 4).
    pub max_concurrent_jobs: usize,

    /// TTL for a saved job request awaiting payment (default: 900s).
    pub saved_request_ttl: Duration,

    /// TTL for a pending checkout awaiting the provider (default: 900s).
    pub pending_checkout_ttl: Duration,
}

/// Per-pack prices in minor units.
#[derive(Debug, Clone, Copy)]
pub struct PackPrices {
    /// One credit.
    pub single: i64,
    /// Three credits.
    pub triple: i64,
    /// Nine credits.
    pub nine: i64,
    /// Thirty days unlimited.
    pub unlimited30: i64,
}

impl PackPrices {
    /// Price for a pack in minor units.
    #[must_use]
    pub fn for_pack(&self, pack: Pack) -> i64 {
        match pack {
            Pack::Single => self.single,
            Pack::Triple => self.triple,
            Pack::Nine => self.nine,
            Pack::Unlimited30 => self.unlimited30,
        }
    }
}

impl Default for PackPrices {
    fn default() -> Self {
        Self {
            single: Pack::Single.default_amount_minor(),
            triple: Pack::Triple.default_amount_minor(),
            nine: Pack::Nine.default_amount_minor(),
            unlimited30: Pack::Unlimited30.default_amount_minor(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            free_per_month: env_i64("FREE_PER_MONTH", 3),
            referrals_enabled: env_bool("REF_ENABLED", true),
            referral_bonus_invitee: env_i64("REF_BONUS_INVITEE", 1),
            referral_bonus_inviter: env_i64("REF_BONUS_INVITER", 1),
            referral_attribution_ttl: Duration::from_secs(
                env_u64("REF_ATTRIBUTION_TTL_HOURS", 48) * 3600,
            ),
            referral_max_bonus_per_day: env_i64("REF_MAX_BONUS_PER_DAY", 5),
            referral_max_bonus_total: env_i64("REF_MAX_BONUS_TOTAL", 100),
            promo_account_age_window: Duration::from_secs(
                env_u64("REF_PROMO_TTL_HOURS", 48) * 3600,
            ),
            prices_minor: PackPrices {
                single: env_i64("PRICE_PACK_SINGLE", Pack::Single.default_amount_minor()),
                triple: env_i64("PRICE_PACK_TRIPLE", Pack::Triple.default_amount_minor()),
                nine: env_i64("PRICE_PACK_NINE", Pack::Nine.default_amount_minor()),
                unlimited30: env_i64(
                    "PRICE_PACK_UNLIM30",
                    Pack::Unlimited30.default_amount_minor(),
                ),
            },
            return_url_base: std::env::var("RETURN_URL_BASE")
                .unwrap_or_else(|_| "https://t.me".into()),
            shop_id: std::env::var("SHOP_ID").unwrap_or_default(),
            secret_key: std::env::var("SHOP_SECRET_KEY").unwrap_or_default(),
            report_dir: std::env::var("REPORT_DIR")
                .map_or_else(|_| PathBuf::from("reports"), PathBuf::from),
            pipeline_path: std::env::var("PARSER_PIPELINE")
                .map_or_else(|_| PathBuf::from("run_pipeline"), PathBuf::from),
            job_timeout: Duration::from_secs(env_u64("PARSER_TIMEOUT", 180)),
            max_concurrent_jobs: usize::try_from(env_u64("MAX_CONCURRENT_JOBS", 4)).unwrap_or(4),
            saved_request_ttl: Duration::from_secs(env_u64("PAYWALL_REQUEST_TTL", 900)),
            pending_checkout_ttl: Duration::from_secs(env_u64("PAYWALL_PAYMENT_TTL", 900)),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            free_per_month: 3,
            referrals_enabled: true,
            referral_bonus_invitee: 1,
            referral_bonus_inviter: 1,
            referral_attribution_ttl: Duration::from_secs(48 * 3600),
            referral_max_bonus_per_day: 5,
            referral_max_bonus_total: 100,
            promo_account_age_window: Duration::from_secs(48 * 3600),
            prices_minor: PackPrices::default(),
            return_url_base: "https://t.me".into(),
            shop_id: String::new(),
            secret_key: String::new(),
            report_dir: PathBuf::from("reports"),
            pipeline_path: PathBuf::from("run_pipeline"),
            job_timeout: Duration::from_secs(180),
            max_concurrent_jobs: 4,
            saved_request_ttl: Duration::from_secs(900),
            pending_checkout_ttl: Duration::from_secs(900),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().map_or(default, |s| {
        matches!(s.trim(), "1" | "true" | "yes" | "on")
    })
}
