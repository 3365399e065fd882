use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// Pool size. SQLite admits a single writer, so the default is 1.
    pub db_max_connections: u32,

    // =========================
    // Reclaimer configuration
    // =========================
    /// Time between two reclaimer ticks. A tick that overruns delays the next
    /// one; ticks never overlap.
    pub reclaimer_interval: Duration,

    /// A reserved OPENED cart untouched for longer than this is released.
    pub reclaimer_idle_threshold: Duration,

    // =========================
    // Reservation configuration
    // =========================
    /// Batches due on or before `today + freshness_horizon_days` cannot be
    /// reserved.
    pub freshness_horizon_days: u32,

    /// Extra attempts granted to an operation that hit a transient store
    /// conflict.
    pub max_tx_retries: u32,

    /// Emit JSON logs.
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://cart_backend.db?mode=rwc".to_string(),
            db_max_connections: 1,
            reclaimer_interval: Duration::from_secs(15 * 60),
            reclaimer_idle_threshold: Duration::from_secs(60 * 60),
            freshness_horizon_days: 21,
            max_tx_retries: 3,
            json_logs: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();

        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(d.database_url),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", d.db_max_connections),
            reclaimer_interval: Duration::from_secs(parse_or(
                &lookup,
                "RECLAIMER_INTERVAL_SECS",
                d.reclaimer_interval.as_secs(),
            )),
            reclaimer_idle_threshold: Duration::from_secs(
                60 * parse_or(
                    &lookup,
                    "RECLAIMER_IDLE_MINUTES",
                    d.reclaimer_idle_threshold.as_secs() / 60,
                ),
            ),
            freshness_horizon_days: parse_or(
                &lookup,
                "FRESHNESS_HORIZON_DAYS",
                d.freshness_horizon_days,
            ),
            max_tx_retries: parse_or(&lookup, "TX_MAX_RETRIES", d.max_tx_retries),
            json_logs: lookup("APP_ENV").as_deref() == Some("production"),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw = %raw, ?default, "unparseable config value; using default");
            default
        }),
    }
}
