//! Application configuration management

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (for generating URLs)
    pub host: Option<String>,

    /// Server port
    pub port: u16,

    /// SQLite database URL (`sqlite:./data/stacks.db`)
    pub database_url: String,

    /// Maximum number of pooled SQLite connections
    pub database_max_connections: u32,

    /// JWT secret for token signing and verification
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    pub token_lifetime_secs: i64,

    /// Bcrypt cost factor
    pub bcrypt_cost: u32,

    /// Whether background sweeps and snapshots run
    pub scheduler_enabled: bool,

    /// Circulation knobs shared by the services
    pub policy: CirculationPolicy,
}

/// Tunables for circulation and booking rules.
///
/// Kept separate from [Config] so services and tests can build one directly.
#[derive(Debug, Clone, PartialEq)]
pub struct CirculationPolicy {
    /// Fine charged per full day a loan is returned late
    pub fine_per_day: Decimal,
    /// How many times a loan may be renewed
    pub max_renewals: i64,
    /// Days a renewed loan runs from the moment of renewal
    pub renewal_days: i64,
    /// How long a reservation is held before it expires
    pub reservation_hold_days: i64,
    /// How long a pending loan request stays valid
    pub loan_request_ttl_hours: i64,
    /// First bookable hour of the day for study rooms
    pub room_opening_hour: u32,
    /// Hour at which study rooms close
    pub room_closing_hour: u32,
}

impl Default for CirculationPolicy {
    fn default() -> Self {
        Self {
            fine_per_day: Decimal::new(100, 0),
            max_renewals: 2,
            renewal_days: 7,
            reservation_hold_days: 7,
            loan_request_ttl_hours: 24,
            room_opening_hour: 8,
            room_closing_hour: 22,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        _ => Ok(default),
    }
}

impl CirculationPolicy {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let policy = Self {
            fine_per_day: parse_var("FINE_PER_DAY", defaults.fine_per_day)?,
            max_renewals: parse_var("MAX_RENEWALS", defaults.max_renewals)?,
            renewal_days: parse_var("RENEWAL_DAYS", defaults.renewal_days)?,
            reservation_hold_days: parse_var(
                "RESERVATION_HOLD_DAYS",
                defaults.reservation_hold_days,
            )?,
            loan_request_ttl_hours: parse_var(
                "LOAN_REQUEST_TTL_HOURS",
                defaults.loan_request_ttl_hours,
            )?,
            room_opening_hour: parse_var("ROOM_OPENING_HOUR", defaults.room_opening_hour)?,
            room_closing_hour: parse_var("ROOM_CLOSING_HOUR", defaults.room_closing_hour)?,
        };

        if policy.room_opening_hour >= policy.room_closing_hour || policy.room_closing_hour > 24 {
            anyhow::bail!(
                "Invalid room hours: opening {} must be before closing {}",
                policy.room_opening_hour,
                policy.room_closing_hour
            );
        }
        if policy.renewal_days < 1 {
            anyhow::bail!("Invalid RENEWAL_DAYS: must be at least 1");
        }
        if policy.fine_per_day.is_sign_negative() {
            anyhow::bail!("Invalid FINE_PER_DAY: must not be negative");
        }

        Ok(policy)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .map(|v| {
                if v.starts_with("sqlite:") {
                    v
                } else {
                    format!("sqlite:{}", v)
                }
            })
            .unwrap_or_else(|_| "sqlite:./data/stacks.db".to_string());

        // In production JWT_SECRET must be set; a per-process secret keeps dev usable
        let jwt_secret = env::var("JWT_SECRET")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| {
                tracing::warn!("JWT_SECRET not set; generating an ephemeral development secret");
                crate::services::auth::generate_secret()
            });

        Ok(Self {
            host: env::var("HOST").ok(),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url,

            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,

            jwt_secret,

            token_lifetime_secs: parse_var("TOKEN_LIFETIME_SECS", 24 * 60 * 60)?,

            bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?,

            scheduler_enabled: env::var("SCHEDULER_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),

            policy: CirculationPolicy::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_library_rules() {
        let policy = CirculationPolicy::default();
        assert_eq!(policy.fine_per_day, Decimal::new(100, 0));
        assert_eq!(policy.renewal_days, 7);
        assert_eq!(policy.reservation_hold_days, 7);
        assert_eq!(policy.loan_request_ttl_hours, 24);
        assert!(policy.room_opening_hour < policy.room_closing_hour);
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        let value: i64 = parse_var("STACKS_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
