//! SQLite helper utilities for ids, timestamps and decimal columns
//!
//! SQLite has no native UUID, timestamp or decimal types. Ids are stored as
//! UUID strings, timestamps go through sqlx's chrono encoding, and money is
//! stored as decimal text. Services pass every instant through [now_utc] or
//! [to_storage] first, so stored timestamps carry whole seconds and compare
//! correctly as text.

use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

// ============================================================================
// Id Helpers
// ============================================================================

/// Generate a fresh row id
#[inline]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate that an externally supplied id looks like one of ours
#[inline]
pub fn parse_id(s: &str) -> Result<String> {
    Uuid::parse_str(s.trim())
        .map(|u| u.to_string())
        .map_err(|e| anyhow!("Invalid id '{}': {}", s, e))
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Current UTC time truncated to whole seconds
#[inline]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Truncate any timestamp to the storage precision
#[inline]
pub fn to_storage(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(0)
}

// ============================================================================
// Decimal Helpers (stored as TEXT)
// ============================================================================

/// Serialize a decimal amount with two fractional digits
#[inline]
pub fn decimal_to_str(d: Decimal) -> String {
    let mut d = d.round_dp(2);
    d.rescale(2);
    d.to_string()
}

/// Parse a stored decimal amount
#[inline]
pub fn str_to_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| anyhow!("Invalid decimal '{}': {}", s, e))
}

// ============================================================================
// Search Helpers
// ============================================================================

/// Build a `LIKE` pattern for case-insensitive substring matching
#[inline]
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = new_id();
        assert_eq!(parse_id(&id).unwrap(), id);
    }

    #[test]
    fn test_now_has_no_fraction() {
        assert_eq!(now_utc().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_decimal_text_has_two_places() {
        let d = Decimal::new(3, 0);
        assert_eq!(decimal_to_str(d * Decimal::new(100, 2)), "3.00");
        assert_eq!(decimal_to_str(d * Decimal::new(100, 0)), "300.00");
        assert_eq!(decimal_to_str(Decimal::ZERO), "0.00");
        assert_eq!(str_to_decimal("12.50").unwrap(), Decimal::new(1250, 2));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
