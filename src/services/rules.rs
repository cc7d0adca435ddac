//! Pure circulation and booking rules
//!
//! Everything here is deterministic and free of I/O so the services and the
//! scheduler share one definition of each rule.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::db::{LoanRequestStatus, MembershipType, PermissionRequestStatus};

static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").ok()
});

// ============================================================================
// Loans
// ============================================================================

/// Due date of a loan taken out at `loan_date` by a patron of the given tier
pub fn due_date(loan_date: DateTime<Utc>, membership: MembershipType) -> DateTime<Utc> {
    loan_date + Duration::days(membership.loan_period_days())
}

/// Due date after a renewal at `renewed_at`
pub fn renewed_due_date(renewed_at: DateTime<Utc>, renewal_days: i64) -> DateTime<Utc> {
    renewed_at + Duration::days(renewal_days)
}

/// Whole calendar days between the due date and the return, zero if on time
pub fn days_overdue(due: DateTime<Utc>, returned: DateTime<Utc>) -> i64 {
    (returned.date_naive() - due.date_naive()).num_days().max(0)
}

/// Fine owed for a late return, with its reason text
pub fn overdue_fine(days_overdue: i64, fine_per_day: Decimal) -> Option<(Decimal, String)> {
    if days_overdue <= 0 {
        return None;
    }
    let amount = Decimal::from(days_overdue) * fine_per_day;
    Some((amount.round_dp(2), format!("Overdue return: {} days", days_overdue)))
}

/// Whether a request in `from` may move to `to`
pub fn loan_request_transition_allowed(from: LoanRequestStatus, to: LoanRequestStatus) -> bool {
    from == LoanRequestStatus::Pending && to != LoanRequestStatus::Pending
}

/// Whether an eBook permission request in `from` may move to `to`
pub fn permission_request_transition_allowed(
    from: PermissionRequestStatus,
    to: PermissionRequestStatus,
) -> bool {
    from == PermissionRequestStatus::Pending && to != PermissionRequestStatus::Pending
}

// ============================================================================
// Study Rooms
// ============================================================================

/// Half-open ranges `[s1, e1)` and `[s2, e2)` share at least one instant
pub fn slots_overlap(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    s1 < e2 && s2 < e1
}

/// Opening and closing times for the given hours
pub fn opening_window(opening_hour: u32, closing_hour: u32) -> (NaiveTime, NaiveTime) {
    let open = NaiveTime::from_hms_opt(opening_hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let close = if closing_hour >= 24 {
        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
    } else {
        NaiveTime::from_hms_opt(closing_hour, 0, 0).unwrap_or(NaiveTime::MIN)
    };
    (open, close)
}

/// Free gaps between opening and closing, given bookings sorted or not
pub fn free_slots(
    open: NaiveTime,
    close: NaiveTime,
    booked: &[(NaiveTime, NaiveTime)],
) -> Vec<(NaiveTime, NaiveTime)> {
    let mut booked = booked.to_vec();
    booked.sort();

    let mut gaps = Vec::new();
    let mut cursor = open;
    for (start, end) in booked {
        if start > cursor {
            gaps.push((cursor, start.min(close)));
        }
        if end > cursor {
            cursor = end;
        }
        if cursor >= close {
            break;
        }
    }
    if cursor < close {
        gaps.push((cursor, close));
    }
    gaps.retain(|(s, e)| s < e);
    gaps
}

// ============================================================================
// Accounts
// ============================================================================

/// Activation state implied by the staff flags; `None` for tiers that do not
/// need approval
pub fn staff_activation(
    membership: MembershipType,
    is_staff_approved: bool,
    email_verified: bool,
) -> Option<bool> {
    match membership {
        MembershipType::Staff => Some(is_staff_approved && email_verified),
        _ => None,
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|re| re.is_match(email.trim()))
}

// ============================================================================
// Catalog
// ============================================================================

/// Strip separators and check the ISBN-10 or ISBN-13 check digit.
/// Returns the normalized ISBN.
pub fn normalize_isbn(raw: &str) -> Result<String, String> {
    let isbn: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let valid = match isbn.len() {
        10 => isbn10_valid(&isbn),
        13 => isbn13_valid(&isbn),
        _ => false,
    };

    if valid {
        Ok(isbn)
    } else {
        Err(format!("'{}' is not a valid ISBN-10 or ISBN-13", raw.trim()))
    }
}

fn isbn10_valid(isbn: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in isbn.chars().enumerate() {
        let value = match (i, c) {
            (9, 'X') => 10,
            (_, d) if d.is_ascii_digit() => d as u32 - '0' as u32,
            _ => return false,
        };
        sum += (10 - i as u32) * value;
    }
    sum % 11 == 0
}

fn isbn13_valid(isbn: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in isbn.chars().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { d } else { d * 3 };
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_due_date_per_tier() {
        let loaned = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            due_date(loaned, MembershipType::Student),
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
        );
        assert_eq!((due_date(loaned, MembershipType::Faculty) - loaned).num_days(), 30);
    }

    #[test]
    fn test_renewal_counts_from_renewal_time() {
        let renewed = Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap();
        assert_eq!(
            renewed_due_date(renewed, 7),
            Utc.with_ymd_and_hms(2024, 3, 19, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_days_overdue_uses_calendar_days() {
        let due = Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap();
        let same_day = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        let three_later = Utc.with_ymd_and_hms(2024, 3, 13, 1, 0, 0).unwrap();
        assert_eq!(days_overdue(due, same_day), 0);
        assert_eq!(days_overdue(due, three_later), 3);
        assert_eq!(days_overdue(three_later, due), 0);
    }

    #[test]
    fn test_overdue_fine_amount_and_reason() {
        let (amount, reason) = overdue_fine(3, Decimal::new(100, 2)).unwrap();
        assert_eq!(amount, Decimal::new(300, 2));
        assert_eq!(reason, "Overdue return: 3 days");
        assert!(overdue_fine(0, Decimal::new(100, 2)).is_none());
    }

    #[test]
    fn test_adjacent_slots_do_not_overlap() {
        assert!(!slots_overlap(t(9, 0), t(10, 0), t(10, 0), t(11, 0)));
        assert!(slots_overlap(t(9, 0), t(10, 0), t(9, 30), t(10, 30)));
        assert!(slots_overlap(t(9, 0), t(12, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn test_free_slots_between_bookings() {
        let gaps = free_slots(
            t(8, 0),
            t(22, 0),
            &[(t(10, 0), t(11, 0)), (t(9, 0), t(10, 0)), (t(14, 0), t(15, 30))],
        );
        assert_eq!(
            gaps,
            vec![(t(8, 0), t(9, 0)), (t(11, 0), t(14, 0)), (t(15, 30), t(22, 0))]
        );
    }

    #[test]
    fn test_free_slots_when_fully_booked() {
        let gaps = free_slots(t(8, 0), t(22, 0), &[(t(8, 0), t(22, 0))]);
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_staff_activation_requires_both_flags() {
        assert_eq!(staff_activation(MembershipType::Staff, true, false), Some(false));
        assert_eq!(staff_activation(MembershipType::Staff, true, true), Some(true));
        assert_eq!(staff_activation(MembershipType::Student, false, false), None);
    }

    #[test]
    fn test_isbn_validation() {
        assert_eq!(normalize_isbn("978-0-306-40615-7").unwrap(), "9780306406157");
        assert_eq!(normalize_isbn("0-306-40615-2").unwrap(), "0306406152");
        assert_eq!(normalize_isbn("0-8044-2957-x").unwrap(), "080442957X");
        assert!(normalize_isbn("978-0-306-40615-8").is_err());
        assert!(normalize_isbn("12345").is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("ada@uni.edu"));
        assert!(!is_valid_email("ada@"));
        assert!(!is_valid_email("not an email"));
    }

    #[test]
    fn test_request_transitions_are_one_way() {
        use LoanRequestStatus::*;
        assert!(loan_request_transition_allowed(Pending, Approved));
        assert!(loan_request_transition_allowed(Pending, Expired));
        assert!(!loan_request_transition_allowed(Approved, Rejected));
        assert!(!loan_request_transition_allowed(Expired, Approved));
        assert!(!loan_request_transition_allowed(Pending, Pending));
    }
}
