//! Expiry checks.
//!
//! Pure functions over timestamps. A missing expiry means the credential
//! never expires and `remaining` is `None`.

use chrono::{DateTime, Utc};
use std::time::Duration;

use grapnel_core::{CredentialBundle, RequiredCookieNames};

/// Result of an expiry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Nothing remains.
    pub is_expired: bool,
    /// Time left. `None` means it never expires.
    pub remaining: Option<Duration>,
    /// Inside the refresh threshold but not yet expired.
    pub needs_refresh: bool,
    /// Governing expiry instant.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ExpiryReport {
    /// Report for a credential without an expiry.
    pub fn never() -> Self {
        Self {
            is_expired: false,
            remaining: None,
            needs_refresh: false,
            expires_at: None,
        }
    }
}

/// Checks a single expiry instant.
pub fn check_expiry(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> ExpiryReport {
    let Some(expires_at) = expires_at else {
        return ExpiryReport::never();
    };

    // A past expiry yields a negative delta, which does not convert.
    let remaining = (expires_at - now).to_std().unwrap_or_default();
    let is_expired = remaining.is_zero();

    ExpiryReport {
        is_expired,
        remaining: Some(remaining),
        needs_refresh: !is_expired && remaining <= threshold,
        expires_at: Some(expires_at),
    }
}

/// Checks a set of cookie expiries. The earliest one governs.
pub fn check_cookie_expiry(
    expiries: &[DateTime<Utc>],
    now: DateTime<Utc>,
    threshold: Duration,
) -> ExpiryReport {
    check_expiry(expiries.iter().min().copied(), now, threshold)
}

/// Checks a bundle: the earliest of its own expiry and its required cookies' expiries.
pub fn check_bundle(
    bundle: &CredentialBundle,
    required: &RequiredCookieNames,
    now: DateTime<Utc>,
    threshold: Duration,
) -> ExpiryReport {
    let mut expiries = bundle.required_cookie_expiries(required);
    expiries.push(bundle.expires_at);
    check_cookie_expiry(&expiries, now, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use grapnel_core::CookieRecord;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let report = check_expiry(None, now(), DAY);
        assert!(!report.is_expired);
        assert!(!report.needs_refresh);
        assert_eq!(report.remaining, None);
        assert_eq!(check_cookie_expiry(&[], now(), DAY), ExpiryReport::never());
    }

    #[test]
    fn test_past_expiry_is_zero() {
        let report = check_expiry(Some(now() - chrono::Duration::hours(1)), now(), DAY);
        assert!(report.is_expired);
        assert_eq!(report.remaining, Some(Duration::ZERO));
        assert!(!report.needs_refresh);
    }

    #[test]
    fn test_exact_expiry_is_expired() {
        let report = check_expiry(Some(now()), now(), DAY);
        assert!(report.is_expired);
    }

    #[test]
    fn test_inside_threshold_needs_refresh() {
        let report = check_expiry(Some(now() + chrono::Duration::hours(12)), now(), DAY);
        assert!(!report.is_expired);
        assert!(report.needs_refresh);
        assert_eq!(report.remaining, Some(Duration::from_secs(12 * 3600)));
    }

    #[test]
    fn test_outside_threshold() {
        let report = check_expiry(Some(now() + chrono::Duration::days(3)), now(), DAY);
        assert!(!report.needs_refresh);
    }

    #[test]
    fn test_earliest_cookie_governs() {
        let expiries = [
            now() + chrono::Duration::days(30),
            now() + chrono::Duration::hours(6),
            now() + chrono::Duration::days(2),
        ];
        let report = check_cookie_expiry(&expiries, now(), DAY);
        assert_eq!(report.expires_at, Some(expiries[1]));
        assert!(report.needs_refresh);
    }

    #[test]
    fn test_bundle_uses_required_cookie_records() {
        let required = RequiredCookieNames::default();
        let soon = now() + chrono::Duration::hours(2);
        let records = vec![
            CookieRecord::new("sessionid", "s").with_expires(now() + chrono::Duration::days(90)),
            CookieRecord::new("csrftoken", "c").with_expires(now() + chrono::Duration::days(90)),
            CookieRecord::new("ds_user_id", "1").with_expires(now() + chrono::Duration::days(90)),
            CookieRecord::new("rur", "r").with_expires(soon),
            CookieRecord::new("unrelated", "x").with_expires(now() + chrono::Duration::minutes(1)),
        ];
        let bundle = CredentialBundle::from_cookie_records(
            records,
            now(),
            chrono::Duration::days(90),
            &required,
        )
        .unwrap();

        let report = check_bundle(&bundle, &required, now(), DAY);
        assert_eq!(report.expires_at, Some(soon));
        assert!(report.needs_refresh);
    }

    #[test]
    fn test_expired_iff_zero_remaining() {
        for hours in [-48_i64, -1, 0, 1, 23, 24, 25, 1000] {
            let report = check_expiry(Some(now() + chrono::Duration::hours(hours)), now(), DAY);
            assert_eq!(report.is_expired, report.remaining == Some(Duration::ZERO));
            assert!(!(report.needs_refresh && report.is_expired));
        }
    }
}
