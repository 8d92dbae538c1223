//! Credential types.
//!
//! A [`CredentialBundle`] is the authenticated cookie set plus its lifecycle
//! metadata. It is usable only when all four required cookies are present,
//! which [`validate_cookie_presence`] checks without touching the network.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::RequiredCookieNames;
use crate::error::CoreError;

// ============================================================================
// Cookie Record
// ============================================================================

/// One raw cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie belongs to.
    #[serde(default)]
    pub domain: String,
    /// Path the cookie is valid for.
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiration time. `None` means a session cookie.
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    /// Whether the cookie requires HTTPS.
    #[serde(default)]
    pub secure: bool,
    /// Whether the cookie is HTTP-only.
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    /// Creates a cookie with only name and value set.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: default_path(),
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    /// Sets the expiry.
    #[must_use]
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Returns true if the cookie is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|exp| exp <= now)
    }
}

// ============================================================================
// Cookie Presence
// ============================================================================

/// Result of the network-free required-cookie check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePresence {
    /// True when every required cookie is present and non-empty.
    pub is_valid: bool,
    /// Names of the missing cookies, in required order.
    pub missing: Vec<String>,
}

/// Checks that all required cookies are present with non-empty values.
pub fn validate_cookie_presence(
    cookies: &BTreeMap<String, String>,
    required: &RequiredCookieNames,
) -> CookiePresence {
    let missing: Vec<String> = required
        .all()
        .into_iter()
        .filter(|name| cookies.get(*name).is_none_or(|v| v.is_empty()))
        .map(str::to_string)
        .collect();

    CookiePresence {
        is_valid: missing.is_empty(),
        missing,
    }
}

// ============================================================================
// Credential Bundle
// ============================================================================

/// The authenticated cookie set plus lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    /// Cookie name to value.
    pub cookies: BTreeMap<String, String>,
    /// When the bundle was created (login or refresh).
    pub created_at: DateTime<Utc>,
    /// When the bundle stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// When the bundle was last renewed.
    #[serde(default)]
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Account handle the bundle belongs to.
    #[serde(default)]
    pub username: Option<String>,
    /// Raw cookie records, when harvested with attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<CookieRecord>>,
}

impl CredentialBundle {
    /// Creates a bundle from a plain cookie map.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBundle`] if `expires_at <= created_at`.
    pub fn new(
        cookies: BTreeMap<String, String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if expires_at <= created_at {
            return Err(CoreError::InvalidBundle(format!(
                "expires_at {expires_at} is not after created_at {created_at}"
            )));
        }

        Ok(Self {
            cookies,
            created_at,
            expires_at,
            last_refreshed_at: None,
            username: None,
            records: None,
        })
    }

    /// Creates a bundle from harvested cookie records.
    ///
    /// Expired records are dropped. The bundle expiry is the earliest expiry
    /// among the required cookies, or `now + default_lifetime` when none of
    /// them carries one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBundle`] if the computed expiry is not
    /// after `now`.
    pub fn from_cookie_records(
        records: Vec<CookieRecord>,
        now: DateTime<Utc>,
        default_lifetime: Duration,
        required: &RequiredCookieNames,
    ) -> Result<Self, CoreError> {
        let records: Vec<CookieRecord> =
            records.into_iter().filter(|r| !r.is_expired_at(now)).collect();

        let required_names = required.all();
        let earliest = records
            .iter()
            .filter(|r| required_names.contains(&r.name.as_str()))
            .filter_map(|r| r.expires)
            .min();

        let cookies = records
            .iter()
            .map(|r| (r.name.clone(), r.value.clone()))
            .collect();

        let mut bundle = Self::new(cookies, now, earliest.unwrap_or(now + default_lifetime))?;
        bundle.records = Some(records);
        Ok(bundle)
    }

    /// Sets the username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Returns a cookie value.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Returns the CSRF token cookie.
    pub fn csrf_token(&self, required: &RequiredCookieNames) -> Option<&str> {
        self.cookie(&required.csrf_token)
    }

    /// Returns the user id cookie.
    pub fn user_id(&self, required: &RequiredCookieNames) -> Option<&str> {
        self.cookie(&required.user_id)
    }

    /// Builds a `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Checks required cookie presence.
    pub fn presence(&self, required: &RequiredCookieNames) -> CookiePresence {
        validate_cookie_presence(&self.cookies, required)
    }

    /// Returns the expiry of each required cookie that carries one.
    pub fn required_cookie_expiries(&self, required: &RequiredCookieNames) -> Vec<DateTime<Utc>> {
        let names = required.all();
        self.records
            .iter()
            .flatten()
            .filter(|r| names.contains(&r.name.as_str()))
            .filter_map(|r| r.expires)
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn full_cookies() -> BTreeMap<String, String> {
        [
            ("sessionid", "s"),
            ("csrftoken", "c"),
            ("ds_user_id", "42"),
            ("rur", "r"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_presence_all_present() {
        let presence = validate_cookie_presence(&full_cookies(), &RequiredCookieNames::default());
        assert!(presence.is_valid);
        assert!(presence.missing.is_empty());
    }

    #[test]
    fn test_presence_lists_exactly_missing() {
        let required = RequiredCookieNames::default();
        let all = required.all();

        // Every non-full subset must report exactly its complement.
        for mask in 0u8..15 {
            let mut cookies = BTreeMap::new();
            let mut expected = Vec::new();
            for (i, name) in all.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    cookies.insert((*name).to_string(), "v".to_string());
                } else {
                    expected.push((*name).to_string());
                }
            }
            let presence = validate_cookie_presence(&cookies, &required);
            assert!(!presence.is_valid, "mask {mask}");
            assert_eq!(presence.missing, expected, "mask {mask}");
        }
    }

    #[test]
    fn test_presence_treats_empty_as_missing() {
        let mut cookies = full_cookies();
        cookies.insert("csrftoken".to_string(), String::new());
        let presence = validate_cookie_presence(&cookies, &RequiredCookieNames::default());
        assert_eq!(presence.missing, vec!["csrftoken".to_string()]);
    }

    #[test]
    fn test_bundle_rejects_inverted_times() {
        let now = Utc::now();
        assert!(CredentialBundle::new(full_cookies(), now, now).is_err());
        assert!(CredentialBundle::new(full_cookies(), now, now - Duration::hours(1)).is_err());
        assert!(CredentialBundle::new(full_cookies(), now, now + Duration::hours(1)).is_ok());
    }

    #[test]
    fn test_bundle_from_records_uses_earliest_required_expiry() {
        let now = Utc::now();
        let records = vec![
            CookieRecord::new("sessionid", "s").with_expires(now + Duration::days(30)),
            CookieRecord::new("csrftoken", "c").with_expires(now + Duration::days(300)),
            CookieRecord::new("ds_user_id", "42").with_expires(now + Duration::days(10)),
            CookieRecord::new("rur", "r"),
            // Not required: must not govern expiry.
            CookieRecord::new("mid", "m").with_expires(now + Duration::days(1)),
            // Already expired: dropped.
            CookieRecord::new("stale", "x").with_expires(now - Duration::days(1)),
        ];

        let bundle = CredentialBundle::from_cookie_records(
            records,
            now,
            Duration::days(90),
            &RequiredCookieNames::default(),
        )
        .unwrap();

        assert_eq!(bundle.expires_at, now + Duration::days(10));
        assert!(bundle.cookie("stale").is_none());
        assert_eq!(bundle.cookie("mid"), Some("m"));
        assert_eq!(bundle.records.as_ref().map(Vec::len), Some(5));
    }

    #[test]
    fn test_bundle_from_records_defaults_lifetime() {
        let now = Utc::now();
        let records = vec![CookieRecord::new("sessionid", "s")];
        let bundle = CredentialBundle::from_cookie_records(
            records,
            now,
            Duration::days(90),
            &RequiredCookieNames::default(),
        )
        .unwrap();
        assert_eq!(bundle.expires_at, now + Duration::days(90));
    }

    #[test]
    fn test_cookie_header_and_accessors() {
        let now = Utc::now();
        let bundle =
            CredentialBundle::new(full_cookies(), now, now + Duration::days(1)).unwrap();
        let required = RequiredCookieNames::default();

        assert_eq!(
            bundle.cookie_header(),
            "csrftoken=c; ds_user_id=42; rur=r; sessionid=s"
        );
        assert_eq!(bundle.csrf_token(&required), Some("c"));
        assert_eq!(bundle.user_id(&required), Some("42"));
    }
}
