//! Response body classification.
//!
//! The platform answers blocked requests with a 200 and an HTML interstitial
//! instead of JSON. [`classify`] tells the two apart and names the kind of
//! interstitial so callers can decide between re-authenticating, backing off,
//! and falling through to another strategy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural markers that identify an HTML (or XML) document.
const HTML_MARKERS: &[&str] = &["<!doctype", "<html", "<?xml"];

/// Keyword families, checked in this order. First hit wins.
const KEYWORD_FAMILIES: &[(Classification, &[&str])] = &[
    (Classification::LoginRequired, &["login", "log in", "sign in", "signin"]),
    (Classification::Captcha, &["captcha", "robot"]),
    (
        Classification::Challenge,
        &["challenge", "suspicious", "confirm your identity", "confirm it's you"],
    ),
    (
        Classification::RateLimited,
        &["too many requests", "slow down", "try again later"],
    ),
    (Classification::Blocked, &["blocked", "disabled"]),
];

// ============================================================================
// Classification
// ============================================================================

/// What a response body turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Not HTML; presumably the JSON payload we asked for.
    JsonOk,
    /// Login wall.
    LoginRequired,
    /// CAPTCHA or robot check.
    Captcha,
    /// Security challenge or identity confirmation.
    Challenge,
    /// Rate-limit interstitial.
    RateLimited,
    /// Account or IP blocked.
    Blocked,
    /// HTML we could not place.
    UnknownHtml,
}

impl Classification {
    /// Returns true for every HTML verdict.
    pub fn is_html(&self) -> bool {
        !matches!(self, Self::JsonOk)
    }

    /// Returns true for verdicts that must not be retried against the same strategy.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            Self::LoginRequired | Self::Captcha | Self::Challenge | Self::Blocked
        )
    }

    /// Human message for this verdict.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::JsonOk => "ok",
            Self::LoginRequired => "requires login",
            Self::Captcha => "CAPTCHA required",
            Self::Challenge => "security challenge required",
            Self::RateLimited => "rate limited, retry later",
            Self::Blocked => "account blocked",
            Self::UnknownHtml => "unexpected HTML page",
        }
    }

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonOk => "json_ok",
            Self::LoginRequired => "login_required",
            Self::Captcha => "captcha",
            Self::Challenge => "challenge",
            Self::RateLimited => "rate_limited",
            Self::Blocked => "blocked",
            Self::UnknownHtml => "unknown_html",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Returns true if the body starts like an HTML or XML document.
///
/// Leading whitespace and a UTF-8 byte-order mark are ignored.
pub fn looks_like_html(body: &str) -> bool {
    let head: String = body
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();

    HTML_MARKERS.iter().any(|marker| head.starts_with(marker))
}

/// Classifies a raw response body.
pub fn classify(body: &str) -> Classification {
    if !looks_like_html(body) {
        return Classification::JsonOk;
    }

    let lower = body.to_lowercase();
    KEYWORD_FAMILIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(Classification::UnknownHtml, |(verdict, _)| *verdict)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_wall() {
        let body = "<!DOCTYPE html><html><body>Please login with your password</body></html>";
        assert_eq!(classify(body), Classification::LoginRequired);
    }

    #[test]
    fn test_json_never_html() {
        for body in [
            r#"{"status": "ok"}"#,
            r#"[{"login": "captcha blocked"}]"#,
            "  \n{\"html\": \"<html>\"}",
            "",
        ] {
            assert_eq!(classify(body), Classification::JsonOk, "body {body:?}");
        }
    }

    #[test]
    fn test_markers_tolerate_bom_and_case() {
        assert!(looks_like_html("\u{feff}  <!doctype html>"));
        assert!(looks_like_html("\n\t<HTML lang=en>"));
        assert!(looks_like_html("<?xml version=\"1.0\"?>"));
        assert!(!looks_like_html("hello <html>"));
    }

    #[test]
    fn test_keyword_priority() {
        // Login outranks captcha when both appear.
        let both = "<html>Sign in to continue. Complete the CAPTCHA.</html>";
        assert_eq!(classify(both), Classification::LoginRequired);

        let captcha = "<html>Prove you're not a robot</html>";
        assert_eq!(classify(captcha), Classification::Captcha);

        let challenge = "<html>We detected suspicious activity</html>";
        assert_eq!(classify(challenge), Classification::Challenge);

        let rate = "<html>Too Many Requests</html>";
        assert_eq!(classify(rate), Classification::RateLimited);

        let blocked = "<html>Your account has been disabled</html>";
        assert_eq!(classify(blocked), Classification::Blocked);

        let unknown = "<html><body>Hello</body></html>";
        assert_eq!(classify(unknown), Classification::UnknownHtml);
    }

    #[test]
    fn test_deterministic() {
        let body = "<html>blocked</html>";
        assert_eq!(classify(body), classify(body));
    }

    #[test]
    fn test_blocked_set() {
        assert!(Classification::Captcha.is_blocked());
        assert!(!Classification::RateLimited.is_blocked());
        assert!(!Classification::UnknownHtml.is_blocked());
        assert!(!Classification::JsonOk.is_html());
    }
}
