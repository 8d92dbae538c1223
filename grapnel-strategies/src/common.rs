//! Helpers shared by the concrete strategies.

use std::time::Duration;

use grapnel_core::{ItemRef, StrategyToggle};
use grapnel_fetch::{Classification, FetchError, HttpResponse, classify};

use crate::error::ParseError;

// ============================================================================
// Tuning
// ============================================================================

/// Per-strategy time budget and transient-retry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyTuning {
    /// Budget for one attempt.
    pub timeout: Duration,
    /// Extra tries on transient failures.
    pub retries: u32,
}

impl Default for StrategyTuning {
    fn default() -> Self {
        Self::from(&StrategyToggle::default())
    }
}

impl From<&StrategyToggle> for StrategyTuning {
    fn from(toggle: &StrategyToggle) -> Self {
        Self {
            timeout: toggle.timeout(),
            retries: toggle.retries,
        }
    }
}

// ============================================================================
// Public Pages
// ============================================================================

/// Maps the status of a public HTML page to an error, if any.
pub(crate) fn check_page(endpoint: &str, response: &HttpResponse) -> Result<(), FetchError> {
    match response.status {
        401 | 403 => Err(FetchError::Auth {
            status: response.status,
            endpoint: endpoint.to_string(),
        }),
        429 => Err(FetchError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after: response.retry_after(),
        }),
        _ if !response.is_success() => Err(FetchError::Http {
            status: response.status,
            endpoint: endpoint.to_string(),
        }),
        _ if response.text.trim().is_empty() => {
            Err(FetchError::EmptyResponse(endpoint.to_string()))
        }
        _ => Ok(()),
    }
}

/// Explains why a public page yielded no item.
///
/// Normal pages carry login and sign-up links, so the classifier is only
/// consulted once parsing has failed.
pub(crate) fn page_failure(endpoint: &str, body: &str, err: ParseError) -> FetchError {
    match classify(body) {
        Classification::RateLimited => FetchError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after: None,
        },
        verdict if verdict.is_blocked() => FetchError::html(verdict, endpoint, body),
        _ => err.into(),
    }
}

/// Returns the shortcode a public page is addressed by.
pub(crate) fn shortcode_for(target: &ItemRef) -> Result<String, ParseError> {
    target
        .shortcode()
        .ok_or_else(|| ParseError::Unaddressable(format!("no shortcode for {target}")))
}

// ============================================================================
// Counts
// ============================================================================

/// Parses display counts such as `1,234`, `12.5K` or `3M`.
pub fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last()? {
        'k' | 'K' => (&raw[..raw.len() - 1], 1_000.0),
        'm' | 'M' => (&raw[..raw.len() - 1], 1_000_000.0),
        'b' | 'B' => (&raw[..raw.len() - 1], 1_000_000_000.0),
        _ => (raw, 1.0),
    };

    let digits = digits.replace(',', "");
    if multiplier > 1.0 {
        let value: f64 = digits.parse().ok()?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        return (value >= 0.0).then(|| (value * multiplier).round() as u64);
    }
    digits.replace('.', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count("12.5K"), Some(12_500));
        assert_eq!(parse_count("3M"), Some(3_000_000));
        assert_eq!(parse_count("0"), Some(0));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("many"), None);
    }

    #[test]
    fn test_check_page_statuses() {
        assert!(check_page("/p", &HttpResponse::new(200, "<html></html>")).is_ok());
        assert!(matches!(
            check_page("/p", &HttpResponse::new(404, "")),
            Err(FetchError::Http { status: 404, .. })
        ));
        assert!(matches!(
            check_page("/p", &HttpResponse::new(429, "")),
            Err(FetchError::RateLimited { .. })
        ));
        assert!(matches!(
            check_page("/p", &HttpResponse::new(200, "  ")),
            Err(FetchError::EmptyResponse(_))
        ));
    }

    #[test]
    fn test_page_failure_classifies_walls() {
        let wall = "<!DOCTYPE html><html><body>Log in to continue</body></html>";
        assert!(page_failure("/p", wall, ParseError::NoContent).is_blocked_content());

        let plain = "<html><body>nothing here</body></html>";
        assert!(matches!(
            page_failure("/p", plain, ParseError::NoContent),
            FetchError::Parse(_)
        ));
    }

    #[test]
    fn test_tuning_from_toggle() {
        let toggle = StrategyToggle {
            enabled: true,
            timeout_secs: 7,
            retries: 2,
        };
        let tuning = StrategyTuning::from(&toggle);
        assert_eq!(tuning.timeout, Duration::from_secs(7));
        assert_eq!(tuning.retries, 2);
    }
}
