//! Configuration value types.
//!
//! Every value here is data, not behavior. Endpoint paths, header names and
//! login-form selectors are all overridable because the platform surface is
//! undocumented and changes without notice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

const HOUR_SECS: u64 = 3600;

// ============================================================================
// Aggregate
// ============================================================================

/// Aggregate configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrapnelConfig {
    /// Account identifier used to key persisted credentials.
    pub account: Option<String>,
    /// Override for the credential storage directory.
    pub storage_dir: Option<PathBuf>,
    /// Rate limiting for authenticated calls.
    pub rate_limit: RateLimitConfig,
    /// Session refresh behavior.
    pub refresh: RefreshConfig,
    /// Health level thresholds.
    pub health: HealthThresholds,
    /// Per-strategy toggles.
    pub strategies: StrategySettings,
    /// Two-factor resolution.
    pub two_factor: TwoFactorConfig,
    /// Platform surface.
    pub platform: PlatformConfig,
}

impl GrapnelConfig {
    /// Checks values that would make components misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.rate_limit.max_requests == 0 {
            return Err(CoreError::InvalidConfig(
                "rate_limit.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "rate_limit.window_ms must be positive".to_string(),
            ));
        }
        if self.health.critical_hours > self.health.warning_hours {
            return Err(CoreError::InvalidConfig(
                "health.critical_hours must not exceed health.warning_hours".to_string(),
            ));
        }
        if self.platform.base_url.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "platform.base_url must be set".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Rate Limit
// ============================================================================

/// Sliding-window request cap plus minimum spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Minimum delay between consecutive requests in milliseconds.
    pub request_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_ms: 3_600_000,
            request_delay_ms: 2_000,
        }
    }
}

impl RateLimitConfig {
    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Minimum spacing.
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

// ============================================================================
// Refresh
// ============================================================================

/// Session refresh behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Refresh when less than this many hours remain.
    pub refresh_threshold_hours: u64,
    /// Extra attempts after the first failed one.
    pub max_retries: u32,
    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Minimum hours between a successful attempt and the next one.
    pub min_refresh_interval_hours: u64,
    /// Lifetime assumed for a new bundle whose cookies carry no expiry.
    pub session_lifetime_days: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_hours: 24,
            max_retries: 3,
            retry_delay_ms: 5_000,
            min_refresh_interval_hours: 168,
            session_lifetime_days: 90,
        }
    }
}

impl RefreshConfig {
    /// Refresh threshold.
    pub fn threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_hours * HOUR_SECS)
    }

    /// Delay between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Minimum refresh interval.
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_hours * HOUR_SECS)
    }

    /// Default bundle lifetime.
    pub fn session_lifetime(&self) -> chrono::Duration {
        let days = i64::try_from(self.session_lifetime_days.min(36_500)).unwrap_or(36_500);
        chrono::Duration::days(days)
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health level thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// At or below this many hours: critical.
    pub critical_hours: u64,
    /// At or below this many hours: warning.
    pub warning_hours: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_hours: 12,
            warning_hours: 48,
        }
    }
}

impl HealthThresholds {
    /// Critical window.
    pub fn critical(&self) -> Duration {
        Duration::from_secs(self.critical_hours * HOUR_SECS)
    }

    /// Warning window.
    pub fn warning(&self) -> Duration {
        Duration::from_secs(self.warning_hours * HOUR_SECS)
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// Enable flag and limits for one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyToggle {
    /// Whether the strategy is tried at all.
    pub enabled: bool,
    /// Time budget for one attempt, in seconds.
    pub timeout_secs: u64,
    /// Extra tries on transient transport failures inside the attempt.
    pub retries: u32,
}

impl Default for StrategyToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 20,
            retries: 1,
        }
    }
}

impl StrategyToggle {
    /// Attempt time budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-strategy toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    /// Public embed lookup.
    pub embed: StrategyToggle,
    /// Public query endpoint.
    pub public_query: StrategyToggle,
    /// HTML page scrape.
    pub html_scrape: StrategyToggle,
    /// Authenticated private API.
    pub authenticated_api: StrategyToggle,
    /// Run search strategies concurrently instead of one after another.
    pub concurrent_search: bool,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            embed: StrategyToggle::default(),
            public_query: StrategyToggle::default(),
            html_scrape: StrategyToggle::default(),
            authenticated_api: StrategyToggle {
                timeout_secs: 30,
                ..StrategyToggle::default()
            },
            concurrent_search: true,
        }
    }
}

// ============================================================================
// Two-Factor
// ============================================================================

/// Verification code delivery method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorMethod {
    /// Authenticator app (time-based one-time password).
    #[default]
    Totp,
    /// Text message.
    Sms,
    /// Single-use backup code.
    BackupCode,
}

impl TwoFactorMethod {
    /// Returns the display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::Sms => "sms",
            Self::BackupCode => "backup_code",
        }
    }
}

impl fmt::Display for TwoFactorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Two-factor resolution settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoFactorConfig {
    /// Base32 TOTP secret.
    pub totp_secret: Option<String>,
    /// Pool of single-use backup codes.
    pub backup_codes: Vec<String>,
    /// Method used when the page does not say.
    pub preferred_method: TwoFactorMethod,
    /// Retry failed resolution.
    pub auto_retry: bool,
    /// Attempt cap when `auto_retry` is set.
    pub max_retries: u32,
    /// Longest wait for an SMS code, in seconds.
    pub sms_timeout_secs: u64,
    /// Poll interval while waiting for an SMS code, in milliseconds.
    pub sms_poll_interval_ms: u64,
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self {
            totp_secret: None,
            backup_codes: Vec::new(),
            preferred_method: TwoFactorMethod::Totp,
            auto_retry: true,
            max_retries: 3,
            sms_timeout_secs: 300,
            sms_poll_interval_ms: 2_000,
        }
    }
}

impl TwoFactorConfig {
    /// SMS wait bound.
    pub fn sms_timeout(&self) -> Duration {
        Duration::from_secs(self.sms_timeout_secs)
    }

    /// SMS poll interval.
    pub fn sms_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sms_poll_interval_ms.max(1))
    }
}

impl fmt::Debug for TwoFactorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoFactorConfig")
            .field("totp_secret", &self.totp_secret.as_ref().map(|_| "<redacted>"))
            .field("backup_codes", &self.backup_codes.len())
            .field("preferred_method", &self.preferred_method)
            .field("auto_retry", &self.auto_retry)
            .field("max_retries", &self.max_retries)
            .field("sms_timeout_secs", &self.sms_timeout_secs)
            .field("sms_poll_interval_ms", &self.sms_poll_interval_ms)
            .finish()
    }
}

// ============================================================================
// Platform Surface
// ============================================================================

/// Names of the four cookies a usable bundle must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredCookieNames {
    /// Session id cookie.
    pub session_id: String,
    /// CSRF token cookie.
    pub csrf_token: String,
    /// User id cookie.
    pub user_id: String,
    /// Routing token cookie.
    pub routing: String,
}

impl Default for RequiredCookieNames {
    fn default() -> Self {
        Self {
            session_id: "sessionid".to_string(),
            csrf_token: "csrftoken".to_string(),
            user_id: "ds_user_id".to_string(),
            routing: "rur".to_string(),
        }
    }
}

impl RequiredCookieNames {
    /// All four names, in fixed order.
    pub fn all(&self) -> Vec<&str> {
        vec![
            self.session_id.as_str(),
            self.csrf_token.as_str(),
            self.user_id.as_str(),
            self.routing.as_str(),
        ]
    }
}

/// Endpoint path templates.
///
/// `{shortcode}`, `{media_id}` and `{user_id}` placeholders are substituted
/// at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformEndpoints {
    /// Public embed page.
    pub embed: String,
    /// Public item page.
    pub post_page: String,
    /// Public query endpoint.
    pub query: String,
    /// Query document id for single items.
    pub item_query_doc_id: String,
    /// Query document id for tag feeds.
    pub tag_query_doc_id: String,
    /// Authenticated media info.
    pub media_info: String,
    /// Authenticated keyword search.
    pub search: String,
    /// Authenticated tag sections.
    pub tag_sections: String,
    /// Cheap authenticated profile lookup used as a liveness probe.
    pub profile_probe: String,
    /// Page requested to receive renewed cookies.
    pub token_refresh: String,
    /// Login page.
    pub login: String,
}

impl Default for PlatformEndpoints {
    fn default() -> Self {
        Self {
            embed: "/p/{shortcode}/embed/captioned/".to_string(),
            post_page: "/p/{shortcode}/".to_string(),
            query: "/graphql/query/".to_string(),
            item_query_doc_id: "8845758582119845".to_string(),
            tag_query_doc_id: "9146181408744497".to_string(),
            media_info: "/api/v1/media/{media_id}/info/".to_string(),
            search: "/api/v1/fbsearch/web/top_serp/".to_string(),
            tag_sections: "/api/v1/tags/{tag}/sections/".to_string(),
            profile_probe: "/api/v1/users/{user_id}/info/".to_string(),
            token_refresh: "/".to_string(),
            login: "/accounts/login/".to_string(),
        }
    }
}

impl PlatformEndpoints {
    /// Substitutes one placeholder in a template.
    pub fn render(template: &str, key: &str, value: &str) -> String {
        template.replace(&format!("{{{key}}}"), value)
    }
}

/// CSS selectors driving the automated login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    /// Username input.
    pub username: String,
    /// Password input.
    pub password: String,
    /// Credential submit button.
    pub submit: String,
    /// Verification code input.
    pub code_input: String,
    /// Verification code submit button.
    pub code_submit: String,
    /// Element present only once logged in.
    pub logged_in_marker: String,
    /// How long to wait for each selector, in milliseconds.
    pub wait_timeout_ms: u64,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            username: "input[name='username']".to_string(),
            password: "input[name='password']".to_string(),
            submit: "button[type='submit']".to_string(),
            code_input: "input[name='verificationCode']".to_string(),
            code_submit: "form button".to_string(),
            logged_in_marker: "nav a[href='/']".to_string(),
            wait_timeout_ms: 15_000,
        }
    }
}

impl LoginSelectors {
    /// Per-selector wait bound.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// The platform surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Scheme and host, without trailing slash.
    pub base_url: String,
    /// Cookie domain.
    pub cookie_domain: String,
    /// Web app id sent with API calls.
    pub app_id: String,
    /// Header carrying the app id.
    pub app_id_header: String,
    /// Header carrying the CSRF token.
    pub csrf_header: String,
    /// User agent for every request.
    pub user_agent: String,
    /// Required cookie names.
    pub required_cookies: RequiredCookieNames,
    /// Endpoint templates.
    pub endpoints: PlatformEndpoints,
    /// Login form selectors.
    pub login: LoginSelectors,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.platform.example".to_string(),
            cookie_domain: ".platform.example".to_string(),
            app_id: "936619743392459".to_string(),
            app_id_header: "X-App-ID".to_string(),
            csrf_header: "X-CSRFToken".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
            required_cookies: RequiredCookieNames::default(),
            endpoints: PlatformEndpoints::default(),
            login: LoginSelectors::default(),
        }
    }
}

impl PlatformConfig {
    /// Joins a path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Origin value (base URL without trailing slash).
    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(GrapnelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = GrapnelConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_health() {
        let mut config = GrapnelConfig::default();
        config.health.critical_hours = 72;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"rate_limit": {"max_requests": 5}, "strategies": {"embed": {"enabled": false}}}"#;
        let config: GrapnelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_ms, 3_600_000);
        assert!(!config.strategies.embed.enabled);
        assert_eq!(config.strategies.embed.timeout_secs, 20);
        assert!(config.strategies.html_scrape.enabled);
    }

    #[test]
    fn test_platform_url_join() {
        let platform = PlatformConfig {
            base_url: "https://host.example/".to_string(),
            ..PlatformConfig::default()
        };
        assert_eq!(platform.url("/a/b/"), "https://host.example/a/b/");
        assert_eq!(platform.url("a"), "https://host.example/a");
        assert_eq!(platform.url("https://other.example/x"), "https://other.example/x");
        assert_eq!(platform.origin(), "https://host.example");
    }

    #[test]
    fn test_render_template() {
        assert_eq!(
            PlatformEndpoints::render("/p/{shortcode}/embed/", "shortcode", "abc"),
            "/p/abc/embed/"
        );
    }

    #[test]
    fn test_two_factor_debug_redacts_secret() {
        let config = TwoFactorConfig {
            totp_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            backup_codes: vec!["11111111".to_string()],
            ..TwoFactorConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("JBSWY3DPEHPK3PXP"));
        assert!(!debug.contains("11111111"));
    }
}
