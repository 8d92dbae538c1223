//! Session error types.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use grapnel_core::CoreError;
use grapnel_fetch::{BrowserError, FetchError, KeychainError};
use grapnel_store::StoreError;

// ============================================================================
// Two-Factor Error
// ============================================================================

/// Error type for two-factor resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TwoFactorError {
    /// No TOTP secret is configured.
    #[error("No TOTP secret configured")]
    MissingSecret,

    /// The TOTP secret is not valid base32.
    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    /// The backup-code pool is empty.
    #[error("no backup codes remaining")]
    NoBackupCodes,

    /// No SMS code source is attached.
    #[error("No SMS code source configured")]
    NoCodeSource,

    /// No SMS code arrived in time.
    #[error("No SMS code received within {0:?}")]
    SmsTimeout(Duration),

    /// The wait was cancelled from outside.
    #[error("Two-factor wait cancelled")]
    Cancelled,

    /// The platform did not accept the submitted code.
    #[error("Verification code rejected: {0}")]
    Rejected(String),
}

impl TwoFactorError {
    /// Returns true if another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::SmsTimeout(_))
    }
}

// ============================================================================
// Session Error
// ============================================================================

/// Error type for session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No bundle is loaded.
    #[error("No active session")]
    NoSession,

    /// Another refresh is running.
    #[error("refresh already in progress")]
    AlreadyInProgress,

    /// The minimum interval since the last attempt has not elapsed.
    #[error("Refresh not allowed before {next_allowed}")]
    TooSoon {
        /// Earliest time the next refresh may run.
        next_allowed: DateTime<Utc>,
    },

    /// Required cookies are missing.
    #[error("Missing required cookies: {}", .0.join(", "))]
    MissingCookies(Vec<String>),

    /// Login credentials are not in the secret store.
    #[error("No login credentials stored for account {0}")]
    NoLoginCredentials(String),

    /// Neither silent refresh nor re-login is configured.
    #[error("No refresh method available")]
    NoRefreshMethod,

    /// The refresh request returned no renewed cookies.
    #[error("Session not renewed: {0}")]
    NotRenewed(String),

    /// The login flow did not reach a logged-in page.
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// A refresh attempt panicked.
    #[error("Refresh attempt panicked: {0}")]
    Panicked(String),

    /// Request failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Browser automation failure.
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// Secret store failure.
    #[error(transparent)]
    Keychain(#[from] KeychainError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Two-factor failure.
    #[error(transparent)]
    TwoFactor(#[from] TwoFactorError),

    /// A harvested bundle broke a model invariant.
    #[error(transparent)]
    Bundle(#[from] CoreError),
}

impl SessionError {
    /// Returns true for guard rejections that did not start an attempt.
    pub fn is_guard_rejection(&self) -> bool {
        matches!(self, Self::AlreadyInProgress | Self::TooSoon { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_two_factor_errors() {
        assert!(TwoFactorError::Rejected("bad".into()).is_retryable());
        assert!(TwoFactorError::SmsTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!TwoFactorError::NoBackupCodes.is_retryable());
        assert!(!TwoFactorError::Cancelled.is_retryable());
    }

    #[test]
    fn test_messages() {
        assert_eq!(SessionError::AlreadyInProgress.to_string(), "refresh already in progress");
        assert_eq!(
            SessionError::MissingCookies(vec!["rur".into(), "sessionid".into()]).to_string(),
            "Missing required cookies: rur, sessionid"
        );
        assert_eq!(TwoFactorError::NoBackupCodes.to_string(), "no backup codes remaining");
    }
}
