//! Fetch error types.
//!
//! [`FetchError`] is `Clone` so a strategy result can own its typed error
//! while the orchestrator keeps a copy as the aggregate's last error.

use std::any::Any;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use grapnel_core::CoreError;

use crate::classify::Classification;

/// Maximum number of characters kept from an HTML body in errors.
pub const SNIPPET_LIMIT: usize = 500;

// ============================================================================
// Operator Action
// ============================================================================

/// What an operator should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorAction {
    /// Wait before trying again.
    BackOff,
    /// Obtain a new session.
    Reauthenticate,
    /// Another strategy may still work.
    TryNextStrategy,
    /// The failure looks transient; retry as is.
    Retry,
    /// Nothing will help.
    Abandon,
}

impl OperatorAction {
    /// Returns the display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::BackOff => "back off",
            Self::Reauthenticate => "re-authenticate",
            Self::TryNextStrategy => "try next strategy",
            Self::Retry => "retry",
            Self::Abandon => "abandon",
        }
    }
}

impl fmt::Display for OperatorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for acquisition operations.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network failure below HTTP.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The attempt exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The platform rejected the session (401/403).
    #[error("Authentication rejected (HTTP {status}) at {endpoint}")]
    Auth {
        /// HTTP status.
        status: u16,
        /// Endpoint path.
        endpoint: String,
    },

    /// The platform asked us to slow down.
    #[error("Rate limited at {endpoint}")]
    RateLimited {
        /// Endpoint path.
        endpoint: String,
        /// Server-suggested wait.
        retry_after: Option<Duration>,
    },

    /// An adversarial HTML page came back instead of data.
    #[error("{classification} page from {endpoint}")]
    HtmlResponse {
        /// Classifier verdict.
        classification: Classification,
        /// Endpoint path.
        endpoint: String,
        /// Leading part of the body.
        snippet: String,
    },

    /// Any other non-success status.
    #[error("HTTP {status} from {endpoint}")]
    Http {
        /// HTTP status.
        status: u16,
        /// Endpoint path.
        endpoint: String,
    },

    /// A success status with no body.
    #[error("Empty response from {0}")]
    EmptyResponse(String),

    /// Malformed or unexpected payload on a success status.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Required session fields were missing; no request was sent.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The strategy does not implement this operation.
    #[error("Operation not supported by {0}")]
    Unsupported(String),

    /// The strategy reported itself unavailable.
    #[error("Strategy not available: {0}")]
    NotAvailable(String),

    /// The orchestrator has no strategies to try.
    #[error("No strategies configured")]
    NoStrategies,

    /// The strategy panicked.
    #[error("Strategy panicked: {0}")]
    Panicked(String),

    /// Every strategy failed.
    #[error("All strategies failed after {elapsed:?}")]
    AllStrategiesFailed {
        /// Error of the last strategy attempted.
        last_error: Option<Box<FetchError>>,
        /// Time spent across all strategies.
        elapsed: Duration,
    },
}

impl FetchError {
    /// Builds an HTML-response error, truncating the body to [`SNIPPET_LIMIT`] characters.
    pub fn html(classification: Classification, endpoint: impl Into<String>, body: &str) -> Self {
        Self::HtmlResponse {
            classification,
            endpoint: endpoint.into(),
            snippet: body.chars().take(SNIPPET_LIMIT).collect(),
        }
    }

    /// Returns true for failures worth retrying against the same strategy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// Returns true for blocked-content failures.
    pub fn is_blocked_content(&self) -> bool {
        matches!(self, Self::HtmlResponse { classification, .. } if classification.is_blocked())
    }

    /// Recommended operator action.
    pub fn action(&self) -> OperatorAction {
        match self {
            Self::Auth { .. } | Self::Validation(_) => OperatorAction::Reauthenticate,
            Self::RateLimited { .. } => OperatorAction::BackOff,
            Self::HtmlResponse { classification, .. } => match classification {
                Classification::LoginRequired => OperatorAction::Reauthenticate,
                Classification::RateLimited => OperatorAction::BackOff,
                Classification::Blocked => OperatorAction::Abandon,
                _ => OperatorAction::TryNextStrategy,
            },
            Self::Transport(_) | Self::Timeout(_) | Self::EmptyResponse(_) => OperatorAction::Retry,
            Self::Http { status, .. } if *status >= 500 => OperatorAction::Retry,
            Self::Http { .. }
            | Self::Parse(_)
            | Self::Unsupported(_)
            | Self::NotAvailable(_)
            | Self::Panicked(_) => OperatorAction::TryNextStrategy,
            Self::NoStrategies => OperatorAction::Abandon,
            Self::AllStrategiesFailed { last_error, .. } => last_error
                .as_ref()
                .map_or(OperatorAction::Abandon, |e| e.action()),
        }
    }

    /// Human message naming what went wrong.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth { .. } => "session rejected, re-authentication required".to_string(),
            Self::RateLimited { .. } => "rate limited, retry later".to_string(),
            Self::HtmlResponse { classification, .. } => classification.user_message().to_string(),
            Self::Transport(_) | Self::Timeout(_) => "network problem, retry shortly".to_string(),
            Self::Validation(_) => "session incomplete, log in again".to_string(),
            Self::NoStrategies => "no acquisition strategy is enabled".to_string(),
            Self::AllStrategiesFailed { last_error, .. } => last_error.as_ref().map_or_else(
                || "every acquisition strategy failed".to_string(),
                |e| e.user_message(),
            ),
            other => other.to_string(),
        }
    }
}

impl From<CoreError> for FetchError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidData(msg) => Self::Parse(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

// ============================================================================
// Transport Error
// ============================================================================

/// Network failure below HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not connect.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The transport's own timeout fired.
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The body could not be read.
    #[error("Body read failed: {0}")]
    Body(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

// ============================================================================
// Browser Error
// ============================================================================

/// Error type for headless-browser operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrowserError {
    /// Navigation failed.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// A selector did not appear in time.
    #[error("Selector {selector} not found within {timeout:?}")]
    SelectorTimeout {
        /// The selector waited for.
        selector: String,
        /// How long we waited.
        timeout: Duration,
    },

    /// An interaction targeted a missing element.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The browser session is gone.
    #[error("Browser session closed")]
    Closed,

    /// Anything else.
    #[error("Browser error: {0}")]
    Other(String),
}

// ============================================================================
// Keychain Error
// ============================================================================

/// Error type for keychain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeychainError {
    /// Access denied.
    #[error("Access denied to keychain")]
    AccessDenied,

    /// Keychain unavailable.
    #[error("Keychain unavailable: {0}")]
    Unavailable(String),

    /// Platform error.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Generic error.
    #[error("Keychain error: {0}")]
    Other(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(e) => Self::Platform(e.to_string()),
            keyring::Error::NoStorageAccess(e) => Self::Unavailable(e.to_string()),
            keyring::Error::Ambiguous(_) => Self::Other("ambiguous credential entry".to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

// ============================================================================
// Panic Payloads
// ============================================================================

/// Extracts the message from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

// ============================================================================
// Tests
// ============================================================================
