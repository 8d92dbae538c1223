//! Derived session health.
//!
//! Nothing in this module is persisted; it is recomputed from a credential
//! bundle and the current time on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::HealthThresholds;

// ============================================================================
// Health
// ============================================================================

/// Health of a credential bundle, by remaining validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// More than the warning window remains.
    Healthy,
    /// Inside the warning window.
    Warning,
    /// Inside the critical window.
    Critical,
    /// Nothing remains.
    Expired,
}

impl Health {
    /// Maps a remaining time to a health level.
    ///
    /// `None` means the bundle never expires.
    pub fn from_remaining(remaining: Option<Duration>, thresholds: &HealthThresholds) -> Self {
        match remaining {
            None => Self::Healthy,
            Some(r) if r.is_zero() => Self::Expired,
            Some(r) if r <= thresholds.critical() => Self::Critical,
            Some(r) if r <= thresholds.warning() => Self::Warning,
            Some(_) => Self::Healthy,
        }
    }

    /// Returns the display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Session Status
// ============================================================================

/// Derived status of the active credential bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// True when a bundle is present, unexpired, and has all required cookies.
    pub is_valid: bool,
    /// Health level.
    pub health: Health,
    /// Time left before expiry. `None` means it never expires.
    pub remaining: Option<Duration>,
    /// True when inside the refresh threshold but not yet expired.
    pub needs_refresh: bool,
    /// Governing expiry instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Required cookies that are missing.
    pub missing_cookies: Vec<String>,
}

impl SessionStatus {
    /// Status reported when no bundle is loaded.
    pub fn no_session() -> Self {
        Self {
            is_valid: false,
            health: Health::Expired,
            remaining: Some(Duration::ZERO),
            needs_refresh: false,
            expires_at: None,
            missing_cookies: Vec::new(),
        }
    }

    /// Returns true if nothing remains.
    pub fn is_expired(&self) -> bool {
        self.remaining.is_some_and(|r| r.is_zero())
    }
}

// ============================================================================
// Tests
// ============================================================================
