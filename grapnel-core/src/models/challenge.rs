//! Two-factor challenge types.

use serde::{Deserialize, Serialize};

use crate::config::TwoFactorMethod;

/// A detected two-factor challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorChallenge {
    /// How the code is delivered.
    pub method: TwoFactorMethod,
    /// Masked phone number shown on the page, for SMS challenges.
    pub phone_hint: Option<String>,
    /// Whether the page offers a backup-code path.
    pub backup_available: bool,
}

impl TwoFactorChallenge {
    /// Creates a challenge with no hint.
    pub fn new(method: TwoFactorMethod) -> Self {
        Self {
            method,
            phone_hint: None,
            backup_available: false,
        }
    }

    /// Returns the same challenge with a different method.
    #[must_use]
    pub fn with_method(mut self, method: TwoFactorMethod) -> Self {
        self.method = method;
        self
    }
}
