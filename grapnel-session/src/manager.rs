//! Active-session holder.
//!
//! [`SessionManager`] owns at most one credential bundle. Status is
//! recomputed on every read and never cached. Callbacks fire on the read
//! where a condition first becomes true, and again only after a new bundle
//! is adopted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use grapnel_core::{
    CredentialBundle, GrapnelConfig, Health, HealthThresholds, RequiredCookieNames, SessionStatus,
};
use grapnel_fetch::CredentialProvider;
use grapnel_store::CredentialStore;

use crate::error::SessionError;
use crate::expiry::check_bundle;

/// Called with the status when the session enters its refresh window.
pub type ExpiringSoonCallback = Arc<dyn Fn(&SessionStatus) + Send + Sync>;

/// Called with a reason when the session becomes invalid.
pub type SessionInvalidCallback = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// Inner State
// ============================================================================

#[derive(Default)]
struct SessionInner {
    bundle: Option<CredentialBundle>,
    /// Edge state: `needs_refresh` was already reported for this bundle.
    expiring_reported: bool,
    /// Edge state: invalidity was already reported for this bundle.
    invalid_reported: bool,
}

#[derive(Default)]
struct Callbacks {
    expiring_soon: Vec<ExpiringSoonCallback>,
    session_invalid: Vec<SessionInvalidCallback>,
}

// ============================================================================
// Session Manager
// ============================================================================

/// Holds the active credential bundle and derives its status.
pub struct SessionManager {
    inner: RwLock<SessionInner>,
    callbacks: RwLock<Callbacks>,
    required: RequiredCookieNames,
    refresh_threshold: Duration,
    health: HealthThresholds,
    notify: watch::Sender<u64>,
}

impl SessionManager {
    /// Creates an empty manager.
    pub fn new(
        required: RequiredCookieNames,
        refresh_threshold: Duration,
        health: HealthThresholds,
    ) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: RwLock::new(SessionInner::default()),
            callbacks: RwLock::new(Callbacks::default()),
            required,
            refresh_threshold,
            health,
            notify,
        }
    }

    /// Creates an empty manager from configuration.
    pub fn from_config(config: &GrapnelConfig) -> Self {
        Self::new(
            config.platform.required_cookies.clone(),
            config.refresh.threshold(),
            config.health,
        )
    }

    /// Required cookie names.
    pub fn required_cookies(&self) -> &RequiredCookieNames {
        &self.required
    }

    /// Refresh threshold.
    pub fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    // ========================================================================
    // Bundle Access
    // ========================================================================

    /// Replaces the active bundle and resets callback edges.
    pub async fn adopt(&self, bundle: CredentialBundle) {
        let mut inner = self.inner.write().await;
        info!(
            cookies = bundle.cookies.len(),
            expires_at = %bundle.expires_at,
            "Session adopted"
        );
        *inner = SessionInner {
            bundle: Some(bundle),
            ..SessionInner::default()
        };
        drop(inner);
        self.bump();
    }

    /// Returns a copy of the active bundle.
    pub async fn bundle(&self) -> Option<CredentialBundle> {
        self.inner.read().await.bundle.clone()
    }

    /// Returns true if a bundle is loaded.
    pub async fn has_session(&self) -> bool {
        self.inner.read().await.bundle.is_some()
    }

    /// Drops the active bundle. Returns it if there was one.
    pub async fn clear(&self) -> Option<CredentialBundle> {
        let previous = std::mem::take(&mut *self.inner.write().await).bundle;
        if previous.is_some() {
            info!("Session cleared");
            self.bump();
        }
        previous
    }

    /// Loads the persisted bundle for `account`.
    ///
    /// Expired bundles are loaded too; their status reports them invalid.
    pub async fn restore(
        &self,
        store: &CredentialStore,
        account: Option<&str>,
    ) -> Result<SessionStatus, SessionError> {
        match store.load(account).await? {
            Some(bundle) => {
                debug!(account = account.unwrap_or("default"), "Restoring persisted session");
                self.adopt(bundle).await;
            }
            None => debug!(account = account.unwrap_or("default"), "No persisted session"),
        }
        Ok(self.get_status().await)
    }

    /// Receiver bumped on every adopt and clear.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    fn bump(&self) {
        self.notify.send_modify(|v| *v = v.wrapping_add(1));
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Current status.
    pub async fn get_status(&self) -> SessionStatus {
        self.get_status_at(Utc::now()).await
    }

    /// Status at `now`. Fires callbacks on rising edges.
    pub async fn get_status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        let (status, fire_expiring, invalid_reason) = {
            let mut inner = self.inner.write().await;
            let Some(bundle) = inner.bundle.as_ref() else {
                return SessionStatus::no_session();
            };

            let status = self.status_for(bundle, now);

            let fire_expiring = status.needs_refresh && !inner.expiring_reported;
            if fire_expiring {
                inner.expiring_reported = true;
            }

            let invalid_reason = if status.is_valid || inner.invalid_reported {
                None
            } else {
                inner.invalid_reported = true;
                Some(invalid_reason(&status))
            };

            (status, fire_expiring, invalid_reason)
        };

        if fire_expiring {
            self.fire_expiring_soon(&status).await;
        }
        if let Some(reason) = invalid_reason {
            self.fire_session_invalid(&reason).await;
        }
        status
    }

    fn status_for(&self, bundle: &CredentialBundle, now: DateTime<Utc>) -> SessionStatus {
        let report = check_bundle(bundle, &self.required, now, self.refresh_threshold);
        let presence = bundle.presence(&self.required);

        SessionStatus {
            is_valid: !report.is_expired && presence.is_valid,
            health: Health::from_remaining(report.remaining, &self.health),
            remaining: report.remaining,
            needs_refresh: report.needs_refresh,
            expires_at: report.expires_at,
            missing_cookies: presence.missing,
        }
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Registers a callback for entering the refresh window.
    pub async fn on_expiring_soon<F>(&self, callback: F)
    where
        F: Fn(&SessionStatus) + Send + Sync + 'static,
    {
        self.callbacks.write().await.expiring_soon.push(Arc::new(callback));
    }

    /// Registers a callback for the session becoming invalid.
    pub async fn on_session_invalid<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.write().await.session_invalid.push(Arc::new(callback));
    }

    async fn fire_expiring_soon(&self, status: &SessionStatus) {
        let callbacks = self.callbacks.read().await.expiring_soon.clone();
        debug!(count = callbacks.len(), health = %status.health, "Session expiring soon");
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
                warn!("Expiring-soon callback panicked");
            }
        }
    }

    async fn fire_session_invalid(&self, reason: &str) {
        let callbacks = self.callbacks.read().await.session_invalid.clone();
        warn!(reason = %reason, "Session invalid");
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(reason))).is_err() {
                warn!("Session-invalid callback panicked");
            }
        }
    }
}

fn invalid_reason(status: &SessionStatus) -> String {
    if status.is_expired() {
        match status.expires_at {
            Some(at) => format!("session expired at {at}"),
            None => "session expired".to_string(),
        }
    } else {
        format!("missing required cookies: {}", status.missing_cookies.join(", "))
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("refresh_threshold", &self.refresh_threshold)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for SessionManager {
    async fn current_bundle(&self) -> Option<CredentialBundle> {
        self.bundle().await
    }
}

// ============================================================================
// Tests
// ============================================================================
