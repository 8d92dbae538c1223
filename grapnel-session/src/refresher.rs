//! Session refresh.
//!
//! [`SessionRefresher`] renews the active bundle. Each attempt tries a
//! silent token refresh first and falls back to an automated browser login
//! (with two-factor resolution). The state machine is
//! `idle -> scheduled -> refreshing -> {succeeded, failed}`, and `failed`
//! may be scheduled again.
//!
//! Two guards apply to [`SessionRefresher::refresh_now`]:
//!
//! - only one refresh runs at a time; a concurrent call fails immediately
//! - a minimum interval must pass since the last attempt, unless it failed
//!
//! Scheduling never starts a timer. [`SessionRefresher::schedule_refresh`]
//! reports when the next refresh is due and an external scheduler calls
//! back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use grapnel_core::{CookieRecord, CredentialBundle, PlatformConfig, RefreshConfig};
use grapnel_fetch::{
    BrowserLauncher, BrowserSession, FetchError, HttpRequest, HttpTransport, RetryPolicy,
    SecretStore, classify, panic_message,
};
use grapnel_store::CredentialStore;

use crate::error::{SessionError, TwoFactorError};
use crate::manager::SessionManager;
use crate::two_factor::TwoFactorResolver;

/// Capacity of the refresh event channel.
const EVENT_CAPACITY: usize = 32;

/// Timeout for the silent refresh request.
const SILENT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// State, Events, Results
// ============================================================================

/// Refresher state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshState {
    /// Nothing planned.
    #[default]
    Idle,
    /// A refresh is due later.
    Scheduled,
    /// A refresh is running.
    Refreshing,
    /// The last refresh succeeded.
    Succeeded,
    /// The last refresh failed.
    Failed,
}

/// How a bundle was renewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMethod {
    /// Cookies renewed by a plain request.
    Silent,
    /// Fresh login through the browser.
    Relogin,
}

impl fmt::Display for RefreshMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => f.write_str("silent"),
            Self::Relogin => f.write_str("relogin"),
        }
    }
}

/// Refresh lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// A refresh was planned.
    Scheduled {
        /// When it is due.
        at: DateTime<Utc>,
        /// True if it runs right away.
        immediate: bool,
    },
    /// A refresh started.
    Started {
        /// Start time.
        at: DateTime<Utc>,
    },
    /// One attempt failed; another may follow.
    AttemptFailed {
        /// 1-based attempt number.
        attempt: u32,
        /// Error message.
        error: String,
    },
    /// The bundle was renewed and adopted.
    Succeeded {
        /// Renewal path.
        method: RefreshMethod,
        /// New expiry.
        expires_at: DateTime<Utc>,
        /// Attempts beyond the first.
        retries_used: u32,
    },
    /// Every attempt failed.
    Failed {
        /// Error of the last attempt.
        error: String,
        /// Attempts beyond the first.
        retries_used: u32,
    },
}

/// Result of [`SessionRefresher::refresh_now`].
#[derive(Debug)]
pub struct RefreshResult {
    /// True if a new bundle was adopted.
    pub success: bool,
    /// Renewal path, on success.
    pub method: Option<RefreshMethod>,
    /// Failure, if any.
    pub error: Option<SessionError>,
    /// Attempts beyond the first.
    pub retries_used: u32,
    /// Time spent.
    pub duration: Duration,
}

impl RefreshResult {
    fn rejected(error: SessionError) -> Self {
        Self {
            success: false,
            method: None,
            error: Some(error),
            retries_used: 0,
            duration: Duration::ZERO,
        }
    }
}

/// Result of [`SessionRefresher::schedule_refresh`].
#[derive(Debug)]
pub enum ScheduleDecision {
    /// The session needed renewal now; the refresh already ran.
    Immediate(RefreshResult),
    /// The refresh is due at this time.
    ScheduledAt(DateTime<Utc>),
    /// The session never expires.
    NotNeeded,
}

// ============================================================================
// Silent Refresh
// ============================================================================

/// Renews a bundle without a browser.
#[async_trait]
pub trait SilentRefresh: Send + Sync {
    /// Returns a renewed bundle.
    async fn refresh(&self, current: &CredentialBundle) -> Result<CredentialBundle, SessionError>;
}

/// Requests the refresh page with the current cookies and harvests the
/// `Set-Cookie` headers of the response.
pub struct HttpSilentRefresh {
    http: Arc<dyn HttpTransport>,
    platform: PlatformConfig,
    lifetime: chrono::Duration,
}

impl HttpSilentRefresh {
    /// Creates a silent refresher. `lifetime` applies when no renewed
    /// required cookie carries an expiry.
    pub fn new(
        http: Arc<dyn HttpTransport>,
        platform: PlatformConfig,
        lifetime: chrono::Duration,
    ) -> Self {
        Self {
            http,
            platform,
            lifetime,
        }
    }
}

/// Overlays renewed cookies on the current set. Cleared cookies are dropped.
fn merge_cookies(current: &CredentialBundle, renewed: Vec<CookieRecord>) -> Vec<CookieRecord> {
    let mut merged: BTreeMap<String, CookieRecord> = match &current.records {
        Some(records) => records.iter().map(|r| (r.name.clone(), r.clone())).collect(),
        None => current
            .cookies
            .iter()
            .map(|(name, value)| (name.clone(), CookieRecord::new(name, value)))
            .collect(),
    };

    for record in renewed {
        if record.value.is_empty() {
            merged.remove(&record.name);
        } else {
            merged.insert(record.name.clone(), record);
        }
    }
    merged.into_values().collect()
}

#[async_trait]
impl SilentRefresh for HttpSilentRefresh {
    async fn refresh(&self, current: &CredentialBundle) -> Result<CredentialBundle, SessionError> {
        let endpoint = self.platform.endpoints.token_refresh.as_str();
        let request = HttpRequest::get(self.platform.url(endpoint))
            .header("Cookie", current.cookie_header())
            .header("Referer", format!("{}/", self.platform.origin()))
            .timeout(SILENT_REFRESH_TIMEOUT);

        let response = self.http.send(request).await.map_err(FetchError::from)?;

        match response.status {
            401 | 403 => {
                return Err(FetchError::Auth {
                    status: response.status,
                    endpoint: endpoint.to_string(),
                }
                .into());
            }
            429 => {
                return Err(FetchError::RateLimited {
                    endpoint: endpoint.to_string(),
                    retry_after: response.retry_after(),
                }
                .into());
            }
            s if !response.is_success() && !(300..400).contains(&s) => {
                return Err(FetchError::Http {
                    status: s,
                    endpoint: endpoint.to_string(),
                }
                .into());
            }
            _ => {}
        }

        let now = Utc::now();
        let renewed = response.set_cookies(now);
        if renewed.is_empty() {
            let classification = classify(&response.text);
            if classification.is_blocked() {
                return Err(FetchError::html(classification, endpoint, &response.text).into());
            }
            return Err(SessionError::NotRenewed("no Set-Cookie headers".to_string()));
        }
        debug!(renewed = renewed.len(), "Harvested renewed cookies");

        let required = &self.platform.required_cookies;
        let mut bundle = CredentialBundle::from_cookie_records(
            merge_cookies(current, renewed),
            now,
            self.lifetime,
            required,
        )?;

        let presence = bundle.presence(required);
        if !presence.is_valid {
            return Err(SessionError::MissingCookies(presence.missing));
        }

        bundle.last_refreshed_at = Some(now);
        bundle.username.clone_from(&current.username);
        Ok(bundle)
    }
}

impl fmt::Debug for HttpSilentRefresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSilentRefresh")
            .field("endpoint", &self.platform.endpoints.token_refresh)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Browser Re-login
// ============================================================================

/// Logs in through a browser with credentials from the secret store.
pub struct BrowserRelogin {
    launcher: Arc<dyn BrowserLauncher>,
    secrets: Arc<dyn SecretStore>,
    account: String,
    platform: PlatformConfig,
    two_factor: Arc<TwoFactorResolver>,
    lifetime: chrono::Duration,
}

impl BrowserRelogin {
    /// Creates a re-login flow for `account`.
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        secrets: Arc<dyn SecretStore>,
        account: impl Into<String>,
        platform: PlatformConfig,
        two_factor: Arc<TwoFactorResolver>,
        lifetime: chrono::Duration,
    ) -> Self {
        Self {
            launcher,
            secrets,
            account: account.into(),
            platform,
            two_factor,
            lifetime,
        }
    }

    /// Runs the login and harvests the cookie jar.
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn login(&self) -> Result<CredentialBundle, SessionError> {
        let (username, password) = self
            .secrets
            .login_credentials(&self.account)
            .await?
            .ok_or_else(|| SessionError::NoLoginCredentials(self.account.clone()))?;

        let page = self.launcher.launch().await?;
        let selectors = &self.platform.login;
        let wait = selectors.wait_timeout();

        page.goto(&self.platform.url(&self.platform.endpoints.login))
            .await?;
        page.wait_for_selector(&selectors.username, wait).await?;
        page.fill(&selectors.username, &username).await?;
        page.fill(&selectors.password, &password).await?;
        page.click(&selectors.submit).await?;
        debug!("Credentials submitted");

        if !page.is_present(&selectors.logged_in_marker, wait).await {
            self.pass_challenge(page.as_ref()).await?;
        }

        let records = page.read_cookies().await?;
        let now = Utc::now();
        let required = &self.platform.required_cookies;
        let mut bundle =
            CredentialBundle::from_cookie_records(records, now, self.lifetime, required)?
                .with_username(username);

        let presence = bundle.presence(required);
        if !presence.is_valid {
            return Err(SessionError::MissingCookies(presence.missing));
        }

        bundle.last_refreshed_at = Some(now);
        info!(cookies = bundle.cookies.len(), "Logged in");
        Ok(bundle)
    }

    async fn pass_challenge(&self, page: &dyn BrowserSession) -> Result<(), SessionError> {
        let text = page.content().await?;
        let url = page.current_url().await?;

        let Some(challenge) = self.two_factor.detect(&text, &url) else {
            return Err(SessionError::LoginFailed(format!(
                "no logged-in marker after submit (at {url})"
            )));
        };
        info!(method = %challenge.method, "Two-factor challenge detected");

        let selectors = &self.platform.login;
        let wait = selectors.wait_timeout();
        let outcome = self
            .two_factor
            .handle_challenge(&challenge, |code| async move {
                let browser = |e: grapnel_fetch::BrowserError| TwoFactorError::Rejected(e.to_string());
                page.wait_for_selector(&selectors.code_input, wait)
                    .await
                    .map_err(browser)?;
                page.fill(&selectors.code_input, &code).await.map_err(browser)?;
                page.click(&selectors.code_submit).await.map_err(browser)?;
                if page.is_present(&selectors.logged_in_marker, wait).await {
                    Ok(())
                } else {
                    Err(TwoFactorError::Rejected("code not accepted".to_string()))
                }
            })
            .await;

        match outcome.error {
            None => Ok(()),
            Some(e) => Err(e.into()),
        }
    }
}

impl fmt::Debug for BrowserRelogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserRelogin")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Refresher
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct LastAttempt {
    at: DateTime<Utc>,
    succeeded: bool,
}

/// Clears the in-progress flag when a refresh ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Errors that another attempt cannot fix.
fn is_permanent(err: &SessionError) -> bool {
    match err {
        SessionError::NoRefreshMethod
        | SessionError::NoSession
        | SessionError::NoLoginCredentials(_)
        | SessionError::Keychain(_) => true,
        SessionError::TwoFactor(e) => !e.is_retryable(),
        _ => false,
    }
}

/// Renews the active credential bundle.
pub struct SessionRefresher {
    manager: Arc<SessionManager>,
    config: RefreshConfig,
    store: Option<CredentialStore>,
    account: Option<String>,
    silent: Option<Arc<dyn SilentRefresh>>,
    relogin: Option<BrowserRelogin>,
    in_progress: AtomicBool,
    state: RwLock<RefreshState>,
    last_attempt: RwLock<Option<LastAttempt>>,
    events: broadcast::Sender<RefreshEvent>,
}

impl SessionRefresher {
    /// Creates a refresher with no renewal paths.
    pub fn new(manager: Arc<SessionManager>, config: RefreshConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            manager,
            config,
            store: None,
            account: None,
            silent: None,
            relogin: None,
            in_progress: AtomicBool::new(false),
            state: RwLock::new(RefreshState::Idle),
            last_attempt: RwLock::new(None),
            events,
        }
    }

    /// Persists renewed bundles for `account`.
    #[must_use]
    pub fn with_store(mut self, store: CredentialStore, account: Option<String>) -> Self {
        self.store = Some(store);
        self.account = account;
        self
    }

    /// Adds the silent refresh path.
    #[must_use]
    pub fn with_silent(mut self, silent: Arc<dyn SilentRefresh>) -> Self {
        self.silent = Some(silent);
        self
    }

    /// Adds the browser re-login path.
    #[must_use]
    pub fn with_relogin(mut self, relogin: BrowserRelogin) -> Self {
        self.relogin = Some(relogin);
        self
    }

    /// Current state.
    pub async fn state(&self) -> RefreshState {
        *self.state.read().await
    }

    /// Start time of the last attempt.
    pub async fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        (*self.last_attempt.read().await).map(|a| a.at)
    }

    /// Event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RefreshEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn set_state(&self, state: RefreshState) {
        *self.state.write().await = state;
    }

    /// Earliest time the next refresh may start, if restricted.
    pub async fn next_allowed(&self) -> Option<DateTime<Utc>> {
        let last = (*self.last_attempt.read().await)?;
        if !last.succeeded {
            return None;
        }
        let interval = chrono::Duration::from_std(self.config.min_interval()).ok()?;
        last.at.checked_add_signed(interval)
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Refreshes now if the session is expired or inside the refresh window,
    /// otherwise reports when the refresh is due.
    pub async fn schedule_refresh(&self) -> ScheduleDecision {
        let status = self.manager.get_status().await;
        let now = Utc::now();

        if status.is_expired() || status.needs_refresh {
            info!(health = %status.health, "Session needs refresh now");
            // refresh_now owns the state; a guard rejection must not change it.
            self.emit(RefreshEvent::Scheduled {
                at: now,
                immediate: true,
            });
            return ScheduleDecision::Immediate(self.refresh_now().await);
        }

        let Some(remaining) = status.remaining else {
            debug!("Session never expires, nothing to schedule");
            return ScheduleDecision::NotNeeded;
        };

        let lead = remaining.saturating_sub(self.manager.refresh_threshold());
        let Some(at) = chrono::Duration::from_std(lead)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
        else {
            return ScheduleDecision::NotNeeded;
        };

        self.set_state(RefreshState::Scheduled).await;
        self.emit(RefreshEvent::Scheduled {
            at,
            immediate: false,
        });
        info!(at = %at, "Refresh scheduled");
        ScheduleDecision::ScheduledAt(at)
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Runs a refresh. Never fails; the outcome is in the result.
    #[instrument(skip(self))]
    pub async fn refresh_now(&self) -> RefreshResult {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Refresh already in progress");
            return RefreshResult::rejected(SessionError::AlreadyInProgress);
        }
        let _in_flight = InFlight(&self.in_progress);

        let started_at = Utc::now();
        if let Some(next_allowed) = self.next_allowed().await {
            if started_at < next_allowed {
                debug!(next_allowed = %next_allowed, "Refresh too soon");
                return RefreshResult::rejected(SessionError::TooSoon { next_allowed });
            }
        }

        let started = Instant::now();
        self.set_state(RefreshState::Refreshing).await;
        self.emit(RefreshEvent::Started { at: started_at });
        info!("Refresh started");

        let policy = RetryPolicy::fixed(
            self.config.max_retries.saturating_add(1),
            self.config.retry_delay(),
        );
        let outcome = policy
            .run(|attempt| self.attempt(attempt), |e| !is_permanent(e))
            .await;
        let retries_used = outcome.attempts.saturating_sub(1);

        *self.last_attempt.write().await = Some(LastAttempt {
            at: started_at,
            succeeded: outcome.result.is_ok(),
        });

        match outcome.result {
            Ok((bundle, method)) => {
                let expires_at = bundle.expires_at;
                self.persist(&bundle).await;
                self.manager.adopt(bundle).await;
                self.set_state(RefreshState::Succeeded).await;
                self.emit(RefreshEvent::Succeeded {
                    method,
                    expires_at,
                    retries_used,
                });
                info!(method = %method, retries_used, expires_at = %expires_at, "Refresh succeeded");

                RefreshResult {
                    success: true,
                    method: Some(method),
                    error: None,
                    retries_used,
                    duration: started.elapsed(),
                }
            }
            Err(err) => {
                self.set_state(RefreshState::Failed).await;
                self.emit(RefreshEvent::Failed {
                    error: err.to_string(),
                    retries_used,
                });
                error!(error = %err, retries_used, "Refresh failed");

                RefreshResult {
                    success: false,
                    method: None,
                    error: Some(err),
                    retries_used,
                    duration: started.elapsed(),
                }
            }
        }
    }

    async fn attempt(&self, attempt: u32) -> Result<(CredentialBundle, RefreshMethod), SessionError> {
        let result = AssertUnwindSafe(self.attempt_once())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SessionError::Panicked(panic_message(panic.as_ref()))));

        if let Err(e) = &result {
            warn!(attempt, error = %e, "Refresh attempt failed");
            self.emit(RefreshEvent::AttemptFailed {
                attempt,
                error: e.to_string(),
            });
        }
        result
    }

    async fn attempt_once(&self) -> Result<(CredentialBundle, RefreshMethod), SessionError> {
        let mut last_error = None;

        if let Some(silent) = &self.silent {
            match self.manager.bundle().await {
                Some(current) => match silent.refresh(&current).await {
                    Ok(bundle) => return Ok((bundle, RefreshMethod::Silent)),
                    Err(e) => {
                        debug!(error = %e, "Silent refresh failed");
                        last_error = Some(e);
                    }
                },
                None => last_error = Some(SessionError::NoSession),
            }
        }

        if let Some(relogin) = &self.relogin {
            return relogin
                .login()
                .await
                .map(|bundle| (bundle, RefreshMethod::Relogin));
        }

        Err(last_error.unwrap_or(SessionError::NoRefreshMethod))
    }

    /// Saves the renewed bundle. A failed save is logged and the bundle is
    /// still adopted.
    async fn persist(&self, bundle: &CredentialBundle) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(self.account.as_deref(), bundle).await {
            error!(error = %e, "Failed to persist refreshed session");
        }
    }
}

impl fmt::Debug for SessionRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRefresher")
            .field("config", &self.config)
            .field("silent", &self.silent.is_some())
            .field("relogin", &self.relogin.is_some())
            .field("in_progress", &self.in_progress.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_with_records(records: Vec<CookieRecord>) -> CredentialBundle {
        let now = Utc::now();
        CredentialBundle::from_cookie_records(
            records,
            now,
            chrono::Duration::days(90),
            &grapnel_core::RequiredCookieNames::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_merge_overrides_and_removes() {
        let current = bundle_with_records(vec![
            CookieRecord::new("sessionid", "old"),
            CookieRecord::new("csrftoken", "c"),
            CookieRecord::new("tracking", "t"),
        ]);
        let merged = merge_cookies(
            &current,
            vec![CookieRecord::new("sessionid", "new"), CookieRecord::new("tracking", "")],
        );

        let names: Vec<(&str, &str)> = merged
            .iter()
            .map(|r| (r.name.as_str(), r.value.as_str()))
            .collect();
        assert_eq!(names, vec![("csrftoken", "c"), ("sessionid", "new")]);
    }

    #[test]
    fn test_merge_without_records_uses_cookie_map() {
        let now = Utc::now();
        let cookies = [("sessionid", "s"), ("rur", "r")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let current = CredentialBundle::new(cookies, now, now + chrono::Duration::days(1)).unwrap();

        let merged = merge_cookies(&current, vec![CookieRecord::new("rur", "r2")]);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|r| r.name == "rur" && r.value == "r2"));
    }

    #[test]
    fn test_permanent_errors() {
        assert!(is_permanent(&SessionError::NoRefreshMethod));
        assert!(is_permanent(&SessionError::TwoFactor(TwoFactorError::NoBackupCodes)));
        assert!(!is_permanent(&SessionError::TwoFactor(TwoFactorError::Rejected(
            "x".into()
        ))));
        assert!(!is_permanent(&SessionError::LoginFailed("x".into())));
    }
}
