//! Live session validation.
//!
//! Local expiry says nothing about whether the platform still accepts the
//! cookies. [`SessionValidator::validate`] sends one cheap authenticated
//! profile lookup, after a network-free presence check has passed.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use grapnel_core::{CookiePresence, CredentialBundle, PlatformConfig, PlatformEndpoints};
use grapnel_fetch::{ApiClient, FetchError, HttpTransport, RateLimiter, StaticCredentials};
use grapnel_store::CredentialStore;

/// Outcome of a live validation.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// The platform accepted the session.
    Valid,
    /// The session is unusable.
    Invalid(String),
    /// The probe could not decide (network trouble, rate limiting).
    Inconclusive(FetchError),
}

impl ValidationOutcome {
    /// Returns true for [`ValidationOutcome::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Confirms remote acceptance of a credential bundle.
pub struct SessionValidator {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    platform: PlatformConfig,
    store: Option<(CredentialStore, Option<String>)>,
}

impl SessionValidator {
    /// Creates a validator sharing the caller's transport and rate limiter.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        platform: PlatformConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            platform,
            store: None,
        }
    }

    /// Records successful validations in the persisted document for `account`.
    #[must_use]
    pub fn with_store(mut self, store: CredentialStore, account: Option<String>) -> Self {
        self.store = Some((store, account));
        self
    }

    /// Network-free check that every required cookie is present.
    pub fn validate_cookie_presence(&self, bundle: &CredentialBundle) -> CookiePresence {
        bundle.presence(&self.platform.required_cookies)
    }

    /// Probes the platform with the bundle.
    #[instrument(skip(self, bundle))]
    pub async fn validate(&self, bundle: &CredentialBundle) -> ValidationOutcome {
        let presence = self.validate_cookie_presence(bundle);
        if !presence.is_valid {
            debug!(missing = ?presence.missing, "Presence check failed, skipping probe");
            return ValidationOutcome::Invalid(format!(
                "missing required cookies: {}",
                presence.missing.join(", ")
            ));
        }

        let Some(user_id) = bundle.user_id(&self.platform.required_cookies) else {
            return ValidationOutcome::Invalid("no user id cookie".to_string());
        };
        let path = PlatformEndpoints::render(
            &self.platform.endpoints.profile_probe,
            "user_id",
            user_id,
        );

        let client = ApiClient::new(
            self.transport.clone(),
            self.limiter.clone(),
            Arc::new(StaticCredentials(Some(bundle.clone()))),
            self.platform.clone(),
        );

        match client.get(&path, &[]).await {
            Ok(_) => {
                info!("Session accepted by platform");
                self.record_validation().await;
                ValidationOutcome::Valid
            }
            Err(err) => classify_failure(err),
        }
    }

    async fn record_validation(&self) {
        let Some((store, account)) = &self.store else {
            return;
        };
        match store.mark_validated(account.as_deref(), Utc::now()).await {
            Ok(true) => {}
            Ok(false) => debug!("No persisted document to mark validated"),
            Err(e) => warn!(error = %e, "Failed to record validation"),
        }
    }
}

/// Rejections are definitive; anything else leaves the question open.
fn classify_failure(err: FetchError) -> ValidationOutcome {
    match err {
        FetchError::Auth { status, .. } => {
            ValidationOutcome::Invalid(format!("session rejected (HTTP {status})"))
        }
        FetchError::Validation(msg) => ValidationOutcome::Invalid(msg),
        err if err.is_blocked_content() => {
            warn!(error = %err, "Probe hit an interstitial");
            ValidationOutcome::Invalid(err.user_message())
        }
        err => {
            warn!(error = %err, "Probe inconclusive");
            ValidationOutcome::Inconclusive(err)
        }
    }
}

impl std::fmt::Debug for SessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionValidator")
            .field("base_url", &self.platform.base_url)
            .field("records_validation", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grapnel_fetch::{HttpRequest, HttpResponse, TransportError};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedTransport {
        response: Result<HttpResponse, TransportError>,
        urls: Mutex<Vec<String>>,
    }

    impl FixedTransport {
        fn new(response: Result<HttpResponse, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                urls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for FixedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.urls.lock().unwrap().push(request.url);
            self.response.clone()
        }
    }

    fn bundle(names: &[&str]) -> CredentialBundle {
        let cookies: BTreeMap<String, String> = names
            .iter()
            .map(|n| ((*n).to_string(), "42".to_string()))
            .collect();
        let now = Utc::now();
        CredentialBundle::new(cookies, now, now + chrono::Duration::days(30)).unwrap()
    }

    fn full() -> CredentialBundle {
        bundle(&["sessionid", "csrftoken", "ds_user_id", "rur"])
    }

    fn validator(transport: Arc<FixedTransport>) -> SessionValidator {
        SessionValidator::new(
            transport,
            Arc::new(RateLimiter::with_limits(10, Duration::from_secs(60), Duration::ZERO)),
            PlatformConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_presence_failure_skips_network() {
        let transport = FixedTransport::new(Ok(HttpResponse::new(200, "{}")));
        let v = validator(transport.clone());

        let outcome = v.validate(&bundle(&["sessionid"])).await;
        assert!(matches!(outcome, ValidationOutcome::Invalid(ref m) if m.contains("rur")));
        assert!(transport.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_valid_probe_hits_profile_endpoint() {
        let transport = FixedTransport::new(Ok(HttpResponse::new(200, r#"{"user":{}}"#)));
        let v = validator(transport.clone());

        assert!(v.validate(&full()).await.is_valid());
        assert!(transport.urls.lock().unwrap()[0].ends_with("/api/v1/users/42/info/"));
    }

    #[tokio::test]
    async fn test_auth_rejection_is_invalid() {
        let v = validator(FixedTransport::new(Ok(HttpResponse::new(403, ""))));
        assert!(matches!(v.validate(&full()).await, ValidationOutcome::Invalid(_)));
    }

    #[tokio::test]
    async fn test_login_wall_is_invalid() {
        let v = validator(FixedTransport::new(Ok(HttpResponse::new(
            200,
            "<!DOCTYPE html><html>Log in to continue</html>",
        ))));
        assert!(matches!(v.validate(&full()).await, ValidationOutcome::Invalid(_)));
    }

    #[tokio::test]
    async fn test_network_failure_is_inconclusive() {
        let v = validator(FixedTransport::new(Err(TransportError::Timeout)));
        assert!(matches!(
            v.validate(&full()).await,
            ValidationOutcome::Inconclusive(FetchError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_success_marks_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        store.save(Some("alice"), &full()).await.unwrap();

        let v = validator(FixedTransport::new(Ok(HttpResponse::new(200, "{}"))))
            .with_store(store.clone(), Some("alice".to_string()));
        assert!(v.validate(&full()).await.is_valid());

        let doc = store.load_document(Some("alice")).await.unwrap().unwrap();
        assert!(doc.last_validated_at.is_some());
    }
}
