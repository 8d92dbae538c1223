//! Authenticated API client.
//!
//! Every call follows the same path: check the session carries its required
//! cookies (no network), take a rate-limiter slot, send with the session
//! header set, then map the response through [`decode_json`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use grapnel_core::{CredentialBundle, PlatformConfig};

use crate::classify::{Classification, classify};
use crate::error::FetchError;
use crate::host::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::rate_limit::RateLimiter;

/// Default per-call timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Credential Provider
// ============================================================================

/// Source of the active credential bundle.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the active bundle, if any.
    async fn current_bundle(&self) -> Option<CredentialBundle>;
}

/// A provider that always returns the same bundle.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Option<CredentialBundle>);

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn current_bundle(&self) -> Option<CredentialBundle> {
        self.0.clone()
    }
}

// ============================================================================
// Response Decoding
// ============================================================================

/// Maps a raw response to JSON or a typed error.
///
/// Order: auth rejection, rate limit status, HTML interstitial, other
/// non-success status, empty body, JSON parse.
pub fn decode_json(endpoint: &str, response: &HttpResponse) -> Result<Value, FetchError> {
    if matches!(response.status, 401 | 403) {
        return Err(FetchError::Auth {
            status: response.status,
            endpoint: endpoint.to_string(),
        });
    }

    if response.status == 429 {
        return Err(FetchError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after: response.retry_after(),
        });
    }

    match classify(&response.text) {
        Classification::JsonOk => {}
        Classification::RateLimited => {
            return Err(FetchError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after: response.retry_after(),
            });
        }
        other => return Err(FetchError::html(other, endpoint, &response.text)),
    }

    if !response.is_success() {
        return Err(FetchError::Http {
            status: response.status,
            endpoint: endpoint.to_string(),
        });
    }

    if response.text.trim().is_empty() {
        return Err(FetchError::EmptyResponse(endpoint.to_string()));
    }

    serde_json::from_str(&response.text)
        .map_err(|e| FetchError::Parse(format!("{endpoint}: {e}")))
}

/// Strips the query from a URL for use as an error endpoint label.
fn endpoint_label(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

// ============================================================================
// API Client
// ============================================================================

/// Client for authenticated platform endpoints.
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    credentials: Arc<dyn CredentialProvider>,
    platform: PlatformConfig,
    timeout: Duration,
}

impl ApiClient {
    /// Creates a client.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        credentials: Arc<dyn CredentialProvider>,
        platform: PlatformConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            credentials,
            platform,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Platform surface this client targets.
    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Returns true if a bundle with every required cookie is loaded.
    pub async fn has_usable_session(&self) -> bool {
        self.credentials
            .current_bundle()
            .await
            .is_some_and(|b| b.presence(&self.platform.required_cookies).is_valid)
    }

    /// The fixed header set derived from a bundle.
    pub fn session_headers(&self, bundle: &CredentialBundle) -> Vec<(String, String)> {
        let p = &self.platform;
        let mut headers = vec![
            ("Cookie".to_string(), bundle.cookie_header()),
            (p.app_id_header.clone(), p.app_id.clone()),
            ("Origin".to_string(), p.origin().to_string()),
            ("Referer".to_string(), format!("{}/", p.origin())),
            ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
        ];
        if let Some(csrf) = bundle.csrf_token(&p.required_cookies) {
            headers.push((p.csrf_header.clone(), csrf.to_string()));
        }
        headers
    }

    async fn usable_bundle(&self) -> Result<CredentialBundle, FetchError> {
        let bundle = self
            .credentials
            .current_bundle()
            .await
            .ok_or_else(|| FetchError::Validation("no active session".to_string()))?;

        let presence = bundle.presence(&self.platform.required_cookies);
        if !presence.is_valid {
            return Err(FetchError::Validation(format!(
                "missing required cookies: {}",
                presence.missing.join(", ")
            )));
        }
        Ok(bundle)
    }

    async fn execute(&self, endpoint: &str, request: HttpRequest) -> Result<Value, FetchError> {
        let bundle = self.usable_bundle().await?;

        let waited = self.limiter.acquire().await;
        if !waited.is_zero() {
            debug!(waited = ?waited, "Rate limiter delayed call");
        }

        let request = self
            .session_headers(&bundle)
            .into_iter()
            .fold(request, |req, (k, v)| req.header(k, v))
            .timeout(self.timeout);

        let response = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        decode_json(endpoint, &response).inspect_err(|e| {
            warn!(endpoint = %endpoint, status = response.status, error = %e, "API call failed");
        })
    }

    /// Authenticated GET returning raw JSON.
    #[instrument(skip(self, query), fields(endpoint = %endpoint_label(path)))]
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        let request = HttpRequest::get(self.platform.url(path)).query(query);
        self.execute(endpoint_label(path), request).await
    }

    /// Authenticated form POST returning raw JSON.
    #[instrument(skip(self, form), fields(endpoint = %endpoint_label(path)))]
    pub async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let form = form
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let request = HttpRequest::post_form(self.platform.url(path), form);
        self.execute(endpoint_label(path), request).await
    }

    /// Authenticated GET deserialized into `T`.
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let value = self.get(path, query).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Authenticated form POST deserialized into `T`.
    pub async fn post_form_with<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let value = self.post_form(path, form).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.platform.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Replays canned responses and records requests.
    struct ScriptedTransport {
        responses: Mutex<Vec<HttpResponse>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(TransportError::Connect("no script".into()));
            }
            Ok(responses.remove(0))
        }
    }

    fn bundle(names: &[&str]) -> CredentialBundle {
        let cookies: BTreeMap<String, String> = names
            .iter()
            .map(|n| ((*n).to_string(), format!("{n}-v")))
            .collect();
        let now = Utc::now();
        CredentialBundle::new(cookies, now, now + chrono::Duration::days(30)).unwrap()
    }

    fn client(transport: Arc<ScriptedTransport>, bundle: Option<CredentialBundle>) -> ApiClient {
        ApiClient::new(
            transport,
            Arc::new(RateLimiter::with_limits(100, Duration::from_secs(60), Duration::ZERO)),
            Arc::new(StaticCredentials(bundle)),
            PlatformConfig::default(),
        )
    }

    const FULL: &[&str] = &["sessionid", "csrftoken", "ds_user_id", "rur"];

    #[tokio::test]
    async fn test_missing_cookies_fail_before_network() {
        let transport = ScriptedTransport::new(vec![HttpResponse::new(200, "{}")]);
        let api = client(Arc::clone(&transport), Some(bundle(&["sessionid"])));

        let err = api.get("/api/v1/x/", &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::Validation(ref m) if m.contains("csrftoken")));
        assert!(transport.requests().is_empty());

        let api = client(Arc::clone(&transport), None);
        assert!(matches!(
            api.get("/api/v1/x/", &[]).await,
            Err(FetchError::Validation(_))
        ));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_session_headers_sent() {
        let transport = ScriptedTransport::new(vec![HttpResponse::new(200, r#"{"ok": true}"#)]);
        let api = client(Arc::clone(&transport), Some(bundle(FULL)));

        let value = api.get("/api/v1/x/", &[("q", "cats")]).await.unwrap();
        assert_eq!(value["ok"], true);

        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://www.platform.example/api/v1/x/");
        assert_eq!(request.query, vec![("q".to_string(), "cats".to_string())]);
        let header = |name: &str| {
            request
                .headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(header("X-CSRFToken").as_deref(), Some("csrftoken-v"));
        assert_eq!(header("X-App-ID").as_deref(), Some("936619743392459"));
        assert!(header("Cookie").unwrap().contains("sessionid=sessionid-v"));
        assert_eq!(header("Origin").as_deref(), Some("https://www.platform.example"));
    }

    fn label(err: &FetchError) -> String {
        match err {
            FetchError::Auth { status, .. } => format!("auth {status}"),
            FetchError::RateLimited { retry_after, .. } => {
                format!("rate {}", retry_after.map_or(0, |d| d.as_secs()))
            }
            FetchError::HtmlResponse { classification, .. } => format!("html {classification}"),
            FetchError::Http { status, .. } => format!("http {status}"),
            FetchError::EmptyResponse(_) => "empty".to_string(),
            FetchError::Parse(_) => "parse".to_string(),
            other => format!("other {other}"),
        }
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (HttpResponse::new(401, ""), "auth 401"),
            (HttpResponse::new(403, "{}"), "auth 403"),
            (HttpResponse::new(429, "").with_header("Retry-After", "12"), "rate 12"),
            (HttpResponse::new(500, "{}"), "http 500"),
            (HttpResponse::new(200, "  "), "empty"),
            (HttpResponse::new(200, "{not json"), "parse"),
            (HttpResponse::new(200, "<html>Please wait, too many requests</html>"), "rate 0"),
            (HttpResponse::new(200, "<!DOCTYPE html><html>captcha</html>"), "html captcha"),
            (HttpResponse::new(502, "<html><body>Bad gateway</body></html>"), "html unknown_html"),
        ];

        for (response, expected) in cases {
            let err = decode_json("/e", &response).unwrap_err();
            assert_eq!(label(&err), expected, "status {}", response.status);
        }
    }

    #[tokio::test]
    async fn test_html_error_carries_endpoint_and_snippet() {
        let body = format!("<html>login {}</html>", "x".repeat(1000));
        let transport = ScriptedTransport::new(vec![HttpResponse::new(200, body)]);
        let api = client(transport, Some(bundle(FULL)));

        match api.get("/api/v1/media/1/info/?a=b", &[]).await {
            Err(FetchError::HtmlResponse {
                classification,
                endpoint,
                snippet,
            }) => {
                assert_eq!(classification, Classification::LoginRequired);
                assert_eq!(endpoint, "/api/v1/media/1/info/");
                assert_eq!(snippet.len(), 500);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_form_and_typed_decode() {
        #[derive(serde::Deserialize)]
        struct Status {
            status: String,
        }

        let transport = ScriptedTransport::new(vec![HttpResponse::new(200, r#"{"status": "ok"}"#)]);
        let api = client(Arc::clone(&transport), Some(bundle(FULL)));

        let status: Status = api.post_form_with("/api/v1/y/", &[("a", "1")]).await.unwrap();
        assert_eq!(status.status, "ok");
        assert_eq!(transport.requests()[0].form, vec![("a".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let transport = ScriptedTransport::new(Vec::new());
        let api = client(transport, Some(bundle(FULL)));
        let err = api.get("/x", &[]).await.unwrap_err();
        assert!(err.is_transient());
    }
}
