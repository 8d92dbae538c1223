//! HTTP transport boundary.
//!
//! Everything above this module talks to the network through
//! [`HttpTransport`], a single `send` primitive returning status, headers and
//! body text. [`ReqwestTransport`] is the production implementation; tests
//! substitute scripted fakes.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::{debug, instrument};

use grapnel_core::CookieRecord;

use crate::error::TransportError;

/// Default request timeout when a request sets none.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Request / Response
// ============================================================================

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST with a form body.
    Post,
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
    /// Headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Form fields for POST.
    pub form: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            form: Vec::new(),
            timeout: None,
        }
    }

    /// Creates a form POST request.
    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            form,
            ..Self::get(url)
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds query parameters.
    #[must_use]
    pub fn query(mut self, params: &[(&str, &str)]) -> Self {
        self.query
            .extend(params.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Headers as received. Repeated headers appear once per value.
    pub headers: Vec<(String, String)>,
    /// Body decoded as text.
    pub text: String,
}

impl HttpResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            text: text.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }

    /// Every value of a header, case-insensitive.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The `Retry-After` header, when given in seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Cookies set by this response.
    pub fn set_cookies(&self, now: DateTime<Utc>) -> Vec<CookieRecord> {
        self.header_values("set-cookie")
            .into_iter()
            .filter_map(|h| parse_set_cookie(h, now))
            .collect()
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Generic HTTP primitive.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and reads the whole body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ============================================================================
// Reqwest Transport
// ============================================================================

/// [`HttpTransport`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("client build failed: {e}")))?;

        Ok(Self { inner: client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { inner: client }
    }

    /// Returns the inner reqwest client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut builder = self.inner.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.method == HttpMethod::Post {
            builder = builder.form(&request.form);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let text = response.text().await?;

        debug!(status, bytes = text.len(), "Response received");
        Ok(HttpResponse {
            status,
            headers,
            text,
        })
    }
}

// ============================================================================
// Set-Cookie Parsing
// ============================================================================

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    // Netscape form: "Wed, 21-Oct-2026 07:28:00 GMT"
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parses one `Set-Cookie` header value.
///
/// `Max-Age` takes precedence over `Expires`. Returns `None` when the header
/// has no `name=value` pair.
pub fn parse_set_cookie(header: &str, now: DateTime<Utc>) -> Option<CookieRecord> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut record = CookieRecord::new(name, value.trim().trim_matches('"'));
    let mut max_age: Option<i64> = None;

    for attr in parts {
        let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
        let val = val.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "expires" => record.expires = parse_http_date(val),
            "max-age" => max_age = val.parse().ok(),
            "domain" => record.domain = val.to_string(),
            "path" if !val.is_empty() => record.path = val.to_string(),
            "secure" => record.secure = true,
            "httponly" => record.http_only = true,
            _ => {}
        }
    }

    // An out-of-range Max-Age is ignored and Expires (if any) stands.
    if let Some(expires) = max_age
        .and_then(|secs| ChronoDuration::try_seconds(secs.max(0)))
        .and_then(|delta| now.checked_add_signed(delta))
    {
        record.expires = Some(expires);
    }

    Some(record)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_set_cookie_expires() {
        let now = Utc::now();
        let record = parse_set_cookie(
            "sessionid=abc%3A123; Domain=.platform.example; expires=Wed, 21 Oct 2026 07:28:00 GMT; \
             HttpOnly; Path=/; Secure",
            now,
        )
        .unwrap();

        assert_eq!(record.name, "sessionid");
        assert_eq!(record.value, "abc%3A123");
        assert_eq!(record.domain, ".platform.example");
        assert!(record.secure);
        assert!(record.http_only);
        assert_eq!(
            record.expires,
            Some(Utc.with_ymd_and_hms(2026, 10, 21, 7, 28, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_set_cookie_netscape_date() {
        let record = parse_set_cookie(
            "rur=\"LLA\"; expires=Thu, 22-Oct-2026 10:00:00 GMT",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.value, "LLA");
        assert_eq!(
            record.expires,
            Some(Utc.with_ymd_and_hms(2026, 10, 22, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_max_age_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record = parse_set_cookie(
            "csrftoken=x; Max-Age=3600; expires=Wed, 21 Oct 2026 07:28:00 GMT",
            now,
        )
        .unwrap();
        assert_eq!(record.expires, Some(now + ChronoDuration::hours(1)));

        let deleted = parse_set_cookie("csrftoken=; Max-Age=0", now).unwrap();
        assert!(deleted.is_expired_at(now));
    }

    #[test]
    fn test_out_of_range_max_age_is_ignored() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let record = parse_set_cookie("sessionid=abc; Max-Age=99999999999999", now).unwrap();
        assert_eq!(record.value, "abc");
        assert_eq!(record.expires, None);

        let record = parse_set_cookie(
            "sessionid=abc; Max-Age=9223372036854775807; expires=Wed, 21 Oct 2026 07:28:00 GMT",
            now,
        )
        .unwrap();
        assert_eq!(
            record.expires,
            Some(Utc.with_ymd_and_hms(2026, 10, 21, 7, 28, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_set_cookie_rejects_garbage() {
        assert!(parse_set_cookie("no-equals-sign", Utc::now()).is_none());
        assert!(parse_set_cookie("=value", Utc::now()).is_none());
    }

    #[test]
    fn test_response_headers_case_insensitive() {
        let response = HttpResponse::new(429, "")
            .with_header("Retry-After", "30")
            .with_header("set-cookie", "a=1")
            .with_header("Set-Cookie", "b=2");

        assert_eq!(response.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(response.set_cookies(Utc::now()).len(), 2);
        assert!(!response.is_success());
    }
}
